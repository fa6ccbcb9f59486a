#![cfg(feature = "stats")]

use serial_test::serial;
use sflight::{stats_registry, Group, GroupConfig};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

fn named(name: &str, expires: Duration) -> Group<u32, String, String> {
    Group::with_config(GroupConfig::new(expires).with_name(name)).unwrap()
}

#[test]
#[serial]
fn test_named_group_registers_stats() {
    let group = named("stats_lookup", Duration::from_secs(5));
    group.work(1, || Ok("a".to_string()));
    group.work(1, || Ok("a".to_string()));
    group.work(2, || Ok("b".to_string()));

    let stats = stats_registry::get("stats_lookup").unwrap();
    assert_eq!(stats.executions(), 2);
    assert_eq!(stats.joins(), 1);
    assert_eq!(stats.total_calls(), 3);
    assert!(stats_registry::list().contains(&"stats_lookup".to_string()));

    stats_registry::unregister("stats_lookup");
}

#[test]
#[serial]
fn test_concurrent_joins_are_counted() {
    let group = named("stats_concurrent", Duration::from_secs(5));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let group = group.clone();
            thread::spawn(move || {
                group.work(1, || {
                    thread::sleep(Duration::from_millis(20));
                    Ok("a".to_string())
                })
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = stats_registry::get_arc("stats_concurrent").unwrap();
    assert_eq!(stats.executions(), 1);
    assert_eq!(stats.joins(), 49);
    assert!((stats.join_rate() - 0.98).abs() < 0.001);

    stats_registry::unregister("stats_concurrent");
}

#[test]
#[serial]
fn test_abandoned_and_sweep_counters() {
    let group = named("stats_sweep", Duration::from_millis(10));

    let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
        group.work(1, || -> Result<String, String> { panic!("producer failed") })
    }));
    assert!(unwound.is_err());

    group.work(2, || Ok("b".to_string()));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(group.purge_expired(), 1);

    let stats = group.stats();
    assert_eq!(stats.abandoned(), 1);
    assert_eq!(stats.sweeps(), 1);
    assert_eq!(stats.swept(), 1);

    stats_registry::reset("stats_sweep");
    assert_eq!(group.stats().total_calls(), 0);
    stats_registry::unregister("stats_sweep");
}
