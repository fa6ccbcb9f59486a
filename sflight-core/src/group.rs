use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use crate::call::{Call, Completion, Settled};
use crate::table::{Claim, Table};
use crate::{ConfigError, GroupConfig};
#[cfg(feature = "stats")]
use crate::FlightStats;

/// What a caller gets back from [`Group::work`].
///
/// * `result` - the producing function's result, shared by every caller of the
///   same execution
/// * `executed` - true if this caller ran the producing function itself, false
///   if it was served by another caller's execution. Useful for
///   instrumentation, not a correctness signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flight<T, E> {
    pub result: Result<T, E>,
    pub executed: bool,
}

impl<T, E> Flight<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn into_parts(self) -> (Result<T, E>, bool) {
        (self.result, self.executed)
    }
}

/// A coalescing group for blocking producers.
///
/// When several threads call [`work`](Group::work) with the same key at
/// overlapping times, only one of them runs the producing function; the others
/// block until it finishes and receive a clone of the same result. The result
/// keeps being handed out to new callers until its freshness window (measured
/// from the moment the execution *started*) elapses.
///
/// # Type Parameters
///
/// * `K` - Key type. Compared by equality, so it must be `Eq + Hash`.
/// * `T` - Success value. Cloned for every caller.
/// * `E` - Error value. Cached and shared exactly like a success.
///
/// # Freshness
///
/// A caller that finds a record started less than `expires` ago joins it, even
/// if the record is still executing. A caller that finds an older record does
/// not join it, even if it is still executing: it starts a new execution and
/// publishes it in place of the old one. Callers already waiting on the old
/// record still get its result.
///
/// # Thread Safety
///
/// The group is `Clone`; clones share the same table. The table mutex is held
/// only for bookkeeping, never while a producer runs or a caller waits, so a
/// slow producer never delays unrelated keys.
///
/// # Panics in the Producer
///
/// If the producing function panics, the panic propagates to the caller that
/// ran it. Callers waiting on that execution are woken, the abandoned record is
/// removed, and each waiter retries: one of them runs the producing function
/// again and the rest join it. Waiters never block forever and never see a
/// value that was not produced.
///
/// # Examples
///
/// ```
/// use sflight_core::Group;
/// use std::time::Duration;
///
/// let group: Group<u64, String, String> = Group::new(Duration::from_secs(5));
///
/// let flight = group.work(1, || Ok("x".to_string()));
/// assert_eq!(flight.result, Ok("x".to_string()));
/// assert!(flight.executed);
///
/// // Within the window, the cached result is reused.
/// let flight = group.work(1, || Ok("y".to_string()));
/// assert_eq!(flight.result, Ok("x".to_string()));
/// assert!(!flight.executed);
///
/// // After forgetting the key, the producer runs again.
/// group.forget(&1);
/// let flight = group.work(1, || Ok("y".to_string()));
/// assert_eq!(flight.result, Ok("y".to_string()));
/// ```
pub struct Group<K, T, E> {
    table: Arc<Table<K, Call<T, E>>>,
}

impl<K, T, E> Group<K, T, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a group whose results stay fresh for `expires`.
    ///
    /// # Panics
    ///
    /// Panics if `expires` is zero. A zero window is rejected rather than read
    /// as "execute every call, never join". Use [`Group::with_config`] to
    /// handle that case as an error.
    pub fn new(expires: Duration) -> Self {
        match Self::with_config(GroupConfig::new(expires)) {
            Ok(group) => group,
            Err(err) => panic!("invalid group configuration: {err}"),
        }
    }

    /// Creates a group from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration does not validate.
    pub fn with_config(config: impl Into<GroupConfig>) -> Result<Self, ConfigError> {
        Ok(Self {
            table: Arc::new(Table::new(config.into())?),
        })
    }

    /// Runs `f` for `key`, or joins an execution already running or recently
    /// finished for the same key.
    ///
    /// # Behavior
    ///
    /// 1. Under the table lock, look up the current record for `key`.
    /// 2. Fresh record: release the lock, block until it settles, return its
    ///    result with `executed = false`.
    /// 3. No record or a stale one: publish a new record, release the lock, run
    ///    `f` on this thread, store its result, wake all waiters, and return
    ///    with `executed = true`.
    ///
    /// A sweep of expired records is dispatched in the background if the
    /// sweep interval has passed.
    pub fn work<F>(&self, key: K, f: F) -> Flight<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        loop {
            match self.table.claim(key.clone(), |now| (Call::new(now), ())) {
                Claim::Lead(call, ()) => return self.lead(&key, &call, f),
                Claim::Join(call) => {
                    #[cfg(feature = "stats")]
                    self.table.stats().record_join();
                    trace!(group = self.table.name(), "joining call");

                    match call.wait() {
                        Settled::Done(result) => {
                            return Flight {
                                result: result.clone(),
                                executed: false,
                            };
                        }
                        Settled::Abandoned => {
                            trace!(group = self.table.name(), "joined call was abandoned, retrying");
                            self.table.retire(&key, &call);
                        }
                    }
                }
            }
        }
    }

    fn lead<F>(&self, key: &K, call: &Arc<Call<T, E>>, f: F) -> Flight<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        #[cfg(feature = "stats")]
        self.table.stats().record_execution();
        trace!(group = self.table.name(), "leading call");

        let execution = Execution {
            table: &self.table,
            key,
            call,
            completion: Some(call.completion()),
        };
        let result = f();
        execution.complete(result.clone());

        Flight {
            result,
            executed: true,
        }
    }

    /// Removes the current record for `key`, so the next call runs the
    /// producer again.
    ///
    /// An execution already in flight is not cancelled and its waiters still
    /// receive its result. Returns true if a record was removed.
    pub fn forget(&self, key: &K) -> bool {
        self.table.forget(key)
    }

    /// Runs an expiration sweep right now on the calling thread.
    ///
    /// Returns the number of records removed.
    pub fn purge_expired(&self) -> usize {
        self.table.sweep(Instant::now())
    }
}

impl<K, T, E> Group<K, T, E> {
    /// Drops every current record.
    pub fn clear(&self) {
        self.table.clear();
    }

    /// Number of keys with a current record, fresh or not yet swept.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The freshness window.
    pub fn expires(&self) -> Duration {
        self.table.expires()
    }

    pub fn name(&self) -> Option<&str> {
        self.table.name()
    }

    /// Returns this group's statistics.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &FlightStats {
        self.table.stats()
    }
}

impl<K, T, E> Clone for Group<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K, T, E> fmt::Debug for Group<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group").field("table", &self.table).finish()
    }
}

/// The leader's side of a call.
///
/// If the producer unwinds, the record is retired from the table before it is
/// settled as abandoned, so woken waiters retry against a clean slot.
struct Execution<'a, K, T, E>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    table: &'a Arc<Table<K, Call<T, E>>>,
    key: &'a K,
    call: &'a Arc<Call<T, E>>,
    completion: Option<Completion<'a, T, E>>,
}

impl<K, T, E> Execution<'_, K, T, E>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn complete(mut self, result: Result<T, E>) {
        if let Some(completion) = self.completion.take() {
            completion.complete(result);
        }
    }
}

impl<K, T, E> Drop for Execution<'_, K, T, E>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            warn!(group = self.table.name(), "producer unwound, abandoning call");
            self.table.retire(self.key, self.call);
            #[cfg(feature = "stats")]
            self.table.stats().record_abandoned();
            drop(completion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn group(expires: Duration) -> Group<u32, String, String> {
        Group::new(expires)
    }

    #[test]
    fn test_work_returns_value() {
        let group = group(Duration::from_secs(5));
        let flight = group.work(1, || Ok("sflight".to_string()));
        assert_eq!(flight.result, Ok("sflight".to_string()));
        assert!(flight.executed);
    }

    #[test]
    fn test_work_returns_error() {
        let group = group(Duration::from_secs(5));
        let flight = group.work(1, || Err("test error".to_string()));
        assert_eq!(flight.result, Err("test error".to_string()));
        assert!(flight.executed);
    }

    #[test]
    fn test_error_is_cached_within_window() {
        let group = group(Duration::from_secs(5));
        group.work(1, || Err("boom".to_string()));

        let flight = group.work(1, || Ok("recovered".to_string()));
        assert_eq!(flight.result, Err("boom".to_string()));
        assert!(!flight.executed);
    }

    #[test]
    fn test_sequential_calls_reuse_result() {
        let group = group(Duration::from_secs(5));
        let counter = AtomicUsize::new(0);

        for _ in 0..5 {
            let flight = group.work(1, || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("a".to_string())
            });
            assert_eq!(flight.result, Ok("a".to_string()));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_keys_execute_separately() {
        let group = group(Duration::from_secs(5));
        assert_eq!(group.work(1, || Ok("one".to_string())).result, Ok("one".to_string()));
        assert_eq!(group.work(2, || Ok("two".to_string())).result, Ok("two".to_string()));
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_concurrent_calls_execute_once() {
        let group = group(Duration::from_secs(5));
        let counter = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(100));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let group = group.clone();
                let counter = Arc::clone(&counter);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    group.work(1, || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        Ok("a".to_string())
                    })
                })
            })
            .collect();

        let flights: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(flights.iter().all(|f| f.result == Ok("a".to_string())));
        assert_eq!(flights.iter().filter(|f| f.executed).count(), 1);
    }

    #[test]
    fn test_stale_record_executes_again() {
        let group = group(Duration::from_millis(100));
        group.work(1, || Ok("a".to_string()));

        thread::sleep(Duration::from_millis(200));

        let flight = group.work(1, || Ok("b".to_string()));
        assert_eq!(flight.result, Ok("b".to_string()));
        assert!(flight.executed);
    }

    #[test]
    fn test_stale_in_flight_call_is_not_joined() {
        let group = group(Duration::from_millis(30));
        let slow = {
            let group = group.clone();
            thread::spawn(move || {
                group.work(1, || {
                    thread::sleep(Duration::from_millis(120));
                    Ok("slow".to_string())
                })
            })
        };

        // The slow call is still running but its window has passed.
        thread::sleep(Duration::from_millis(60));
        let fresh = group.work(1, || Ok("fresh".to_string()));
        assert_eq!(fresh.result, Ok("fresh".to_string()));
        assert!(fresh.executed);

        let slow = slow.join().unwrap();
        assert_eq!(slow.result, Ok("slow".to_string()));
        assert!(slow.executed);
    }

    #[test]
    fn test_superseded_waiters_keep_old_result() {
        let group = group(Duration::from_millis(50));
        let started = Arc::new(Barrier::new(2));

        let leader = {
            let group = group.clone();
            let started = Arc::clone(&started);
            thread::spawn(move || {
                group.work(1, || {
                    started.wait();
                    thread::sleep(Duration::from_millis(150));
                    Ok("old".to_string())
                })
            })
        };
        started.wait();

        // Joins the old record while it is fresh.
        let waiter = {
            let group = group.clone();
            thread::spawn(move || group.work(1, || Ok("unused".to_string())))
        };

        thread::sleep(Duration::from_millis(80));
        // Supersedes the old record.
        let newer = group.work(1, || Ok("new".to_string()));

        assert_eq!(newer.result, Ok("new".to_string()));
        let waited = waiter.join().unwrap();
        assert_eq!(waited.result, Ok("old".to_string()));
        assert!(!waited.executed);
        assert_eq!(leader.join().unwrap().result, Ok("old".to_string()));
    }

    #[test]
    fn test_forget_forces_execution() {
        let group = group(Duration::from_secs(5));
        group.work(1, || Ok("a".to_string()));

        assert!(group.forget(&1));
        let flight = group.work(1, || Ok("b".to_string()));
        assert_eq!(flight.result, Ok("b".to_string()));
        assert!(flight.executed);
    }

    #[test]
    fn test_forget_missing_key_is_noop() {
        let group = group(Duration::from_secs(5));
        assert!(!group.forget(&42));
        assert!(group.is_empty());
    }

    #[test]
    fn test_forget_does_not_cancel_in_flight() {
        let group = group(Duration::from_secs(5));
        let started = Arc::new(Barrier::new(2));

        let leader = {
            let group = group.clone();
            let started = Arc::clone(&started);
            thread::spawn(move || {
                group.work(1, || {
                    started.wait();
                    thread::sleep(Duration::from_millis(50));
                    Ok("in-flight".to_string())
                })
            })
        };
        started.wait();
        group.forget(&1);

        assert_eq!(leader.join().unwrap().result, Ok("in-flight".to_string()));
        // The forgotten record is not republished by its leader.
        assert!(group.is_empty());
    }

    // Spawns a slow leader on key 1 and one caller that joins it. Returns once
    // both are attached.
    fn slow_leader_with_joiner(
        group: &Group<u32, String, String>,
    ) -> (
        thread::JoinHandle<Flight<String, String>>,
        thread::JoinHandle<Flight<String, String>>,
    ) {
        let started = Arc::new(Barrier::new(2));
        let leader = {
            let group = group.clone();
            let started = Arc::clone(&started);
            thread::spawn(move || {
                group.work(1, || {
                    started.wait();
                    thread::sleep(Duration::from_millis(150));
                    Ok("old".to_string())
                })
            })
        };
        started.wait();

        let joiner = {
            let group = group.clone();
            thread::spawn(move || group.work(1, || Ok("new".to_string())))
        };
        thread::sleep(Duration::from_millis(20));
        (leader, joiner)
    }

    #[test]
    fn test_joiner_survives_sweep_of_in_flight_record() {
        let group: Group<u32, String, String> = Group::with_config(
            GroupConfig::new(Duration::from_millis(50)).with_sweep_interval(Duration::from_secs(60)),
        )
        .unwrap();
        let (leader, joiner) = slow_leader_with_joiner(&group);

        // The record is now past its window but still executing.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(group.purge_expired(), 1);
        assert!(!group.forget(&1));

        let joined = joiner.join().unwrap();
        assert_eq!(joined.result, Ok("old".to_string()));
        assert!(!joined.executed);
        assert!(leader.join().unwrap().executed);
        assert!(group.is_empty());
    }

    #[test]
    fn test_joiner_survives_forget_of_in_flight_record() {
        let group = group(Duration::from_secs(5));
        let (leader, joiner) = slow_leader_with_joiner(&group);

        assert!(group.forget(&1));

        let joined = joiner.join().unwrap();
        assert_eq!(joined.result, Ok("old".to_string()));
        assert!(!joined.executed);
        assert_eq!(leader.join().unwrap().result, Ok("old".to_string()));

        // Callers arriving after the forget start a new execution.
        assert!(group.work(1, || Ok("new".to_string())).executed);
    }

    #[test]
    fn test_panicking_leader_releases_waiters() {
        let group = group(Duration::from_secs(5));
        let started = Arc::new(Barrier::new(2));
        let executions = Arc::new(AtomicUsize::new(0));

        let leader = {
            let group = group.clone();
            let started = Arc::clone(&started);
            thread::spawn(move || {
                group.work(1, || -> Result<String, String> {
                    started.wait();
                    thread::sleep(Duration::from_millis(50));
                    panic!("producer failed");
                })
            })
        };
        started.wait();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let group = group.clone();
                let executions = Arc::clone(&executions);
                thread::spawn(move || {
                    group.work(1, || {
                        executions.fetch_add(1, Ordering::SeqCst);
                        Ok("retried".to_string())
                    })
                })
            })
            .collect();

        assert!(leader.join().is_err());
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().result, Ok("retried".to_string()));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_leader_does_not_poison_key() {
        let group = group(Duration::from_secs(5));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            group.work(1, || -> Result<String, String> { panic!("boom") })
        }));
        assert!(result.is_err());
        assert!(group.is_empty());

        let flight = group.work(1, || Ok("ok".to_string()));
        assert_eq!(flight.result, Ok("ok".to_string()));
        assert!(flight.executed);
    }

    #[test]
    fn test_purge_expired() {
        // A long sweep interval keeps the background sweep out of the way.
        let group: Group<u32, String, String> = Group::with_config(
            GroupConfig::new(Duration::from_millis(20)).with_sweep_interval(Duration::from_secs(60)),
        )
        .unwrap();
        group.work(1, || Ok("a".to_string()));
        group.work(2, || Ok("b".to_string()));

        thread::sleep(Duration::from_millis(40));
        group.work(3, || Ok("c".to_string()));

        assert_eq!(group.purge_expired(), 2);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_clear() {
        let group = group(Duration::from_secs(5));
        group.work(1, || Ok("a".to_string()));
        group.clear();
        assert!(group.is_empty());
        assert!(group.work(1, || Ok("b".to_string())).executed);
    }

    #[test]
    fn test_with_config_rejects_zero_expiry() {
        let result = Group::<u32, String, String>::with_config(Duration::ZERO);
        assert_eq!(result.err(), Some(ConfigError::ZeroExpiry));
    }

    #[test]
    #[should_panic(expected = "invalid group configuration")]
    fn test_new_panics_on_zero_expiry() {
        let _ = group(Duration::ZERO);
    }

    #[test]
    fn test_flight_accessors() {
        let flight: Flight<i32, ()> = Flight {
            result: Ok(7),
            executed: true,
        };
        assert!(flight.is_executed());
        assert_eq!(flight.clone().into_parts(), (Ok(7), true));
        assert_eq!(flight.into_result(), Ok(7));
    }

    #[cfg(feature = "stats")]
    #[test]
    fn test_stats_count_executions_and_joins() {
        let group = group(Duration::from_secs(5));
        group.work(1, || Ok("a".to_string()));
        group.work(1, || Ok("a".to_string()));
        group.work(1, || Ok("a".to_string()));

        assert_eq!(group.stats().executions(), 1);
        assert_eq!(group.stats().joins(), 2);
    }

    #[cfg(feature = "stats")]
    #[test]
    fn test_stats_count_abandoned() {
        let group = group(Duration::from_secs(5));
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            group.work(1, || -> Result<String, String> { panic!("boom") })
        }));
        assert_eq!(group.stats().abandoned(), 1);
    }
}
