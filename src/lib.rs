//! # sflight
//!
//! Coalesce concurrent, identical units of work.
//!
//! When several callers ask for the result of the same key at overlapping
//! times, only one of them runs the producing function. The others block and
//! receive the same result. The result stays reusable for a bounded freshness
//! window, so a burst of requests for one key is served by a single recent
//! execution even when the requests do not overlap perfectly.
//!
//! ## Features
//!
//! - **One execution per window**: concurrent callers for a key share one run
//! - **Errors are shared too**: a failed run is handed to every caller of its window
//! - **Bounded memory**: stale records are swept opportunistically from regular traffic
//! - **Panic safe**: a panicking producer wakes its waiters, one of which takes over
//! - **Async support**: `AsyncGroup` with the `async` feature
//! - **Statistics**: execution/join counters per group (`stats` feature, on by default)
//!
//! ## Quick Start
//!
//! ```rust
//! use sflight::Group;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let group: Group<&'static str, String, String> = Group::new(Duration::from_secs(5));
//! let runs = Arc::new(AtomicUsize::new(0));
//!
//! let handles: Vec<_> = (0..8)
//!     .map(|_| {
//!         let group = group.clone();
//!         let runs = Arc::clone(&runs);
//!         thread::spawn(move || {
//!             group.work("config", || {
//!                 runs.fetch_add(1, Ordering::SeqCst);
//!                 thread::sleep(Duration::from_millis(20));
//!                 Ok("loaded".to_string())
//!             })
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     assert_eq!(handle.join().unwrap().result, Ok("loaded".to_string()));
//! }
//! assert_eq!(runs.load(Ordering::SeqCst), 1);
//! ```
//!
//! ## Freshness Window
//!
//! The window is measured from the moment an execution *starts*. A caller that
//! arrives after the window has passed never reuses the old execution, even if
//! it is still running; it starts a new one.
//!
//! ```rust
//! use sflight::Group;
//! use std::thread;
//! use std::time::Duration;
//!
//! let group: Group<u32, &'static str, ()> = Group::new(Duration::from_millis(50));
//! assert_eq!(group.work(1, || Ok("a")).result, Ok("a"));
//!
//! thread::sleep(Duration::from_millis(100));
//!
//! let flight = group.work(1, || Ok("b"));
//! assert_eq!(flight.result, Ok("b"));
//! assert!(flight.executed);
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use sflight::{Group, GroupConfig};
//! use std::time::Duration;
//!
//! let group: Group<u64, Vec<u8>, String> = Group::with_config(
//!     GroupConfig::new(Duration::from_secs(2))
//!         .with_sweep_interval(Duration::from_secs(30))
//!         .with_name("blob_fetch"),
//! )
//! .expect("valid configuration");
//! assert_eq!(group.name(), Some("blob_fetch"));
//! ```

pub use sflight_core::*;

#[cfg(feature = "async")]
pub use sflight_async::{AsyncCall, AsyncGroup};
