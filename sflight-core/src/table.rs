use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::{ConfigError, GroupConfig};
#[cfg(feature = "stats")]
use crate::FlightStats;

/// Anything stored in a [`Table`] must report when its execution started.
pub trait Started {
    fn started_at(&self) -> Instant;
}

/// Result of claiming a key in a [`Table`].
///
/// * `Join` - a fresh record already exists; wait on it.
/// * `Lead` - a new record was published; the caller must execute it. The
///   second field is whatever executor-side state the record factory produced.
#[derive(Debug)]
pub enum Claim<C, L = ()> {
    Join(Arc<C>),
    Lead(Arc<C>, L),
}

struct State<K, C> {
    calls: HashMap<K, Arc<C>>,
    swept_at: Instant,
}

/// The coalescing table shared by every clone of a group.
///
/// Maps each key to its *current* call record behind a single
/// `parking_lot::Mutex`. The lock is held only for bookkeeping: lookup,
/// freshness check, insertion, removal and the sweep pass. It is never held
/// while a producer runs or while a caller waits for a result.
///
/// # Expiration Sweep
///
/// Every [`claim`](Table::claim) checks whether the sweep interval has passed
/// since the last sweep. If so, a sweep is dispatched to a detached thread so
/// the caller is not delayed. A sweep removes every record that started at
/// least `expires` before the triggering call. Records already held by waiters
/// stay alive until those waiters drop them.
///
/// # Type Parameters
///
/// * `K` - Key type, compared by equality
/// * `C` - Record type, see [`Started`]
pub struct Table<K, C> {
    state: Mutex<State<K, C>>,
    expires: Duration,
    sweep_interval: Duration,
    name: Option<String>,
    #[cfg(feature = "stats")]
    stats: Arc<FlightStats>,
}

impl<K, C> Table<K, C>
where
    K: Eq + Hash + Send + Sync + 'static,
    C: Started + Send + Sync + 'static,
{
    /// Builds a table from a validated configuration.
    ///
    /// With the `stats` feature, a named table registers its statistics in the
    /// [`stats_registry`](crate::stats_registry), replacing any earlier
    /// registration under the same name.
    pub fn new(config: GroupConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sweep_interval = config.effective_sweep_interval();

        #[cfg(feature = "stats")]
        let stats = Arc::new(FlightStats::new());
        #[cfg(feature = "stats")]
        if let Some(name) = &config.name {
            crate::stats_registry::register(name, Arc::clone(&stats));
        }

        Ok(Self {
            state: Mutex::new(State {
                calls: HashMap::new(),
                swept_at: Instant::now(),
            }),
            expires: config.expires,
            sweep_interval,
            name: config.name,
            #[cfg(feature = "stats")]
            stats,
        })
    }

    /// Joins the fresh record for `key`, or publishes a new one built by `make`.
    ///
    /// `make` receives the instant that becomes the new record's start time.
    /// A stale record is superseded, not cancelled: callers already waiting on
    /// it keep their reference and still get its result.
    ///
    /// The sweep-due check runs on every claim, joins included, so join-only
    /// traffic on hot keys still reclaims expired cold keys.
    pub fn claim<L, F>(self: &Arc<Self>, key: K, make: F) -> Claim<C, L>
    where
        F: FnOnce(Instant) -> (C, L),
    {
        let now = Instant::now();
        let mut sweep_due = false;

        let claim = {
            let mut state = self.state.lock();

            if now.saturating_duration_since(state.swept_at) >= self.sweep_interval {
                state.swept_at = now;
                sweep_due = true;
            }

            let current = state
                .calls
                .get(&key)
                .filter(|call| self.is_fresh(call.as_ref(), now))
                .cloned();

            match current {
                Some(call) => Claim::Join(call),
                None => {
                    let (call, leader) = make(now);
                    let call = Arc::new(call);
                    state.calls.insert(key, Arc::clone(&call));
                    Claim::Lead(call, leader)
                }
            }
        };

        if sweep_due {
            self.dispatch_sweep(now);
        }

        claim
    }

    /// Removes the current record for `key`. Returns true if one was present.
    pub fn forget(&self, key: &K) -> bool {
        self.state.lock().calls.remove(key).is_some()
    }

    /// Removes `key` only if its current record is `call` itself.
    ///
    /// A newer record published under the same key is left alone.
    pub fn retire(&self, key: &K, call: &Arc<C>) -> bool {
        let mut state = self.state.lock();
        match state.calls.get(key) {
            Some(current) if Arc::ptr_eq(current, call) => {
                state.calls.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Removes every record that is at least `expires` old at `now`.
    ///
    /// Returns the number of removed records.
    pub fn sweep(&self, now: Instant) -> usize {
        let (removed, remaining) = {
            let mut state = self.state.lock();
            let before = state.calls.len();
            let expires = self.expires;
            state
                .calls
                .retain(|_, call| now.saturating_duration_since(call.started_at()) < expires);
            (before - state.calls.len(), state.calls.len())
        };

        #[cfg(feature = "stats")]
        self.stats.record_sweep(removed as u64);

        debug!(group = self.name(), removed, remaining, "expired calls swept");
        removed
    }

    fn dispatch_sweep(self: &Arc<Self>, now: Instant) {
        debug!(group = self.name(), "dispatching expiration sweep");
        let table = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("sflight-sweep".to_string())
            .spawn(move || {
                table.sweep(now);
            });
        if let Err(err) = spawned {
            warn!(group = self.name(), error = %err, "could not spawn sweep thread, sweeping inline");
            self.sweep(now);
        }
    }

    fn is_fresh(&self, call: &C, now: Instant) -> bool {
        now.saturating_duration_since(call.started_at()) < self.expires
    }
}

impl<K, C> Table<K, C> {
    /// Number of keys with a current record.
    pub fn len(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every current record.
    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    /// The freshness window.
    pub fn expires(&self) -> Duration {
        self.expires
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &Arc<FlightStats> {
        &self.stats
    }
}

impl<K, C> fmt::Debug for Table<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("expires", &self.expires)
            .field("sweep_interval", &self.sweep_interval)
            .field("len", &self.len())
            .finish()
    }
}
