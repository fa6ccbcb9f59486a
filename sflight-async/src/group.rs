use sflight_core::{Claim, ConfigError, Flight, GroupConfig, Table};
#[cfg(feature = "stats")]
use sflight_core::FlightStats;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use crate::call::{AsyncCall, Outcome};

/// A coalescing group for async producers.
///
/// The async counterpart of [`sflight_core::Group`], sharing the same table,
/// freshness rule and expiration sweep. Concurrent tasks calling
/// [`work`](AsyncGroup::work) with the same key share one execution of the
/// producer; the executing task awaits the producer itself and the others await
/// its result.
///
/// # Cancellation
///
/// If the executing task's future is dropped before the producer finishes, or
/// the producer panics, the record is abandoned: it is removed from the table
/// and every waiting task retries, so one of them becomes the new executor.
///
/// # Examples
///
/// ```
/// use sflight_async::AsyncGroup;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let group: AsyncGroup<&'static str, u64, String> = AsyncGroup::new(Duration::from_secs(5));
///
/// let flight = group.work("answer", || async { Ok(42) }).await;
/// assert_eq!(flight.result, Ok(42));
/// assert!(flight.executed);
///
/// let flight = group.work("answer", || async { Ok(0) }).await;
/// assert_eq!(flight.result, Ok(42));
/// assert!(!flight.executed);
/// # }
/// ```
pub struct AsyncGroup<K, T, E> {
    table: Arc<Table<K, AsyncCall<T, E>>>,
}

impl<K, T, E> AsyncGroup<K, T, E>
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
    /// as "execute every call, never join"; [`AsyncGroup::with_config`]
    /// reports it as [`ConfigError::ZeroExpiry`].
    pub fn new(expires: Duration) -> Self {
        match Self::with_config(GroupConfig::new(expires)) {
            Ok(group) => group,
            Err(err) => panic!("invalid group configuration: {err}"),
        }
    }

    /// Creates a group from a full configuration.
    pub fn with_config(config: impl Into<GroupConfig>) -> Result<Self, ConfigError> {
        Ok(Self {
            table: Arc::new(Table::new(config.into())?),
        })
    }

    /// Awaits `f()` for `key`, or joins an execution already running or
    /// recently finished for the same key.
    ///
    /// The table lock is never held across an `.await`.
    pub async fn work<F, Fut>(&self, key: K, f: F) -> Flight<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            match self.table.claim(key.clone(), AsyncCall::new) {
                Claim::Lead(call, outcome) => return self.lead(&key, &call, outcome, f).await,
                Claim::Join(call) => {
                    #[cfg(feature = "stats")]
                    self.table.stats().record_join();
                    trace!(group = self.table.name(), "joining call");

                    if let Some(result) = call.wait().await {
                        return Flight {
                            result,
                            executed: false,
                        };
                    }
                    trace!(group = self.table.name(), "joined call was abandoned, retrying");
                    self.table.retire(&key, &call);
                }
            }
        }
    }

    async fn lead<F, Fut>(
        &self,
        key: &K,
        call: &Arc<AsyncCall<T, E>>,
        outcome: Outcome<T, E>,
        f: F,
    ) -> Flight<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        #[cfg(feature = "stats")]
        self.table.stats().record_execution();
        trace!(group = self.table.name(), "leading call");

        let execution = Execution {
            table: &self.table,
            key,
            call,
            outcome: Some(outcome),
        };
        let result = f().await;
        execution.complete(result.clone());

        Flight {
            result,
            executed: true,
        }
    }

    /// Removes the current record for `key`. In-flight work is not cancelled.
    pub fn forget(&self, key: &K) -> bool {
        self.table.forget(key)
    }

    /// Runs an expiration sweep right now on the calling thread.
    pub fn purge_expired(&self) -> usize {
        self.table.sweep(Instant::now())
    }
}

impl<K, T, E> AsyncGroup<K, T, E> {
    pub fn clear(&self) {
        self.table.clear();
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn expires(&self) -> Duration {
        self.table.expires()
    }

    pub fn name(&self) -> Option<&str> {
        self.table.name()
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &FlightStats {
        self.table.stats()
    }
}

impl<K, T, E> Clone for AsyncGroup<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K, T, E> fmt::Debug for AsyncGroup<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncGroup")
            .field("table", &self.table)
            .finish()
    }
}

/// The executing task's side of a call. Dropped unsent, it abandons the call.
struct Execution<'a, K, T, E>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    table: &'a Arc<Table<K, AsyncCall<T, E>>>,
    key: &'a K,
    call: &'a Arc<AsyncCall<T, E>>,
    outcome: Option<Outcome<T, E>>,
}

impl<K, T, E> Execution<'_, K, T, E>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn complete(mut self, result: Result<T, E>) {
        if let Some(outcome) = self.outcome.take() {
            outcome.send_replace(Some(result));
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
        if let Some(outcome) = self.outcome.take() {
            warn!(group = self.table.name(), "producer cancelled or unwound, abandoning call");
            self.table.retire(self.key, self.call);
            #[cfg(feature = "stats")]
            self.table.stats().record_abandoned();
            drop(outcome);
        }
    }
}
