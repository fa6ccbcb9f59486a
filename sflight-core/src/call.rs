use once_cell::sync::OnceCell;
use std::fmt;
use std::time::{Duration, Instant};

use crate::table::Started;

/// Final state of a call record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    /// The producing function returned this result.
    Done(Result<T, E>),
    /// The executor unwound before storing a result.
    Abandoned,
}

/// One execution of the producing function for a key.
///
/// A record is created pending and is settled exactly once by its executor
/// through a [`Completion`] guard. After that it is immutable and any number of
/// threads may read it without locking. Observers block in [`Call::wait`]
/// until the record settles.
///
/// # Examples
///
/// ```
/// use sflight_core::Call;
/// use std::time::Instant;
///
/// let call: Call<&str, ()> = Call::new(Instant::now());
/// assert!(!call.is_settled());
/// assert!(call.try_get().is_none());
/// ```
///
/// Only the executing group can settle a record; outside code cannot obtain
/// a completion:
///
/// ```compile_fail
/// use sflight_core::Call;
/// use std::time::Instant;
///
/// let call: Call<&str, ()> = Call::new(Instant::now());
/// call.completion().complete(Ok("x"));
/// ```
pub struct Call<T, E> {
    started_at: Instant,
    outcome: OnceCell<Settled<T, E>>,
}

impl<T, E> Call<T, E> {
    /// Creates a pending record that started at `started_at`.
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            outcome: OnceCell::new(),
        }
    }

    /// When the execution behind this record began.
    #[inline]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Age of the record at `now`. Zero if `now` precedes the start.
    #[inline]
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Returns true if the record may still be joined at `now`.
    #[inline]
    pub fn is_fresh_at(&self, now: Instant, expires: Duration) -> bool {
        self.age_at(now) < expires
    }

    /// Returns true once the executor has settled the record.
    pub fn is_settled(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Returns the outcome without blocking, if settled.
    pub fn try_get(&self) -> Option<&Settled<T, E>> {
        self.outcome.get()
    }

    /// Blocks the current thread until the record settles.
    pub fn wait(&self) -> &Settled<T, E> {
        self.outcome.wait()
    }

    /// Returns the guard through which the executor settles this record.
    ///
    /// Only the caller that created the record holds a completion.
    pub(crate) fn completion(&self) -> Completion<'_, T, E> {
        Completion {
            call: self,
            armed: true,
        }
    }

    fn settle(&self, settled: Settled<T, E>) {
        // The executor is the only writer, so the cell is always empty here.
        let _ = self.outcome.set(settled);
    }
}

impl<T, E> Started for Call<T, E> {
    fn started_at(&self) -> Instant {
        self.started_at
    }
}

impl<T, E> fmt::Debug for Call<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.outcome.get() {
            None => "pending",
            Some(Settled::Done(Ok(_))) => "ok",
            Some(Settled::Done(Err(_))) => "err",
            Some(Settled::Abandoned) => "abandoned",
        };
        f.debug_struct("Call")
            .field("started_at", &self.started_at)
            .field("state", &state)
            .finish()
    }
}

/// Executor-side handle that settles a [`Call`] exactly once.
///
/// Dropping the guard without calling [`Completion::complete`] settles the
/// record as [`Settled::Abandoned`]. This is what happens when the producing
/// function panics, and it wakes every waiter.
#[must_use = "dropping a completion abandons the call"]
pub struct Completion<'a, T, E> {
    call: &'a Call<T, E>,
    armed: bool,
}

impl<T, E> Completion<'_, T, E> {
    /// Stores the result and wakes all waiters.
    pub fn complete(mut self, result: Result<T, E>) {
        self.armed = false;
        self.call.settle(Settled::Done(result));
    }
}

impl<T, E> Drop for Completion<'_, T, E> {
    fn drop(&mut self) {
        if self.armed {
            self.call.settle(Settled::Abandoned);
        }
    }
}
