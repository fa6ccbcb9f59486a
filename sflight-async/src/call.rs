use sflight_core::Started;
use std::fmt;
use std::time::Instant;
use tokio::sync::watch;

/// Sending half of an [`AsyncCall`], held by the task executing it.
pub(crate) type Outcome<T, E> = watch::Sender<Option<Result<T, E>>>;

/// One execution of an async producer for a key.
///
/// The record keeps the receiving end of a `watch` channel; the executing task
/// keeps the only sender. Sending the result settles the record for every
/// waiter. If the sender is dropped without sending (the producer panicked or
/// its future was dropped), waiters see the channel close and treat the record
/// as abandoned.
pub struct AsyncCall<T, E> {
    started_at: Instant,
    outcome: watch::Receiver<Option<Result<T, E>>>,
}

impl<T, E> AsyncCall<T, E> {
    /// Creates a pending record and the sender that settles it.
    pub(crate) fn new(started_at: Instant) -> (Self, Outcome<T, E>) {
        let (tx, rx) = watch::channel(None);
        let call = Self {
            started_at,
            outcome: rx,
        };
        (call, tx)
    }

    /// Returns true once a result has been sent.
    pub fn is_settled(&self) -> bool {
        self.outcome.borrow().is_some()
    }
}

impl<T: Clone, E: Clone> AsyncCall<T, E> {
    /// Waits until the record settles.
    ///
    /// Returns `None` if the executor went away without producing a result.
    pub async fn wait(&self) -> Option<Result<T, E>> {
        let mut rx = self.outcome.clone();
        // A closed channel still holds the last value sent, so the result of
        // the wait itself does not matter.
        let _ = rx.wait_for(Option::is_some).await;
        let settled = rx.borrow().clone();
        settled
    }
}

impl<T, E> Started for AsyncCall<T, E> {
    fn started_at(&self) -> Instant {
        self.started_at
    }
}

impl<T, E> fmt::Debug for AsyncCall<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.outcome.borrow() {
            None => "pending",
            Some(Ok(_)) => "ok",
            Some(Err(_)) => "err",
        };
        f.debug_struct("AsyncCall")
            .field("started_at", &self.started_at)
            .field("state", &state)
            .finish()
    }
}
