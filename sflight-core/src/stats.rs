use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for a coalescing group.
///
/// Tracks how often callers led an execution versus joined one, how often an
/// execution was abandoned, and how much the expiration sweep reclaimed.
///
/// # Thread Safety
///
/// All counters are atomics updated with `Relaxed` ordering. Values are
/// independent of each other, so a snapshot taken while calls are in flight may
/// be momentarily inconsistent across counters.
///
/// # Examples
///
/// ```
/// use sflight_core::FlightStats;
///
/// let stats = FlightStats::new();
///
/// stats.record_execution();
/// stats.record_join();
/// stats.record_join();
///
/// assert_eq!(stats.executions(), 1);
/// assert_eq!(stats.joins(), 2);
/// assert_eq!(stats.total_calls(), 3);
/// assert!((stats.join_rate() - 0.6666).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct FlightStats {
    executions: AtomicU64,
    joins: AtomicU64,
    abandoned: AtomicU64,
    sweeps: AtomicU64,
    swept: AtomicU64,
}

impl FlightStats {
    /// Creates a new `FlightStats` instance with zero counters.
    pub fn new() -> Self {
        Self {
            executions: AtomicU64::new(0),
            joins: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            swept: AtomicU64::new(0),
        }
    }

    /// Records a call that ran the producing function itself.
    #[inline]
    pub fn record_execution(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a call that was served by another caller's execution.
    #[inline]
    pub fn record_join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an execution whose leader unwound before producing a result.
    #[inline]
    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one sweep pass that removed `removed` records.
    #[inline]
    pub fn record_sweep(&self, removed: u64) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.swept.fetch_add(removed, Ordering::Relaxed);
    }

    #[inline]
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn joins(&self) -> u64 {
        self.joins.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Number of sweep passes run so far.
    #[inline]
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Total records removed by sweeps.
    #[inline]
    pub fn swept(&self) -> u64 {
        self.swept.load(Ordering::Relaxed)
    }

    /// Returns the total number of calls (executions + joins).
    ///
    /// A caller that retries after an abandoned execution is counted once per
    /// attempt.
    #[inline]
    pub fn total_calls(&self) -> u64 {
        self.executions() + self.joins()
    }

    /// Fraction of calls (0.0 to 1.0) served by another caller's execution.
    ///
    /// Returns 0.0 if there have been no calls.
    ///
    /// # Examples
    ///
    /// ```
    /// use sflight_core::FlightStats;
    ///
    /// let stats = FlightStats::new();
    /// assert_eq!(stats.join_rate(), 0.0);
    ///
    /// stats.record_execution();
    /// for _ in 0..3 {
    ///     stats.record_join();
    /// }
    /// assert_eq!(stats.join_rate(), 0.75);
    /// ```
    #[inline]
    pub fn join_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            0.0
        } else {
            self.joins() as f64 / total as f64
        }
    }

    /// Fraction of calls (0.0 to 1.0) that executed the producing function.
    #[inline]
    pub fn execution_rate(&self) -> f64 {
        1.0 - self.join_rate()
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.executions.store(0, Ordering::Relaxed);
        self.joins.store(0, Ordering::Relaxed);
        self.abandoned.store(0, Ordering::Relaxed);
        self.sweeps.store(0, Ordering::Relaxed);
        self.swept.store(0, Ordering::Relaxed);
    }
}

impl Default for FlightStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for FlightStats {
    fn clone(&self) -> Self {
        Self {
            executions: AtomicU64::new(self.executions()),
            joins: AtomicU64::new(self.joins()),
            abandoned: AtomicU64::new(self.abandoned()),
            sweeps: AtomicU64::new(self.sweeps()),
            swept: AtomicU64::new(self.swept()),
        }
    }
}

impl fmt::Display for FlightStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "executions={} joins={} abandoned={} sweeps={} swept={} join_rate={:.2}%",
            self.executions(),
            self.joins(),
            self.abandoned(),
            self.sweeps(),
            self.swept(),
            self.join_rate() * 100.0
        )
    }
}
