use std::sync::atomic::{AtomicI64, Ordering};

/// Whether a breakpoint hit should raise or lower the trial score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

/// A breakpoint repurposed as a pure hit counter.
///
/// One `HitCounter` is shared (via `Arc`) between the debugger backend,
/// which calls `record_hit` once per actual breakpoint hit, and the
/// `ScoreOracle`, which reads and clears the accumulated score between
/// trials. The counter never pauses target execution.
#[derive(Debug)]
pub struct HitCounter {
    delta: i64,
    score: AtomicI64,
}

impl HitCounter {
    pub fn new(polarity: Polarity) -> Self {
        let delta = match polarity {
            Polarity::Positive => 1,
            Polarity::Negative => -1,
        };
        Self {
            delta,
            score: AtomicI64::new(0),
        }
    }

    /// Called by the debugger backend on every hit.
    pub fn record_hit(&self) {
        self.score.fetch_add(self.delta, Ordering::SeqCst);
    }

    /// Non-clearing read of the accumulated score.
    pub fn score(&self) -> i64 {
        self.score.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.score.store(0, Ordering::SeqCst);
    }

    /// Atomic read-and-clear.
    pub fn pop(&self) -> i64 {
        self.score.swap(0, Ordering::SeqCst)
    }
}
