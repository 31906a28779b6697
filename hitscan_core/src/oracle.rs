use crate::config::BreakpointSettings;
use crate::counter::{HitCounter, Polarity};
use crate::debugger::{Debugger, DebuggerError};
use std::sync::Arc;

/// Aggregates the instrumented-location counters into one signed trial
/// score plus independent win/lose flags.
///
/// The oracle is the sole reader of the counters; the debugger backend
/// is the sole writer. Clones share the same counters, so the executor
/// can reset them while the search engine reads them.
///
/// Invariant: between the `reset_all` preceding a trial and the reads
/// following it, exactly one trial's worth of hits is accumulated.
/// `ProcessController::trial` bundles that sequence so callers cannot
/// get the ordering wrong.
#[derive(Debug, Clone, Default)]
pub struct ScoreOracle {
    positive: Option<Arc<HitCounter>>,
    negative: Option<Arc<HitCounter>>,
    win: Option<Arc<HitCounter>>,
    lose: Option<Arc<HitCounter>>,
}

impl ScoreOracle {
    /// Creates the counters from the operator-supplied addresses and
    /// registers each with the debugger. Counters never pause the
    /// target; they only count.
    pub fn install<D: Debugger>(
        debugger: &mut D,
        breakpoints: &BreakpointSettings,
    ) -> Result<Self, DebuggerError> {
        let mut register = |addr: Option<u64>,
                            polarity: Polarity|
         -> Result<Option<Arc<HitCounter>>, DebuggerError> {
            match addr {
                Some(addr) => {
                    let counter = Arc::new(HitCounter::new(polarity));
                    debugger.add_counter(addr, Arc::clone(&counter))?;
                    Ok(Some(counter))
                }
                None => Ok(None),
            }
        };

        Ok(Self {
            positive: register(breakpoints.positive, Polarity::Positive)?,
            negative: register(breakpoints.negative, Polarity::Negative)?,
            win: register(breakpoints.win, Polarity::Positive)?,
            lose: register(breakpoints.lose, Polarity::Positive)?,
        })
    }

    /// Zeroes every counter, win and lose included. Must precede each
    /// trial; a missed reset corrupts that trial's score and every
    /// baseline after it.
    pub fn reset_all(&self) {
        for counter in [&self.positive, &self.negative, &self.win, &self.lose]
            .into_iter()
            .flatten()
        {
            counter.reset();
        }
    }

    /// Sum of positive and negative hits since the last reset,
    /// read-and-clear. Win/lose counters are left untouched so the
    /// flags stay readable independently.
    pub fn pop_score(&self) -> i64 {
        let mut score = 0;
        if let Some(counter) = &self.positive {
            score += counter.pop();
        }
        if let Some(counter) = &self.negative {
            score += counter.pop();
        }
        score
    }

    /// True iff the win breakpoint was hit since the last reset.
    /// Always false when no win breakpoint is configured.
    pub fn hit_win(&self) -> bool {
        self.win.as_ref().is_some_and(|c| c.score() != 0)
    }

    /// True iff the lose breakpoint was hit since the last reset.
    pub fn hit_lose(&self) -> bool {
        self.lose.as_ref().is_some_and(|c| c.score() != 0)
    }

    pub fn has_win(&self) -> bool {
        self.win.is_some()
    }

    pub fn has_lose(&self) -> bool {
        self.lose.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::{InputSource, StopReason};
    use std::collections::HashMap;

    /// Records registrations; hits are driven by the test by hand.
    #[derive(Default)]
    struct RecordingDebugger {
        counters: HashMap<u64, Arc<HitCounter>>,
    }

    impl Debugger for RecordingDebugger {
        fn add_counter(&mut self, addr: u64, counter: Arc<HitCounter>) -> Result<(), DebuggerError> {
            self.counters.insert(addr, counter);
            Ok(())
        }
        fn add_breakpoint(&mut self, _addr: u64, _silent: bool) -> Result<(), DebuggerError> {
            Ok(())
        }
        fn run(&mut self, _input: InputSource) -> Result<StopReason, DebuggerError> {
            Ok(StopReason::Exited(0))
        }
        fn resume(&mut self) -> Result<StopReason, DebuggerError> {
            Err(DebuggerError::NotRunning)
        }
        fn checkpoint(&mut self) -> Result<u32, DebuggerError> {
            Ok(1)
        }
        fn restore(&mut self, _id: u32) -> Result<(), DebuggerError> {
            Ok(())
        }
        fn delete_checkpoint(&mut self, _id: u32) -> Result<(), DebuggerError> {
            Ok(())
        }
        fn write_memory(&mut self, _addr: u64, _bytes: &[u8]) -> Result<(), DebuggerError> {
            Ok(())
        }
        fn set_quiet(&mut self, _quiet: bool) {}
    }

    fn full_settings() -> BreakpointSettings {
        BreakpointSettings {
            positive: Some(0x10),
            negative: Some(0x20),
            win: Some(0x30),
            lose: Some(0x40),
        }
    }

    #[test]
    fn install_registers_only_configured_counters() {
        let mut debugger = RecordingDebugger::default();
        let settings = BreakpointSettings {
            positive: Some(0x10),
            ..Default::default()
        };
        let oracle = ScoreOracle::install(&mut debugger, &settings).unwrap();
        assert_eq!(debugger.counters.len(), 1);
        assert!(debugger.counters.contains_key(&0x10));
        assert!(!oracle.has_win());
        assert!(!oracle.has_lose());
        assert!(!oracle.hit_win());
        assert!(!oracle.hit_lose());
    }

    #[test]
    fn pop_score_sums_polarities_and_clears() {
        let mut debugger = RecordingDebugger::default();
        let oracle = ScoreOracle::install(&mut debugger, &full_settings()).unwrap();

        for _ in 0..5 {
            debugger.counters[&0x10].record_hit();
        }
        for _ in 0..2 {
            debugger.counters[&0x20].record_hit();
        }
        assert_eq!(oracle.pop_score(), 3);
        assert_eq!(oracle.pop_score(), 0, "pop must clear");
    }

    #[test]
    fn win_and_lose_flags_survive_pop_score() {
        let mut debugger = RecordingDebugger::default();
        let oracle = ScoreOracle::install(&mut debugger, &full_settings()).unwrap();

        debugger.counters[&0x30].record_hit();
        debugger.counters[&0x40].record_hit();
        let _ = oracle.pop_score();
        assert!(oracle.hit_win());
        assert!(oracle.hit_lose());
        assert!(oracle.hit_win(), "flag reads must not clear");
    }

    #[test]
    fn reset_all_clears_every_counter() {
        let mut debugger = RecordingDebugger::default();
        let oracle = ScoreOracle::install(&mut debugger, &full_settings()).unwrap();

        for counter in debugger.counters.values() {
            counter.record_hit();
        }
        oracle.reset_all();
        assert_eq!(oracle.pop_score(), 0);
        assert!(!oracle.hit_win());
        assert!(!oracle.hit_lose());
    }

    #[test]
    fn clones_share_counters() {
        let mut debugger = RecordingDebugger::default();
        let oracle = ScoreOracle::install(&mut debugger, &full_settings()).unwrap();
        let clone = oracle.clone();

        debugger.counters[&0x10].record_hit();
        clone.reset_all();
        assert_eq!(oracle.pop_score(), 0);
    }
}
