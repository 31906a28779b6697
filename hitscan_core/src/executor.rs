use crate::debugger::{Debugger, DebuggerError, InputSource, StopReason};
use crate::oracle::ScoreOracle;
use thiserror::Error;

/// Checkpoint-id ceiling after which the session is torn down and
/// respawned. gdb misbehaves past ~41885 checkpoints per process, and
/// ids keep rising even when checkpoints are deleted along the way.
pub const DEFAULT_CHECKPOINT_CEILING: u32 = 40_000;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Debugger(#[from] DebuggerError),
    #[error("target exited with code {0} before reaching the loop-end marker; check the persistent start/end addresses")]
    TargetExited(i32),
}

/// The outcome of one scored execution: reset, run, read, as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    pub score: i64,
    pub win: bool,
    pub lose: bool,
}

#[derive(Debug, Clone)]
pub struct PersistentConfig {
    pub start_addr: u64,
    pub end_addr: u64,
    pub buffer_addr: u64,
    pub checkpoint_ceiling: u32,
}

impl PersistentConfig {
    pub fn new(start_addr: u64, end_addr: u64, buffer_addr: u64) -> Self {
        Self {
            start_addr,
            end_addr,
            buffer_addr,
            checkpoint_ceiling: DEFAULT_CHECKPOINT_CEILING,
        }
    }
}

#[derive(Debug)]
struct PersistentSession {
    cfg: PersistentConfig,
    /// False until the bootstrap pass has parked the target at the
    /// checkpoint; also cleared on ceiling wrap to force a respawn.
    running: bool,
    /// Id of the pristine checkpoint captured at the start marker.
    /// `None` means the marker has not fired yet.
    baseline: Option<u32>,
    /// Id of the checkpoint the session currently executes from.
    generation: u32,
}

/// Owns the one target session and turns candidate inputs into counter
/// hits, either by a full spawn per trial or by checkpoint rewinds.
///
/// All effects of `run` are observed through the shared [`ScoreOracle`];
/// there is no return value. A hung target blocks forever: no timeout
/// is enforced here.
pub struct ProcessController<D: Debugger> {
    debugger: D,
    oracle: ScoreOracle,
    session: Option<PersistentSession>,
}

impl<D: Debugger> ProcessController<D> {
    /// Fresh-run mode: every trial is a complete spawn-to-exit process
    /// lifecycle with the input fed on stdin.
    pub fn fresh(debugger: D, oracle: ScoreOracle) -> Self {
        Self {
            debugger,
            oracle,
            session: None,
        }
    }

    /// Persistent mode: one process is checkpointed at `start_addr` and
    /// rewound at `end_addr` for every trial, with input written
    /// directly into the target buffer.
    pub fn persistent(
        mut debugger: D,
        oracle: ScoreOracle,
        cfg: PersistentConfig,
    ) -> Result<Self, ExecutorError> {
        debugger.add_breakpoint(cfg.start_addr, false)?;
        // fires once per trial, so keep it quiet
        debugger.add_breakpoint(cfg.end_addr, true)?;
        Ok(Self {
            debugger,
            oracle,
            session: Some(PersistentSession {
                cfg,
                running: false,
                baseline: None,
                generation: 1,
            }),
        })
    }

    pub fn oracle(&self) -> &ScoreOracle {
        &self.oracle
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.debugger.set_quiet(quiet);
    }

    /// Reset, run, read: the only way trial scores are produced, so the
    /// reset-before-run ordering holds by construction.
    pub fn trial(&mut self, input: &[u8]) -> Result<Trial, ExecutorError> {
        self.oracle.reset_all();
        self.run(input)?;
        Ok(Trial {
            score: self.oracle.pop_score(),
            win: self.oracle.hit_win(),
            lose: self.oracle.hit_lose(),
        })
    }

    /// Executes the target against `input`. On return the oracle holds
    /// exactly the hits generated while the target processed `input`
    /// and the session is ready for the next call.
    pub fn run(&mut self, input: &[u8]) -> Result<(), ExecutorError> {
        match &self.session {
            None => self.run_fresh(input),
            Some(session) => {
                let cfg = session.cfg.clone();
                let running = session.running;
                self.run_persistent(input, &cfg, running)
            }
        }
    }

    fn run_fresh(&mut self, input: &[u8]) -> Result<(), ExecutorError> {
        let mut stop = self.debugger.run(InputSource::Bytes(input.to_vec()))?;
        loop {
            match stop {
                StopReason::Exited(_) => return Ok(()),
                StopReason::Breakpoint(_) => stop = self.debugger.resume()?,
            }
        }
    }

    fn run_persistent(
        &mut self,
        input: &[u8],
        cfg: &PersistentConfig,
        running: bool,
    ) -> Result<(), ExecutorError> {
        if !running {
            // One clean pass with a closed stdin, so blocking reads in
            // the target terminate and the markers can do their first
            // round of checkpoint-and-rewind. Afterwards the target is
            // parked at the checkpoint, awaiting buffer writes.
            let stop = self.debugger.run(InputSource::Closed)?;
            self.drive_to_rewind(stop, cfg)?;
            if let Some(session) = self.session.as_mut() {
                session.running = true;
            }
            // the empty bootstrap round hit counters of its own; those
            // hits must not count toward the caller's input
            self.oracle.reset_all();
        }

        let mut payload = input.to_vec();
        payload.extend_from_slice(b"\n\0");
        self.debugger.write_memory(cfg.buffer_addr, &payload)?;
        let stop = self.debugger.resume()?;
        self.drive_to_rewind(stop, cfg)
    }

    /// Runs the stop loop until the end marker fires and the rewind for
    /// the next trial has been performed.
    fn drive_to_rewind(
        &mut self,
        mut stop: StopReason,
        cfg: &PersistentConfig,
    ) -> Result<(), ExecutorError> {
        loop {
            match stop {
                StopReason::Breakpoint(addr) if addr == cfg.start_addr => {
                    self.arm_start_marker()?;
                    stop = self.debugger.resume()?;
                }
                StopReason::Breakpoint(addr) if addr == cfg.end_addr => {
                    return self.rewind();
                }
                StopReason::Breakpoint(_) => {
                    stop = self.debugger.resume()?;
                }
                StopReason::Exited(code) => return Err(ExecutorError::TargetExited(code)),
            }
        }
    }

    /// Captures the pristine checkpoint the first time the start marker
    /// fires; every later hit is a no-op.
    fn arm_start_marker(&mut self) -> Result<(), ExecutorError> {
        let armed = self
            .session
            .as_ref()
            .map(|s| s.baseline.is_some())
            .unwrap_or(true);
        if armed {
            return Ok(());
        }
        let id = self.debugger.checkpoint()?;
        if let Some(session) = self.session.as_mut() {
            session.baseline = Some(id);
            session.generation = id;
        }
        Ok(())
    }

    /// The end-marker state machine: rewind to the pristine baseline,
    /// rotate the generation checkpoint, resume from the fresh copy.
    fn rewind(&mut self) -> Result<(), ExecutorError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let Some(baseline) = session.baseline else {
            // End marker fired before the start marker ever did; the
            // operator's addresses are misplaced. Not fatal, but it
            // will recur every round.
            eprintln!(
                "[!] rewind requested before the start marker armed; check the persistent start/end addresses"
            );
            return Ok(());
        };

        if session.generation > session.cfg.checkpoint_ceiling {
            // Checkpoint ids never come back down, so wrap the session:
            // the next run() respawns from scratch and re-arms.
            session.generation = 1;
            session.baseline = None;
            session.running = false;
            return Ok(());
        }

        let previous = session.generation;
        self.debugger.restore(baseline)?;
        if previous > baseline {
            self.debugger.delete_checkpoint(previous)?;
        }
        let fresh = self.debugger.checkpoint()?;
        if let Some(session) = self.session.as_mut() {
            session.generation = fresh;
        }
        self.debugger.restore(fresh)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakpointSettings;
    use crate::sim::{self, SimDebugger};

    fn scoring_settings() -> BreakpointSettings {
        BreakpointSettings {
            positive: Some(sim::POSITIVE_ADDR),
            win: Some(sim::WIN_ADDR),
            ..Default::default()
        }
    }

    fn persistent_cfg(ceiling: u32) -> PersistentConfig {
        PersistentConfig {
            start_addr: sim::START_ADDR,
            end_addr: sim::END_ADDR,
            buffer_addr: sim::BUFFER_ADDR,
            checkpoint_ceiling: ceiling,
        }
    }

    #[test]
    fn fresh_mode_spawns_per_trial() {
        let mut debugger = SimDebugger::new(b"abc");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        let mut controller = ProcessController::fresh(debugger, oracle);

        let trial = controller.trial(b"abc").unwrap();
        assert_eq!(trial.score, 3);
        assert!(trial.win);

        let trial = controller.trial(b"abd").unwrap();
        assert_eq!(trial.score, 2);
        assert!(!trial.win);
    }

    #[test]
    fn trial_isolates_scores_from_stale_hits() {
        let mut debugger = SimDebugger::new(b"ab");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        let mut controller = ProcessController::fresh(debugger, oracle);

        // an unscored execution leaves stale hits behind
        controller.run(b"ab").unwrap();

        let trial = controller.trial(b"ax").unwrap();
        assert_eq!(trial.score, 1, "only the trial's own hits may count");
    }

    #[test]
    fn bootstrap_hits_do_not_score_into_the_first_trial() {
        let mut debugger = SimDebugger::looping(b"ab");
        let settings = BreakpointSettings {
            positive: Some(sim::POSITIVE_ADDR),
            negative: Some(sim::NEGATIVE_ADDR),
            win: Some(sim::WIN_ADDR),
            lose: Some(sim::LOSE_ADDR),
        };
        let oracle = ScoreOracle::install(&mut debugger, &settings).unwrap();
        let mut controller =
            ProcessController::persistent(debugger, oracle, persistent_cfg(1000)).unwrap();

        // the bootstrap pass compares empty input against the secret,
        // hitting negative and lose; none of that may reach the caller
        let first = controller.trial(b"ab").unwrap();
        let second = controller.trial(b"ab").unwrap();
        assert_eq!(first.score, 2);
        assert!(first.win);
        assert!(!first.lose);
        assert_eq!(first, second);
    }

    #[test]
    fn repeated_identical_inputs_score_identically() {
        let mut debugger = SimDebugger::new(b"abc");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        let mut controller = ProcessController::fresh(debugger, oracle);
        let first = controller.trial(b"abx").unwrap();
        assert_eq!(first.score, 2);
        for _ in 0..3 {
            assert_eq!(controller.trial(b"abx").unwrap(), first);
        }

        let mut debugger = SimDebugger::looping(b"abc");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        let mut controller =
            ProcessController::persistent(debugger, oracle, persistent_cfg(1000)).unwrap();
        let first = controller.trial(b"abx").unwrap();
        assert_eq!(first.score, 2);
        for _ in 0..3 {
            assert_eq!(controller.trial(b"abx").unwrap(), first);
        }
    }

    #[test]
    fn persistent_mode_bootstraps_once_and_rewinds() {
        let mut debugger = SimDebugger::looping(b"zz");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        let mut controller =
            ProcessController::persistent(debugger, oracle, persistent_cfg(1000)).unwrap();

        let trial = controller.trial(b"zz").unwrap();
        assert_eq!(trial.score, 2);
        assert!(trial.win);

        let trial = controller.trial(b"za").unwrap();
        assert_eq!(trial.score, 1);
        assert!(!trial.win);

        // many trials, still the one spawned process
        for _ in 0..20 {
            controller.trial(b"qq").unwrap();
        }
        let session = controller.session.as_ref().unwrap();
        assert!(session.running);
        assert_eq!(controller.debugger.spawns(), 1);
    }

    #[test]
    fn persistent_mode_bounds_live_checkpoints() {
        let mut debugger = SimDebugger::looping(b"secret");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        let mut controller =
            ProcessController::persistent(debugger, oracle, persistent_cfg(1000)).unwrap();

        for _ in 0..10 {
            controller.trial(b"guess").unwrap();
        }
        // pristine baseline plus the rotating generation copy
        assert_eq!(controller.debugger.live_checkpoints(), 2);
    }

    #[test]
    fn checkpoint_ceiling_forces_session_restart() {
        let mut debugger = SimDebugger::looping(b"k");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        let mut controller =
            ProcessController::persistent(debugger, oracle, persistent_cfg(5)).unwrap();

        // generation ids after each trial: 3, 4, 5, 6, then the wrap
        for _ in 0..4 {
            controller.trial(b"x").unwrap();
        }
        assert_eq!(controller.debugger.spawns(), 1);
        let session = controller.session.as_ref().unwrap();
        assert!(session.running);

        // this trial's rewind sees generation 6 > 5 and wraps
        controller.trial(b"x").unwrap();
        let session = controller.session.as_ref().unwrap();
        assert!(!session.running, "ceiling wrap must clear the running flag");
        assert!(session.baseline.is_none(), "start marker must disarm");

        // next trial respawns from scratch and still scores correctly
        let trial = controller.trial(b"k").unwrap();
        assert_eq!(controller.debugger.spawns(), 2);
        assert_eq!(trial.score, 1);
        assert!(trial.win);
    }

    #[test]
    fn misplaced_start_marker_is_a_noop_rewind() {
        let mut debugger = SimDebugger::looping(b"ab");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        // start marker at an address the target never visits
        let cfg = PersistentConfig {
            start_addr: 0xdead_beef,
            end_addr: sim::END_ADDR,
            buffer_addr: sim::BUFFER_ADDR,
            checkpoint_ceiling: 1000,
        };
        let mut controller = ProcessController::persistent(debugger, oracle, cfg).unwrap();

        // no checkpoint ever armed, so every rewind logs and no-ops;
        // the trial itself must still complete without error
        controller.trial(b"ab").unwrap();
        let session = controller.session.as_ref().unwrap();
        assert!(session.baseline.is_none());
        assert_eq!(controller.debugger.live_checkpoints(), 0);
    }

    #[test]
    fn target_exit_mid_trial_is_a_configuration_error() {
        // a non-looping target exits instead of reaching the end marker
        let mut debugger = SimDebugger::new(b"ab");
        let oracle = ScoreOracle::install(&mut debugger, &scoring_settings()).unwrap();
        let cfg = PersistentConfig {
            start_addr: sim::START_ADDR,
            end_addr: 0xdead_beef,
            buffer_addr: sim::BUFFER_ADDR,
            checkpoint_ceiling: 1000,
        };
        let mut controller = ProcessController::persistent(debugger, oracle, cfg).unwrap();
        match controller.trial(b"ab") {
            Err(ExecutorError::TargetExited(0)) => {}
            other => panic!("expected TargetExited, got {other:?}"),
        }
    }
}
