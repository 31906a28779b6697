use crate::counter::HitCounter;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebuggerError {
    #[error("I/O error talking to the target: {0}")]
    Io(#[from] std::io::Error),
    #[error("no live target process")]
    NotRunning,
    #[error("unknown checkpoint id {0}")]
    UnknownCheckpoint(u32),
    #[error("debugger backend error: {0}")]
    Backend(String),
}

/// Why `run`/`resume` handed control back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A pausing breakpoint at this address was hit.
    Breakpoint(u64),
    /// The target terminated with this exit code.
    Exited(i32),
}

/// What the target reads on stdin for a spawned run.
///
/// `Closed` stands in for an empty, immediately-EOF stream so that
/// blocking reads in the target terminate cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Bytes(Vec<u8>),
    Closed,
}

/// The boundary to the host debugging engine.
///
/// Everything hitscan knows about the target flows through this trait:
/// counter breakpoints report hits into shared [`HitCounter`]s, pausing
/// breakpoints surface as [`StopReason::Breakpoint`], and checkpoints
/// give the persistent execution mode its rewind primitive.
///
/// Input bytes handed to [`Debugger::run`] must reach the target
/// verbatim (e.g. down a pipe); implementations must not pass them
/// through a shell or any other interpreting layer.
///
/// Checkpoint ids are assigned by the backend and rise monotonically
/// for the lifetime of a spawned process, even across deletions; a
/// fresh spawn restarts the numbering. The rotation logic in the
/// persistent executor depends on both properties.
pub trait Debugger {
    /// Registers a counting breakpoint. Hits increment `counter` and
    /// execution continues; they never surface as a stop.
    fn add_counter(&mut self, addr: u64, counter: Arc<HitCounter>) -> Result<(), DebuggerError>;

    /// Registers a pausing breakpoint. `silent` suppresses the
    /// backend's per-hit console notification, for markers that fire
    /// once per trial.
    fn add_breakpoint(&mut self, addr: u64, silent: bool) -> Result<(), DebuggerError>;

    /// Spawns (or respawns) the target with the given stdin and runs
    /// until a pausing breakpoint is hit or the target exits.
    fn run(&mut self, input: InputSource) -> Result<StopReason, DebuggerError>;

    /// Continues a paused target until the next stop.
    fn resume(&mut self) -> Result<StopReason, DebuggerError>;

    /// Captures full process state, returning the backend-assigned id.
    fn checkpoint(&mut self) -> Result<u32, DebuggerError>;

    /// Rewinds the target to a previously captured checkpoint.
    fn restore(&mut self, id: u32) -> Result<(), DebuggerError>;

    fn delete_checkpoint(&mut self, id: u32) -> Result<(), DebuggerError>;

    /// Writes bytes into target memory at an absolute address.
    fn write_memory(&mut self, addr: u64, bytes: &[u8]) -> Result<(), DebuggerError>;

    /// Toggles incidental backend console output, so thousands of
    /// automated trials do not spam the operator.
    fn set_quiet(&mut self, quiet: bool);
}
