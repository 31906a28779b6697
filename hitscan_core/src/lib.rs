pub mod config;
pub mod counter;
pub mod debugger;
pub mod executor;
pub mod oracle;
pub mod search;
pub mod sim;

pub use config::{
    BreakpointSettings, HitscanConfig, PersistentSettings, SearchSettings, DEFAULT_CHARSET,
};
pub use counter::{HitCounter, Polarity};
pub use debugger::{Debugger, DebuggerError, InputSource, StopReason};
pub use executor::{
    ExecutorError, PersistentConfig, ProcessController, Trial, DEFAULT_CHECKPOINT_CEILING,
};
pub use oracle::ScoreOracle;
pub use search::{ChunkCandidates, SearchEngine, SearchError, SearchOutcome, WinSignal};
pub use sim::SimDebugger;
