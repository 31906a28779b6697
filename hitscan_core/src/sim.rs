//! A software model of a debugger-plus-target, for tests and demos.
//!
//! The modeled target is the round-based kind hitscan is built for: it
//! reads one line of input, compares it to a secret position by
//! position (one hit on the positive location per matching position,
//! one on the negative location per mismatch), then signals win on an
//! exact match or lose otherwise. The looping variant goes back to the
//! top for the next input, the way a persistent-mode target does; the
//! one-shot variant exits after a single round.

use crate::counter::HitCounter;
use crate::debugger::{Debugger, DebuggerError, InputSource, StopReason};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const POSITIVE_ADDR: u64 = 0x1000;
pub const NEGATIVE_ADDR: u64 = 0x1008;
pub const WIN_ADDR: u64 = 0x1010;
pub const LOSE_ADDR: u64 = 0x1018;
/// Top of the read-compare loop.
pub const START_ADDR: u64 = 0x2000;
/// Where the loop jumps back for the next input.
pub const END_ADDR: u64 = 0x2008;
/// The input buffer the looping target reads from.
pub const BUFFER_ADDR: u64 = 0x3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimPc {
    LoopTop,
    Compare,
    LoopEnd,
    Exited,
}

#[derive(Debug, Clone)]
struct Snapshot {
    pc: SimPc,
    memory: HashMap<u64, Vec<u8>>,
}

pub struct SimDebugger {
    secret: Vec<u8>,
    looping: bool,

    counters: HashMap<u64, Arc<HitCounter>>,
    pause_points: HashSet<u64>,
    silenced: HashSet<u64>,
    quiet: bool,

    alive: bool,
    pc: SimPc,
    stdin: Vec<u8>,
    memory: HashMap<u64, Vec<u8>>,

    snapshots: HashMap<u32, Snapshot>,
    next_checkpoint_id: u32,
    spawns: u32,
}

impl SimDebugger {
    /// One-shot target: reads a single input and exits.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_looping(secret, false)
    }

    /// Looping target: reads, compares, jumps back for the next input.
    pub fn looping(secret: &[u8]) -> Self {
        Self::with_looping(secret, true)
    }

    fn with_looping(secret: &[u8], looping: bool) -> Self {
        Self {
            secret: secret.to_vec(),
            looping,
            counters: HashMap::new(),
            pause_points: HashSet::new(),
            silenced: HashSet::new(),
            quiet: false,
            alive: false,
            pc: SimPc::Exited,
            stdin: Vec::new(),
            memory: HashMap::new(),
            snapshots: HashMap::new(),
            next_checkpoint_id: 1,
            spawns: 0,
        }
    }

    /// How many times the target process has been spawned.
    pub fn spawns(&self) -> u32 {
        self.spawns
    }

    pub fn live_checkpoints(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn is_silenced(&self, addr: u64) -> bool {
        self.silenced.contains(&addr)
    }

    fn touch(&self, addr: u64) {
        if let Some(counter) = self.counters.get(&addr) {
            counter.record_hit();
        }
    }

    /// Visits a code location: counters fire, then the location pauses
    /// the "process" if a pausing breakpoint sits on it.
    fn visit(&self, addr: u64) -> bool {
        self.touch(addr);
        self.pause_points.contains(&addr)
    }

    /// The line the target's read would return right now: the memory
    /// buffer once something was written there, stdin otherwise.
    fn current_guess(&self) -> Vec<u8> {
        let raw = self
            .memory
            .get(&BUFFER_ADDR)
            .cloned()
            .unwrap_or_else(|| self.stdin.clone());
        raw.split(|&b| b == b'\n' || b == b'\0')
            .next()
            .map(|line| line.to_vec())
            .unwrap_or_default()
    }

    fn compare_round(&self) {
        let guess = self.current_guess();
        for (i, expected) in self.secret.iter().enumerate() {
            if guess.get(i) == Some(expected) {
                self.touch(POSITIVE_ADDR);
            } else {
                self.touch(NEGATIVE_ADDR);
            }
        }
        if guess == self.secret {
            self.touch(WIN_ADDR);
        } else {
            self.touch(LOSE_ADDR);
        }
    }

    fn step_until_stop(&mut self) -> StopReason {
        loop {
            match self.pc {
                SimPc::LoopTop => {
                    self.pc = SimPc::Compare;
                    if self.visit(START_ADDR) {
                        return StopReason::Breakpoint(START_ADDR);
                    }
                }
                SimPc::Compare => {
                    self.compare_round();
                    self.pc = SimPc::LoopEnd;
                }
                SimPc::LoopEnd => {
                    self.pc = if self.looping {
                        SimPc::LoopTop
                    } else {
                        SimPc::Exited
                    };
                    if self.visit(END_ADDR) {
                        return StopReason::Breakpoint(END_ADDR);
                    }
                }
                SimPc::Exited => {
                    self.alive = false;
                    return StopReason::Exited(0);
                }
            }
        }
    }
}

impl Debugger for SimDebugger {
    fn add_counter(&mut self, addr: u64, counter: Arc<HitCounter>) -> Result<(), DebuggerError> {
        self.counters.insert(addr, counter);
        Ok(())
    }

    fn add_breakpoint(&mut self, addr: u64, silent: bool) -> Result<(), DebuggerError> {
        self.pause_points.insert(addr);
        if silent {
            self.silenced.insert(addr);
        }
        Ok(())
    }

    fn run(&mut self, input: InputSource) -> Result<StopReason, DebuggerError> {
        // a respawn discards the previous process wholesale, its
        // checkpoints included, and restarts checkpoint numbering
        self.spawns += 1;
        self.alive = true;
        self.pc = SimPc::LoopTop;
        self.memory.clear();
        self.snapshots.clear();
        self.next_checkpoint_id = 1;
        self.stdin = match input {
            InputSource::Bytes(bytes) => bytes,
            InputSource::Closed => Vec::new(),
        };
        Ok(self.step_until_stop())
    }

    fn resume(&mut self) -> Result<StopReason, DebuggerError> {
        if !self.alive {
            return Err(DebuggerError::NotRunning);
        }
        Ok(self.step_until_stop())
    }

    fn checkpoint(&mut self) -> Result<u32, DebuggerError> {
        if !self.alive {
            return Err(DebuggerError::NotRunning);
        }
        let id = self.next_checkpoint_id;
        self.next_checkpoint_id += 1;
        self.snapshots.insert(
            id,
            Snapshot {
                pc: self.pc,
                memory: self.memory.clone(),
            },
        );
        Ok(id)
    }

    fn restore(&mut self, id: u32) -> Result<(), DebuggerError> {
        let snapshot = self
            .snapshots
            .get(&id)
            .ok_or(DebuggerError::UnknownCheckpoint(id))?;
        self.pc = snapshot.pc;
        self.memory = snapshot.memory.clone();
        self.alive = true;
        Ok(())
    }

    fn delete_checkpoint(&mut self, id: u32) -> Result<(), DebuggerError> {
        self.snapshots
            .remove(&id)
            .map(|_| ())
            .ok_or(DebuggerError::UnknownCheckpoint(id))
    }

    fn write_memory(&mut self, addr: u64, bytes: &[u8]) -> Result<(), DebuggerError> {
        if !self.alive {
            return Err(DebuggerError::NotRunning);
        }
        self.memory.insert(addr, bytes.to_vec());
        Ok(())
    }

    fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }
}
