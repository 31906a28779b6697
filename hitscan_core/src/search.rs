use crate::config::SearchSettings;
use crate::debugger::Debugger;
use crate::executor::{ExecutorError, ProcessController, Trial};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(
        "calibration scores disagree ({first} vs {second}); the target does not score round-wise, or a filler symbol is part of the secret"
    )]
    CalibrationMismatch { first: i64, second: i64 },
    #[error("charset is empty after deduplication")]
    EmptyCharset,
    #[error("chunk size must be at least 1")]
    ZeroChunkSize,
    #[error("calibration needs exactly two distinct filler symbols, got {0:?}")]
    BadFillers(String),
}

/// Which success signal ended the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WinSignal {
    /// The dedicated win breakpoint fired on the accepted candidate.
    WinBreakpoint,
    /// A lose breakpoint is configured and did not fire on an advancing
    /// round. Weaker evidence than a win hit; reported separately so
    /// the operator can judge it.
    NoLoseObserved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchOutcome {
    /// The reconstruction is believed complete.
    Complete { key: String, via: WinSignal },
    /// The charset ran out without beating the baseline; the span
    /// between prefix and suffix is unresolved.
    Exhausted { prefix: String, suffix: String },
}

impl SearchOutcome {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchOutcome::Complete { key, .. } => write!(f, "{key}"),
            SearchOutcome::Exhausted { prefix, suffix } => {
                write!(f, "{prefix}[...?...]{suffix}")
            }
        }
    }
}

/// Lazy enumeration of every length-`chunk_size` string over the
/// charset, in charset-major order: for charset `ab` and size 2 that
/// is `aa, ab, ba, bb`. Nothing is materialized up front, so large
/// chunk sizes only cost iteration time.
pub struct ChunkCandidates {
    symbols: Vec<char>,
    indices: Vec<usize>,
    done: bool,
}

impl ChunkCandidates {
    pub fn new(symbols: &[char], chunk_size: usize) -> Self {
        Self {
            symbols: symbols.to_vec(),
            indices: vec![0; chunk_size],
            done: symbols.is_empty() || chunk_size == 0,
        }
    }
}

impl Iterator for ChunkCandidates {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let chunk: String = self.indices.iter().map(|&i| self.symbols[i]).collect();

        // odometer increment, rightmost position fastest
        let mut pos = self.indices.len();
        loop {
            if pos == 0 {
                self.done = true;
                break;
            }
            pos -= 1;
            self.indices[pos] += 1;
            if self.indices[pos] < self.symbols.len() {
                break;
            }
            self.indices[pos] = 0;
        }
        Some(chunk)
    }
}

/// Drives calibration and the chunked candidate scan, growing the known
/// prefix one chunk per round until a success signal or exhaustion.
pub struct SearchEngine<D: Debugger> {
    controller: ProcessController<D>,
    known_prefix: String,
    known_suffix: String,
    chunk_size: usize,
    charset: Vec<char>,
    fillers: [char; 2],
    lose_configured: bool,
}

impl<D: Debugger> SearchEngine<D> {
    pub fn new(
        controller: ProcessController<D>,
        settings: &SearchSettings,
    ) -> Result<Self, SearchError> {
        let charset = settings.charset_symbols();
        if charset.is_empty() {
            return Err(SearchError::EmptyCharset);
        }
        if settings.chunk_size == 0 {
            return Err(SearchError::ZeroChunkSize);
        }
        let fillers: Vec<char> = settings.calibration_fillers.chars().collect();
        let &[first, second] = fillers.as_slice() else {
            return Err(SearchError::BadFillers(settings.calibration_fillers.clone()));
        };
        if first == second {
            return Err(SearchError::BadFillers(settings.calibration_fillers.clone()));
        }
        let lose_configured = controller.oracle().has_lose();
        Ok(Self {
            controller,
            known_prefix: settings.known_prefix.clone(),
            known_suffix: settings.known_suffix.clone(),
            chunk_size: settings.chunk_size,
            charset,
            fillers: [first, second],
            lose_configured,
        })
    }

    fn score_candidate(&mut self, middle: &str) -> Result<Trial, SearchError> {
        let input = format!("{}{}{}", self.known_prefix, middle, self.known_suffix);
        Ok(self.controller.trial(input.as_bytes())?)
    }

    /// Establishes the baseline: the score of "everything correct
    /// except the next chunk", measured with two different deliberately
    /// impossible chunks. If the two runs disagree, chunk content is
    /// not what decides the score and scanning would be guesswork, so
    /// the whole search halts with both scores for diagnosis.
    pub fn calibrate(&mut self) -> Result<i64, SearchError> {
        let [first_filler, second_filler] = self.fillers;
        let first = self
            .score_candidate(&first_filler.to_string().repeat(self.chunk_size))?
            .score;
        let second = self
            .score_candidate(&second_filler.to_string().repeat(self.chunk_size))?
            .score;
        if first != second {
            return Err(SearchError::CalibrationMismatch { first, second });
        }
        Ok(first)
    }

    /// Scans candidate chunks in charset order; the first one whose
    /// score strictly beats the baseline, or which trips the win flag,
    /// wins the round. No attempt is made to find a better or unique
    /// match beyond the first.
    pub fn bruteforce_chunk(&mut self, baseline: i64) -> Result<Option<(String, Trial)>, SearchError> {
        for chunk in ChunkCandidates::new(&self.charset, self.chunk_size) {
            let trial = self.score_candidate(&chunk)?;
            if trial.win || trial.score > baseline {
                return Ok(Some((chunk, trial)));
            }
        }
        Ok(None)
    }

    /// The outer loop: calibrate, scan, append, repeat. Terminates on a
    /// success signal or when a round finds no improving chunk. No
    /// automatic retries with other parameters; that is an operator
    /// decision.
    pub fn bruteforce(&mut self) -> Result<SearchOutcome, SearchError> {
        self.controller.set_quiet(true);
        let outcome = self.run_rounds();
        self.controller.set_quiet(false);
        outcome
    }

    fn run_rounds(&mut self) -> Result<SearchOutcome, SearchError> {
        loop {
            let baseline = self.calibrate()?;
            let Some((chunk, trial)) = self.bruteforce_chunk(baseline)? else {
                return Ok(self.report_exhausted());
            };

            self.known_prefix.push_str(&chunk);
            println!(
                "Found new scorer, we're now at '{}[...]{}'",
                self.known_prefix, self.known_suffix
            );

            let key = format!("{}{}", self.known_prefix, self.known_suffix);
            if trial.win {
                println!("Hit the win breakpoint! Winning guess is '{key}'");
                return Ok(SearchOutcome::Complete {
                    key,
                    via: WinSignal::WinBreakpoint,
                });
            }
            if self.lose_configured && !trial.lose {
                println!(
                    "The lose breakpoint stayed quiet on an advancing round; taking '{key}' as the answer. \
                     Treat this with more suspicion than a win hit."
                );
                return Ok(SearchOutcome::Complete {
                    key,
                    via: WinSignal::NoLoseObserved,
                });
            }
        }
    }

    fn report_exhausted(&self) -> SearchOutcome {
        println!("Scanned the whole charset without beating the baseline. Possible causes:");
        println!(" - the charset is too small");
        println!(" - the chunk size is too small");
        println!(" - the breakpoint addresses are off");
        println!(" - the known prefix and/or suffix is wrong");
        println!(" - the target does not operate round-wise, so no stable score exists");
        let outcome = SearchOutcome::Exhausted {
            prefix: self.known_prefix.clone(),
            suffix: self.known_suffix.clone(),
        };
        if !self.known_prefix.is_empty() || !self.known_suffix.is_empty() {
            println!("Stopped with the key '{outcome}'. Maybe that helps.");
        }
        outcome
    }
}
