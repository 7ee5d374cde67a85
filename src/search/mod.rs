//! Parallel vanity key search
//!
//! A [`Coordinator`] runs a fixed pool of CPU worker threads. Each worker
//! draws keypairs from a [`KeySource`](crate::keys::KeySource), tests the
//! public key against a validated [`SearchRequest`], and batches its attempt
//! count into a shared [`ProgressAccounter`]. The first worker to match
//! publishes its keypair and cancels everyone else.

mod coordinator;
mod handoff;
mod matcher;
mod progress;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::keys::{KeyError, Keypair};

pub use coordinator::{Coordinator, SearchState};
pub use matcher::{matches, Pattern};
pub use progress::{LocalCounter, ProgressAccounter, StopReason};

/// Attempts a worker accumulates locally before publishing them
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Errors that can occur before or during a search
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("empty {0} prefix")]
    EmptyPrefix(SearchMode),

    #[error("'{ch}' is not a valid {mode} character (valid characters: {})", .mode.alphabet())]
    InvalidPrefix { ch: char, mode: SearchMode },

    #[error("{mode} prefix is {len} characters long, at most {max} can be matched")]
    PrefixTooLong {
        mode: SearchMode,
        len: usize,
        max: usize,
    },

    #[error("key generation failed in every worker: {0}")]
    RandomSource(#[source] KeyError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker thread panicked")]
    WorkerPanicked,

    #[error("search was cancelled as found, but no result was published")]
    ResultMissing,

    #[error("coordinator has already run a search")]
    AlreadyStarted,
}

/// Which text form of the public key the prefix is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Lower-case hex of the 32-byte x-only key
    Hex,
    /// The npub data characters following `npub1`
    Bech32,
}

impl SearchMode {
    /// Characters a prefix may use in this mode
    pub fn alphabet(&self) -> &'static str {
        match self {
            SearchMode::Hex => "0123456789abcdef",
            SearchMode::Bech32 => crate::BECH32_CHARSET,
        }
    }

    /// Longest prefix that falls inside the key's own characters
    ///
    /// 32 bytes are 64 hex digits, or 52 five-bit groups before the bech32
    /// checksum starts.
    pub fn max_prefix_len(&self) -> usize {
        match self {
            SearchMode::Hex => 64,
            SearchMode::Bech32 => 52,
        }
    }

    /// Mean number of attempts to hit a prefix of `len` characters
    pub fn expected_attempts(&self, len: usize) -> f64 {
        (self.alphabet().len() as f64).powi(len as i32)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Hex => write!(f, "hex"),
            SearchMode::Bech32 => write!(f, "bech32"),
        }
    }
}

/// A validated prefix and the mode it applies to
///
/// Construction is the only place characters are checked; matching never
/// re-validates.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    prefix: String,
    mode: SearchMode,
    pattern: Pattern,
}

impl SearchRequest {
    /// Normalize and validate a prefix
    ///
    /// The prefix is lower-cased; in bech32 mode a leading `npub1` is
    /// stripped first.
    pub fn new(prefix: &str, mode: SearchMode) -> Result<Self, SearchError> {
        let mut prefix = prefix.trim().to_lowercase();
        if mode == SearchMode::Bech32 {
            if let Some(rest) = prefix.strip_prefix("npub1") {
                prefix = rest.to_string();
            }
        }

        let pattern = Pattern::compile(&prefix, mode)?;
        Ok(Self {
            prefix,
            mode,
            pattern,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The prefix as it would appear in the encoded key
    pub fn label(&self) -> String {
        match self.mode {
            SearchMode::Hex => self.prefix.clone(),
            SearchMode::Bech32 => format!("npub1{}", self.prefix),
        }
    }

    pub fn expected_attempts(&self) -> f64 {
        self.mode.expected_attempts(self.prefix.len())
    }
}

/// Tuning knobs for a search
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Worker threads, at least one
    pub workers: usize,
    /// Local attempts between flushes to the shared counter
    pub batch_size: u64,
    /// How often the coordinator checks for cancellation and worker exits
    pub poll_interval: Duration,
    /// How often a [`Progress`] snapshot is sent
    pub report_interval: Duration,
    /// How long to wait for the published result once a match is signalled
    pub result_timeout: Duration,
}

impl SearchConfig {
    /// Default configuration with a specific worker count
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..Self::default()
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_millis(50),
            report_interval: Duration::from_secs(1),
            result_timeout: Duration::from_secs(2),
        }
    }
}

/// Progress update from the coordinator
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub keys_checked: u64,
    pub keys_per_sec: f64,
    pub elapsed_secs: f64,
}

impl Progress {
    fn snapshot(keys_checked: u64, elapsed: Duration) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let keys_per_sec = if elapsed_secs > 0.0 {
            keys_checked as f64 / elapsed_secs
        } else {
            0.0
        };

        Self {
            keys_checked,
            keys_per_sec,
            elapsed_secs,
        }
    }
}

/// A matching keypair and what it took to find it
#[derive(Debug, Clone)]
pub struct FoundKey {
    pub keypair: Keypair,
    /// Exact number of keypairs generated across all workers
    pub attempts: u64,
    pub elapsed: Duration,
}

/// How a search ended
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Found(FoundKey),
    /// Cancelled from outside before any worker matched
    Aborted { attempts: u64, elapsed: Duration },
}

impl SearchOutcome {
    pub fn attempts(&self) -> u64 {
        match self {
            SearchOutcome::Found(found) => found.attempts,
            SearchOutcome::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Format speed for display
pub fn format_speed(speed: u64) -> String {
    if speed >= 1_000_000_000 {
        format!("{:.1}B", speed as f64 / 1_000_000_000.0)
    } else if speed >= 1_000_000 {
        format!("{:.1}M", speed as f64 / 1_000_000.0)
    } else if speed >= 1_000 {
        format!("{:.1}K", speed as f64 / 1_000.0)
    } else {
        format!("{}", speed)
    }
}

/// Format a count with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
