//! Nostr Key Toolkit CLI
//!
//! Derives keypairs from seed phrases and searches for vanity public keys
//! on every CPU core.

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::unbounded;
use log::warn;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use nostr_vanity::{
    decode_npub, decode_nsec, derive_keypair, format_keypair, format_number, format_speed,
    nip06_path, Coordinator, Keypair, OsKeySource, Progress, SearchConfig, SearchMode,
    SearchOutcome, SearchRequest, NIP06_PATH,
};

#[derive(Parser)]
#[command(name = "nvk")]
#[command(about = "Nostr key derivation and vanity key search")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive a keypair from a BIP39 seed phrase (NIP-06)
    Derive {
        /// Seed words
        #[arg(required = true)]
        words: Vec<String>,

        /// Optional BIP39 passphrase
        #[arg(long, default_value = "")]
        passphrase: String,

        /// Account index in m/44'/1237'/<account>'/0/0
        #[arg(short, long, conflicts_with = "path")]
        account: Option<u32>,

        /// Full derivation path
        #[arg(long)]
        path: Option<String>,
    },

    /// Search for a public key whose hex form starts with a prefix
    Hex {
        /// Hex prefix (0123456789abcdef)
        prefix: String,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Search for an npub starting with a prefix
    Npub {
        /// Bech32 prefix, with or without the leading npub1
        prefix: String,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Decode an npub or nsec back to hex
    Decode {
        /// npub1... or nsec1...
        key: String,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Number of worker threads
    #[arg(short = 't', long, default_value_t = num_cpus::get())]
    threads: usize,
}

/// Pretty duration formatter
struct PrettyDur(chrono::Duration);

impl PrettyDur {
    fn from_std(duration: Duration) -> Self {
        Self(chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero()))
    }

    fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs < 0.0 {
            return Self(chrono::Duration::zero());
        }
        // chrono stores milliseconds in an i64
        let secs = secs.min(9.0e15);
        Self::from_std(Duration::from_secs_f64(secs))
    }
}

impl std::fmt::Display for PrettyDur {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.num_weeks() >= 52 {
            write!(f, "{} years, ", self.0.num_weeks() / 52)?;
        }
        if self.0.num_weeks() % 52 > 0 {
            write!(f, "{} weeks, ", self.0.num_weeks() % 52)?;
        }
        if self.0.num_days() % 7 > 0 {
            write!(f, "{} days, ", self.0.num_days() % 7)?;
        }
        if self.0.num_hours() % 24 > 0 {
            write!(f, "{}h ", self.0.num_hours() % 24)?;
        }
        if self.0.num_minutes() % 60 > 0 {
            write!(f, "{}m ", self.0.num_minutes() % 60)?;
        }
        write!(f, "{}s", self.0.num_seconds() % 60)
    }
}

const EXIT_INVALID_INPUT: u8 = 1;
const EXIT_SEARCH_FAILED: u8 = 2;
const EXIT_ABORTED: u8 = 130;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Derive {
            words,
            passphrase,
            account,
            path,
        } => derive(&words, &passphrase, account, path),
        Command::Hex { prefix, search } => vanity(&prefix, SearchMode::Hex, search),
        Command::Npub { prefix, search } => vanity(&prefix, SearchMode::Bech32, search),
        Command::Decode { key } => decode(&key),
    }
}

fn derive(
    words: &[String],
    passphrase: &str,
    account: Option<u32>,
    path: Option<String>,
) -> ExitCode {
    let path = match (path, account) {
        (Some(path), _) => path,
        (None, Some(account)) => nip06_path(account),
        (None, None) => NIP06_PATH.to_string(),
    };

    match derive_keypair(words, passphrase, &path) {
        Ok(keypair) => print_keypair(&keypair),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_INVALID_INPUT)
        }
    }
}

fn vanity(prefix: &str, mode: SearchMode, args: SearchArgs) -> ExitCode {
    let request = match SearchRequest::new(prefix, mode) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
    };

    let config = SearchConfig::with_workers(args.threads);
    let expected = request.expected_attempts();

    eprintln!(
        "Searching for {}... using {} workers",
        request.label(),
        config.workers
    );

    let mut coordinator = Coordinator::new(OsKeySource::new(), config);

    // Ctrl+C takes the same cancellation path a winning worker does
    let accounter = coordinator.accounter();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nStopping...");
        accounter.cancel();
    }) {
        warn!("could not install Ctrl+C handler: {}", e);
    }

    let (progress_tx, progress_rx) = unbounded::<Progress>();
    let gen_handle = std::thread::spawn(move || coordinator.run(&request, Some(progress_tx)));

    // The channel closes when the search returns
    for progress in progress_rx {
        report(&progress, expected);
    }
    eprintln!();

    match gen_handle.join() {
        Ok(Ok(SearchOutcome::Found(found))) => {
            eprintln!(
                "Found after {} total attempts in {}",
                format_number(found.attempts),
                PrettyDur::from_std(found.elapsed)
            );
            print_keypair(&found.keypair)
        }
        Ok(Ok(SearchOutcome::Aborted { attempts, elapsed })) => {
            eprintln!(
                "Search aborted after {} attempts in {}",
                format_number(attempts),
                PrettyDur::from_std(elapsed)
            );
            ExitCode::from(EXIT_ABORTED)
        }
        Ok(Err(e)) => {
            eprintln!("Search failed: {}", e);
            ExitCode::from(EXIT_SEARCH_FAILED)
        }
        Err(_) => {
            eprintln!("Search thread panicked");
            ExitCode::from(EXIT_SEARCH_FAILED)
        }
    }
}

/// Overwrite the status line with the latest throughput
fn report(progress: &Progress, expected: f64) {
    let expected_secs = if progress.keys_per_sec > 0.0 {
        expected / progress.keys_per_sec
    } else {
        0.0
    };

    eprint!(
        "\r  {} attempts | {} keys/sec | {} (expected ~{})    ",
        format_number(progress.keys_checked),
        format_speed(progress.keys_per_sec as u64),
        PrettyDur::from_secs_f64(progress.elapsed_secs),
        PrettyDur::from_secs_f64(expected_secs),
    );
    let _ = std::io::stderr().flush();
}

fn decode(key: &str) -> ExitCode {
    let key = key.trim().to_lowercase();

    let decoded = if key.starts_with("npub1") {
        decode_npub(&key).map(|bytes| ("Public key (hex): ", bytes))
    } else if key.starts_with("nsec1") {
        decode_nsec(&key).map(|bytes| ("Private key (hex):", bytes))
    } else {
        eprintln!("Error: expected an npub1... or nsec1... key");
        return ExitCode::from(EXIT_INVALID_INPUT);
    };

    match decoded {
        Ok((label, bytes)) => {
            println!("{} {}", label, hex::encode(bytes));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_INVALID_INPUT)
        }
    }
}

fn print_keypair(keypair: &Keypair) -> ExitCode {
    match format_keypair(keypair) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_SEARCH_FAILED)
        }
    }
}
