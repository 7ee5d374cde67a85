//! Nostr Key Toolkit Library
//!
//! This library derives Nostr keypairs from BIP-39 seed phrases (NIP-06) and
//! searches the key space in parallel for vanity public keys whose hex or
//! npub encoding starts with a chosen prefix.

pub mod derive;
pub mod keys;
pub mod search;

pub use derive::{derive_keypair, nip06_path, DeriveError};
pub use keys::{
    decode_npub, decode_nsec, encode_npub, encode_nsec, format_keypair, public_key_from_private,
    KeyError, KeySource, Keypair, OsKeySource,
};
pub use search::{
    format_number, format_speed, Coordinator, FoundKey, Progress, ProgressAccounter, SearchConfig,
    SearchError, SearchMode, SearchOutcome, SearchRequest, StopReason,
};

/// Human-readable part of a bech32-encoded public key
pub const NPUB_HRP: &str = "npub";

/// Human-readable part of a bech32-encoded private key
pub const NSEC_HRP: &str = "nsec";

/// The 32-character bech32 data alphabet
pub const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// NIP-06 derivation path for the first account
pub const NIP06_PATH: &str = "m/44'/1237'/0'/0/0";
