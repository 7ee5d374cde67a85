//! Deterministic key derivation from a BIP-39 seed phrase (NIP-06)
//!
//! The mnemonic is turned into a 64-byte seed, a BIP-32 master key is built
//! from it, and the tree is walked along the derivation path. NIP-06 uses
//! coin type 1237: `m/44'/1237'/<account>'/0/0`.

use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;
use std::str::FromStr;
use thiserror::Error;

use crate::keys::{KeyError, Keypair};

/// Errors from seed-phrase derivation
#[derive(Error, Debug)]
pub enum DeriveError {
    #[error("invalid BIP39 seed phrase (checksum failed)")]
    InvalidSeedChecksum,

    #[error("invalid BIP39 seed phrase: {0}")]
    InvalidMnemonic(String),

    #[error("invalid derivation path '{0}'")]
    InvalidPath(String),

    #[error("key derivation error: {0}")]
    Derivation(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// NIP-06 path for the given account index
pub fn nip06_path(account: u32) -> String {
    format!("m/44'/1237'/{}'/0/0", account)
}

/// Derive a keypair from seed words along `path`
///
/// Words are joined with single spaces before parsing, so both a single
/// phrase and a list of separate words are accepted.
pub fn derive_keypair<S: AsRef<str>>(
    words: &[S],
    passphrase: &str,
    path: &str,
) -> Result<Keypair, DeriveError> {
    let phrase = words
        .iter()
        .map(|w| w.as_ref().trim())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mnemonic = Mnemonic::parse(phrase.as_str()).map_err(|e| match e {
        bip39::Error::InvalidChecksum => DeriveError::InvalidSeedChecksum,
        other => DeriveError::InvalidMnemonic(other.to_string()),
    })?;

    let path =
        DerivationPath::from_str(path).map_err(|_| DeriveError::InvalidPath(path.to_string()))?;

    let seed = mnemonic.to_seed(passphrase);
    derive_from_seed(&seed, &path)
}

fn derive_from_seed(seed: &[u8; 64], path: &DerivationPath) -> Result<Keypair, DeriveError> {
    let secp = Secp256k1::new();

    // The network only affects serialization, not the derived secret
    let master = Xpriv::new_master(Network::Bitcoin, seed)
        .map_err(|e| DeriveError::Derivation(e.to_string()))?;

    let child = master
        .derive_priv(&secp, path)
        .map_err(|e| DeriveError::Derivation(e.to_string()))?;

    Ok(Keypair::from_private_key(child.private_key.secret_bytes())?)
}
