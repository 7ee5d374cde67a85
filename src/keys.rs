//! Nostr keypair generation and text encodings
//!
//! A Nostr public key is the x-only (32 byte) serialization of a secp256k1
//! point. Both halves of a keypair have a hex form and a bech32 form
//! (`nsec1...` for the private key, `npub1...` for the public key).

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, SignOnly, Signing};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

use crate::{NPUB_HRP, NSEC_HRP};

const NPUB: Hrp = Hrp::parse_unchecked(NPUB_HRP);
const NSEC: Hrp = Hrp::parse_unchecked(NSEC_HRP);

/// Errors produced by key generation and the key codecs
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("random source failure: {0}")]
    RandomSource(String),

    #[error("invalid secp256k1 secret key")]
    InvalidSecretKey,

    #[error("bech32 encoding error: {0}")]
    Bech32Encode(String),

    #[error("bech32 decoding error: {0}")]
    Bech32Decode(String),

    #[error("invalid hrp: expected {expected}, got {got}")]
    InvalidHrp { expected: String, got: String },

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A Nostr keypair: a 32-byte secret and its 32-byte x-only public key
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub private_key: [u8; 32],
    pub public_key: [u8; 32],
}

impl Keypair {
    /// Build a keypair from a secret, deriving the public half
    pub fn from_private_key(private_key: [u8; 32]) -> Result<Self, KeyError> {
        let public_key = public_key_from_private(&private_key)?;
        Ok(Self {
            private_key,
            public_key,
        })
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key)
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    pub fn nsec(&self) -> Result<String, KeyError> {
        encode_nsec(&self.private_key)
    }

    pub fn npub(&self) -> Result<String, KeyError> {
        encode_npub(&self.public_key)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key_hex())
            .field("private_key", &"[redacted]")
            .finish()
    }
}

/// A source of fresh keypairs, driven once per search attempt
pub trait KeySource: Send + Sync {
    fn generate(&self) -> Result<Keypair, KeyError>;
}

/// Draws secrets from the operating system CSPRNG
pub struct OsKeySource {
    secp: Secp256k1<SignOnly>,
}

impl OsKeySource {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::signing_only(),
        }
    }
}

impl Default for OsKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for OsKeySource {
    fn generate(&self) -> Result<Keypair, KeyError> {
        let mut private_key = [0u8; 32];
        loop {
            OsRng
                .try_fill_bytes(&mut private_key)
                .map_err(|e| KeyError::RandomSource(e.to_string()))?;

            // Zero or >= curve order; redraw
            let Ok(secret) = SecretKey::from_slice(&private_key) else {
                continue;
            };

            return Ok(Keypair {
                private_key,
                public_key: x_only(&self.secp, &secret),
            });
        }
    }
}

fn x_only<C: Signing>(secp: &Secp256k1<C>, secret: &SecretKey) -> [u8; 32] {
    let (x_only, _parity) = PublicKey::from_secret_key(secp, secret).x_only_public_key();
    x_only.serialize()
}

/// Derive the x-only public key for a 32-byte secret
pub fn public_key_from_private(private_key: &[u8; 32]) -> Result<[u8; 32], KeyError> {
    let secp = Secp256k1::signing_only();
    let secret = SecretKey::from_slice(private_key).map_err(|_| KeyError::InvalidSecretKey)?;
    Ok(x_only(&secp, &secret))
}

/// Encode a public key as `npub1...`
pub fn encode_npub(public_key: &[u8; 32]) -> Result<String, KeyError> {
    encode(NPUB, public_key)
}

/// Encode a private key as `nsec1...`
pub fn encode_nsec(private_key: &[u8; 32]) -> Result<String, KeyError> {
    encode(NSEC, private_key)
}

/// Decode an `npub1...` string to the raw public key
pub fn decode_npub(npub: &str) -> Result<[u8; 32], KeyError> {
    decode(NPUB, npub)
}

/// Decode an `nsec1...` string to the raw private key
pub fn decode_nsec(nsec: &str) -> Result<[u8; 32], KeyError> {
    decode(NSEC, nsec)
}

fn encode(hrp: Hrp, data: &[u8; 32]) -> Result<String, KeyError> {
    bech32::encode::<Bech32>(hrp, data).map_err(|e| KeyError::Bech32Encode(e.to_string()))
}

fn decode(expected: Hrp, encoded: &str) -> Result<[u8; 32], KeyError> {
    // NIP-19 keys use the original bech32 checksum; bech32m is rejected
    let checked = CheckedHrpstring::new::<Bech32>(encoded)
        .map_err(|e| KeyError::Bech32Decode(e.to_string()))?;

    let hrp = checked.hrp();
    if hrp != expected {
        return Err(KeyError::InvalidHrp {
            expected: expected.to_string(),
            got: hrp.to_string(),
        });
    }

    let data: Vec<u8> = checked.byte_iter().collect();
    data.as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidLength(data.len()))
}

/// Render a keypair as the four output lines (hex and bech32 of each half)
pub fn format_keypair(keypair: &Keypair) -> Result<String, KeyError> {
    Ok(format!(
        "Private key (hex):    {}\n\
         Private key (bech32): {}\n\
         Public key (hex):     {}\n\
         Public key (bech32):  {}",
        keypair.private_key_hex(),
        keypair.nsec()?,
        keypair.public_key_hex(),
        keypair.npub()?,
    ))
}
