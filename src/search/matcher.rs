//! Prefix matching against the hex or npub form of a public key
//!
//! Both modes compare the key's digits directly instead of building the
//! encoded string, so a check costs no allocation.

use bech32::primitives::iter::ByteIterExt;
use bech32::Fe32;

use super::{SearchError, SearchMode, SearchRequest};

/// A prefix compiled to the digits of its mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// One nibble per hex character
    Hex(Vec<u8>),
    /// One field element per bech32 data character
    Bech32(Vec<Fe32>),
}

impl Pattern {
    /// Validate every character of `prefix` against the mode's alphabet
    pub fn compile(prefix: &str, mode: SearchMode) -> Result<Self, SearchError> {
        if prefix.is_empty() {
            return Err(SearchError::EmptyPrefix(mode));
        }

        let pattern = match mode {
            SearchMode::Hex => Pattern::Hex(
                prefix
                    .chars()
                    .map(|ch| {
                        ch.to_digit(16)
                            .filter(|_| !ch.is_ascii_uppercase())
                            .map(|d| d as u8)
                            .ok_or(SearchError::InvalidPrefix { ch, mode })
                    })
                    .collect::<Result<_, _>>()?,
            ),
            SearchMode::Bech32 => Pattern::Bech32(
                prefix
                    .chars()
                    .map(|ch| {
                        if ch.is_ascii_uppercase() {
                            return Err(SearchError::InvalidPrefix { ch, mode });
                        }
                        Fe32::from_char(ch).map_err(|_| SearchError::InvalidPrefix { ch, mode })
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };

        let len = pattern.len();
        if len > mode.max_prefix_len() {
            return Err(SearchError::PrefixTooLong {
                mode,
                len,
                max: mode.max_prefix_len(),
            });
        }

        Ok(pattern)
    }

    pub fn len(&self) -> usize {
        match self {
            Pattern::Hex(nibbles) => nibbles.len(),
            Pattern::Bech32(fes) => fes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the encoded `public_key` starts with this pattern
    #[inline]
    pub fn matches(&self, public_key: &[u8; 32]) -> bool {
        match self {
            Pattern::Hex(nibbles) => nibbles.iter().enumerate().all(|(i, &nibble)| {
                let byte = public_key[i / 2];
                let digit = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
                digit == nibble
            }),
            // The codec's 5-bit groups are exactly the characters after "npub1"
            Pattern::Bech32(fes) => public_key
                .iter()
                .copied()
                .bytes_to_fes()
                .zip(fes.iter())
                .all(|(fe, want)| fe == *want),
        }
    }
}

/// Test a public key against a validated request
#[inline]
pub fn matches(public_key: &[u8; 32], request: &SearchRequest) -> bool {
    request.pattern().matches(public_key)
}
