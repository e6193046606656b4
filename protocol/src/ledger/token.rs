//! # Token Identifiers
//!
//! A collection is a fixed set of fungible asset classes called *ranks*.
//! Every unit of the same rank is interchangeable; ranks themselves are
//! opaque numeric identifiers assigned by the issuer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{DEFAULT_COLLECTION_NAME, DEFAULT_COLLECTION_SYMBOL};

/// Account identifier: holders, the reserve account, operators and the
/// collection owner are all plain strings.
pub type Address = String;

/// Unit count of a single rank.
pub type Amount = u64;

// ---------------------------------------------------------------------------
// Rank
// ---------------------------------------------------------------------------

/// Identifier of one fungible asset class within the collection.
///
/// Serialized as a bare integer so it can be used as a JSON map key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(pub u32);

impl Rank {
    /// Returns the numeric id.
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank{}", self.0)
    }
}

impl From<u32> for Rank {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for Rank {
    type Err = std::num::ParseIntError;

    /// Accepts either `"7"` or `"rank7"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("rank").unwrap_or(s);
        digits.trim().parse::<u32>().map(Rank)
    }
}

// ---------------------------------------------------------------------------
// CollectionInfo
// ---------------------------------------------------------------------------

/// Display metadata for the collection. The ledger never interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Human-readable collection name.
    pub name: String,
    /// Short ticker symbol.
    pub symbol: String,
}

impl CollectionInfo {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
        }
    }
}

impl Default for CollectionInfo {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION_NAME, DEFAULT_COLLECTION_SYMBOL)
    }
}
