//! # Conversion Requests
//!
//! A request names an ordered list of `(rank, amount)` source entries and
//! a single destination rank. Entries may repeat a rank; their amounts
//! accumulate.

use std::collections::BTreeMap;
use std::fmt;

use gacha_protocol::config::MAX_CONVERSION_SOURCES;
use gacha_protocol::ledger::{Amount, Rank};
use serde::{Deserialize, Serialize};

use crate::error::SwapError;

// ---------------------------------------------------------------------------
// SourceEntry
// ---------------------------------------------------------------------------

/// One `(rank, amount)` pair offered by the holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub rank: Rank,
    pub amount: Amount,
}

impl SourceEntry {
    pub fn new(rank: impl Into<Rank>, amount: Amount) -> Self {
        Self {
            rank: rank.into(),
            amount,
        }
    }
}

impl fmt::Display for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rank.id(), self.amount)
    }
}

impl std::str::FromStr for SourceEntry {
    type Err = String;

    /// Parses `RANK:AMOUNT`, e.g. `0:12` or `rank7:2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rank, amount) = s
            .split_once(':')
            .ok_or_else(|| format!("expected RANK:AMOUNT, got '{s}'"))?;
        let rank = rank
            .parse::<Rank>()
            .map_err(|e| format!("bad rank '{rank}': {e}"))?;
        let amount = amount
            .trim()
            .parse::<Amount>()
            .map_err(|e| format!("bad amount '{amount}': {e}"))?;
        Ok(Self { rank, amount })
    }
}

// ---------------------------------------------------------------------------
// ConversionRequest
// ---------------------------------------------------------------------------

/// A holder's proposed conversion of several sources into one destination unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub sources: Vec<SourceEntry>,
    pub destination: Rank,
}

impl ConversionRequest {
    /// Creates a request with no sources yet.
    pub fn new(destination: impl Into<Rank>) -> Self {
        Self {
            sources: Vec::new(),
            destination: destination.into(),
        }
    }

    /// Builder-style: appends one source entry.
    pub fn with_source(mut self, rank: impl Into<Rank>, amount: Amount) -> Self {
        self.sources.push(SourceEntry::new(rank, amount));
        self
    }

    /// Builds a request from parallel id/amount lists, the shape the
    /// collection contract's `swap(ids, amounts, destination)` takes.
    pub fn from_parallel(
        ranks: &[u32],
        amounts: &[Amount],
        destination: u32,
    ) -> Result<Self, SwapError> {
        if ranks.len() != amounts.len() {
            return Err(SwapError::InvalidRequest(format!(
                "{} ranks but {} amounts",
                ranks.len(),
                amounts.len()
            )));
        }
        Ok(Self {
            sources: ranks
                .iter()
                .zip(amounts)
                .map(|(r, a)| SourceEntry::new(*r, *a))
                .collect(),
            destination: Rank(destination),
        })
    }

    /// Rejects zero amounts and oversized requests. An empty source list
    /// passes here; the value gate rejects it.
    pub fn validate_shape(&self) -> Result<(), SwapError> {
        if self.sources.len() > MAX_CONVERSION_SOURCES {
            return Err(SwapError::InvalidRequest(format!(
                "{} source entries exceeds the limit of {}",
                self.sources.len(),
                MAX_CONVERSION_SOURCES
            )));
        }
        if let Some(entry) = self.sources.iter().find(|e| e.amount == 0) {
            return Err(SwapError::InvalidRequest(format!(
                "source amount for {} must be positive",
                entry.rank
            )));
        }
        Ok(())
    }

    /// Amount requested per distinct rank, duplicates summed.
    pub fn totals_by_rank(&self) -> Result<BTreeMap<Rank, Amount>, SwapError> {
        let mut totals = BTreeMap::new();
        for entry in &self.sources {
            let slot = totals.entry(entry.rank).or_insert(0u64);
            *slot = slot
                .checked_add(entry.amount)
                .ok_or(SwapError::ArithmeticOverflow)?;
        }
        Ok(totals)
    }

    /// Whether the destination rank is also offered as a source.
    pub fn is_self_referential(&self) -> bool {
        self.sources.iter().any(|e| e.rank == self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_entry_parses_cli_syntax() {
        assert_eq!("0:12".parse::<SourceEntry>().unwrap(), SourceEntry::new(0, 12));
        assert_eq!("rank7:2".parse::<SourceEntry>().unwrap(), SourceEntry::new(7, 2));
        assert!("7".parse::<SourceEntry>().is_err());
        assert!("7:-1".parse::<SourceEntry>().is_err());
        assert!("x:1".parse::<SourceEntry>().is_err());
    }

    #[test]
    fn parallel_lists_must_match() {
        let req = ConversionRequest::from_parallel(&[0, 7], &[6, 2], 8).unwrap();
        assert_eq!(req.sources.len(), 2);
        assert_eq!(req.destination, Rank(8));
        assert!(ConversionRequest::from_parallel(&[0], &[6, 2], 8).is_err());
    }

    #[test]
    fn zero_amount_rejected() {
        let req = ConversionRequest::new(8).with_source(0, 12).with_source(7, 0);
        assert!(matches!(
            req.validate_shape(),
            Err(SwapError::InvalidRequest(_))
        ));
    }

    #[test]
    fn oversized_request_rejected() {
        let mut req = ConversionRequest::new(8);
        for _ in 0..=MAX_CONVERSION_SOURCES {
            req = req.with_source(0, 1);
        }
        assert!(req.validate_shape().is_err());
    }

    #[test]
    fn empty_request_passes_shape_check() {
        assert!(ConversionRequest::new(8).validate_shape().is_ok());
    }

    #[test]
    fn duplicates_accumulate() {
        let req = ConversionRequest::new(8)
            .with_source(0, 5)
            .with_source(7, 1)
            .with_source(0, 7);
        let totals = req.totals_by_rank().unwrap();
        assert_eq!(totals.get(&Rank(0)), Some(&12));
        assert_eq!(totals.get(&Rank(7)), Some(&1));
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn duplicate_totals_overflow_is_reported() {
        let req = ConversionRequest::new(8)
            .with_source(0, u64::MAX)
            .with_source(0, 1);
        assert_eq!(req.totals_by_rank(), Err(SwapError::ArithmeticOverflow));
    }

    #[test]
    fn self_reference_detected() {
        assert!(ConversionRequest::new(8).with_source(8, 1).is_self_referential());
        assert!(!ConversionRequest::new(8).with_source(0, 1).is_self_referential());
    }
}
