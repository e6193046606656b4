//! # Value Table
//!
//! Maps every convertible rank to its weight: how many value units one
//! unit of that rank is worth. Fixed at construction and never mutated.
//!
//! Construction rejects non-positive weights. A zero weight would let a
//! destination be claimed for free, and a negative one has no meaning in
//! unsigned arithmetic.

use std::collections::BTreeMap;

use gacha_protocol::ledger::Rank;
use serde::{Deserialize, Serialize};

use crate::error::SwapError;
use crate::request::SourceEntry;

/// Immutable rank → weight mapping.
///
/// Serialized as a JSON object of `{ "rank": weight }`; deserialization
/// re-runs the same validation as [`ValueTable::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Rank, i64>", into = "BTreeMap<Rank, i64>")]
pub struct ValueTable {
    weights: BTreeMap<Rank, u64>,
}

impl ValueTable {
    /// Builds a table from `(rank, weight)` pairs.
    ///
    /// # Errors
    ///
    /// [`SwapError::InvalidConfiguration`] if the table is empty, a weight
    /// is zero or negative, or a rank is listed twice.
    pub fn new<I>(entries: I) -> Result<Self, SwapError>
    where
        I: IntoIterator<Item = (Rank, i64)>,
    {
        let mut weights = BTreeMap::new();
        for (rank, weight) in entries {
            if weight <= 0 {
                return Err(SwapError::InvalidConfiguration(format!(
                    "weight for {rank} must be positive, got {weight}"
                )));
            }
            if weights.insert(rank, weight as u64).is_some() {
                return Err(SwapError::InvalidConfiguration(format!(
                    "{rank} is configured more than once"
                )));
            }
        }
        if weights.is_empty() {
            return Err(SwapError::InvalidConfiguration(
                "value table has no ranks".into(),
            ));
        }
        Ok(Self { weights })
    }

    /// The weights of the reference collection: B (rank 0) = 1,
    /// A (rank 7) = 3, S (rank 4) = 6, SS (rank 8) = 12.
    pub fn gacha_default() -> Self {
        let weights = [(Rank(0), 1), (Rank(7), 3), (Rank(4), 6), (Rank(8), 12)]
            .into_iter()
            .collect();
        Self { weights }
    }

    /// Weight of one unit of `rank`.
    pub fn weight_of(&self, rank: Rank) -> Result<u64, SwapError> {
        self.weights
            .get(&rank)
            .copied()
            .ok_or(SwapError::UnknownRank(rank))
    }

    /// Weighted value of `sources`: `Σ amount × weight`.
    ///
    /// # Errors
    ///
    /// [`SwapError::UnknownRank`] for an unconfigured rank,
    /// [`SwapError::ArithmeticOverflow`] if the sum leaves `u64`.
    pub fn value_of(&self, sources: &[SourceEntry]) -> Result<u64, SwapError> {
        sources.iter().try_fold(0u64, |total, entry| {
            let weight = self.weight_of(entry.rank)?;
            let contribution = entry
                .amount
                .checked_mul(weight)
                .ok_or(SwapError::ArithmeticOverflow)?;
            total
                .checked_add(contribution)
                .ok_or(SwapError::ArithmeticOverflow)
        })
    }

    pub fn contains(&self, rank: Rank) -> bool {
        self.weights.contains_key(&rank)
    }

    /// Configured ranks in ascending order.
    pub fn ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.weights.keys().copied()
    }

    /// `(rank, weight)` pairs in ascending rank order.
    pub fn entries(&self) -> Vec<(Rank, u64)> {
        self.weights.iter().map(|(r, w)| (*r, *w)).collect()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl TryFrom<BTreeMap<Rank, i64>> for ValueTable {
    type Error = SwapError;

    fn try_from(map: BTreeMap<Rank, i64>) -> Result<Self, Self::Error> {
        Self::new(map)
    }
}

impl From<ValueTable> for BTreeMap<Rank, i64> {
    fn from(table: ValueTable) -> Self {
        table
            .weights
            .into_iter()
            .map(|(r, w)| (r, i64::try_from(w).unwrap_or(i64::MAX)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_weights() {
        let table = ValueTable::gacha_default();
        assert_eq!(table.weight_of(Rank(0)).unwrap(), 1);
        assert_eq!(table.weight_of(Rank(7)).unwrap(), 3);
        assert_eq!(table.weight_of(Rank(4)).unwrap(), 6);
        assert_eq!(table.weight_of(Rank(8)).unwrap(), 12);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn unknown_rank_rejected() {
        let table = ValueTable::gacha_default();
        assert_eq!(table.weight_of(Rank(3)), Err(SwapError::UnknownRank(Rank(3))));
        assert!(!table.contains(Rank(3)));
    }

    #[test]
    fn zero_weight_is_invalid_configuration() {
        let err = ValueTable::new([(Rank(0), 1), (Rank(1), 0)]).unwrap_err();
        assert!(matches!(err, SwapError::InvalidConfiguration(_)));
    }

    #[test]
    fn negative_weight_is_invalid_configuration() {
        let err = ValueTable::new([(Rank(0), -3)]).unwrap_err();
        assert!(matches!(err, SwapError::InvalidConfiguration(_)));
    }

    #[test]
    fn duplicate_rank_is_invalid_configuration() {
        let err = ValueTable::new([(Rank(0), 1), (Rank(0), 2)]).unwrap_err();
        assert!(matches!(err, SwapError::InvalidConfiguration(_)));
    }

    #[test]
    fn empty_table_is_invalid_configuration() {
        assert!(ValueTable::new(Vec::<(Rank, i64)>::new()).is_err());
    }

    #[test]
    fn value_of_sums_weighted_amounts() {
        let table = ValueTable::gacha_default();
        let sources = [SourceEntry::new(0, 6), SourceEntry::new(7, 2)];
        assert_eq!(table.value_of(&sources).unwrap(), 12);
        assert_eq!(table.value_of(&[]).unwrap(), 0);
    }

    #[test]
    fn value_of_detects_overflow() {
        let table = ValueTable::new([(Rank(0), 2)]).unwrap();
        let sources = [SourceEntry::new(0, u64::MAX)];
        assert_eq!(table.value_of(&sources), Err(SwapError::ArithmeticOverflow));

        let table = ValueTable::new([(Rank(0), 1)]).unwrap();
        let sources = [SourceEntry::new(0, u64::MAX), SourceEntry::new(0, 1)];
        assert_eq!(table.value_of(&sources), Err(SwapError::ArithmeticOverflow));
    }

    #[test]
    fn json_roundtrip_revalidates() {
        let table = ValueTable::gacha_default();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"0":1,"4":6,"7":3,"8":12}"#);
        let back: ValueTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);

        let bad = serde_json::from_str::<ValueTable>(r#"{"0":1,"8":0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn ranks_are_ordered() {
        let ranks: Vec<Rank> = ValueTable::gacha_default().ranks().collect();
        assert_eq!(ranks, vec![Rank(0), Rank(4), Rank(7), Rank(8)]);
    }
}
