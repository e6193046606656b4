//! Ledger events, appended on every successful mutation.
//!
//! Externally tagged so the log survives a bincode round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::token::{Address, Amount, Rank};

/// A record of one successful ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    /// New units were issued by the collection owner.
    Mint {
        to: Address,
        rank: Rank,
        amount: Amount,
        at: DateTime<Utc>,
    },
    /// A single-rank move between two accounts.
    TransferSingle {
        operator: Address,
        from: Address,
        to: Address,
        rank: Rank,
        amount: Amount,
        at: DateTime<Utc>,
    },
    /// An atomic multi-rank move between two accounts.
    TransferBatch {
        operator: Address,
        from: Address,
        to: Address,
        ranks: Vec<Rank>,
        amounts: Vec<Amount>,
        at: DateTime<Utc>,
    },
    /// A holder granted or revoked an operator's delegated transfer rights.
    ApprovalForAll {
        holder: Address,
        operator: Address,
        approved: bool,
        at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Short name used in logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::Mint { .. } => "mint",
            LedgerEvent::TransferSingle { .. } => "transfer_single",
            LedgerEvent::TransferBatch { .. } => "transfer_batch",
            LedgerEvent::ApprovalForAll { .. } => "approval_for_all",
        }
    }
}
