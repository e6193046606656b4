//! # Gacha Protocol
//!
//! The ledger side of the gacha swap: a multi-token ledger of fungible
//! ranks with delegated approvals and atomic batch transfers, plus the
//! sled-backed storage that persists it.
//!
//! The swap engine itself lives in `gacha-contracts` and talks to this
//! crate only through balance reads, approval reads and transfers.

pub mod config;
pub mod ledger;
pub mod storage;

pub use ledger::{
    Address, Amount, BalanceError, BalanceSheet, CollectionInfo, LedgerError, LedgerEvent,
    MultiTokenLedger, Rank,
};
pub use storage::{DbError, LedgerDb};
