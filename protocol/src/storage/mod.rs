//! # Storage Module
//!
//! Persistence for a deployment's ledger. Snapshots are bincode-encoded
//! and stored next to their BLAKE3 state root; JSON is reserved for the
//! API and for human-edited configuration.

pub mod db;

pub use db::{DbError, DbResult, LedgerDb};
