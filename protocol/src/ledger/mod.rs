//! # Ledger Module: Multi-Token Balances & Approvals
//!
//! The ledger is where ranks live. It mints, stores and moves units of
//! every rank in a collection, and keeps the delegated-approval registry
//! that lets an operator (the swap engine) move a holder's tokens.
//!
//! ## Architecture
//!
//! ```text
//! token.rs        Rank, Address, Amount, collection metadata
//! balance.rs      Per-account balance sheet with checked arithmetic
//! event.rs        Append-only record of successful mutations
//! multi_token.rs  The ledger: mint, approvals, single and batch transfers
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` unit counts.** Ranks are indivisible.
//! 2. **Batch transfers are all-or-nothing.** Legs are applied to working
//!    copies and committed together.
//! 3. **Canonical state.** Ordered maps everywhere, so the state root is a
//!    pure function of balances and approvals.

pub mod balance;
pub mod event;
pub mod multi_token;
pub mod token;

pub use balance::{BalanceError, BalanceSheet};
pub use event::LedgerEvent;
pub use multi_token::{LedgerError, MultiTokenLedger};
pub use token::{Address, Amount, CollectionInfo, Rank};
