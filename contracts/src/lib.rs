//! # Gacha Swap Contracts
//!
//! Conversion logic for a multi-rank token collection. Holders trade a
//! weighted combination of lower ranks for exactly one unit of a higher
//! rank, paid out of a reserve account:
//!
//! - **Value Table**: immutable rank → weight mapping, validated at
//!   construction.
//! - **Swap Engine**: authorization gate, value gate, atomic source
//!   transfer, then single-unit settlement.
//!
//! ## Design Principles
//!
//! 1. All value arithmetic is checked. Overflow is an error, never a wrap.
//! 2. A rejected conversion leaves the ledger untouched.
//! 3. The engine reads the ledger only through [`ledger::TokenLedger`] and
//!    caches nothing between calls.
//! 4. Every public type is serializable (serde) for the node's HTTP API.

pub mod error;
pub mod ledger;
pub mod request;
pub mod swap;
pub mod value_table;

pub use error::SwapError;
pub use ledger::TokenLedger;
pub use request::{ConversionRequest, SourceEntry};
pub use swap::{ConversionReceipt, ConversionStage, SwapEngine, Valuation};
pub use value_table::ValueTable;
