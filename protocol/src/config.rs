//! # Protocol Configuration & Constants
//!
//! Every fixed number the ledger and the swap engine agree on lives here.
//! The node may override addresses and ports at runtime; the limits below
//! are compiled in.

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Default collection name for a freshly deployed ledger.
pub const DEFAULT_COLLECTION_NAME: &str = "sample";

/// Default collection symbol.
pub const DEFAULT_COLLECTION_SYMBOL: &str = "SPL";

/// Number of ranks minted by the reference deployment (ranks `0..10`).
pub const DEFAULT_RANK_COUNT: u32 = 10;

// ---------------------------------------------------------------------------
// Swap Limits
// ---------------------------------------------------------------------------

/// Maximum number of `(rank, amount)` entries in a single conversion
/// request. Bounds the cost of the value gate and the transfer batch.
pub const MAX_CONVERSION_SOURCES: usize = 64;

/// Number of destination units handed out by every successful conversion.
/// Not configurable: a conversion settles exactly one unit.
pub const SETTLEMENT_UNITS: u64 = 1;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Default address of the swap engine. The reference deployment uses the
/// same address as the operator and as the reserve account.
pub const DEFAULT_SWAP_ADDRESS: &str = "swap";

/// Default address of the collection owner (the only account allowed to mint).
pub const DEFAULT_OWNER_ADDRESS: &str = "owner";

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Version string reported by the node and embedded in persisted metadata.
pub const PROTOCOL_VERSION: &str = "0.1.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_do_not_collide() {
        assert_ne!(DEFAULT_RPC_PORT, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn settlement_is_a_single_unit() {
        assert_eq!(SETTLEMENT_UNITS, 1);
    }
}
