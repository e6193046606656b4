//! Error taxonomy shared by the value table and the swap engine.

use gacha_protocol::ledger::{Address, LedgerError, Rank};
use thiserror::Error;

/// Every way a deployment or a conversion can be rejected.
///
/// A rejected conversion never mutates the ledger, whichever variant is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    /// A source or destination rank has no configured weight.
    #[error("unknown rank: {0} has no configured weight")]
    UnknownRank(Rank),

    /// The value table was built from bad input. Fatal at deployment time.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The holder has not delegated transfer rights to the engine.
    #[error("Not allowed: {holder} has not approved operator {operator}")]
    NotAuthorized {
        /// The account requesting the conversion.
        holder: Address,
        /// The engine's operating address.
        operator: Address,
    },

    /// Weighted sum of the sources is below the destination weight.
    #[error("Not enough token values to complete transaction: offered {offered}, required {required}")]
    InsufficientValue {
        /// Weighted value of every source entry.
        offered: u64,
        /// Weight of one destination unit.
        required: u64,
    },

    /// The reserve account has no unit of the destination rank to hand out.
    #[error("reserve depleted: {reserve} holds no {rank}")]
    ReserveDepleted {
        /// The reserve account.
        reserve: Address,
        /// The destination rank.
        rank: Rank,
    },

    /// Accumulating weights or amounts would exceed `u64`.
    #[error("arithmetic overflow while valuing the conversion")]
    ArithmeticOverflow,

    /// The request is malformed (zero amount, too many entries).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A ledger primitive failed. Carries the ledger's own error unchanged.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SwapError {
    /// Stable, machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::UnknownRank(_) => "unknown_rank",
            SwapError::InvalidConfiguration(_) => "invalid_configuration",
            SwapError::NotAuthorized { .. } => "not_authorized",
            SwapError::InsufficientValue { .. } => "insufficient_value",
            SwapError::ReserveDepleted { .. } => "reserve_depleted",
            SwapError::ArithmeticOverflow => "arithmetic_overflow",
            SwapError::InvalidRequest(_) => "invalid_request",
            SwapError::Ledger(LedgerError::InsufficientBalance { .. }) => "insufficient_balance",
            SwapError::Ledger(_) => "ledger",
        }
    }

    /// Whether resubmitting the same request later could succeed without
    /// the caller changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwapError::ReserveDepleted { .. }
                | SwapError::NotAuthorized { .. }
                | SwapError::Ledger(LedgerError::InsufficientBalance { .. })
        )
    }
}
