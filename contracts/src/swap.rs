//! # Swap Engine
//!
//! Converts a weighted combination of lower ranks into exactly one unit of
//! a higher rank. Every call walks the same pipeline:
//!
//! ```text
//! Received ─▶ Authorized ─▶ Valued ─▶ Transferred ─▶ Complete
//!     │            │           │            │
//!     └────────────┴───────────┴────────────┴──▶ Rejected
//! ```
//!
//! 1. **Authorization gate**: the holder must have approved the engine's
//!    operator address on the ledger. No balance is read before this.
//! 2. **Value gate**: `Σ amount × weight(source) >= weight(destination)`,
//!    with checked arithmetic. Equality passes.
//! 3. **Transfer**: the reserve must hold a destination unit and the holder
//!    must hold every source amount; both are checked before anything
//!    moves. The sources then move to the reserve in one atomic batch.
//! 4. **Settlement**: one destination unit moves from the reserve to the
//!    holder.
//!
//! A rejected call leaves the ledger exactly as it found it. Surplus value
//! is forfeited; the engine never computes change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gacha_protocol::config::SETTLEMENT_UNITS;
use gacha_protocol::ledger::{Address, Amount, LedgerError, Rank};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SwapError;
use crate::ledger::TokenLedger;
use crate::request::{ConversionRequest, SourceEntry};
use crate::value_table::ValueTable;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Position of a conversion in the gate pipeline. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStage {
    Received,
    Authorized,
    Valued,
    Transferred,
    Complete,
    Rejected,
}

impl std::fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionStage::Received => write!(f, "Received"),
            ConversionStage::Authorized => write!(f, "Authorized"),
            ConversionStage::Valued => write!(f, "Valued"),
            ConversionStage::Transferred => write!(f, "Transferred"),
            ConversionStage::Complete => write!(f, "Complete"),
            ConversionStage::Rejected => write!(f, "Rejected"),
        }
    }
}

impl ConversionStage {
    /// Terminal state of a pipeline that last reached `self`.
    fn conclude<T, E>(self, result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => self,
            Err(_) => ConversionStage::Rejected,
        }
    }
}

/// Outcome of the value gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    /// Weighted value of every source entry.
    pub offered: u64,
    /// Weight of one destination unit.
    pub required: u64,
}

impl Valuation {
    /// Whether the sources cover the destination. Equality passes.
    pub fn is_sufficient(&self) -> bool {
        self.offered >= self.required
    }

    /// Value given up on success.
    pub fn surplus(&self) -> u64 {
        self.offered.saturating_sub(self.required)
    }
}

/// Proof of a completed conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReceipt {
    /// Unique identifier for this conversion.
    pub receipt_id: String,
    pub holder: Address,
    pub destination: Rank,
    /// Units received. Always one.
    pub received: Amount,
    /// Units moved to the reserve, one entry per distinct source rank.
    pub consumed: Vec<SourceEntry>,
    pub offered_value: u64,
    pub required_value: u64,
    /// `offered_value - required_value`, kept by the reserve.
    pub forfeited_value: u64,
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SwapEngine
// ---------------------------------------------------------------------------

/// The exchange engine for one deployment.
///
/// Holds only immutable configuration: the value table, the reserve
/// account and the operator address. Ledger state is re-read on every
/// call and never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapEngine {
    table: ValueTable,
    reserve: Address,
    operator: Address,
}

impl SwapEngine {
    /// Creates an engine. `reserve` custodies destination inventory and
    /// receives sources; `operator` is the address holders approve.
    pub fn new(table: ValueTable, reserve: impl Into<Address>, operator: impl Into<Address>) -> Self {
        Self {
            table,
            reserve: reserve.into(),
            operator: operator.into(),
        }
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn reserve(&self) -> &str {
        &self.reserve
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    // -- Read-only preflights -----------------------------------------------

    /// Runs the value gate alone. Touches no state.
    ///
    /// # Errors
    ///
    /// [`SwapError::UnknownRank`] or [`SwapError::ArithmeticOverflow`];
    /// an insufficient offer is `Ok(false)`, not an error.
    pub fn value_check(&self, sources: &[SourceEntry], destination: Rank) -> Result<bool, SwapError> {
        Ok(self.valuate(sources, destination)?.is_sufficient())
    }

    /// Offered and required value for a conversion, without judging it.
    pub fn valuate(&self, sources: &[SourceEntry], destination: Rank) -> Result<Valuation, SwapError> {
        let offered = self.table.value_of(sources)?;
        let required = self.table.weight_of(destination)?;
        Ok(Valuation { offered, required })
    }

    /// Whether `holder` has approved this engine's operator address.
    pub fn allowance_check<L: TokenLedger + ?Sized>(&self, ledger: &L, holder: &str) -> bool {
        ledger.is_approved_for_all(holder, &self.operator)
    }

    /// Units of `rank` the reserve can currently hand out.
    pub fn reserve_stock<L: TokenLedger + ?Sized>(&self, ledger: &L, rank: Rank) -> Amount {
        ledger.balance_of(&self.reserve, rank)
    }

    // -- Conversion ---------------------------------------------------------

    /// Converts `request.sources` held by `holder` into one unit of
    /// `request.destination`.
    ///
    /// # Errors
    ///
    /// Any [`SwapError`]; in every error case the ledger is unchanged.
    /// A holder short of a source amount gets the ledger's own
    /// `InsufficientBalance` through [`SwapError::Ledger`].
    pub fn convert<L: TokenLedger + ?Sized>(
        &self,
        ledger: &mut L,
        holder: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionReceipt, SwapError> {
        let mut reached = ConversionStage::Received;
        let result = self.run_pipeline(ledger, holder, request, &mut reached);
        let stage = reached.conclude(&result);

        match &result {
            Ok(receipt) => info!(
                holder,
                destination = %receipt.destination,
                offered = receipt.offered_value,
                forfeited = receipt.forfeited_value,
                receipt_id = %receipt.receipt_id,
                "conversion complete"
            ),
            Err(e) => info!(
                holder,
                destination = %request.destination,
                stage = %stage,
                failed_after = %reached,
                kind = e.kind(),
                error = %e,
                "conversion rejected"
            ),
        }
        result
    }

    fn run_pipeline<L: TokenLedger + ?Sized>(
        &self,
        ledger: &mut L,
        holder: &str,
        request: &ConversionRequest,
        stage: &mut ConversionStage,
    ) -> Result<ConversionReceipt, SwapError> {
        // Authorization gate.
        if !self.allowance_check(ledger, holder) {
            return Err(SwapError::NotAuthorized {
                holder: holder.to_string(),
                operator: self.operator.clone(),
            });
        }
        self.advance(stage, ConversionStage::Authorized, holder);
        request.validate_shape()?;

        // Value gate.
        let valuation = self.valuate(&request.sources, request.destination)?;
        if !valuation.is_sufficient() {
            return Err(SwapError::InsufficientValue {
                offered: valuation.offered,
                required: valuation.required,
            });
        }
        if request.is_self_referential() {
            warn!(holder, destination = %request.destination, "destination rank also offered as a source");
        }
        self.advance(stage, ConversionStage::Valued, holder);

        // Transfer: pre-check everything, then move sources in one batch.
        let totals = request.totals_by_rank()?;
        self.check_reserve(ledger, request.destination)?;
        self.check_holdings(ledger, holder, &totals, request.destination)?;

        let legs: Vec<(Rank, Amount)> = totals.into_iter().collect();
        ledger.batch_transfer(&self.operator, holder, &self.reserve, &legs)?;
        self.advance(stage, ConversionStage::Transferred, holder);

        // Settlement.
        if let Err(e) = ledger.transfer(
            &self.operator,
            &self.reserve,
            holder,
            request.destination,
            SETTLEMENT_UNITS,
        ) {
            self.unwind(ledger, holder, &legs);
            return Err(e.into());
        }
        self.advance(stage, ConversionStage::Complete, holder);

        Ok(ConversionReceipt {
            receipt_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            destination: request.destination,
            received: SETTLEMENT_UNITS,
            consumed: legs
                .into_iter()
                .map(|(rank, amount)| SourceEntry { rank, amount })
                .collect(),
            offered_value: valuation.offered,
            required_value: valuation.required,
            forfeited_value: valuation.surplus(),
            completed_at: Utc::now(),
        })
    }

    fn advance(&self, stage: &mut ConversionStage, next: ConversionStage, holder: &str) {
        debug!(holder, from = %stage, to = %next, "conversion stage");
        *stage = next;
    }

    /// The reserve must hold a destination unit and be movable by the operator.
    fn check_reserve<L: TokenLedger + ?Sized>(&self, ledger: &L, destination: Rank) -> Result<(), SwapError> {
        if self.reserve_stock(ledger, destination) < SETTLEMENT_UNITS {
            return Err(SwapError::ReserveDepleted {
                reserve: self.reserve.clone(),
                rank: destination,
            });
        }
        if self.reserve != self.operator && !ledger.is_approved_for_all(&self.reserve, &self.operator) {
            return Err(LedgerError::NotApproved {
                operator: self.operator.clone(),
                holder: self.reserve.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Every source total must be covered, and receiving the destination
    /// unit must not overflow the holder's balance.
    fn check_holdings<L: TokenLedger + ?Sized>(
        &self,
        ledger: &L,
        holder: &str,
        totals: &BTreeMap<Rank, Amount>,
        destination: Rank,
    ) -> Result<(), SwapError> {
        for (&rank, &requested) in totals {
            let available = ledger.balance_of(holder, rank);
            if available < requested {
                return Err(LedgerError::InsufficientBalance {
                    account: holder.to_string(),
                    rank,
                    available,
                    requested,
                }
                .into());
            }
        }

        let outgoing = totals.get(&destination).copied().unwrap_or(0);
        let after_sources = ledger.balance_of(holder, destination) - outgoing;
        if after_sources.checked_add(SETTLEMENT_UNITS).is_none() {
            return Err(LedgerError::Overflow {
                account: holder.to_string(),
                rank: destination,
                credit: SETTLEMENT_UNITS,
            }
            .into());
        }
        Ok(())
    }

    /// Returns the sources to the holder after a failed settlement.
    fn unwind<L: TokenLedger + ?Sized>(&self, ledger: &mut L, holder: &str, legs: &[(Rank, Amount)]) {
        if let Err(e) = ledger.batch_transfer(&self.operator, &self.reserve, holder, legs) {
            error!(holder, error = %e, "failed to return sources after settlement failure");
        } else {
            warn!(holder, "settlement failed, sources returned to holder");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gacha_protocol::ledger::{CollectionInfo, MultiTokenLedger};

    fn setup() -> (SwapEngine, MultiTokenLedger) {
        let engine = SwapEngine::new(ValueTable::gacha_default(), "swap", "swap");
        let mut ledger = MultiTokenLedger::new("owner", CollectionInfo::default());
        ledger.mint("owner", "alice", Rank(0), 12).unwrap();
        ledger.mint("owner", "alice", Rank(7), 12).unwrap();
        ledger.mint("owner", "swap", Rank(8), 1).unwrap();
        ledger.mint("owner", "swap", Rank(4), 1).unwrap();
        (engine, ledger)
    }

    #[test]
    fn stage_display() {
        assert_eq!(ConversionStage::Valued.to_string(), "Valued");
    }

    #[test]
    fn failed_pipeline_concludes_rejected() {
        let (engine, mut ledger) = setup();
        ledger.set_approval_for_all("alice", "swap", true).unwrap();

        let req = ConversionRequest::new(8).with_source(0, 11);
        let mut reached = ConversionStage::Received;
        let result = engine.run_pipeline(&mut ledger, "alice", &req, &mut reached);
        assert_eq!(reached, ConversionStage::Authorized);
        assert_eq!(reached.conclude(&result), ConversionStage::Rejected);

        let req = ConversionRequest::new(8).with_source(0, 12);
        let mut reached = ConversionStage::Received;
        let result = engine.run_pipeline(&mut ledger, "alice", &req, &mut reached);
        assert_eq!(reached.conclude(&result), ConversionStage::Complete);
    }

    #[test]
    fn valuation_surplus() {
        let v = Valuation {
            offered: 15,
            required: 12,
        };
        assert!(v.is_sufficient());
        assert_eq!(v.surplus(), 3);

        let v = Valuation {
            offered: 11,
            required: 12,
        };
        assert!(!v.is_sufficient());
        assert_eq!(v.surplus(), 0);
    }

    #[test]
    fn value_check_boundary_is_inclusive() {
        let (engine, _) = setup();
        assert!(engine.value_check(&[SourceEntry::new(0, 12)], Rank(8)).unwrap());
        assert!(!engine.value_check(&[SourceEntry::new(0, 11)], Rank(8)).unwrap());
    }

    #[test]
    fn value_check_rejects_unknown_ranks() {
        let (engine, _) = setup();
        assert_eq!(
            engine.value_check(&[SourceEntry::new(3, 1)], Rank(8)),
            Err(SwapError::UnknownRank(Rank(3)))
        );
        assert_eq!(
            engine.value_check(&[SourceEntry::new(0, 1)], Rank(9)),
            Err(SwapError::UnknownRank(Rank(9)))
        );
    }

    #[test]
    fn surplus_is_forfeited() {
        let (engine, mut ledger) = setup();
        ledger.set_approval_for_all("alice", "swap", true).unwrap();

        // 5 A = 15 value for a 12-value SS.
        let req = ConversionRequest::new(8).with_source(7, 5);
        let receipt = engine.convert(&mut ledger, "alice", &req).unwrap();
        assert_eq!(receipt.forfeited_value, 3);
        assert_eq!(receipt.received, 1);
        assert_eq!(ledger.balance_of("alice", Rank(7)), 7);
        assert_eq!(ledger.balance_of("alice", Rank(8)), 1);
        assert_eq!(ledger.balance_of("swap", Rank(7)), 5);
    }

    #[test]
    fn depleted_reserve_rejected_before_any_transfer() {
        let (engine, mut ledger) = setup();
        ledger.set_approval_for_all("alice", "swap", true).unwrap();
        let req = ConversionRequest::new(8).with_source(0, 12);
        engine.convert(&mut ledger, "alice", &req).unwrap();

        let root = ledger.state_root();
        let req = ConversionRequest::new(8).with_source(7, 4);
        let err = engine.convert(&mut ledger, "alice", &req).unwrap_err();
        assert_eq!(
            err,
            SwapError::ReserveDepleted {
                reserve: "swap".into(),
                rank: Rank(8)
            }
        );
        assert_eq!(ledger.state_root(), root);
    }

    #[test]
    fn separate_reserve_needs_operator_approval() {
        let engine = SwapEngine::new(ValueTable::gacha_default(), "vault", "swap");
        let mut ledger = MultiTokenLedger::new("owner", CollectionInfo::default());
        ledger.mint("owner", "alice", Rank(0), 12).unwrap();
        ledger.mint("owner", "vault", Rank(8), 1).unwrap();
        ledger.set_approval_for_all("alice", "swap", true).unwrap();

        let req = ConversionRequest::new(8).with_source(0, 12);
        let root = ledger.state_root();
        let err = engine.convert(&mut ledger, "alice", &req).unwrap_err();
        assert!(matches!(err, SwapError::Ledger(LedgerError::NotApproved { .. })));
        assert_eq!(ledger.state_root(), root);

        ledger.set_approval_for_all("vault", "swap", true).unwrap();
        engine.convert(&mut ledger, "alice", &req).unwrap();
        assert_eq!(ledger.balance_of("vault", Rank(0)), 12);
        assert_eq!(ledger.balance_of("alice", Rank(8)), 1);
        assert_eq!(ledger.balance_of("swap", Rank(0)), 0);
    }

    #[test]
    fn zero_amount_is_invalid_request() {
        let (engine, mut ledger) = setup();
        ledger.set_approval_for_all("alice", "swap", true).unwrap();
        let req = ConversionRequest::new(8).with_source(0, 12).with_source(7, 0);
        assert!(matches!(
            engine.convert(&mut ledger, "alice", &req),
            Err(SwapError::InvalidRequest(_))
        ));
    }

    #[test]
    fn empty_request_is_insufficient_value() {
        let (engine, mut ledger) = setup();
        ledger.set_approval_for_all("alice", "swap", true).unwrap();
        let err = engine
            .convert(&mut ledger, "alice", &ConversionRequest::new(8))
            .unwrap_err();
        assert_eq!(
            err,
            SwapError::InsufficientValue {
                offered: 0,
                required: 12
            }
        );
    }

    #[test]
    fn self_referential_conversion_is_permitted() {
        let (engine, mut ledger) = setup();
        ledger.mint("owner", "alice", Rank(4), 2).unwrap();
        ledger.set_approval_for_all("alice", "swap", true).unwrap();

        // 2 S (12) for 1 S (6): allowed, surplus forfeited.
        let req = ConversionRequest::new(4).with_source(4, 2);
        let receipt = engine.convert(&mut ledger, "alice", &req).unwrap();
        assert_eq!(receipt.forfeited_value, 6);
        assert_eq!(ledger.balance_of("alice", Rank(4)), 1);
        assert_eq!(ledger.balance_of("swap", Rank(4)), 2);
    }

    /// A ledger whose single transfers always fail, to exercise unwinding.
    struct BrokenSettlement(MultiTokenLedger);

    impl TokenLedger for BrokenSettlement {
        fn balance_of(&self, account: &str, rank: Rank) -> Amount {
            self.0.balance_of(account, rank)
        }
        fn is_approved_for_all(&self, holder: &str, operator: &str) -> bool {
            self.0.is_approved_for_all(holder, operator)
        }
        fn transfer(&mut self, _: &str, _: &str, _: &str, _: Rank, _: Amount) -> Result<(), LedgerError> {
            Err(LedgerError::InvalidAddress)
        }
        fn batch_transfer(
            &mut self,
            operator: &str,
            from: &str,
            to: &str,
            legs: &[(Rank, Amount)],
        ) -> Result<(), LedgerError> {
            TokenLedger::batch_transfer(&mut self.0, operator, from, to, legs)
        }
    }

    #[test]
    fn failed_settlement_returns_sources() {
        let (engine, mut inner) = setup();
        inner.set_approval_for_all("alice", "swap", true).unwrap();
        let mut ledger = BrokenSettlement(inner);

        let req = ConversionRequest::new(8).with_source(0, 12);
        let err = engine.convert(&mut ledger, "alice", &req).unwrap_err();
        assert_eq!(err, SwapError::Ledger(LedgerError::InvalidAddress));
        assert_eq!(ledger.0.balance_of("alice", Rank(0)), 12);
        assert_eq!(ledger.0.balance_of("swap", Rank(0)), 0);
        assert_eq!(ledger.0.balance_of("swap", Rank(8)), 1);
    }
}
