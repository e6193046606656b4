//! # Ledger Capabilities
//!
//! The swap engine never touches ledger storage directly. It sees the
//! ledger only through [`TokenLedger`]: two reads and two moves.
//!
//! Implementations must make [`TokenLedger::batch_transfer`] atomic. The
//! engine additionally pre-checks every source balance before moving
//! anything, so a non-atomic ledger still cannot observe a partial batch
//! caused by an ordinary shortfall.

use gacha_protocol::ledger::{Amount, LedgerError, MultiTokenLedger, Rank};

/// The capability set the swap engine consumes.
pub trait TokenLedger {
    /// Units of `rank` currently held by `account`.
    fn balance_of(&self, account: &str, rank: Rank) -> Amount;

    /// Whether `holder` has delegated transfer rights to `operator`.
    fn is_approved_for_all(&self, holder: &str, operator: &str) -> bool;

    /// Moves `amount` units of `rank` from `from` to `to` on behalf of `operator`.
    fn transfer(
        &mut self,
        operator: &str,
        from: &str,
        to: &str,
        rank: Rank,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Moves every `(rank, amount)` leg from `from` to `to`, all or nothing.
    fn batch_transfer(
        &mut self,
        operator: &str,
        from: &str,
        to: &str,
        legs: &[(Rank, Amount)],
    ) -> Result<(), LedgerError>;
}

impl TokenLedger for MultiTokenLedger {
    fn balance_of(&self, account: &str, rank: Rank) -> Amount {
        MultiTokenLedger::balance_of(self, account, rank)
    }

    fn is_approved_for_all(&self, holder: &str, operator: &str) -> bool {
        MultiTokenLedger::is_approved_for_all(self, holder, operator)
    }

    fn transfer(
        &mut self,
        operator: &str,
        from: &str,
        to: &str,
        rank: Rank,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.safe_transfer_from(operator, from, to, rank, amount)
    }

    fn batch_transfer(
        &mut self,
        operator: &str,
        from: &str,
        to: &str,
        legs: &[(Rank, Amount)],
    ) -> Result<(), LedgerError> {
        let (ranks, amounts): (Vec<Rank>, Vec<Amount>) = legs.iter().copied().unzip();
        self.safe_batch_transfer_from(operator, from, to, &ranks, &amounts)
    }
}
