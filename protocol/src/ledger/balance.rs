//! # Per-Account Balances
//!
//! A [`BalanceSheet`] holds every rank balance of a single account and
//! enforces the two rules that keep the books straight: you can never
//! spend more than you hold, and a credit can never wrap around `u64`.
//!
//! Balances live in a `BTreeMap` so that the canonical encoding of a
//! sheet (and therefore the ledger's state root) is independent of
//! insertion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::token::{Amount, Rank};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during balance operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// Attempted to debit more than the available balance.
    #[error("insufficient balance: available {available}, requested {requested} ({rank})")]
    InsufficientBalance {
        /// The rank that was being debited.
        rank: Rank,
        /// The current balance.
        available: Amount,
        /// The amount that was requested.
        requested: Amount,
    },

    /// Arithmetic overflow during a credit operation.
    #[error("balance overflow: current {current}, credit {credit} ({rank})")]
    Overflow {
        /// The rank that was being credited.
        rank: Rank,
        /// The balance before the failed credit.
        current: Amount,
        /// The amount that caused the overflow.
        credit: Amount,
    },
}

// ---------------------------------------------------------------------------
// BalanceSheet
// ---------------------------------------------------------------------------

/// The complete set of rank balances for a single account.
///
/// Zero balances are pruned on debit so that two sheets holding the same
/// amounts always encode to the same bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    balances: BTreeMap<Rank, Amount>,
}

impl BalanceSheet {
    /// Creates an empty balance sheet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` units of `rank`, returning the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::Overflow`] if the credit would exceed `u64::MAX`.
    pub fn credit(&mut self, rank: Rank, amount: Amount) -> Result<Amount, BalanceError> {
        let current = self.get(rank);
        let updated = current
            .checked_add(amount)
            .ok_or(BalanceError::Overflow {
                rank,
                current,
                credit: amount,
            })?;

        if updated > 0 {
            self.balances.insert(rank, updated);
        }
        Ok(updated)
    }

    /// Removes `amount` units of `rank`, returning the remaining balance.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::InsufficientBalance`] if the sheet holds
    /// fewer than `amount` units. The sheet is left untouched.
    pub fn debit(&mut self, rank: Rank, amount: Amount) -> Result<Amount, BalanceError> {
        let available = self.get(rank);
        if available < amount {
            return Err(BalanceError::InsufficientBalance {
                rank,
                available,
                requested: amount,
            });
        }

        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(&rank);
        } else {
            self.balances.insert(rank, remaining);
        }
        Ok(remaining)
    }

    /// Returns the balance for `rank`, zero if never credited.
    pub fn get(&self, rank: Rank) -> Amount {
        self.balances.get(&rank).copied().unwrap_or(0)
    }

    /// Returns all non-zero balances in rank order.
    pub fn all_balances(&self) -> Vec<(Rank, Amount)> {
        self.balances.iter().map(|(r, a)| (*r, *a)).collect()
    }

    /// Number of ranks with a non-zero balance.
    pub fn rank_count(&self) -> usize {
        self.balances.len()
    }

    /// Returns `true` if the account holds nothing.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
