//! # Multi-Token Ledger
//!
//! The reference ledger for a rank collection. It owns every balance and
//! the delegated-approval registry, and exposes the primitives the swap
//! engine consumes: balance reads, approval reads, and single or batched
//! transfers.
//!
//! ## Atomicity
//!
//! A batch transfer is applied to working copies of the two affected
//! balance sheets and committed only after every leg has succeeded. A
//! failed batch leaves the ledger byte-for-byte unchanged, which
//! [`MultiTokenLedger::state_root`] makes observable.
//!
//! ## Events
//!
//! Events are buffered on the ledger until the next save, when
//! [`LedgerDb`](crate::storage::db::LedgerDb) appends them to its own log
//! and clears the buffer. They are never part of a snapshot, so snapshot
//! size and clone cost track live balances, not history.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::balance::{BalanceError, BalanceSheet};
use super::event::LedgerEvent;
use super::token::{Address, Amount, CollectionInfo, Rank};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Only the collection owner may mint.
    #[error("caller {caller} is not the collection owner")]
    NotOwner {
        /// The account that attempted the privileged call.
        caller: Address,
    },

    /// The operator is neither the holder nor approved by the holder.
    #[error("operator {operator} is not approved to move tokens of {holder}")]
    NotApproved {
        /// The account issuing the transfer.
        operator: Address,
        /// The account whose tokens would move.
        holder: Address,
    },

    /// The source account holds fewer units than the transfer requires.
    #[error("insufficient balance for transfer: {account} holds {available} of {rank}, needs {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: Address,
        /// The rank being debited.
        rank: Rank,
        /// Units held.
        available: Amount,
        /// Units requested.
        requested: Amount,
    },

    /// Crediting would overflow the recipient's balance.
    #[error("balance overflow: crediting {credit} of {rank} to {account}")]
    Overflow {
        /// The account being credited.
        account: Address,
        /// The rank being credited.
        rank: Rank,
        /// Units that could not be added.
        credit: Amount,
    },

    /// Batch inputs of different lengths.
    #[error("length mismatch: {left} ids vs {right} amounts")]
    LengthMismatch {
        /// Length of the first list.
        left: usize,
        /// Length of the second list.
        right: usize,
    },

    /// A holder tried to approve itself as an operator.
    #[error("setting approval status for self: {0}")]
    SelfApproval(Address),

    /// Empty account identifiers are not valid transfer or mint targets.
    #[error("invalid address: account identifiers must be non-empty")]
    InvalidAddress,
}

impl LedgerError {
    /// Attaches the account to a [`BalanceError`].
    fn from_balance(account: &str, err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientBalance {
                rank,
                available,
                requested,
            } => LedgerError::InsufficientBalance {
                account: account.to_string(),
                rank,
                available,
                requested,
            },
            BalanceError::Overflow { rank, credit, .. } => LedgerError::Overflow {
                account: account.to_string(),
                rank,
                credit,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// MultiTokenLedger
// ---------------------------------------------------------------------------

/// In-memory multi-token ledger for one collection.
///
/// Serializable so it can be snapshotted by
/// [`LedgerDb`](crate::storage::db::LedgerDb). Accounts with no holdings
/// are never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTokenLedger {
    owner: Address,
    collection: CollectionInfo,
    accounts: BTreeMap<Address, BalanceSheet>,
    /// `(holder, operator)` pairs with delegated transfer rights.
    approvals: BTreeSet<(Address, Address)>,
    /// Events recorded since the last save.
    #[serde(skip)]
    events: Vec<LedgerEvent>,
}

/// The part of the ledger covered by the state root.
#[derive(Serialize)]
struct CanonicalState<'a> {
    owner: &'a Address,
    collection: &'a CollectionInfo,
    accounts: &'a BTreeMap<Address, BalanceSheet>,
    approvals: &'a BTreeSet<(Address, Address)>,
}

impl MultiTokenLedger {
    /// Creates an empty ledger owned by `owner`.
    pub fn new(owner: impl Into<Address>, collection: CollectionInfo) -> Self {
        Self {
            owner: owner.into(),
            collection,
            accounts: BTreeMap::new(),
            approvals: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    /// The collection owner (sole minter).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Collection display metadata.
    pub fn collection(&self) -> &CollectionInfo {
        &self.collection
    }

    // -- Issuance -----------------------------------------------------------

    /// Issues `amount` new units of `rank` to `to`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotOwner`] if `caller` is not the owner,
    /// [`LedgerError::InvalidAddress`] for an empty recipient,
    /// [`LedgerError::Overflow`] if the recipient's balance would wrap.
    pub fn mint(
        &mut self,
        caller: &str,
        to: &str,
        rank: Rank,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if caller != self.owner {
            return Err(LedgerError::NotOwner {
                caller: caller.to_string(),
            });
        }
        if to.is_empty() {
            return Err(LedgerError::InvalidAddress);
        }

        let mut sheet = self.sheet(to);
        sheet
            .credit(rank, amount)
            .map_err(|e| LedgerError::from_balance(to, e))?;
        self.commit(to, sheet);

        debug!(to, %rank, amount, "minted");
        self.events.push(LedgerEvent::Mint {
            to: to.to_string(),
            rank,
            amount,
            at: Utc::now(),
        });
        Ok(())
    }

    // -- Reads --------------------------------------------------------------

    /// Units of `rank` held by `account`.
    pub fn balance_of(&self, account: &str, rank: Rank) -> Amount {
        self.accounts.get(account).map(|s| s.get(rank)).unwrap_or(0)
    }

    /// Pairwise balances for `accounts[i]` / `ranks[i]`.
    pub fn balance_of_batch(
        &self,
        accounts: &[Address],
        ranks: &[Rank],
    ) -> Result<Vec<Amount>, LedgerError> {
        if accounts.len() != ranks.len() {
            return Err(LedgerError::LengthMismatch {
                left: accounts.len(),
                right: ranks.len(),
            });
        }
        Ok(accounts
            .iter()
            .zip(ranks)
            .map(|(a, r)| self.balance_of(a, *r))
            .collect())
    }

    /// All non-zero balances of `account`, in rank order.
    pub fn holdings(&self, account: &str) -> Vec<(Rank, Amount)> {
        self.accounts
            .get(account)
            .map(|s| s.all_balances())
            .unwrap_or_default()
    }

    /// Number of accounts holding at least one unit.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    // -- Approvals ----------------------------------------------------------

    /// Grants or revokes `operator`'s right to move every token of `holder`.
    pub fn set_approval_for_all(
        &mut self,
        holder: &str,
        operator: &str,
        approved: bool,
    ) -> Result<(), LedgerError> {
        if holder == operator {
            return Err(LedgerError::SelfApproval(holder.to_string()));
        }
        if holder.is_empty() || operator.is_empty() {
            return Err(LedgerError::InvalidAddress);
        }

        let key = (holder.to_string(), operator.to_string());
        if approved {
            self.approvals.insert(key);
        } else {
            self.approvals.remove(&key);
        }

        debug!(holder, operator, approved, "approval updated");
        self.events.push(LedgerEvent::ApprovalForAll {
            holder: holder.to_string(),
            operator: operator.to_string(),
            approved,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Whether `operator` may move every token of `holder`.
    pub fn is_approved_for_all(&self, holder: &str, operator: &str) -> bool {
        self.approvals
            .contains(&(holder.to_string(), operator.to_string()))
    }

    // -- Transfers ----------------------------------------------------------

    /// Moves `amount` units of `rank` from `from` to `to` on behalf of
    /// `operator`.
    pub fn safe_transfer_from(
        &mut self,
        operator: &str,
        from: &str,
        to: &str,
        rank: Rank,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.authorize(operator, from, to)?;
        self.move_units(from, to, &[(rank, amount)])?;

        debug!(operator, from, to, %rank, amount, "transfer");
        self.events.push(LedgerEvent::TransferSingle {
            operator: operator.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            rank,
            amount,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Moves `amounts[i]` units of `ranks[i]` from `from` to `to`, all or
    /// nothing. Repeated ranks accumulate.
    pub fn safe_batch_transfer_from(
        &mut self,
        operator: &str,
        from: &str,
        to: &str,
        ranks: &[Rank],
        amounts: &[Amount],
    ) -> Result<(), LedgerError> {
        if ranks.len() != amounts.len() {
            return Err(LedgerError::LengthMismatch {
                left: ranks.len(),
                right: amounts.len(),
            });
        }
        self.authorize(operator, from, to)?;

        let legs: Vec<(Rank, Amount)> = ranks.iter().copied().zip(amounts.iter().copied()).collect();
        self.move_units(from, to, &legs)?;

        debug!(operator, from, to, legs = legs.len(), "batch transfer");
        self.events.push(LedgerEvent::TransferBatch {
            operator: operator.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            ranks: ranks.to_vec(),
            amounts: amounts.to_vec(),
            at: Utc::now(),
        });
        Ok(())
    }

    // -- Introspection ------------------------------------------------------

    /// Events recorded since the last save, oldest first.
    pub fn pending_events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Drops the buffered events once they have been persisted.
    pub fn clear_pending_events(&mut self) {
        self.events.clear();
    }

    /// BLAKE3 digest of the canonical encoding of balances, approvals and
    /// collection metadata.
    pub fn state_root(&self) -> [u8; 32] {
        let canonical = CanonicalState {
            owner: &self.owner,
            collection: &self.collection,
            accounts: &self.accounts,
            approvals: &self.approvals,
        };
        // Serializing plain maps and strings into a Vec cannot fail.
        let bytes = bincode::serialize(&canonical).unwrap_or_default();
        *blake3::hash(&bytes).as_bytes()
    }

    /// Hex-encoded [`state_root`](Self::state_root).
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root())
    }

    // -- Internals ----------------------------------------------------------

    fn authorize(&self, operator: &str, from: &str, to: &str) -> Result<(), LedgerError> {
        if from.is_empty() || to.is_empty() {
            return Err(LedgerError::InvalidAddress);
        }
        if operator != from && !self.is_approved_for_all(from, operator) {
            return Err(LedgerError::NotApproved {
                operator: operator.to_string(),
                holder: from.to_string(),
            });
        }
        Ok(())
    }

    /// Working copy of an account's sheet.
    fn sheet(&self, account: &str) -> BalanceSheet {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    fn commit(&mut self, account: &str, sheet: BalanceSheet) {
        if sheet.is_empty() {
            self.accounts.remove(account);
        } else {
            self.accounts.insert(account.to_string(), sheet);
        }
    }

    /// Applies every leg to working copies, then commits both sheets.
    fn move_units(
        &mut self,
        from: &str,
        to: &str,
        legs: &[(Rank, Amount)],
    ) -> Result<(), LedgerError> {
        let mut source = self.sheet(from);
        for (rank, amount) in legs {
            source
                .debit(*rank, *amount)
                .map_err(|e| LedgerError::from_balance(from, e))?;
        }

        if from == to {
            for (rank, amount) in legs {
                source
                    .credit(*rank, *amount)
                    .map_err(|e| LedgerError::from_balance(to, e))?;
            }
            self.commit(from, source);
            return Ok(());
        }

        let mut target = self.sheet(to);
        for (rank, amount) in legs {
            target
                .credit(*rank, *amount)
                .map_err(|e| LedgerError::from_balance(to, e))?;
        }

        self.commit(from, source);
        self.commit(to, target);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
