//! # LedgerDb: Persistent Storage Engine
//!
//! Persists ledger snapshots, the ledger event log and deployment metadata
//! on top of sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key              | Value                        |
//! |------------|------------------|------------------------------|
//! | `ledger`   | `snapshot`       | `bincode(MultiTokenLedger)`  |
//! | `ledger`   | `state_root`     | 32-byte BLAKE3 state root    |
//! | `events`   | `seq` (u64 BE)   | `bincode(LedgerEvent)`       |
//! | `metadata` | key (UTF-8)      | value (bytes)                |
//!
//! ## Atomicity
//!
//! The snapshot, its state root and the events recorded since the last
//! save are written in one transaction across the `ledger` and `events`
//! trees, so a crash never leaves a root that does not match the stored
//! snapshot or a log that runs ahead of it. The snapshot holds current
//! state only; history lives in `events`, append-only.

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;

use crate::ledger::{LedgerEvent, MultiTokenLedger};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("state root mismatch: stored {stored}, computed {computed}")]
    Corrupted { stored: String, computed: String },
}

pub type DbResult<T> = Result<T, DbError>;

const KEY_SNAPSHOT: &[u8] = b"snapshot";
const KEY_STATE_ROOT: &[u8] = b"state_root";

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent store for one deployment's ledger.
///
/// Cheap to clone; sled handles are reference counted and safe to share
/// across threads.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    ledger: Tree,
    events: Tree,
    metadata: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let ledger = db.open_tree("ledger")?;
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            ledger,
            events,
            metadata,
        })
    }

    // -- Ledger snapshots ---------------------------------------------------

    /// Persist a ledger snapshot with its state root, and append the
    /// ledger's pending events to the log.
    ///
    /// The pending events are cleared only once the write has committed.
    pub fn save_ledger(&self, ledger: &mut MultiTokenLedger) -> DbResult<()> {
        let bytes =
            bincode::serialize(&*ledger).map_err(|e| DbError::Serialization(e.to_string()))?;
        let root = ledger.state_root();

        let first_seq = self.next_event_seq()?;
        let encoded = ledger
            .pending_events()
            .iter()
            .map(|event| bincode::serialize(event).map_err(|e| DbError::Serialization(e.to_string())))
            .collect::<DbResult<Vec<Vec<u8>>>>()?;

        (&self.ledger, &self.events)
            .transaction(|(ledger_tx, events_tx)| {
                ledger_tx.insert(KEY_SNAPSHOT, bytes.as_slice())?;
                ledger_tx.insert(KEY_STATE_ROOT, &root[..])?;
                for (seq, event) in (first_seq..).zip(&encoded) {
                    events_tx.insert(&seq.to_be_bytes()[..], event.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => DbError::Sled(e),
                TransactionError::Abort(()) => DbError::Serialization("ledger save aborted".into()),
            })?;
        self.db.flush()?;

        tracing::debug!(
            state_root = %hex::encode(root),
            events = encoded.len(),
            "ledger snapshot saved"
        );
        ledger.clear_pending_events();
        Ok(())
    }

    /// Load the last saved ledger snapshot, or `None` if nothing was saved.
    ///
    /// The stored state root is checked against the decoded ledger.
    pub fn load_ledger(&self) -> DbResult<Option<MultiTokenLedger>> {
        let bytes = match self.ledger.get(KEY_SNAPSHOT)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let ledger: MultiTokenLedger =
            bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;

        let stored = self
            .ledger
            .get(KEY_STATE_ROOT)?
            .ok_or_else(|| DbError::NotFound("state_root".into()))?;
        let computed = ledger.state_root();
        if stored[..] != computed[..] {
            return Err(DbError::Corrupted {
                stored: hex::encode(&stored),
                computed: hex::encode(computed),
            });
        }

        Ok(Some(ledger))
    }

    /// The state root of the last saved snapshot.
    pub fn stored_state_root(&self) -> DbResult<Option<[u8; 32]>> {
        match self.ledger.get(KEY_STATE_ROOT)? {
            Some(bytes) => {
                let root: [u8; 32] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Serialization("invalid state root length".into()))?;
                Ok(Some(root))
            }
            None => Ok(None),
        }
    }

    // -- Event log ----------------------------------------------------------

    /// Number of events in the log.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Every logged event, oldest first.
    pub fn events(&self) -> DbResult<Vec<LedgerEvent>> {
        self.events
            .iter()
            .values()
            .map(|value| {
                let bytes = value?;
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))
            })
            .collect()
    }

    /// Size in bytes of the stored snapshot, if any.
    pub fn snapshot_size(&self) -> DbResult<Option<usize>> {
        Ok(self.ledger.get(KEY_SNAPSHOT)?.map(|bytes| bytes.len()))
    }

    fn next_event_seq(&self) -> DbResult<u64> {
        match self.events.last()? {
            Some((key, _)) => {
                let seq: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Serialization("invalid event key length".into()))?;
                Ok(u64::from_be_bytes(seq) + 1)
            }
            None => Ok(0),
        }
    }

    // -- Metadata -----------------------------------------------------------

    /// Store an arbitrary metadata value.
    pub fn put_metadata(&self, key: &str, value: &[u8]) -> DbResult<()> {
        self.metadata.insert(key.as_bytes(), value)?;
        Ok(())
    }

    /// Read a metadata value.
    pub fn get_metadata(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CollectionInfo, Rank};

    fn sample_ledger() -> MultiTokenLedger {
        let mut l = MultiTokenLedger::new("owner", CollectionInfo::default());
        l.mint("owner", "alice", Rank(0), 12).unwrap();
        l.mint("owner", "swap", Rank(8), 1).unwrap();
        l.set_approval_for_all("alice", "swap", true).unwrap();
        l
    }

    #[test]
    fn empty_database_has_no_ledger() {
        let db = LedgerDb::open_temporary().unwrap();
        assert!(db.load_ledger().unwrap().is_none());
        assert!(db.stored_state_root().unwrap().is_none());
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut ledger = sample_ledger();
        db.save_ledger(&mut ledger).unwrap();

        let loaded = db.load_ledger().unwrap().expect("snapshot present");
        assert_eq!(loaded.state_root(), ledger.state_root());
        assert_eq!(loaded.balance_of("alice", Rank(0)), 12);
        assert!(loaded.is_approved_for_all("alice", "swap"));
        assert!(loaded.pending_events().is_empty());
        assert_eq!(db.stored_state_root().unwrap(), Some(ledger.state_root()));
    }

    #[test]
    fn later_snapshot_replaces_earlier_one() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut ledger = sample_ledger();
        db.save_ledger(&mut ledger).unwrap();

        ledger
            .safe_transfer_from("swap", "alice", "swap", Rank(0), 12)
            .unwrap();
        db.save_ledger(&mut ledger).unwrap();

        let loaded = db.load_ledger().unwrap().unwrap();
        assert_eq!(loaded.balance_of("alice", Rank(0)), 0);
        assert_eq!(loaded.balance_of("swap", Rank(0)), 12);
    }

    #[test]
    fn persistent_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = {
            let db = LedgerDb::open(dir.path()).unwrap();
            let mut ledger = sample_ledger();
            db.save_ledger(&mut ledger).unwrap();
            ledger.state_root()
        };

        let db = LedgerDb::open(dir.path()).unwrap();
        let loaded = db.load_ledger().unwrap().unwrap();
        assert_eq!(loaded.state_root(), root);
        assert_eq!(db.event_count(), 3);
    }

    #[test]
    fn saves_append_pending_events_in_order() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut ledger = sample_ledger();
        db.save_ledger(&mut ledger).unwrap();
        assert!(ledger.pending_events().is_empty());

        ledger
            .safe_transfer_from("swap", "alice", "swap", Rank(0), 12)
            .unwrap();
        db.save_ledger(&mut ledger).unwrap();

        let kinds: Vec<&str> = db.events().unwrap().iter().map(LedgerEvent::kind).collect();
        assert_eq!(kinds, vec!["mint", "mint", "approval_for_all", "transfer_single"]);

        // Nothing pending: the log is left alone.
        db.save_ledger(&mut ledger).unwrap();
        assert_eq!(db.event_count(), 4);
    }

    #[test]
    fn snapshot_size_does_not_grow_with_history() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut ledger = sample_ledger();
        db.save_ledger(&mut ledger).unwrap();
        let size = db.snapshot_size().unwrap().expect("snapshot present");

        for _ in 0..100 {
            ledger.set_approval_for_all("alice", "swap", false).unwrap();
            db.save_ledger(&mut ledger).unwrap();
            ledger.set_approval_for_all("alice", "swap", true).unwrap();
            db.save_ledger(&mut ledger).unwrap();
        }

        assert_eq!(db.snapshot_size().unwrap(), Some(size));
        assert_eq!(db.event_count(), 203);
    }

    #[test]
    fn metadata_roundtrip() {
        let db = LedgerDb::open_temporary().unwrap();
        assert!(db.get_metadata("deployment").unwrap().is_none());
        db.put_metadata("deployment", b"{}").unwrap();
        assert_eq!(db.get_metadata("deployment").unwrap(), Some(b"{}".to_vec()));
    }
}
