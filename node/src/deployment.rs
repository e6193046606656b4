//! # Deployment
//!
//! A deployment is one collection plus one swap engine, described by
//! `deployment.json` in the data directory and backed by a sled database
//! under `db/`:
//!
//! ```text
//! <data-dir>/
//! ├── deployment.json   collection, owner, reserve, operator, value table
//! └── db/               LedgerDb (ledger snapshot + metadata)
//! ```
//!
//! Weights are stored as signed integers and re-validated on every load, so
//! a hand-edited zero or negative weight stops the node before it serves.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use gacha_contracts::{SwapEngine, ValueTable};
use gacha_protocol::config::{DEFAULT_RANK_COUNT, DEFAULT_SWAP_ADDRESS};
use gacha_protocol::ledger::{Address, Amount, CollectionInfo, LedgerError, MultiTokenLedger, Rank};
use gacha_protocol::storage::LedgerDb;

const DEPLOYMENT_FILE: &str = "deployment.json";
const DB_DIR: &str = "db";
const META_INITIALIZED_AT: &str = "initialized_at";

/// Static description of a deployment. Never changes after `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub collection: CollectionInfo,
    /// Sole minter of the collection.
    pub owner: Address,
    /// Account that pays out destinations and absorbs sources.
    pub reserve: Address,
    /// Address holders approve so the engine may move their tokens.
    pub operator: Address,
    pub value_table: ValueTable,
}

impl Deployment {
    /// The reference deployment: default collection and weights, with the
    /// swap account acting as both reserve and operator.
    pub fn with_owner(owner: impl Into<Address>) -> Self {
        Self {
            collection: CollectionInfo::default(),
            owner: owner.into(),
            reserve: DEFAULT_SWAP_ADDRESS.to_string(),
            operator: DEFAULT_SWAP_ADDRESS.to_string(),
            value_table: ValueTable::gacha_default(),
        }
    }

    /// Builds the engine this deployment describes.
    pub fn engine(&self) -> SwapEngine {
        SwapEngine::new(
            self.value_table.clone(),
            self.reserve.clone(),
            self.operator.clone(),
        )
    }

    /// Reads and validates `deployment.json`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read deployment file {}", path.display()))?;
        let deployment: Deployment = serde_json::from_str(&raw)
            .with_context(|| format!("invalid deployment file {}", path.display()))?;
        if deployment.owner.is_empty() || deployment.reserve.is_empty() || deployment.operator.is_empty() {
            bail!("deployment addresses must not be empty");
        }
        Ok(deployment)
    }

    /// Writes `deployment.json` as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write deployment file {}", path.display()))
    }

    /// Builds the initial ledger: the owner mints `holder_stock +
    /// reserve_stock` of every rank, then moves `reserve_stock` of each to
    /// the reserve. Ranks `0..DEFAULT_RANK_COUNT` are always minted, along
    /// with any configured rank outside that range.
    pub fn seed_ledger(
        &self,
        holder_stock: Amount,
        reserve_stock: Amount,
    ) -> Result<MultiTokenLedger, LedgerError> {
        let total = holder_stock
            .checked_add(reserve_stock)
            .ok_or_else(|| LedgerError::Overflow {
                account: self.owner.clone(),
                rank: Rank(0),
                credit: reserve_stock,
            })?;

        let ranks: BTreeSet<Rank> = (0..DEFAULT_RANK_COUNT)
            .map(Rank)
            .chain(self.value_table.ranks())
            .collect();

        let mut ledger = MultiTokenLedger::new(self.owner.clone(), self.collection.clone());
        for rank in ranks {
            if total > 0 {
                ledger.mint(&self.owner, &self.owner, rank, total)?;
            }
            if reserve_stock > 0 && self.reserve != self.owner {
                ledger.safe_transfer_from(&self.owner, &self.owner, &self.reserve, rank, reserve_stock)?;
            }
        }
        if self.reserve != self.operator {
            ledger.set_approval_for_all(&self.reserve, &self.operator, true)?;
        }
        Ok(ledger)
    }
}

/// An opened data directory: the deployment, its engine, the store and the
/// current ledger.
pub struct NodeContext {
    pub deployment: Deployment,
    pub engine: SwapEngine,
    pub db: LedgerDb,
    pub ledger: MultiTokenLedger,
}

impl NodeContext {
    /// Creates a fresh deployment under `data_dir`.
    ///
    /// Refuses to overwrite an existing `deployment.json` unless `force`.
    pub fn init(
        data_dir: &Path,
        deployment: Deployment,
        holder_stock: Amount,
        reserve_stock: Amount,
        force: bool,
    ) -> Result<Self> {
        let deployment_path = data_dir.join(DEPLOYMENT_FILE);
        if deployment_path.exists() && !force {
            bail!(
                "{} already exists; pass --force to overwrite",
                deployment_path.display()
            );
        }
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let mut ledger = deployment
            .seed_ledger(holder_stock, reserve_stock)
            .context("failed to seed ledger")?;
        deployment.save(&deployment_path)?;

        let db = open_db(data_dir)?;
        db.save_ledger(&mut ledger).context("failed to persist seeded ledger")?;
        db.put_metadata(META_INITIALIZED_AT, chrono::Utc::now().to_rfc3339().as_bytes())?;

        tracing::info!(
            data_dir = %data_dir.display(),
            owner = %deployment.owner,
            reserve = %deployment.reserve,
            state_root = %ledger.state_root_hex(),
            "deployment initialized"
        );

        Ok(Self {
            engine: deployment.engine(),
            deployment,
            db,
            ledger,
        })
    }

    /// Opens an initialized data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let deployment = Deployment::load(&data_dir.join(DEPLOYMENT_FILE))
            .context("data directory is not initialized; run `gacha-node init`")?;
        let db = open_db(data_dir)?;
        let ledger = db
            .load_ledger()
            .context("failed to load ledger snapshot")?
            .with_context(|| format!("no ledger snapshot in {}", db_path(data_dir).display()))?;

        tracing::debug!(
            accounts = ledger.account_count(),
            state_root = %ledger.state_root_hex(),
            "ledger loaded"
        );

        Ok(Self {
            engine: deployment.engine(),
            deployment,
            db,
            ledger,
        })
    }

    /// Persists the current ledger and its pending events.
    pub fn persist(&mut self) -> Result<()> {
        self.db
            .save_ledger(&mut self.ledger)
            .context("failed to persist ledger")
    }

    /// When `init` ran, if recorded.
    pub fn initialized_at(&self) -> Option<String> {
        self.db
            .get_metadata(META_INITIALIZED_AT)
            .ok()
            .flatten()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }
}

fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_DIR)
}

fn open_db(data_dir: &Path) -> Result<LedgerDb> {
    let path = db_path(data_dir);
    LedgerDb::open(&path).with_context(|| format!("failed to open database at {}", path.display()))
}
