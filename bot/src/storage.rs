//! Durable key-value state for the local-ledger and pending-payout
//! policies.
//!
//! One JSON document holds the pool balance, a last-update timestamp
//! and the per-user pending payouts. Writes go through a temp file and
//! rename, and every read-modify-write is an optimistic compare-and-set
//! on the document version so concurrent writers cannot silently lose
//! updates.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    /// Monotonic write counter used for conflict detection.
    pub version: u64,
    pub pool_balance: u64,
    pub updated_at: DateTime<Utc>,
    /// user id -> pending payout in smallest units.
    #[serde(default)]
    pub pending_payouts: BTreeMap<String, u64>,
}

impl Default for StateDocument {
    fn default() -> Self {
        StateDocument {
            version: 0,
            pool_balance: 0,
            updated_at: Utc::now(),
            pending_payouts: BTreeMap::new(),
        }
    }
}

pub struct StateStore {
    path: PathBuf,
}

const MAX_CONFLICT_RETRIES: u32 = 5;

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        StateStore { path: path.into() }
    }

    /// Load the document; a missing file is an empty default, not an
    /// error.
    pub fn load(&self) -> Result<StateDocument> {
        if !self.path.exists() {
            return Ok(StateDocument::default());
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read state file: {}", self.path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse state file: {}", self.path.display()))
    }

    fn write(&self, doc: &StateDocument) -> Result<()> {
        let data = serde_json::to_string_pretty(doc).context("failed to encode state document")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)
            .with_context(|| format!("failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace state file: {}", self.path.display()))?;
        Ok(())
    }

    /// Read-modify-write under optimistic concurrency: if the on-disk
    /// version moved between the read and the write, the mutation is
    /// re-run against fresh state.
    pub fn update<T, E, F>(&self, mut mutate: F) -> Result<T, E>
    where
        F: FnMut(&mut StateDocument) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut doc = self.load()?;
            let expected = doc.version;
            let out = mutate(&mut doc)?;
            let current = self.load()?.version;
            if current != expected {
                log::debug!(
                    "state version moved ({expected} -> {current}), retrying update"
                );
                continue;
            }
            doc.version = expected + 1;
            doc.updated_at = Utc::now();
            self.write(&doc)?;
            return Ok(out);
        }
        Err(anyhow::anyhow!(
            "state update conflicted {MAX_CONFLICT_RETRIES} times: {}",
            self.path.display()
        )
        .into())
    }
}
