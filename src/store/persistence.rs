//! Sled-backed artifact store.

use std::path::Path;

use sled::Db;
use tracing::debug;

use crate::error::StorageError;

use super::ArtifactStore;

/// Artifact store for one run, keyed `{run_name}/{stage}` inside a shared
/// sled database. Different runs share the database file but never each
/// other's artifacts.
pub struct SledArtifactStore {
    db: Db,
    run_name: String,
}

impl SledArtifactStore {
    pub fn open(path: &Path, run_name: &str) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        debug!(path = %path.display(), run_name, "opened artifact store");
        Ok(Self {
            db,
            run_name: run_name.to_string(),
        })
    }

    fn key(&self, stage: &str) -> String {
        format!("{}/{}", self.run_name, stage)
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Drop every artifact belonging to this run.
    pub fn clear_run(&self) -> Result<(), StorageError> {
        let prefix = format!("{}/", self.run_name);
        let keys: Vec<_> = self
            .db
            .scan_prefix(prefix.as_bytes())
            .keys()
            .collect::<Result<_, _>>()?;
        for key in keys {
            self.db.remove(key)?;
        }
        self.db.flush()?;
        Ok(())
    }
}

impl ArtifactStore for SledArtifactStore {
    fn put(&self, stage: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.db.insert(self.key(stage).as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn get(&self, stage: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .db
            .get(self.key(stage).as_bytes())?
            .map(|ivec| ivec.to_vec()))
    }

    fn exists(&self, stage: &str) -> Result<bool, StorageError> {
        Ok(self.db.contains_key(self.key(stage).as_bytes())?)
    }
}
