//! Run-scoped artifact cache.
//!
//! Every pipeline stage persists its output under `{run_name}/{stage}`.
//! A later invocation of the same run loads the cached artifact instead
//! of recomputing, which is what makes interrupted runs cheap to resume.
//! Artifacts travel inside a versioned envelope so stale encodings are
//! detected instead of misread.

pub mod persistence;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use persistence::SledArtifactStore;

/// Envelope schema version; bump on any breaking layout change.
pub const ARTIFACT_VERSION: u32 = 1;

/// Raw byte-level store keyed by stage name within one run.
pub trait ArtifactStore: Send + Sync {
    fn put(&self, stage: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn get(&self, stage: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn exists(&self, stage: &str) -> Result<bool, StorageError>;
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    stage: String,
    created_at: String,
    payload: T,
}

/// Persist a typed stage artifact.
pub fn save_stage<T: Serialize>(
    store: &dyn ArtifactStore,
    stage: &str,
    payload: &T,
) -> Result<(), StorageError> {
    let envelope = Envelope {
        version: ARTIFACT_VERSION,
        stage: stage.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        payload,
    };
    let bytes = bincode::serialize(&envelope).map_err(|e| StorageError::Codec(e.to_string()))?;
    store.put(stage, &bytes)
}

/// Load a typed stage artifact, if present and current.
pub fn load_stage<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    stage: &str,
) -> Result<Option<T>, StorageError> {
    let Some(bytes) = store.get(stage)? else {
        return Ok(None);
    };
    // An undecodable artifact is a cache miss, not a fatal error: the
    // stage recomputes and overwrites it.
    let envelope: Envelope<T> = match bincode::deserialize(&bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(stage, error = %e, "discarding undecodable artifact");
            return Ok(None);
        }
    };
    if envelope.version != ARTIFACT_VERSION {
        tracing::warn!(
            stage,
            found = envelope.version,
            expected = ARTIFACT_VERSION,
            "ignoring artifact with stale version"
        );
        return Ok(None);
    }
    Ok(Some(envelope.payload))
}
