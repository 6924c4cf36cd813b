//! Pipeline configuration.
//!
//! Settings load from an optional TOML file with `MINDMELD_*` environment
//! overrides layered on top (e.g. `MINDMELD_PROVIDER__MODEL=llama3`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::segment::IdScope;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Input document. Usually supplied on the command line instead.
    pub input: Option<PathBuf>,
    /// Directory receiving exported mindmaps and the artifact database.
    pub output_dir: PathBuf,
    /// Run name; defaults to the input file stem.
    pub run_name: Option<String>,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input: None,
            output_dir: PathBuf::from("output"),
            run_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub id_scope: IdScope,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            overlap_tokens: 200,
            id_scope: IdScope::Content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum concurrent service calls.
    pub max_workers: usize,
    /// Retry budget per service call.
    pub max_attempts: u32,
    /// Minimum spacing between outbound calls, in milliseconds.
    pub min_spacing_ms: u64,
    /// Fixed mapping batch size; unset uses the adaptive heuristic.
    pub map_batch_size: Option<usize>,
    /// Explicit cluster count; unset picks one by silhouette score.
    pub cluster_count: Option<usize>,
    /// Generate and map question/answer pairs.
    pub qa: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            max_attempts: 4,
            min_spacing_ms: 150,
            map_batch_size: None,
            cluster_count: None,
            qa: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OpenAI-compatible base URL including the version segment.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `mindmeld=debug`.
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MindmeldConfig {
    pub io: IoConfig,
    pub chunk: ChunkConfig,
    pub runtime: RuntimeConfig,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

impl MindmeldConfig {
    /// Load configuration from an optional file plus environment
    /// overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("MINDMELD")
                .separator("__")
                .try_parsing(true),
        );
        let config: MindmeldConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk.max_tokens == 0 {
            return Err(PipelineError::Config("chunk.max_tokens must be > 0".into()));
        }
        if self.chunk.overlap_tokens >= self.chunk.max_tokens {
            return Err(PipelineError::Config(
                "chunk.overlap_tokens must be smaller than chunk.max_tokens".into(),
            ));
        }
        if self.runtime.max_workers == 0 {
            return Err(PipelineError::Config("runtime.max_workers must be > 0".into()));
        }
        if self.runtime.max_attempts == 0 {
            return Err(PipelineError::Config(
                "runtime.max_attempts must be > 0".into(),
            ));
        }
        if self.provider.endpoint.is_empty() {
            return Err(PipelineError::Config("provider.endpoint is required".into()));
        }
        if self.provider.model.is_empty() {
            return Err(PipelineError::Config("provider.model is required".into()));
        }
        if let Some(k) = self.runtime.cluster_count {
            if k == 0 {
                return Err(PipelineError::Config(
                    "runtime.cluster_count must be > 0 when set".into(),
                ));
            }
        }
        Ok(())
    }

    /// Effective run name: explicit override, else the input file stem,
    /// else "run".
    pub fn run_name(&self, input: Option<&Path>) -> String {
        if let Some(name) = &self.io.run_name {
            return name.clone();
        }
        input
            .or(self.io.input.as_deref())
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string())
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.runtime.min_spacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        MindmeldConfig::default().validate().unwrap();
    }

    #[test]
    fn test_overlap_must_be_below_budget() {
        let mut cfg = MindmeldConfig::default();
        cfg.chunk.overlap_tokens = cfg.chunk.max_tokens;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut cfg = MindmeldConfig::default();
        cfg.runtime.max_workers = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_run_name_from_input_stem() {
        let cfg = MindmeldConfig::default();
        assert_eq!(cfg.run_name(Some(Path::new("docs/guide.md"))), "guide");
        assert_eq!(cfg.run_name(None), "run");

        let mut named = MindmeldConfig::default();
        named.io.run_name = Some("custom".into());
        assert_eq!(named.run_name(Some(Path::new("x.md"))), "custom");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mindmeld.toml");
        std::fs::write(
            &path,
            "[chunk]\nmax_tokens = 800\noverlap_tokens = 80\n\n[provider]\nmodel = \"test-model\"\n",
        )
        .unwrap();
        let cfg = MindmeldConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.chunk.max_tokens, 800);
        assert_eq!(cfg.chunk.overlap_tokens, 80);
        assert_eq!(cfg.provider.model, "test-model");
        // Untouched sections keep defaults.
        assert_eq!(cfg.runtime.max_workers, 8);
    }
}
