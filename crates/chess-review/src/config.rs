//! Review configuration loaded from `review.toml`.
//!
//! Every section is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::critical::DetectorConfig;
use crate::orchestrator::AnalysisSettings;
use crate::quality::{LadderError, LossLadder, MoveClassifier, Rung};
use crate::session::SessionOptions;
use crate::Classification;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<LadderError> for ConfigError {
    fn from(e: LadderError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

/// `[engine]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine executable; looked up on `PATH` when not absolute.
    #[serde(default = "default_engine_path")]
    pub path: PathBuf,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_hash_mb")]
    pub hash_mb: u32,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
}

fn default_engine_path() -> PathBuf {
    PathBuf::from("stockfish")
}

fn default_threads() -> u32 {
    1
}

fn default_hash_mb() -> u32 {
    32
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_search_timeout_ms() -> u64 {
    60_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine_path(),
            threads: default_threads(),
            hash_mb: default_hash_mb(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            search_timeout_ms: default_search_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            threads: self.threads,
            hash_mb: self.hash_mb,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            search_timeout: Duration::from_millis(self.search_timeout_ms),
        }
    }
}

/// `[classification]`: an optional replacement for the default loss ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default)]
    pub ladder: Vec<Rung>,
    /// Label for losses beyond the last rung.
    #[serde(default = "default_above")]
    pub above: Classification,
}

fn default_above() -> Classification {
    Classification::Blunder
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            ladder: Vec::new(),
            above: default_above(),
        }
    }
}

impl ClassificationConfig {
    pub fn classifier(&self) -> Result<MoveClassifier, LadderError> {
        if self.ladder.is_empty() {
            return Ok(MoveClassifier::default());
        }
        Ok(MoveClassifier::new(LossLadder::new(
            self.ladder.clone(),
            self.above,
        )?))
    }
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

fn default_database() -> PathBuf {
    PathBuf::from("reviews.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub critical: DetectorConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ReviewConfig {
    /// Loads [`Self::config_path`], or the defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        PathBuf::from("review.toml")
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.depth == 0 {
            return Err(ConfigError::Invalid("analysis.depth must be at least 1".to_string()));
        }
        if self.analysis.multipv == 0 {
            return Err(ConfigError::Invalid("analysis.multipv must be at least 1".to_string()));
        }
        if self.engine.threads == 0 {
            return Err(ConfigError::Invalid("engine.threads must be at least 1".to_string()));
        }
        if self.engine.search_timeout_ms == 0 || self.engine.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid("engine timeouts must be positive".to_string()));
        }
        self.classification.classifier()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReviewConfig::load_from(dir.path().join("review.toml")).unwrap();
        assert_eq!(config, ReviewConfig::default());
        assert_eq!(config.analysis.depth, 18);
        assert_eq!(config.analysis.multipv, 3);
        assert!(config.analysis.restart_on_crash);
        assert_eq!(config.critical.opening_phase_half_moves, 16);
        assert_eq!(config.engine.path, PathBuf::from("stockfish"));
        assert_eq!(config.storage.database, PathBuf::from("reviews.db"));
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[engine]
path = "/opt/stockfish"
search_timeout_ms = 5000

[analysis]
depth = 12
book_plies = 6

[critical]
positional_loss_threshold = 120
"#
        )
        .unwrap();

        let config = ReviewConfig::load_from(file.path()).unwrap();
        assert_eq!(config.engine.path, PathBuf::from("/opt/stockfish"));
        assert_eq!(config.engine.hash_mb, 32);
        let options = config.engine.session_options();
        assert_eq!(options.search_timeout, Duration::from_secs(5));
        assert_eq!(options.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.analysis.depth, 12);
        assert_eq!(config.analysis.multipv, 3);
        assert_eq!(config.analysis.book_plies, 6);
        assert_eq!(config.critical.opening_phase_half_moves, 16);
        assert_eq!(config.critical.positional_loss_threshold, 120);
    }

    #[test]
    fn custom_ladder() {
        let config: ReviewConfig = toml::from_str(
            r#"
[classification]
above = "mistake"

[[classification.ladder]]
max_loss = 20
label = "best"

[[classification.ladder]]
max_loss = 150
label = "inaccuracy"
"#,
        )
        .unwrap();
        config.validate().unwrap();
        let classifier = config.classification.classifier().unwrap();
        assert_eq!(classifier.ladder().rungs().len(), 2);
        assert_eq!(classifier.ladder().above(), Classification::Mistake);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config: ReviewConfig = toml::from_str("[analysis]\nmultipv = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let unordered: ReviewConfig = toml::from_str(
            r#"
[[classification.ladder]]
max_loss = 50
label = "good"

[[classification.ladder]]
max_loss = 10
label = "best"
"#,
        )
        .unwrap();
        assert!(matches!(unordered.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[engine\npath = 3").unwrap();
        assert!(matches!(
            ReviewConfig::load_from(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
