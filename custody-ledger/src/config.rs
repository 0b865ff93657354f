//! Configuration for a collection run

use crate::digest::{DigestAlgorithm, DigestEngine, DEFAULT_CHUNK_SIZE};
use crate::system::{current_operator, SystemInfo};
use crate::types::SessionMetadata;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the journal inside `output_dir`
pub const JOURNAL_FILE_NAME: &str = "chain_of_custody.jsonl";

/// Collection run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Evidence output directory
    pub output_dir: PathBuf,

    /// Fixed case identifier (a fresh UUIDv7 is used when absent)
    pub case_id: Option<String>,

    /// Digest configuration
    pub digest: DigestConfig,

    /// Journal configuration
    pub journal: JournalConfig,

    /// Collector scheduling
    pub collection: CollectionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./evidence"),
            case_id: None,
            digest: DigestConfig::default(),
            journal: JournalConfig::default(),
            collection: CollectionConfig::default(),
        }
    }
}

/// Digest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Algorithms computed for every artifact
    pub algorithms: Vec<DigestAlgorithm>,

    /// Streaming read buffer (bytes)
    pub chunk_size: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            algorithms: DigestAlgorithm::ALL.to_vec(),
            chunk_size: DEFAULT_CHUNK_SIZE, // 64 KiB
        }
    }
}

/// Journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Persist the ledger to disk
    pub enabled: bool,

    /// Explicit journal path (defaults to `output_dir/chain_of_custody.jsonl`)
    pub path: Option<PathBuf>,

    /// fsync after every record
    pub sync_on_append: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            sync_on_append: true,
        }
    }
}

/// Collector scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Collectors allowed to run at once
    pub max_concurrent_collectors: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_collectors: 4,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `CUSTODY_*` environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let mut config = Config::default();

        if let Some(dir) = lookup("CUSTODY_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(case_id) = lookup("CUSTODY_CASE_ID") {
            config.case_id = Some(case_id);
        }

        if let Some(list) = lookup("CUSTODY_DIGEST_ALGORITHMS") {
            config.digest.algorithms = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<DigestAlgorithm>)
                .collect::<crate::Result<Vec<_>>>()?;
        }

        if let Some(size) = lookup("CUSTODY_CHUNK_SIZE") {
            config.digest.chunk_size = parse_var("CUSTODY_CHUNK_SIZE", &size)?;
        }

        if let Some(path) = lookup("CUSTODY_JOURNAL_PATH") {
            config.journal.path = Some(PathBuf::from(path));
        }

        if let Some(enabled) = lookup("CUSTODY_JOURNAL_ENABLED") {
            config.journal.enabled = parse_var("CUSTODY_JOURNAL_ENABLED", &enabled)?;
        }

        if let Some(sync) = lookup("CUSTODY_JOURNAL_SYNC") {
            config.journal.sync_on_append = parse_var("CUSTODY_JOURNAL_SYNC", &sync)?;
        }

        if let Some(max) = lookup("CUSTODY_MAX_COLLECTORS") {
            config.collection.max_concurrent_collectors = parse_var("CUSTODY_MAX_COLLECTORS", &max)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.digest.algorithms.is_empty() {
            return Err(crate::Error::Config("digest.algorithms is empty".to_string()));
        }
        if self.digest.chunk_size == 0 {
            return Err(crate::Error::Config("digest.chunk_size must be positive".to_string()));
        }
        if self.collection.max_concurrent_collectors == 0 {
            return Err(crate::Error::Config(
                "collection.max_concurrent_collectors must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Where the journal is written
    pub fn journal_path(&self) -> PathBuf {
        self.journal
            .path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(JOURNAL_FILE_NAME))
    }

    /// Digest engine for this run
    pub fn digest_engine(&self) -> crate::Result<DigestEngine> {
        Ok(DigestEngine::new(self.digest.algorithms.iter().copied())?
            .with_chunk_size(self.digest.chunk_size))
    }

    /// Configured case id, or a fresh one
    pub fn case_id_or_generate(&self) -> String {
        self.case_id
            .clone()
            .unwrap_or_else(|| crate::crypto::generate_uuid_v7().to_string())
    }

    /// SESSION_OPEN metadata for a run on this host by the current user
    pub fn session_metadata(&self) -> SessionMetadata {
        SessionMetadata::new(
            self.case_id_or_generate(),
            current_operator(),
            SystemInfo::capture(),
        )
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("{}={:?}: {}", key, value, e)))
}
