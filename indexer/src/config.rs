use crate::error::{IndexerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use trove_index::{MAX_BUCKET_DEFAULT, MAX_INDEX_FILE_SIZE, MIN_BUCKET_DEFAULT, ScanErrorPolicy};

/// Configuration for the indexing engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Directory holding the word indices and the metadata store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Modules queued by a full run, in order
    #[serde(default = "default_index_modules")]
    pub index_modules: Vec<String>,

    /// Delay between a posting being buffered and the flush that persists it
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Smallest bucket count exponent of a flushed segment
    #[serde(default = "default_min_bucket")]
    pub min_bucket: u32,

    /// Largest bucket count exponent of a flushed segment
    #[serde(default = "default_max_bucket")]
    pub max_bucket: u32,

    /// Size in bytes past which indexing halts
    #[serde(default = "default_max_index_file_size")]
    pub max_index_file_size: u64,

    /// Shortest term kept from a filtered field
    #[serde(default = "default_min_word_length")]
    pub min_word_length: usize,

    /// Longest term kept from a filtered field
    #[serde(default = "default_max_word_length")]
    pub max_word_length: usize,

    /// Block index promotion when the data directory cannot be scanned
    #[serde(default)]
    pub fail_closed_on_scan_error: bool,

    /// Settings of the built-in `files` module
    #[serde(default)]
    pub files: FilesModuleConfig,
}

/// Configuration for the built-in `files` module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesModuleConfig {
    /// Directories crawled by a full run
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    /// Directories never descended into
    #[serde(default)]
    pub ignored_directories: Vec<PathBuf>,

    /// Upper bound on the text read from one file
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: u64,
}

fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trove")
}

fn default_index_modules() -> Vec<String> {
    vec!["files".to_string()]
}

fn default_flush_interval_secs() -> u64 {
    10
}

fn default_min_bucket() -> u32 {
    MIN_BUCKET_DEFAULT
}

fn default_max_bucket() -> u32 {
    MAX_BUCKET_DEFAULT
}

fn default_max_index_file_size() -> u64 {
    MAX_INDEX_FILE_SIZE
}

fn default_min_word_length() -> usize {
    3
}

fn default_max_word_length() -> usize {
    30
}

fn default_roots() -> Vec<PathBuf> {
    dirs::home_dir().into_iter().collect()
}

fn default_max_text_bytes() -> u64 {
    1024 * 1024
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_modules: default_index_modules(),
            flush_interval_secs: default_flush_interval_secs(),
            min_bucket: default_min_bucket(),
            max_bucket: default_max_bucket(),
            max_index_file_size: default_max_index_file_size(),
            min_word_length: default_min_word_length(),
            max_word_length: default_max_word_length(),
            fail_closed_on_scan_error: false,
            files: FilesModuleConfig::default(),
        }
    }
}

impl Default for FilesModuleConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            ignored_directories: Vec::new(),
            max_text_bytes: default_max_text_bytes(),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: IndexerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_bucket > self.max_bucket {
            return Err(IndexerError::Config(format!(
                "min_bucket ({}) must not exceed max_bucket ({})",
                self.min_bucket, self.max_bucket
            )));
        }

        if self.max_bucket > 30 {
            return Err(IndexerError::Config(format!(
                "max_bucket ({}) must be <= 30",
                self.max_bucket
            )));
        }

        if self.flush_interval_secs == 0 {
            return Err(IndexerError::Config(
                "flush_interval_secs must be > 0".to_string(),
            ));
        }

        if self.min_word_length > self.max_word_length {
            return Err(IndexerError::Config(format!(
                "min_word_length ({}) must not exceed max_word_length ({})",
                self.min_word_length, self.max_word_length
            )));
        }

        if self.index_modules.iter().any(|name| name.trim().is_empty()) {
            return Err(IndexerError::Config(
                "index_modules must not contain empty names".to_string(),
            ));
        }

        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn scan_error_policy(&self) -> ScanErrorPolicy {
        if self.fail_closed_on_scan_error {
            ScanErrorPolicy::AssumePending
        } else {
            ScanErrorPolicy::AssumeNone
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = IndexerConfig::default();
        assert_eq!(config.index_modules, vec!["files".to_string()]);
        assert_eq!(config.flush_interval(), Duration::from_secs(10));
        assert_eq!(config.max_index_file_size, 2_000_000_000);
        assert_eq!(config.scan_error_policy(), ScanErrorPolicy::AssumeNone);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = IndexerConfig::default();
        config.min_bucket = 21;
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.flush_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.min_word_length = 40;
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.index_modules.push(" ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_toml() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("trove.toml");
        fs::write(
            &path,
            r#"
data_dir = "/tmp/trove-data"
flush_interval_secs = 3
fail_closed_on_scan_error = true

[files]
roots = ["/srv/docs"]
ignored_directories = ["/srv/docs/.cache"]
"#,
        )
        .expect("Failed to write");

        let config = IndexerConfig::load(&path).expect("Failed to load");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/trove-data"));
        assert_eq!(config.flush_interval_secs, 3);
        assert_eq!(config.min_bucket, MIN_BUCKET_DEFAULT);
        assert_eq!(config.files.roots, vec![PathBuf::from("/srv/docs")]);
        assert_eq!(config.files.max_text_bytes, 1024 * 1024);
        assert_eq!(config.scan_error_policy(), ScanErrorPolicy::AssumePending);
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("trove.toml");
        fs::write(&path, "flush_interval_secs = \"soon\"").expect("Failed to write");

        assert!(matches!(
            IndexerConfig::load(&path),
            Err(IndexerError::Config(_))
        ));
    }
}
