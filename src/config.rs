use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Immutable configuration snapshot, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
    pub downloads: DownloadConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    /// Directory holding the metadata store
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding one blob file per object
    pub local_storage_path: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum size of a single-shot upload in bytes
    pub max_upload_size: u64,
    /// Maximum size of one chunk append in bytes
    pub max_chunk_size: u64,
    /// How long a pending upload may sit idle before it is reclaimed
    pub inactivity_timeout: Duration,
    /// Longest time-to-live an object may be given
    pub max_lifetime: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadConfig {
    /// MIME types served `inline` rather than as an attachment
    pub inline_types: Vec<String>,
}

impl DownloadConfig {
    pub fn serves_inline(&self, mime: &str) -> bool {
        self.inline_types.iter().any(|t| t.eq_ignore_ascii_case(mime))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_storage_path: "./files".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024,
            max_chunk_size: 32 * 1024 * 1024,
            inactivity_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

/// Comma-separated list, e.g. `INLINE_TYPES=image/png, text/plain`
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let node_defaults = NodeConfig::default();
        let upload_defaults = UploadConfig::default();

        let bind_address = std::env::var("BIND_ADDRESS").unwrap_or(node_defaults.bind_address);
        let data_dir = std::env::var("DATA_DIR").unwrap_or(node_defaults.data_dir);

        let local_storage_path = std::env::var("LOCAL_STORAGE_PATH")
            .unwrap_or_else(|_| StorageConfig::default().local_storage_path);

        let max_upload_size =
            env_parse("MAX_UPLOAD_SIZE").unwrap_or(upload_defaults.max_upload_size);
        let max_chunk_size = env_parse("MAX_CHUNK_SIZE").unwrap_or(upload_defaults.max_chunk_size);

        let inactivity_timeout = env_parse::<u64>("UPLOAD_TIMEOUT")
            .map(Duration::from_secs)
            .unwrap_or(upload_defaults.inactivity_timeout);

        let max_lifetime = env_parse::<u64>("MAX_LIFETIME_DAYS")
            .map(|days| Duration::from_secs(days * 24 * 60 * 60))
            .unwrap_or(upload_defaults.max_lifetime);

        let inline_types = std::env::var("INLINE_TYPES")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            storage: StorageConfig { local_storage_path },
            uploads: UploadConfig {
                max_upload_size,
                max_chunk_size,
                inactivity_timeout,
                max_lifetime,
            },
            downloads: DownloadConfig { inline_types },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.uploads.max_chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_CHUNK_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.uploads.inactivity_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "UPLOAD_TIMEOUT must be greater than 0".to_string(),
            ));
        }

        if self.uploads.max_lifetime.is_zero() {
            return Err(ConfigError::ValidationError(
                "MAX_LIFETIME_DAYS must be greater than 0".to_string(),
            ));
        }

        if self.node.data_dir == self.storage.local_storage_path {
            tracing::warn!(
                "DATA_DIR and LOCAL_STORAGE_PATH are the same directory ({}). \
                 Blob reconciliation will ignore files that are not object ids.",
                self.node.data_dir
            );
        }

        Ok(())
    }
}
