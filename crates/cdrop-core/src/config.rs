use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CdropError, CdropResult};

/// Top-level client configuration (loaded from cdrop.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CdropConfig {
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub decrypt: DecryptConfig,
    pub log: LogConfig,
}

/// Which object store backend serves `GET` for ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Public HTTP gateway: `GET <gateway>/ipfs/<cid>`
    Gateway,
    /// S3-compatible bucket: objects at `<prefix>/<cid>`
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Content gateway base URL (default: https://ipfs.io)
    pub gateway: String,
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding encrypted envelopes
    pub bucket: String,
    /// Key prefix inside the bucket
    pub prefix: String,
    /// Reject plaintext HTTP endpoints instead of warning
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Application base URL hosting the upload/delete endpoints
    pub base_url: String,
    pub upload_path: String,
    pub delete_path: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Batch decryption tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecryptConfig {
    /// Files decrypted concurrently per group (default: 3)
    pub batch_size: usize,
    /// Pause between groups in milliseconds (default: 100)
    pub batch_pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gateway,
            gateway: "https://ipfs.io".into(),
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "cipherdrop".into(),
            prefix: "objects".into(),
            enforce_tls: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            upload_path: "/api/upload".into(),
            delete_path: "/api/files".into(),
            timeout_secs: 60,
        }
    }
}

impl Default for DecryptConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause_ms: 100,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl DecryptConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CdropConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> CdropResult<Self> {
        let config: CdropConfig =
            toml::from_str(content).map_err(|e| CdropError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    }

    pub fn validate(&self) -> CdropResult<()> {
        if self.decrypt.batch_size == 0 {
            return Err(CdropError::Config(
                "decrypt.batch_size must be at least 1".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Gateway && self.storage.gateway.is_empty() {
            return Err(CdropError::Config(
                "storage.gateway is required for the gateway backend".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[storage]
backend = "s3"
gateway = "https://gateway.example.com"
endpoint = "https://s3.example.com"
region = "eu-west-1"
bucket = "vault"
prefix = "envelopes"
enforce_tls = true

[api]
base_url = "https://app.example.com"
upload_path = "/api/v2/upload"
timeout_secs = 15

[decrypt]
batch_size = 5
batch_pause_ms = 250

[log]
level = "debug"
format = "json"
"#;
        let config = CdropConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.bucket, "vault");
        assert!(config.storage.enforce_tls);
        assert_eq!(config.api.upload_path, "/api/v2/upload");
        assert_eq!(config.api.delete_path, "/api/files");
        assert_eq!(config.api.timeout(), Duration::from_secs(15));
        assert_eq!(config.decrypt.batch_size, 5);
        assert_eq!(config.decrypt.batch_pause(), Duration::from_millis(250));
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config = CdropConfig::from_toml("").unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Gateway);
        assert_eq!(config.storage.gateway, "https://ipfs.io");
        assert!(!config.storage.enforce_tls);
        assert_eq!(config.api.base_url, "http://localhost:3000");
        assert_eq!(config.decrypt.batch_size, 3);
        assert_eq!(config.decrypt.batch_pause_ms, 100);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = CdropConfig::from_toml("[decrypt]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, CdropError::Config(_)));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CdropConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.decrypt.batch_size, 3);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdrop.toml");
        std::fs::write(&path, "[storage]\ngateway = \"https://dweb.link\"\n").unwrap();
        let config = CdropConfig::load(&path).unwrap();
        assert_eq!(config.storage.gateway, "https://dweb.link");
        assert_eq!(config.storage.region, "us-east-1");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = CdropConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = CdropConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.storage.gateway, parsed.storage.gateway);
        assert_eq!(config.api.upload_path, parsed.api.upload_path);
        assert_eq!(config.decrypt.batch_size, parsed.decrypt.batch_size);
    }
}
