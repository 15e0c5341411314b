//! Configuration for rapid-verify.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for engine data (proof store snapshot).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Evidence-fetching configuration.
    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Retry and expiry policy.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Developers and apps known to the bundled in-memory directory.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Protocol-level settings for the DNS and HTTP checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Hard timeout for a single check, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User agent sent with HTTP fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Subdomain label holding the TXT record.
    #[serde(default = "default_dns_label")]
    pub dns_label: String,

    /// Well-known path of the hosted verification file.
    #[serde(default = "default_file_path")]
    pub file_path: String,

    /// Accepted `name` attributes for the verification meta tag, current first.
    #[serde(default = "default_meta_names")]
    pub meta_names: Vec<String>,

    /// Largest response body the HTTP checks will read.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Retry and expiry policy applied to new proofs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Failed checks allowed before a proof becomes FAILED.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Token lifetime in days.
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: u32,
}

/// Seed data for [`crate::InMemoryDirectory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Known developers.
    #[serde(default)]
    pub developers: Vec<DeveloperEntry>,
}

/// A developer and the apps they own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperEntry {
    /// Developer id.
    pub id: String,

    /// Ids of apps owned by this developer.
    #[serde(default)]
    pub apps: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            verifier: VerifierConfig::default(),
            policy: PolicyConfig::default(),
            directory: DirectoryConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            dns_label: default_dns_label(),
            file_path: default_file_path(),
            meta_names: default_meta_names(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

impl VerifierConfig {
    /// Per-check timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The primary meta tag name, used in setup instructions.
    #[must_use]
    pub fn meta_name(&self) -> &str {
        self.meta_names
            .first()
            .map_or(DEFAULT_META_NAME, String::as_str)
    }
}

impl PolicyConfig {
    /// Token lifetime.
    #[must_use]
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.token_ttl_days))
    }
}

const DEFAULT_META_NAME: &str = "rapid-verify";

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "rapid-verify")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".rapid-verify"))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!(
        "rapid-verify/{} (domain ownership verification)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_dns_label() -> String {
    "_rapid-verify".to_string()
}

fn default_file_path() -> String {
    "/rapid-verify.txt".to_string()
}

fn default_meta_names() -> Vec<String> {
    vec![
        DEFAULT_META_NAME.to_string(),
        "rapid-verify-site-verification".to_string(),
    ]
}

const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_token_ttl_days() -> u32 {
    7
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the proof store snapshot inside `data_dir`.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("proofs.msgpack")
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.verifier.timeout_ms == 0 {
            return Err(Error::Config("verifier.timeout_ms must be positive".into()));
        }
        if self.verifier.dns_label.is_empty() || self.verifier.dns_label.contains('.') {
            return Err(Error::Config(
                "verifier.dns_label must be a single non-empty label".into(),
            ));
        }
        if !self.verifier.file_path.starts_with('/') {
            return Err(Error::Config("verifier.file_path must start with '/'".into()));
        }
        if self.verifier.meta_names.is_empty() {
            return Err(Error::Config("verifier.meta_names must not be empty".into()));
        }
        if self.policy.max_retries == 0 {
            return Err(Error::Config("policy.max_retries must be at least 1".into()));
        }
        if self.policy.token_ttl_days == 0 {
            return Err(Error::Config("policy.token_ttl_days must be at least 1".into()));
        }
        Ok(())
    }
}
