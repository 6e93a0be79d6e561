//! Configuration file handling for the ledger mirror.
//!
//! The configuration is a JSON file listing the remote ledgers (profiles) to mirror, where the
//! local snapshot lives, and how the sync engine and its caller-side retry behave. Every section
//! except `profiles` may be omitted.

use crate::model::Profile;
use crate::sync::{LedgerStore, LocalStore, StoreError, SyncSettings};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SNAPSHOT_FILE: &str = "ledger.json";

/// Errors raised while loading or validating a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config defines no profiles")]
    NoProfiles,

    #[error("Duplicate profile id {0}")]
    DuplicateId(i64),

    #[error("Duplicate profile uuid {0}")]
    DuplicateUuid(Uuid),

    #[error("Profile {profile} has an invalid URL {url:?}: {reason}")]
    InvalidUrl {
        profile: String,
        url: String,
        reason: String,
    },

    #[error("sync.batch_size must be greater than zero")]
    ZeroBatchSize,
}

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the local snapshot. Relative paths are resolved against the config file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub sync: SyncConfig,
    pub profiles: Vec<Profile>,
}

/// Sync engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub request_timeout_secs: u64,
    pub batch_size: usize,
    pub retry: RetryConfig,
}

/// Caller-side retry of retryable failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Give up once this much time has passed since the first attempt
    pub max_elapsed_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            batch_size: crate::sync::DEFAULT_BATCH_SIZE,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            max_interval_ms: 10_000,
            max_elapsed_secs: 120,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            batch_size: self.batch_size,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff policy for retrying a whole sync run.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_interval_ms))
            .with_max_interval(Duration::from_millis(self.max_interval_ms))
            .with_max_elapsed_time(Some(Duration::from_secs(self.max_elapsed_secs)))
            .build()
    }
}

impl AppConfig {
    /// Load and validate the configuration file at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config = Self::from_json(&content)?;

        if config.data_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.data_dir = parent.join(&config.data_dir);
            }
        }
        debug!(
            "Loaded config {:?} with {} profiles",
            path,
            config.profiles.len()
        );
        Ok(config)
    }

    /// Parse and validate a configuration from JSON text.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }
        if self.sync.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }

        let mut ids = HashSet::new();
        let mut uuids = HashSet::new();
        for profile in &self.profiles {
            if !ids.insert(profile.id) {
                return Err(ConfigError::DuplicateId(profile.id));
            }
            if !profile.uuid.is_nil() && !uuids.insert(profile.uuid) {
                return Err(ConfigError::DuplicateUuid(profile.uuid));
            }
            validate_url(profile)?;
        }
        Ok(())
    }

    /// Path of the local snapshot inside the data directory
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    pub fn profile(&self, profile_id: i64) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == profile_id)
    }

    /// Bring the stored profiles in line with this configuration.
    ///
    /// Profiles absent from the configuration are dropped with their data. A profile without a
    /// configured uuid keeps the one it was stored with. A cached server version survives as long
    /// as the profile keeps pointing at the same URL.
    pub async fn register_profiles(&self, store: &LocalStore) -> Result<(), StoreError> {
        for stored in store.profiles().await {
            if self.profile(stored.id).is_none() {
                info!("Profile {} left the configuration, dropping its data", stored.name);
                store.remove_profile(stored.id).await?;
            }
        }

        for profile in &self.profiles {
            let mut profile = profile.clone();
            let existing = store.profile(profile.id).await?;
            if let Some(existing) = &existing {
                if profile.uuid.is_nil() {
                    profile.uuid = existing.uuid;
                }
                if existing.url == profile.url {
                    profile.detected_version = existing.detected_version;
                }
            }
            if profile.uuid.is_nil() {
                profile.uuid = Uuid::new_v4();
            }
            store.insert_profile(profile).await?;
        }
        Ok(())
    }
}

fn validate_url(profile: &Profile) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        profile: profile.name.clone(),
        url: profile.url.clone(),
        reason,
    };
    let url = reqwest::Url::parse(&profile.url).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ApiVersion;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"{
        "profiles": [{"id": 1, "name": "home", "url": "https://ledger.example.org"}]
    }"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = AppConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.sync.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.sync.settings().batch_size, 100);
        assert_eq!(config.data_dir, PathBuf::from("data"));

        let profile = config.profile(1).unwrap();
        assert_eq!(profile.api_version, ApiVersion::Auto);
        assert!(profile.auth.is_none());
        assert!(config.profile(2).is_none());
    }

    #[test]
    fn full_config_is_read() {
        let config = AppConfig::from_json(
            r#"{
                "data_dir": "/var/lib/ledger",
                "sync": {"request_timeout_secs": 5, "batch_size": 20,
                         "retry": {"initial_interval_ms": 100}},
                "profiles": [{
                    "id": 7, "name": "work", "uuid": "6f1c0c5e-7d3c-4f0e-9a43-1f1b0c8d2e55",
                    "url": "http://localhost:5000/ledger",
                    "auth": {"user": "me", "password": "secret"},
                    "api_version": "1.32",
                    "preferences": {"default_commodity": "EUR", "permit_posting": true}
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.snapshot_path(), PathBuf::from("/var/lib/ledger/ledger.json"));
        assert_eq!(config.sync.batch_size, 20);
        assert_eq!(config.sync.retry.initial_interval_ms, 100);
        assert_eq!(config.sync.retry.max_interval_ms, 10_000);

        let profile = config.profile(7).unwrap();
        assert_eq!(profile.api_version, ApiVersion::V1_32);
        assert_eq!(profile.auth.as_ref().unwrap().user, "me");
        assert_eq!(
            profile.preferences.default_commodity.as_deref(),
            Some("EUR")
        );
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let cases = [
            (r#"{"profiles": []}"#, "no profiles"),
            (
                r#"{"profiles": [{"id": 1, "name": "a", "url": "http://a"},
                                 {"id": 1, "name": "b", "url": "http://b"}]}"#,
                "duplicate id",
            ),
            (
                r#"{"profiles": [{"id": 1, "name": "a", "url": "ftp://a"}]}"#,
                "bad scheme",
            ),
            (
                r#"{"profiles": [{"id": 1, "name": "a", "url": "ledger.local"}]}"#,
                "relative url",
            ),
            (
                r#"{"sync": {"batch_size": 0},
                    "profiles": [{"id": 1, "name": "a", "url": "http://a"}]}"#,
                "zero batch",
            ),
            (r#"{"profiles": [{"id": 1}]}"#, "missing fields"),
        ];
        for (json, label) in cases {
            assert!(AppConfig::from_json(json).is_err(), "{label} should fail");
        }
    }

    #[test]
    fn duplicate_uuids_are_rejected() {
        let json = r#"{"profiles": [
            {"id": 1, "name": "a", "url": "http://a", "uuid": "6f1c0c5e-7d3c-4f0e-9a43-1f1b0c8d2e55"},
            {"id": 2, "name": "b", "url": "http://b", "uuid": "6f1c0c5e-7d3c-4f0e-9a43-1f1b0c8d2e55"}
        ]}"#;
        assert!(matches!(
            AppConfig::from_json(json),
            Err(ConfigError::DuplicateUuid(_))
        ));
    }

    #[test]
    fn profiles_without_uuid_do_not_collide() {
        let json = r#"{"profiles": [
            {"id": 1, "name": "a", "url": "http://a"},
            {"id": 2, "name": "b", "url": "http://b"}
        ]}"#;
        let config = AppConfig::from_json(json).unwrap();
        assert!(config.profiles.iter().all(|p| p.uuid.is_nil()));
    }

    #[tokio::test]
    async fn registration_keeps_the_stored_uuid_across_loads() {
        let store = LocalStore::in_memory();
        AppConfig::from_json(MINIMAL)
            .unwrap()
            .register_profiles(&store)
            .await
            .unwrap();
        let first = store.profile(1).await.unwrap().unwrap().uuid;
        assert!(!first.is_nil());

        AppConfig::from_json(MINIMAL)
            .unwrap()
            .register_profiles(&store)
            .await
            .unwrap();
        assert_eq!(store.profile(1).await.unwrap().unwrap().uuid, first);
    }

    #[tokio::test]
    async fn registration_honours_configured_uuid_and_drops_removed_profiles() {
        let store = LocalStore::in_memory();
        let two = r#"{"profiles": [
            {"id": 1, "name": "home", "url": "https://ledger.example.org"},
            {"id": 2, "name": "work", "url": "http://work"}
        ]}"#;
        AppConfig::from_json(two)
            .unwrap()
            .register_profiles(&store)
            .await
            .unwrap();
        let mut stored = store.profile(1).await.unwrap().unwrap();
        stored.detected_version = Some(crate::remote::ServerVersion::new(1, 32));
        store.insert_profile(stored).await.unwrap();

        let pinned = r#"{"profiles": [{"id": 1, "name": "home", "url": "https://ledger.example.org",
                          "uuid": "6f1c0c5e-7d3c-4f0e-9a43-1f1b0c8d2e55"}]}"#;
        AppConfig::from_json(pinned)
            .unwrap()
            .register_profiles(&store)
            .await
            .unwrap();

        let home = store.profile(1).await.unwrap().unwrap();
        assert_eq!(home.uuid.to_string(), "6f1c0c5e-7d3c-4f0e-9a43-1f1b0c8d2e55");
        assert_eq!(
            home.detected_version,
            Some(crate::remote::ServerVersion::new(1, 32))
        );
        assert!(store.profile(2).await.unwrap().is_none());
    }

    #[test]
    fn retry_policy_follows_config() {
        let retry = RetryConfig {
            initial_interval_ms: 250,
            max_interval_ms: 1_000,
            max_elapsed_secs: 3,
        };
        let backoff = retry.backoff();
        assert_eq!(backoff.initial_interval, Duration::from_millis(250));
        assert_eq!(backoff.max_interval, Duration::from_secs(1));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn relative_data_dir_follows_the_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, MINIMAL).await.unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.snapshot_path(), dir.path().join("data").join("ledger.json"));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let result = AppConfig::load(dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
