//! Configuration for sidereal-release.

use std::collections::BTreeMap;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ReleaseError, ReleaseResult};
use crate::formation::Constraints;
use crate::sequencer::SequencerLock;

/// Top-level configuration for the release subsystem.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReleaseConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Scheduler client configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Version sequencing configuration.
    #[serde(default)]
    pub sequencer: SequencerConfig,

    /// Defaults for newly introduced process types.
    #[serde(default)]
    pub formation: FormationConfig,
}

impl ReleaseConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `release.toml` in the current directory (if present)
    /// 3. Environment variables with `SIDEREAL_RELEASE_` prefix
    pub fn load() -> ReleaseResult<Self> {
        Figment::new()
            .merge(Toml::file("release.toml"))
            .merge(Env::prefixed("SIDEREAL_RELEASE_").split("__"))
            .extract()
            .map_err(|e| ReleaseError::Config(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ReleaseResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SIDEREAL_RELEASE_").split("__"))
            .extract()
            .map_err(|e| ReleaseError::Config(e.to_string()))
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/sidereal".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Scheduler client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Base URL for the scheduler HTTP API.
    #[serde(default = "default_scheduler_url")]
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_scheduler_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_scheduler_url() -> String {
    "http://localhost:8082".to_owned()
}

const fn default_scheduler_timeout_secs() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            url: default_scheduler_url(),
            timeout_secs: default_scheduler_timeout_secs(),
        }
    }
}

/// Version sequencing configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SequencerConfig {
    /// How concurrent creators of the same application are serialised.
    #[serde(default)]
    pub lock: SequencerLock,
}

/// Defaults applied to process types a release introduces.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormationConfig {
    /// Instance count for new process types.
    #[serde(default)]
    pub default_quantity: u32,

    /// Per-type instance counts that override `default_quantity`.
    #[serde(default)]
    pub quantities: BTreeMap<String, u32>,

    /// Resource limits for new process types.
    #[serde(default)]
    pub constraints: Constraints,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ReleaseConfig::default();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.scheduler.url, "http://localhost:8082");
        assert_eq!(config.sequencer.lock, SequencerLock::Application);
        assert_eq!(config.formation.default_quantity, 0);
        assert!(config.formation.quantities.is_empty());
        assert_eq!(config.formation.constraints, Constraints::default());
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [database]
            url = "postgres://user:pass@db:5432/releases"
            max_connections = 20

            [sequencer]
            lock = "rows"

            [formation]
            default_quantity = 1

            [formation.quantities]
            web = 2

            [formation.constraints]
            memory_mb = 1024
        "#;

        let config: ReleaseConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "postgres://user:pass@db:5432/releases");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.sequencer.lock, SequencerLock::Rows);
        assert_eq!(config.formation.default_quantity, 1);
        assert_eq!(config.formation.quantities.get("web"), Some(&2));
        assert_eq!(config.formation.constraints.memory_mb, 1024);
        assert_eq!(config.formation.constraints.cpu_shares, 256);
    }

    #[test]
    fn load_merges_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "release.toml",
                r#"
                [database]
                url = "postgres://file/releases"

                [sequencer]
                lock = "application"

                [formation.quantities]
                web = 1
                "#,
            )?;
            jail.set_env("SIDEREAL_RELEASE_SEQUENCER__LOCK", "rows");
            jail.set_env("SIDEREAL_RELEASE_FORMATION__QUANTITIES__WORKER", "3");

            let config = ReleaseConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.database.url, "postgres://file/releases");
            assert_eq!(config.sequencer.lock, SequencerLock::Rows);
            assert_eq!(config.formation.quantities.get("web"), Some(&1));
            assert_eq!(config.formation.quantities.get("worker"), Some(&3));
            Ok(())
        });
    }

    #[test]
    fn load_without_file_uses_defaults() {
        figment::Jail::expect_with(|_| {
            let config = ReleaseConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.sequencer.lock, SequencerLock::Application);
            assert_eq!(config.scheduler.timeout_secs, 10);
            Ok(())
        });
    }

    #[test]
    fn from_file_reads_given_path() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [scheduler]
                url = "http://scheduler:9000"
                "#,
            )?;
            jail.set_env("SIDEREAL_RELEASE_SCHEDULER__TIMEOUT_SECS", "30");

            let config = ReleaseConfig::from_file("custom.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.scheduler.url, "http://scheduler:9000");
            assert_eq!(config.scheduler.timeout_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn invalid_lock_is_a_config_error() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SIDEREAL_RELEASE_SEQUENCER__LOCK", "table");

            assert!(matches!(ReleaseConfig::load(), Err(ReleaseError::Config(_))));
            Ok(())
        });
    }
}
