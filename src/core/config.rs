//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{ReaperError, Result};

/// Full reaper configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub sweep: SweepConfig,
    pub paths: PathsConfig,
}

/// Connection settings for the container-runtime daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Daemon endpoint: `unix://PATH`, `tcp://HOST:PORT`, `http://HOST:PORT`,
    /// or empty for the client library's local defaults.
    pub host: String,
    pub connect_timeout_secs: u64,
}

/// Sweep cadence and allowlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SweepConfig {
    /// Cooldown between passes, in seconds.
    pub interval_secs: u64,
    /// Grace period between the initial candidate computation and the final
    /// usage re-check, in seconds.
    pub grace_secs: u64,
    /// Comma-separated allowlist of `repo:tag` or bare `repo` patterns.
    /// Matching images are never deleted.
    pub locked_images: String,
}

/// Filesystem paths used by the reaper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: "unix:///var/run/docker.sock".to_string(),
            connect_timeout_secs: 120,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            grace_secs: 1800,
            locked_images: String::new(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[IMR-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("imgr").join("config.toml");
        let data = home_dir.join(".local").join("share").join("imgr");
        Self {
            config_file: cfg,
            jsonl_log: data.join("activity.jsonl"),
        }
    }
}

impl SweepConfig {
    /// Cooldown between passes as a `Duration`.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Grace period as a `Duration`.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ReaperError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(ReaperError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over canonical JSON, stable across processes and Rust releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // runtime
        set_env_string("IMR_RUNTIME_HOST", &mut self.runtime.host);
        set_env_u64(
            "IMR_RUNTIME_CONNECT_TIMEOUT_SECS",
            &mut self.runtime.connect_timeout_secs,
        )?;

        // sweep
        set_env_u64("IMR_SWEEP_INTERVAL_SECS", &mut self.sweep.interval_secs)?;
        set_env_u64("IMR_SWEEP_GRACE_SECS", &mut self.sweep.grace_secs)?;
        set_env_string("IMR_SWEEP_LOCKED_IMAGES", &mut self.sweep.locked_images);

        // paths
        if let Some(raw) = env_var("IMR_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Validate invariants the sweep loop relies on.
    ///
    /// An empty `runtime.host` is valid: it selects the client library's
    /// local defaults (which honor `DOCKER_HOST`).
    pub fn validate(&self) -> Result<()> {
        if self.runtime.connect_timeout_secs == 0 {
            return Err(ReaperError::InvalidConfig {
                details: "runtime.connect_timeout_secs must be >= 1".to_string(),
            });
        }
        if self.sweep.interval_secs == 0 {
            return Err(ReaperError::InvalidConfig {
                details: "sweep.interval_secs must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_string(name: &str, slot: &mut String) {
    if let Some(raw) = env_var(name) {
        *slot = raw;
    }
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| ReaperError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.runtime.host, "unix:///var/run/docker.sock");
        assert_eq!(cfg.sweep.interval_secs, 1);
        assert_eq!(cfg.sweep.grace_secs, 1800);
        assert!(cfg.sweep.locked_images.is_empty());
    }

    #[test]
    fn duration_accessors() {
        let cfg = SweepConfig {
            interval_secs: 5,
            grace_secs: 60,
            locked_images: String::new(),
        };
        assert_eq!(cfg.interval(), Duration::from_secs(5));
        assert_eq!(cfg.grace(), Duration::from_secs(60));
    }

    #[test]
    fn load_explicit_missing_path_errors() {
        let err = Config::load(Some(Path::new("/nonexistent/imgr.toml"))).unwrap_err();
        assert_eq!(err.code(), "IMR-1002");
    }

    #[test]
    fn load_parses_toml_sections() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[runtime]\nhost = \"tcp://127.0.0.1:2375\"\n\n\
             [sweep]\ninterval_secs = 30\ngrace_secs = 600\nlocked_images = \"app,db:9\""
        )
        .unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.runtime.host, "tcp://127.0.0.1:2375");
        assert_eq!(cfg.sweep.interval_secs, 30);
        assert_eq!(cfg.sweep.grace_secs, 600);
        assert_eq!(cfg.sweep.locked_images, "app,db:9");
        assert_eq!(cfg.paths.config_file, file.path());
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "= not toml").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert_eq!(err.code(), "IMR-1003");
    }

    #[test]
    fn empty_host_is_valid_and_selects_local_defaults() {
        let mut cfg = Config::default();
        cfg.runtime.host = String::new();
        assert!(cfg.validate().is_ok());
        // Whitespace normalizes to the same thing at connect time.
        cfg.runtime.host = "  ".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut cfg = Config::default();
        cfg.sweep.interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn grace_of_zero_is_allowed() {
        // A zero grace period degenerates to a single-snapshot sweep, which
        // operators may want in test environments.
        let mut cfg = Config::default();
        cfg.sweep.grace_secs = 0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn stable_hash_changes_with_config() {
        let a = Config::default();
        let mut b = Config::default();
        b.sweep.grace_secs = 7;
        assert_ne!(a.stable_hash().unwrap(), b.stable_hash().unwrap());
        assert_eq!(a.stable_hash().unwrap(), Config::default().stable_hash().unwrap());
    }
}
