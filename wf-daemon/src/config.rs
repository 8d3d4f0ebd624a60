// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: a `toml` file on disk, overridable by environment
//! variables for container deployments where editing a file is awkward.

use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no home directory available to derive a default state directory")]
    NoStateDir,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the WAL, snapshot, and Unix socket.
    pub state_dir: PathBuf,
    /// How often the engine re-ticks every in-flight run looking for
    /// newly-ready steps (§4.3.3) and the scheduler checks for due
    /// schedules (§4.5).
    pub tick_interval_ms: u64,
    /// Default per-step dispatch timeout when a step's own config omits
    /// one (§4.4).
    pub default_step_timeout_ms: u64,
    /// Upper bound on concurrently in-flight step dispatches across all
    /// tenants, a coarse backpressure valve (§5).
    pub max_concurrent_dispatch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir().unwrap_or_else(|_| PathBuf::from(".wf")),
            tick_interval_ms: 5_000,
            default_step_timeout_ms: 30_000,
            max_concurrent_dispatch: 32,
        }
    }
}

impl Config {
    /// Loads `path` if it exists, falling back to defaults entirely when
    /// it does not — a fresh install should boot without any file on
    /// disk. Every field is then overridable by a `WF_*` environment
    /// variable, checked after the file so an operator can patch one
    /// value without editing the file in a container.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("WF_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(v) = env_u64("WF_TICK_INTERVAL_MS") {
            self.tick_interval_ms = v;
        }
        if let Some(v) = env_u64("WF_STEP_TIMEOUT_MS") {
            self.default_step_timeout_ms = v;
        }
        if let Some(v) = env_u64("WF_MAX_CONCURRENT_DISPATCH") {
            self.max_concurrent_dispatch = v as usize;
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("daemon.sock")
    }

    pub fn wal_path(&self) -> PathBuf {
        self.state_dir.join("wal.log")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("snapshot.zst")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_millis(self.default_step_timeout_ms)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// `WF_STATE_DIR` > `dirs::state_dir()/wf` > `dirs::home_dir()/.local/state/wf`.
fn default_state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("WF_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = dirs::state_dir() {
        return Ok(dir.join("wf"));
    }
    dirs::home_dir()
        .map(|home| home.join(".local/state/wf"))
        .ok_or(ConfigError::NoStateDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/path/daemon.toml").unwrap();
        assert_eq!(config.tick_interval_ms, 5_000);
    }

    #[test]
    fn parses_a_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.toml");
        std::fs::write(&path, "tick_interval_ms = 1000\nmax_concurrent_dispatch = 4\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.max_concurrent_dispatch, 4);
    }

    #[test]
    fn derived_paths_live_under_state_dir() {
        let mut config = Config::default();
        config.state_dir = PathBuf::from("/tmp/wf-test-state");
        assert_eq!(config.wal_path(), PathBuf::from("/tmp/wf-test-state/wal.log"));
        assert_eq!(config.socket_path(), PathBuf::from("/tmp/wf-test-state/daemon.sock"));
    }
}
