//! Application configuration.
//!
//! Values are layered: built-in defaults, then the optional TOML file in the
//! user's config directory, then `NEON_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    save::FileSaveStore,
    session::{SessionConfig, DEFAULT_SAVE_ID},
};

const CONFIG_DIR: &str = "neon-genesis";
const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "NEON";

const DEFAULT_CONFIG: &str = r#"# Neon Genesis configuration.
# Every key is optional; environment variables such as NEON_PORT override it.

# Address and port the save API listens on.
bind_addr = "0.0.0.0"
port = 3000

# Directory holding one record file per save.
# data_dir = "/var/lib/neon-genesis/saves"

# Built client assets; served with an index.html fallback when present.
static_dir = "dist"

# Save identity used by the game session.
save_id = "player_one"

# Backend the HTTP gateway talks to.
api_base_url = "http://localhost:3000"

# Passive-income tick and autosave cadences.
tick_interval_ms = 1000
autosave_interval_secs = 30
"#;

/// Settings for the server and the game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Interface the server binds.
    pub bind_addr: String,
    /// Port the server binds.
    pub port: u16,
    /// Directory of the file save store.
    pub data_dir: PathBuf,
    /// Directory of the static client build.
    pub static_dir: PathBuf,
    /// Save identity of the session.
    pub save_id: String,
    /// Base URL of the save API for the HTTP gateway.
    pub api_base_url: String,
    /// Tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Autosave period in seconds.
    pub autosave_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 3000,
            data_dir: FileSaveStore::default_root(),
            static_dir: PathBuf::from("dist"),
            save_id: DEFAULT_SAVE_ID.to_string(),
            api_base_url: "http://localhost:3000".to_string(),
            tick_interval_ms: 1000,
            autosave_interval_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load from the default file location and the environment.
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::build(None),
        }
    }

    /// Load from `path` (if it exists) and the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(Some(path))
    }

    fn build(path: Option<&Path>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = Config::builder()
            .set_default("bind_addr", defaults.bind_addr)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("data_dir", defaults.data_dir.to_string_lossy().into_owned())?
            .set_default(
                "static_dir",
                defaults.static_dir.to_string_lossy().into_owned(),
            )?
            .set_default("save_id", defaults.save_id)?
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("tick_interval_ms", defaults.tick_interval_ms)?
            .set_default("autosave_interval_secs", defaults.autosave_interval_secs)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("failed to assemble configuration")?;
        config
            .try_deserialize()
            .context("invalid configuration values")
    }

    /// `bind_addr:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Identity and cadences for a game session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            save_id: self.save_id.clone(),
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            autosave_interval: Duration::from_secs(self.autosave_interval_secs.max(1)),
        }
    }
}

/// Location of the configuration file, if the platform has a config dir.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Write the commented default file when none exists yet.
pub fn ensure_default_config() -> Result<()> {
    match config_path() {
        Some(path) => write_default_config(&path),
        None => Ok(()),
    }
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::load_from(&dir.path().join("absent.toml"))?;
        let defaults = AppConfig::default();
        assert_eq!(config.port, defaults.port);
        assert_eq!(config.save_id, "player_one");
        assert_eq!(config.static_dir, PathBuf::from("dist"));
        assert_eq!(config.autosave_interval_secs, 30);
        Ok(())
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "port = 4100\nsave_id = \"slot_b\"\ndata_dir = \"/tmp/neon\"\ntick_interval_ms = 250\n",
        )?;

        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.port, 4100);
        assert_eq!(config.save_id, "slot_b");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/neon"));
        assert_eq!(config.listen_addr(), "0.0.0.0:4100");

        let session = config.session_config();
        assert_eq!(session.save_id, "slot_b");
        assert_eq!(session.tick_interval, Duration::from_millis(250));
        assert_eq!(session.autosave_interval, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn default_template_parses() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join(CONFIG_FILE);
        write_default_config(&path)?;
        assert!(path.is_file());

        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.api_base_url, "http://localhost:3000");

        // An existing file is left alone.
        fs::write(&path, "port = 5000\n")?;
        write_default_config(&path)?;
        assert_eq!(fs::read_to_string(&path)?, "port = 5000\n");
        Ok(())
    }

    #[test]
    fn zero_cadences_are_clamped() {
        let config = AppConfig {
            tick_interval_ms: 0,
            autosave_interval_secs: 0,
            ..AppConfig::default()
        };
        let session = config.session_config();
        assert_eq!(session.tick_interval, Duration::from_millis(1));
        assert_eq!(session.autosave_interval, Duration::from_secs(1));
    }
}
