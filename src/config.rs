//! Server configuration.
//!
//! Read from `<config_dir>/inlay/config.json`, then overridden by
//! `INLAY_PORT`, `INLAY_DATABASE`, `INLAY_SERIALIZE_WRITES` and
//! `INLAY_EDITOR_IDLE_MINUTES`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_TINT;

const APP_NAME: &str = "inlay";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_PORT: u16 = 17020;
pub const DEFAULT_EDITOR_IDLE_MINUTES: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlayConfig {
    /// Port the HTTP API listens on (localhost only)
    pub port: u16,
    /// SQLite database file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    /// Run one read-modify-write per container at a time instead of letting
    /// the last container write win.
    pub serialize_container_writes: bool,
    /// Tint given to synthesized lifecycle effects.
    pub default_effect_tint: String,
    /// Editor sessions unused for this long are closed.
    pub editor_idle_minutes: u64,
}

impl Default for InlayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: None,
            serialize_container_writes: false,
            default_effect_tint: DEFAULT_TINT.to_string(),
            editor_idle_minutes: DEFAULT_EDITOR_IDLE_MINUTES,
        }
    }
}

impl InlayConfig {
    /// Load configuration from the user's config directory and the environment.
    /// Falls back to defaults if the file doesn't exist or fails to parse.
    pub fn load() -> Self {
        let mut config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    fn try_load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save the current configuration to the user's config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply `INLAY_*` environment overrides. Unparsable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("INLAY_PORT") {
            match port.trim().parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid INLAY_PORT: {}", port),
            }
        }

        if let Some(path) = var("INLAY_DATABASE").filter(|p| !p.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }

        if let Some(flag) = var("INLAY_SERIALIZE_WRITES") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.serialize_container_writes = true,
                "0" | "false" | "no" | "off" => self.serialize_container_writes = false,
                _ => tracing::warn!("Ignoring invalid INLAY_SERIALIZE_WRITES: {}", flag),
            }
        }

        if let Some(minutes) = var("INLAY_EDITOR_IDLE_MINUTES") {
            match minutes.trim().parse() {
                Ok(minutes) => self.editor_idle_minutes = minutes,
                Err(_) => tracing::warn!("Ignoring invalid INLAY_EDITOR_IDLE_MINUTES: {}", minutes),
            }
        }
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
