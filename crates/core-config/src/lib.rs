//! Configuration loading for the input pipeline.
//!
//! Parses the `[input]` table of the editor's TOML configuration. Unknown
//! fields are ignored so a newer config file keeps working against an
//! older binary. Every field has a default matching long-standing modal
//! editor behavior, so an absent file is not an error.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};
use tracing::info;

const CONFIG_FILE: &str = "rasp.toml";

/// Timeout and mapping options consumed by the input core.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct InputConfig {
    /// Whether an incomplete mapping times out at all.
    #[serde(default = "InputConfig::default_timeout")]
    pub timeout: bool,
    /// Grace period for completing a mapping, in milliseconds.
    #[serde(default = "InputConfig::default_timeoutlen")]
    pub timeoutlen: u32,
    /// Whether an incomplete key code times out.
    #[serde(default = "InputConfig::default_ttimeout")]
    pub ttimeout: bool,
    /// Grace period for completing a key code, in milliseconds.
    /// Negative falls back to `timeoutlen`.
    #[serde(default = "InputConfig::default_ttimeoutlen")]
    pub ttimeoutlen: i64,
    /// Nested mapping expansions allowed before the engine gives up.
    #[serde(default = "InputConfig::default_maxmapdepth")]
    pub maxmapdepth: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            timeout: Self::default_timeout(),
            timeoutlen: Self::default_timeoutlen(),
            ttimeout: Self::default_ttimeout(),
            ttimeoutlen: Self::default_ttimeoutlen(),
            maxmapdepth: Self::default_maxmapdepth(),
        }
    }
}

impl InputConfig {
    const fn default_timeout() -> bool {
        true
    }
    const fn default_timeoutlen() -> u32 {
        1000
    }
    const fn default_ttimeout() -> bool {
        true
    }
    const fn default_ttimeoutlen() -> i64 {
        50
    }
    const fn default_maxmapdepth() -> u32 {
        200
    }

    /// Wait budget for an incomplete mapping. `None` means block forever.
    pub fn map_wait(&self) -> Option<Duration> {
        self.timeout
            .then(|| Duration::from_millis(u64::from(self.timeoutlen)))
    }

    /// Wait budget for an incomplete key code. `None` means block forever.
    pub fn keycode_wait(&self) -> Option<Duration> {
        if !self.ttimeout && !self.timeout {
            return None;
        }
        let ms = if self.ttimeoutlen >= 0 {
            self.ttimeoutlen as u64
        } else {
            u64::from(self.timeoutlen)
        };
        Some(Duration::from_millis(ms))
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub input: InputConfig,
}

/// Best-effort config path: working directory first, then the platform
/// config directory.
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|d| d.join("rasp").join(CONFIG_FILE))
        .unwrap_or(local)
}

/// Load and parse a config file. A missing file yields the defaults.
pub fn load(path: &std::path::Path) -> Result<ConfigFile> {
    if !path.exists() {
        info!(target: "config", path = %path.display(), "no config file; using defaults");
        return Ok(ConfigFile::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let parsed: ConfigFile = toml::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    info!(target: "config", path = %path.display(), "config loaded");
    Ok(parsed)
}

/// Load from `discover()`, honoring an explicit override path from the
/// environment.
pub fn load_default() -> Result<ConfigFile> {
    let path = env::var_os("RASP_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(discover);
    load(&path)
}
