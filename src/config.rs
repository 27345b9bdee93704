//! Configuration management for camhub.
//!
//! Settings start from built-in defaults, are overlaid by the JSON config file
//! (`~/.config/camhub.json` unless `CAMHUB_CONFIG_PATH` points elsewhere) and
//! finally by `CAMHUB_*` environment variables.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::naming::NamingConfig;
use crate::{HubError, HubResult};

/// Configuration settings for camhub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Query endpoint bind address
    pub http_host: String,
    /// Query endpoint port
    pub http_port: u16,
    /// Host advertised in stream URLs
    pub stream_host: String,
    /// RTSP port advertised in stream URLs
    pub stream_port: u16,
    /// Seconds between reconciliation passes
    pub poll_interval_secs: u64,
    /// Device slots scanned, `/dev/video0` up to `/dev/video{max_slots - 1}`
    pub max_slots: u32,
    /// Trial-open each device before publishing it
    pub probe_enabled: bool,
    /// Upper bound on a single streamability probe
    pub probe_timeout_ms: u64,
    /// H.264 encoder bitrate
    pub bitrate_kbps: u32,
    /// Pixels cropped from the right of side-by-side stereo frames
    pub stereo_crop_right: u32,
    /// Logical naming strategy
    pub naming: NamingConfig,
    /// Command template used to launch a pipeline for a mount. Placeholders:
    /// `{name}`, `{mount}`, `{descriptor}`, `{port}`. When unset, mounts are
    /// tracked without spawning anything.
    pub launcher: Option<Vec<String>>,
    /// Enable debug logging
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 5000,
            stream_host: "127.0.0.1".to_string(),
            stream_port: 8554,
            poll_interval_secs: 5,
            max_slots: 10,
            probe_enabled: true,
            probe_timeout_ms: 1000,
            bitrate_kbps: 1000,
            stereo_crop_right: 2208,
            naming: NamingConfig::default(),
            launcher: None,
            debug: false,
        }
    }
}

impl Settings {
    /// Load settings from the config file and the process environment.
    pub fn new() -> HubResult<Self> {
        let mut settings = Self::load_file(&Self::get_config_path());
        settings.apply_overrides(|key| env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Overlay `CAMHUB_*` variables, looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> HubResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CAMHUB_HTTP_HOST") {
            self.http_host = host;
        }
        if let Some(port) = lookup("CAMHUB_HTTP_PORT") {
            self.http_port = parse_var("CAMHUB_HTTP_PORT", &port)?;
        }
        if let Some(host) = lookup("CAMHUB_STREAM_HOST") {
            self.stream_host = host;
        }
        if let Some(port) = lookup("CAMHUB_STREAM_PORT") {
            self.stream_port = parse_var("CAMHUB_STREAM_PORT", &port)?;
        }
        if let Some(interval) = lookup("CAMHUB_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_var("CAMHUB_POLL_INTERVAL_SECS", &interval)?;
        }
        if let Some(slots) = lookup("CAMHUB_MAX_SLOTS") {
            self.max_slots = parse_var("CAMHUB_MAX_SLOTS", &slots)?;
        }
        if let Some(enabled) = lookup("CAMHUB_PROBE_ENABLED") {
            self.probe_enabled = parse_var("CAMHUB_PROBE_ENABLED", &enabled)?;
        }
        if let Some(timeout) = lookup("CAMHUB_PROBE_TIMEOUT_MS") {
            self.probe_timeout_ms = parse_var("CAMHUB_PROBE_TIMEOUT_MS", &timeout)?;
        }
        if let Some(bitrate) = lookup("CAMHUB_BITRATE_KBPS") {
            self.bitrate_kbps = parse_var("CAMHUB_BITRATE_KBPS", &bitrate)?;
        }
        if let Some(debug) = lookup("CAMHUB_DEBUG") {
            self.debug = parse_var("CAMHUB_DEBUG", &debug)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.max_slots == 0 {
            return Err(HubError::Config("max_slots must be at least 1".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(HubError::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(HubError::Config(
                "probe_timeout_ms must be at least 1".to_string(),
            ));
        }

        // Names become mount paths, so keep them to a single URL-safe segment.
        let valid_name = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$")
            .map_err(|e| HubError::Config(format!("invalid name pattern: {e}")))?;
        for name in self.naming.rule_names() {
            if !valid_name.is_match(name) {
                return Err(HubError::Config(format!(
                    "camera name '{name}' is not a valid mount segment"
                )));
            }
        }

        if let Some(launcher) = &self.launcher {
            if launcher.is_empty() {
                return Err(HubError::Config("launcher command is empty".to_string()));
            }
        }
        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path() -> PathBuf {
        if let Ok(config_path_override) = env::var("CAMHUB_CONFIG_PATH") {
            return PathBuf::from(config_path_override);
        }

        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("camhub.json")
    }

    /// Read settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_file(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config file at {path:?}, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Failed to parse config from {path:?}: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config from {path:?}: {e}");
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON to `path`
    pub fn save(&self, path: &Path) -> HubResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;

        debug!("Saved config to {path:?}");
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> HubResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| HubError::Config(format!("{key}={value:?}: {e}")))
}
