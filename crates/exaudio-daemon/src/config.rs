//! Configuration loading

use anyhow::Result;
use clap::ValueEnum;
use exaudio_core::Direction;
use exaudio_discovery::{EnumeratedDevice, Enumeration};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log filter, a level or `tracing` directives
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How often to check that the parent process is still there, 0 disables
    #[serde(default = "default_parent_check_interval")]
    pub parent_check_interval_ms: u64,
    /// Populate the directory before reading the first command
    #[serde(default = "default_true")]
    pub scan_on_startup: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            parent_check_interval_ms: default_parent_check_interval(),
            scan_on_startup: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_parent_check_interval() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

/// Which audio host to talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The platform audio host through cpal
    #[default]
    Cpal,
    /// The device list from `[[backend.devices]]`
    Static,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// cpal host name (e.g. "ALSA" or "JACK"), the platform default when unset
    #[serde(default)]
    pub host: Option<String>,
    /// Devices reported by the static backend
    #[serde(default)]
    pub devices: Vec<StaticDeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticDeviceConfig {
    pub name: String,
    pub direction: Direction,
    #[serde(default)]
    pub default: bool,
}

impl BackendConfig {
    /// Enumeration the static backend will report
    pub fn static_enumeration(&self) -> Enumeration {
        let mut enumeration = Enumeration::default();
        for device in &self.devices {
            let entry = EnumeratedDevice::new(device.name.clone(), device.default);
            match device.direction {
                Direction::Capture => enumeration.capture.push(entry),
                Direction::Playback => enumeration.playback.push(entry),
            }
        }
        enumeration
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.parent_check_interval_ms, 500);
        assert!(config.daemon.scan_on_startup);
        assert_eq!(config.backend.kind, BackendKind::Cpal);
        assert_eq!(config.backend.host, None);
        assert!(config.backend.devices.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[daemon]\nlog_level = \"debug\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.parent_check_interval_ms, 500);
        assert_eq!(config.backend.kind, BackendKind::Cpal);
    }

    #[test]
    fn test_static_backend_devices() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[daemon]
scan_on_startup = false

[backend]
kind = "static"

[[backend.devices]]
name = "Loopback In"
direction = "capture"
default = true

[[backend.devices]]
name = "Loopback Out"
direction = "playback"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(!config.daemon.scan_on_startup);
        assert_eq!(config.backend.kind, BackendKind::Static);

        let enumeration = config.backend.static_enumeration();
        assert_eq!(
            enumeration.capture,
            vec![EnumeratedDevice::new("Loopback In", true)]
        );
        assert_eq!(
            enumeration.playback,
            vec![EnumeratedDevice::new("Loopback Out", false)]
        );
    }

    #[test]
    fn test_cpal_host_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nkind = \"cpal\"\nhost = \"JACK\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Cpal);
        assert_eq!(config.backend.host.as_deref(), Some("JACK"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nkind = \"alsa\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
