//! Configuration management

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::protocol::ProtocolType;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Receiver to connect to; discovery runs when unset.
    #[serde(default)]
    pub receiver: Option<ReceiverConfig>,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Known devices, reported by discovery before any search answers.
    #[serde(default)]
    pub favorites: Vec<FavoriteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    pub host: String,
    pub port: Option<u16>,
    pub protocol: Option<ProtocolType>,
    #[serde(default)]
    pub zone: usize,
}

impl ReceiverConfig {
    /// Protocol and port, each derived from the other when only one is given.
    pub fn endpoint(&self) -> (ProtocolType, u16) {
        match (self.protocol, self.port) {
            (Some(protocol), Some(port)) => (protocol, port),
            (Some(protocol), None) => (protocol, protocol.default_port()),
            (None, Some(port)) => (ProtocolType::from_port(port), port),
            (None, None) => (ProtocolType::Iscp, ProtocolType::Iscp.default_port()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Switch the receiver on when it reports standby after connecting.
    #[serde(default)]
    pub auto_power: bool,

    /// Put all zones into standby when the session stops.
    #[serde(default)]
    pub standby_on_exit: bool,

    /// Follow multiroom companions announced by the receiver.
    #[serde(default = "default_true")]
    pub multiroom: bool,

    #[serde(default = "default_true")]
    pub listening_mode_retry: bool,

    /// Shortcut script run once the session is active.
    pub script: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_power: false,
            standby_on_exit: false,
            multiroom: true,
            listening_mode_retry: true,
            script: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Search rounds before giving up; each round lasts three seconds.
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// Skip the SSDP search for Denon/Marantz receivers.
    #[serde(default)]
    pub iscp_only: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            iscp_only: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Option<ProtocolType>,
    pub alias: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_rounds() -> u32 {
    3
}

const APP_DIR_NAME: &str = "onpc";

/// Get config directory (ONPC_CONFIG_DIR, XDG_CONFIG_HOME or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ONPC_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    // Fallback to current directory
    PathBuf::from(".")
}

/// Get data directory (ONPC_DATA_DIR, XDG_DATA_HOME or platform default)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ONPC_DATA_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/share").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    // Fallback to ./data
    PathBuf::from("./data")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let config = ::config::Config::builder()
        // Start with defaults
        .set_default("discovery.rounds", default_rounds() as i64)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (ONPC_RECEIVER__HOST, ONPC_SESSION__AUTO_POWER, etc.)
        .add_source(
            ::config::Environment::with_prefix("ONPC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Receiver-information snapshots kept between runs, one XML file per host.
#[derive(Debug, Clone)]
pub struct ReceiverCache {
    dir: PathBuf,
}

impl ReceiverCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache in the data directory.
    pub fn in_data_dir() -> Self {
        Self::new(get_data_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, host: &str) -> PathBuf {
        let name: String = host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("receiver-{}.xml", name))
    }

    pub fn load(&self, host: &str) -> Option<String> {
        let path = self.path(host);
        match std::fs::read_to_string(&path) {
            Ok(xml) if !xml.trim().is_empty() => Some(xml),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("No cached receiver info at {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn store(&self, host: &str, xml: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path(host);
        std::fs::write(&path, xml).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!("Stored receiver info for {} in {}", host, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env() {
        for key in [
            "ONPC_RECEIVER__HOST",
            "ONPC_RECEIVER__PORT",
            "ONPC_RECEIVER__PROTOCOL",
            "ONPC_SESSION__AUTO_POWER",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        clear_env();
        env::set_var("ONPC_CONFIG_DIR", "/tmp/onpc-test-nonexistent");

        let config = load_config().expect("config should load");

        env::remove_var("ONPC_CONFIG_DIR");

        assert!(config.receiver.is_none());
        assert!(!config.session.auto_power);
        assert!(config.session.multiroom);
        assert!(config.session.listening_mode_retry);
        assert_eq!(config.discovery.rounds, 3);
        assert!(config.favorites.is_empty());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("ONPC_CONFIG_DIR", "/tmp/onpc-test-nonexistent");
        env::set_var("ONPC_RECEIVER__HOST", "192.168.1.80");
        env::set_var("ONPC_RECEIVER__PROTOCOL", "dcp");
        env::set_var("ONPC_SESSION__AUTO_POWER", "true");

        let config = load_config().expect("config should load");

        clear_env();
        env::remove_var("ONPC_CONFIG_DIR");

        let receiver = config.receiver.expect("receiver from env");
        assert_eq!(receiver.host, "192.168.1.80");
        assert_eq!(receiver.endpoint(), (ProtocolType::Dcp, 23));
        assert!(config.session.auto_power);
    }

    #[test]
    #[serial]
    fn test_config_file() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
[receiver]
host = "10.0.0.7"
port = 60128
zone = 1

[session]
standby_on_exit = true

[[favorites]]
host = "10.0.0.8"
port = 23
alias = "Kitchen"
"#,
        )
        .unwrap();
        env::set_var("ONPC_CONFIG_DIR", dir.path());

        let config = load_config().expect("config should load");

        env::remove_var("ONPC_CONFIG_DIR");

        let receiver = config.receiver.unwrap();
        assert_eq!(receiver.endpoint(), (ProtocolType::Iscp, 60128));
        assert_eq!(receiver.zone, 1);
        assert!(config.session.standby_on_exit);
        assert_eq!(config.favorites.len(), 1);
        assert_eq!(config.favorites[0].alias.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn test_endpoint_inference() {
        let mut r = ReceiverConfig {
            host: "h".to_string(),
            port: Some(23),
            protocol: None,
            zone: 0,
        };
        assert_eq!(r.endpoint(), (ProtocolType::Dcp, 23));
        r.port = None;
        assert_eq!(r.endpoint(), (ProtocolType::Iscp, 60128));
    }

    #[test]
    fn test_receiver_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReceiverCache::new(dir.path().join("nested"));
        assert!(cache.load("192.168.1.80").is_none());

        cache.store("192.168.1.80", "<response/>").unwrap();
        assert_eq!(cache.load("192.168.1.80").as_deref(), Some("<response/>"));
        assert!(cache
            .path("fe80::1")
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("receiver-fe80__1"));
    }
}
