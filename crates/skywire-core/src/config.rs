//! Configuration resolution for Skywire.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/skywire/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binaries)
//!
//! Files are deep-merged as JSON before deserialization, so a file only has
//! to mention the keys it changes.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Complete Skywire configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub relay: RelayConfig,
    pub producer: ProducerConfig,
}

/// Relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Per-observer event buffer before a slow observer starts skipping.
    pub broadcast_capacity: usize,
    /// Monitor → hub record queue depth.
    pub record_buffer: usize,
    pub disconnect_policy: DisconnectPolicy,
    /// Browser origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            log_level: "info".to_string(),
            broadcast_capacity: 256,
            record_buffer: 256,
            disconnect_policy: DisconnectPolicy::default(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// What an observer disconnect does to the shared producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisconnectPolicy {
    /// Any observer leaving stops the producer.
    Always,
    /// The producer is stopped once no observers remain.
    #[default]
    LastObserver,
}

impl FromStr for DisconnectPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "always" => Ok(Self::Always),
            "last-observer" => Ok(Self::LastObserver),
            other => Err(Error::Config(format!("Unknown disconnect policy: {other}"))),
        }
    }
}

impl fmt::Display for DisconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::LastObserver => f.write_str("last-observer"),
        }
    }
}

/// Which producer program the relay supervises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProducerMode {
    #[default]
    Simulator,
    Live,
}

impl FromStr for ProducerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simulator" | "sim" => Ok(Self::Simulator),
            "live" => Ok(Self::Live),
            other => Err(Error::Config(format!("Unknown producer mode: {other}"))),
        }
    }
}

/// Producer process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProducerConfig {
    pub mode: ProducerMode,
    /// Simulator executable; relative paths resolve against the relay's
    /// installation directory.
    pub simulator_bin: PathBuf,
    /// Live bridge executable; resolved like `simulator_bin`.
    ///
    /// The bridge is an external program that is not built by this workspace.
    /// It must print protocol lines on stdout and accept `--fc-device`,
    /// `--fc-baud`, `--radio-device` and `--radio-baud`.
    pub bridge_bin: PathBuf,
    pub live: LiveLinkConfig,
    /// Seconds to wait for graceful producer exit before SIGKILL.
    pub terminate_timeout_secs: u64,
    /// Delay after spawn before checking the producer is still alive.
    pub startup_grace_ms: u64,
    /// Back-off after a failed stdout read.
    pub read_retry_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            mode: ProducerMode::default(),
            simulator_bin: PathBuf::from("skywire-sim"),
            bridge_bin: PathBuf::from("skywire-bridge"),
            live: LiveLinkConfig::default(),
            terminate_timeout_secs: 5,
            startup_grace_ms: 200,
            read_retry_ms: 1000,
        }
    }
}

impl ProducerConfig {
    pub const fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }

    pub const fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub const fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }
}

/// Serial links used by the live bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LiveLinkConfig {
    /// Flight controller serial device.
    pub fc_device: String,
    pub fc_baud: u32,
    /// Outbound radio serial device.
    pub radio_device: String,
    pub radio_baud: u32,
}

impl Default for LiveLinkConfig {
    fn default() -> Self {
        Self {
            fc_device: "/dev/ttyACM0".to_string(),
            fc_baud: 115_200,
            radio_device: "/dev/ttyUSB0".to_string(),
            radio_baud: 9600,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` must exist when given; the global file is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut merged = Value::Object(serde_json::Map::new());

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        merge_json(&mut merged, load_config_file(&global_path)?);
    }

    if let Some(path) = explicit {
        merge_json(&mut merged, load_config_file(path)?);
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".skywire").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/skywire/settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
            .map(|p| p.join("skywire").join("settings.json"))
    }
}

fn load_config_file(path: &Path) -> Result<Value> {
    let display = path.display();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {display}: {e}")))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file {display}: {e}")))?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(value)
}

/// Deep-merge `overlay` into `base`; objects merge per key, everything else
/// replaces.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `SKYWIRE_*` overrides. `lookup` resolves a variable name.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("SKYWIRE_BIND_ADDR") {
        config.relay.bind_addr = val
            .parse()
            .map_err(|e| Error::Config(format!("SKYWIRE_BIND_ADDR: {e}")))?;
    }
    if let Some(val) = lookup("SKYWIRE_LOG_LEVEL") {
        config.relay.log_level = val;
    }
    if let Some(val) = lookup("SKYWIRE_DISCONNECT_POLICY") {
        config.relay.disconnect_policy = val.parse()?;
    }
    if let Some(val) = lookup("SKYWIRE_PRODUCER_MODE") {
        config.producer.mode = val.parse()?;
    }
    if let Some(val) = lookup("SKYWIRE_SIMULATOR_BIN") {
        config.producer.simulator_bin = PathBuf::from(val);
    }
    if let Some(val) = lookup("SKYWIRE_BRIDGE_BIN") {
        config.producer.bridge_bin = PathBuf::from(val);
    }
    if let Some(n) = numeric_override(&lookup, "SKYWIRE_TERMINATE_TIMEOUT") {
        config.producer.terminate_timeout_secs = n;
    }
    if let Some(val) = lookup("SKYWIRE_FC_DEVICE") {
        config.producer.live.fc_device = val;
    }
    if let Some(n) = numeric_override(&lookup, "SKYWIRE_FC_BAUD") {
        config.producer.live.fc_baud = n;
    }
    if let Some(val) = lookup("SKYWIRE_RADIO_DEVICE") {
        config.producer.live.radio_device = val;
    }
    if let Some(n) = numeric_override(&lookup, "SKYWIRE_RADIO_BAUD") {
        config.producer.live.radio_baud = n;
    }
    Ok(())
}

/// Numeric overrides that do not parse are ignored, keeping the previous value.
fn numeric_override<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let val = lookup(key)?;
    let parsed = val.parse().ok();
    if parsed.is_none() {
        warn!(key, value = %val, "Ignoring non-numeric override");
    }
    parsed
}
