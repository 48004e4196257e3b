//! Service configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via STASHSORT_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use stashsort_capture::SessionConfig;
use stashsort_core::{ContainerKind, ScreenLayout, SortOrder};
use stashsort_protocol::{
    CommandSet, HeaderLimits, ReassemblyConfig, ReassemblyMode, DEFAULT_RESERVED_VALUES,
    MAX_BUFFER_SIZE, MAX_FRAME_LEN, MIN_FRAME_LEN,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture configuration.
    pub capture: CaptureConfig,
    /// Wire protocol limits.
    pub protocol: ProtocolConfig,
    /// Snapshot storage configuration.
    pub storage: StorageConfig,
    /// Sort configuration.
    pub sort: SortConfig,
    /// On-screen geometry used by actuators.
    pub screen: ScreenLayout,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], with an explicit file taking precedence over
    /// STASHSORT_CONFIG.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = path.or_else(|| std::env::var("STASHSORT_CONFIG").ok().map(PathBuf::from));
        if let Some(path) = path {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.capture.apply_env_overrides();
        self.protocol.apply_env_overrides();
        self.storage.apply_env_overrides();
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.protocol.validate()?;
        self.sort.order()?;
        self.sort.overflow_kind()?;
        Ok(())
    }

    /// Capture session settings, with the state file resolved against the
    /// data directory when relative.
    pub fn session_config(&self) -> SessionConfig {
        let state_file = if self.capture.state_file.is_absolute() {
            self.capture.state_file.clone()
        } else {
            self.storage.data_dir.join(&self.capture.state_file)
        };
        SessionConfig {
            interface: self.capture.interface.clone(),
            port_range: self.capture.port_range(),
            state_file,
            stop_timeouts: self.capture.stop_timeouts(),
            reassembly: self.protocol.reassembly_config(),
        }
    }
}

/// Capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interface name or description to capture on.
    pub interface: String,
    /// Lowest game-server source port.
    pub port_low: u16,
    /// Highest game-server source port.
    pub port_high: u16,
    /// Persisted capture state, relative to the data directory unless absolute.
    pub state_file: PathBuf,
    /// Packet read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Escalating join timeouts on stop, in milliseconds.
    pub stop_timeouts_ms: Vec<u64>,
    /// Capture snap length in bytes.
    pub snaplen: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: "Ethernet".to_string(),
            port_low: 20200,
            port_high: 20300,
            state_file: PathBuf::from("capture_state.json"),
            read_timeout_ms: 100,
            stop_timeouts_ms: vec![1000, 3000, 6000],
            snaplen: 65535,
        }
    }
}

impl CaptureConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(interface) = std::env::var("STASHSORT_INTERFACE") {
            self.interface = interface;
        }

        if let Ok(port) = std::env::var("STASHSORT_PORT_LOW") {
            if let Ok(p) = port.parse() {
                self.port_low = p;
            }
        }

        if let Ok(port) = std::env::var("STASHSORT_PORT_HIGH") {
            if let Ok(p) = port.parse() {
                self.port_high = p;
            }
        }

        if let Ok(path) = std::env::var("STASHSORT_STATE_FILE") {
            self.state_file = PathBuf::from(path);
        }
    }

    pub fn port_range(&self) -> (u16, u16) {
        (self.port_low, self.port_high)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stop_timeouts(&self) -> Vec<Duration> {
        self.stop_timeouts_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port_low > self.port_high {
            return Err(ConfigError::ValidationError(format!(
                "capture port range {}-{} is inverted",
                self.port_low, self.port_high
            )));
        }
        if self.interface.is_empty() {
            return Err(ConfigError::ValidationError(
                "capture interface not set".to_string(),
            ));
        }
        if self.stop_timeouts_ms.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one stop timeout is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Wire protocol limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Smallest accepted `total_length`, header included.
    pub min_frame_len: u32,
    /// Largest accepted `total_length`.
    pub max_frame_len: u32,
    /// Values accepted in the header's reserved field.
    pub reserved_values: Vec<u16>,
    /// Per-stream reassembly buffer cap in bytes.
    pub max_buffer: usize,
    /// Recovery strategy on a bad header.
    pub reassembly: ReassemblyMode,
    /// Command codes recognised in addition to the known ones.
    pub extra_commands: Vec<u16>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_frame_len: MIN_FRAME_LEN,
            max_frame_len: MAX_FRAME_LEN,
            reserved_values: DEFAULT_RESERVED_VALUES.to_vec(),
            max_buffer: MAX_BUFFER_SIZE,
            reassembly: ReassemblyMode::Stream,
            extra_commands: Vec::new(),
        }
    }
}

impl ProtocolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("STASHSORT_REASSEMBLY") {
            if let Ok(m) = mode.parse() {
                self.reassembly = m;
            }
        }
    }

    pub fn header_limits(&self) -> HeaderLimits {
        HeaderLimits::default()
            .with_length_range(self.min_frame_len, self.max_frame_len)
            .with_reserved_values(self.reserved_values.clone())
            .with_commands(CommandSet::known().with_extra(self.extra_commands.iter().copied()))
    }

    pub fn reassembly_config(&self) -> ReassemblyConfig {
        ReassemblyConfig {
            limits: self.header_limits(),
            max_buffer: self.max_buffer,
            mode: self.reassembly,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_frame_len < MIN_FRAME_LEN {
            return Err(ConfigError::ValidationError(format!(
                "min_frame_len {} is shorter than the header",
                self.min_frame_len
            )));
        }
        if self.max_frame_len < self.min_frame_len {
            return Err(ConfigError::ValidationError(format!(
                "max_frame_len {} is below min_frame_len {}",
                self.max_frame_len, self.min_frame_len
            )));
        }
        if self.reserved_values.is_empty() {
            return Err(ConfigError::ValidationError(
                "reserved_values must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding decoded messages and the capture state.
    pub data_dir: PathBuf,
    /// Optional item catalog (JSON).
    pub catalog: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            catalog: None,
        }
    }
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("STASHSORT_DATA") {
            self.data_dir = PathBuf::from(dir);
        }
    }
}

/// Sort configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Comparator keys, e.g. `height:desc`.
    pub order: Vec<String>,
    /// Container receiving displaced items.
    pub overflow: String,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            order: SortOrder::default()
                .keys()
                .iter()
                .map(|k| k.to_string())
                .collect(),
            overflow: "bag".to_string(),
        }
    }
}

impl SortConfig {
    pub fn order(&self) -> Result<SortOrder, ConfigError> {
        SortOrder::parse(&self.order).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn overflow_kind(&self) -> Result<ContainerKind, ConfigError> {
        let kind = ContainerKind::parse(&self.overflow).ok_or_else(|| {
            ConfigError::ValidationError(format!("unknown overflow container '{}'", self.overflow))
        })?;
        if kind.dimensions().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "overflow container {} has no grid",
                kind
            )));
        }
        Ok(kind)
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use stashsort_protocol::PacketCommand;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capture.interface, "Ethernet");
        assert_eq!(config.capture.port_range(), (20200, 20300));
        assert_eq!(
            config.capture.stop_timeouts(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(6)
            ]
        );
        assert_eq!(config.protocol.reserved_values, vec![0, 256]);
        assert_eq!(config.sort.overflow_kind().unwrap(), ContainerKind::Bag);
        assert_eq!(config.sort.order().unwrap(), SortOrder::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_paths() {
        let config = Config::default();
        let session = config.session_config();
        assert_eq!(session.state_file, PathBuf::from("./data/capture_state.json"));
        assert_eq!(session.interface, "Ethernet");

        let mut config = Config::default();
        config.capture.state_file = std::env::temp_dir().join("state.json");
        assert_eq!(
            config.session_config().state_file,
            std::env::temp_dir().join("state.json")
        );
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.capture.port_range(), config.capture.port_range());
        assert_eq!(parsed.screen, config.screen);
        assert_eq!(parsed.sort.order, config.sort.order);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "
capture:
  interface: eth1
protocol:
  min_frame_len: 100
  reassembly: single_frame
  extra_commands: [77]
sort:
  order: [area:desc, name:asc]
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.capture.interface, "eth1");
        assert_eq!(config.capture.port_low, 20200);
        assert!(config.validate().is_ok());

        let reassembly = config.protocol.reassembly_config();
        assert_eq!(reassembly.mode, ReassemblyMode::SingleFrame);
        assert!(reassembly.limits.commands.contains(77));
        assert!(reassembly
            .limits
            .commands
            .contains(PacketCommand::LobbyCharacterInfoRes.code()));
        assert_eq!(config.sort.order().unwrap().keys().len(), 2);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.capture.port_low = 30000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.protocol.min_frame_len = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.protocol.max_frame_len = 7;
        config.protocol.min_frame_len = 8;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.protocol.reserved_values.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sort.order = vec!["weight:desc".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sort.overflow = "equipment".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stashsort.yaml");

        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.capture.port_high = 20250;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.storage.data_dir, dir.path().join("data"));
        assert_eq!(loaded.capture.port_high, 20250);

        let missing = Config::from_file(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::IoError(_, _))));
    }
}
