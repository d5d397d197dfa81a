use std::env;
use std::fmt;

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "switchyard.toml";

/// Top-level switchyard.toml configuration
#[derive(Debug, Deserialize, Default)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_storage")]
    pub storage: StorageBackend,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Memory,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Sled => "sled",
            StorageBackend::Memory => "memory",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "sled" => Some(StorageBackend::Sled),
            "memory" => Some(StorageBackend::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_port() -> u16 {
    4242
}

fn default_hostname() -> String {
    "0.0.0.0".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_storage() -> StorageBackend {
    StorageBackend::Sled
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            hostname: default_hostname(),
            data_dir: default_data_dir(),
            storage: default_storage(),
        }
    }
}

/// Flags given on the command line. Each one set wins over file and env.
#[derive(Debug, Default, Clone)]
pub struct ServerOverrides {
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub data_dir: Option<String>,
    pub storage: Option<StorageBackend>,
}

impl SwitchyardConfig {
    /// Load configuration from a TOML file, falling back to defaults if the file
    /// doesn't exist or cannot be parsed.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(path, &content),
            Err(_) => Self::default(),
        }
    }

    fn parse(path: &str, content: &str) -> Self {
        match toml::from_str(content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path, error = %e, "failed to parse config, using defaults");
                Self::default()
            }
        }
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SWITCHYARD_PORT") {
            match val.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %val, "ignoring invalid SWITCHYARD_PORT"),
            }
        }

        if let Some(val) = lookup("SWITCHYARD_HOSTNAME") {
            self.server.hostname = val;
        }

        if let Some(val) = lookup("SWITCHYARD_DATA_DIR") {
            self.server.data_dir = val;
        }

        if let Some(val) = lookup("SWITCHYARD_STORAGE") {
            match StorageBackend::parse(&val) {
                Some(storage) => self.server.storage = storage,
                None => warn!(value = %val, "unknown SWITCHYARD_STORAGE value"),
            }
        }
    }

    pub fn apply_cli_overrides(&mut self, overrides: ServerOverrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(hostname) = overrides.hostname {
            self.server.hostname = hostname;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.server.data_dir = data_dir;
        }
        if let Some(storage) = overrides.storage {
            self.server.storage = storage;
        }
    }

    /// File, then environment, then command line.
    pub fn resolve(path: &str, overrides: ServerOverrides) -> Self {
        let mut config = Self::load(path);
        config.apply_env_overrides();
        config.apply_cli_overrides(overrides);
        config
    }
}
