use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "rusbit.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Failed to read config {path}: {source}")]
	Read { path: String, source: std::io::Error },

	#[error("Failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("Invalid config value '{0}': {1}")]
	Invalid(&'static str, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub peer_id_prefix: String,
	pub listen_port: u16,
	pub max_peers: usize,
	pub connect_timeout: u64, // seconds
	pub request_timeout: u64, // seconds
	pub tracker_timeout: u64, // seconds
	pub max_retries: u32,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			peer_id_prefix: "-RB0001-".to_string(),
			listen_port: 6881,
			max_peers: 50,
			connect_timeout: 5,
			request_timeout: 30,
			tracker_timeout: 15,
			max_retries: 3,
		}
	}
}

impl Config {
	/// Loads `rusbit.toml` from the working directory, falling back to defaults.
	pub fn load() -> Result<Self, ConfigError> {
		if Path::new(DEFAULT_CONFIG_PATH).exists() {
			Self::from_path(DEFAULT_CONFIG_PATH)
		} else {
			Ok(Self::default())
		}
	}

	pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.display().to_string(),
			source,
		})?;
		Self::from_toml(&contents)
	}

	pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(contents)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_peers == 0 {
			return Err(ConfigError::Invalid("max_peers", "must be at least 1".into()));
		}
		for (name, value) in [
			("connect_timeout", self.connect_timeout),
			("request_timeout", self.request_timeout),
			("tracker_timeout", self.tracker_timeout),
		] {
			if value == 0 {
				return Err(ConfigError::Invalid(name, "must be at least 1 second".into()));
			}
		}
		Ok(())
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_secs(self.connect_timeout)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout)
	}

	pub fn tracker_timeout(&self) -> Duration {
		Duration::from_secs(self.tracker_timeout)
	}
}
