// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization configuration.
//!
//! Layers are merged in precedence order (defaults, then the `[rbac]` table
//! of a TOML file, then environment variables) and finalized into an
//! [`RbacConfig`].
//!
//! Environment variables:
//! - `LOOM_SERVER_RBAC_POLICY_PATH`: policy file to load instead of the bundled one
//! - `LOOM_SERVER_RBAC_LOG_ALLOWED_DECISIONS`: log allowed decisions at debug

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

pub const ENV_POLICY_PATH: &str = "LOOM_SERVER_RBAC_POLICY_PATH";
pub const ENV_LOG_ALLOWED_DECISIONS: &str = "LOOM_SERVER_RBAC_LOG_ALLOWED_DECISIONS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },
}

/// Authorization configuration (runtime, fully resolved).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RbacConfig {
	/// `None` means the bundled policy.
	pub policy_path: Option<PathBuf>,
	pub log_allowed_decisions: bool,
}

/// Authorization configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RbacConfigLayer {
	#[serde(default)]
	pub policy_path: Option<PathBuf>,
	#[serde(default)]
	pub log_allowed_decisions: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
	#[serde(default)]
	rbac: Option<RbacConfigLayer>,
}

impl RbacConfigLayer {
	pub fn merge(&mut self, other: RbacConfigLayer) {
		if other.policy_path.is_some() {
			self.policy_path = other.policy_path;
		}
		if other.log_allowed_decisions.is_some() {
			self.log_allowed_decisions = other.log_allowed_decisions;
		}
	}

	pub fn finalize(self) -> RbacConfig {
		RbacConfig {
			policy_path: self.policy_path,
			log_allowed_decisions: self.log_allowed_decisions.unwrap_or(false),
		}
	}

	/// Read the `[rbac]` table of a TOML config file. A missing file yields
	/// an empty layer.
	pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
		if !path.exists() {
			debug!(path = %path.display(), "config file not found, skipping");
			return Ok(Self::default());
		}

		debug!(path = %path.display(), "loading config file");
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
			path: path.to_path_buf(),
			source: e,
		})?;

		let file: ConfigFile = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: path.to_path_buf(),
			source: e,
		})?;

		trace!("parsed rbac config layer from TOML");
		Ok(file.rbac.unwrap_or_default())
	}

	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let var = |name: &str| lookup(name).filter(|s| !s.is_empty());

		let log_allowed_decisions = match var(ENV_LOG_ALLOWED_DECISIONS) {
			Some(v) => Some(parse_bool(ENV_LOG_ALLOWED_DECISIONS, &v)?),
			None => None,
		};

		Ok(Self {
			policy_path: var(ENV_POLICY_PATH).map(PathBuf::from),
			log_allowed_decisions,
		})
	}
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
	match value.to_ascii_lowercase().as_str() {
		"true" | "1" => Ok(true),
		"false" | "0" => Ok(false),
		_ => Err(ConfigError::InvalidValue {
			key: key.to_string(),
			message: format!("invalid bool value '{value}'"),
		}),
	}
}

/// Load configuration from defaults, an optional TOML file, then the
/// environment.
pub fn load_config(config_file: Option<&Path>) -> Result<RbacConfig, ConfigError> {
	let mut layer = RbacConfigLayer::default();
	if let Some(path) = config_file {
		layer.merge(RbacConfigLayer::from_toml_file(path)?);
	}
	layer.merge(RbacConfigLayer::from_env()?);
	Ok(layer.finalize())
}
