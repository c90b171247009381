//! Host configuration.
//!
//! Settings come from an optional `stepscope.toml`, then command-line flags
//! override individual fields. A missing default file is not an error; a
//! file named with `--config` must exist and parse.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use stepscope_core::config::{DEFAULT_COLLECTION_TIME_S, DEFAULT_FREQUENCY_HZ, MeasurementConfig};
use thiserror::Error;

use crate::overlay::RcModel;

pub const DEFAULT_CONFIG_PATH: &str = "stepscope.toml";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    pub link: LinkConfig,
    pub acquisition: AcquisitionConfig,
    pub model: RcModel,
}

/// Serial transport parameters.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout; keeps the loop responsive to cancel.
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: "COM3".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1,
        }
    }
}

/// Run parameters the host must agree on with the device.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub frequency_hz: u32,
    pub collection_time_s: u32,
    /// Longest silence tolerated between complete lines.
    pub idle_limit_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            collection_time_s: DEFAULT_COLLECTION_TIME_S,
            idle_limit_ms: 5_000,
        }
    }
}

impl AcquisitionConfig {
    #[must_use]
    pub fn measurement(&self) -> MeasurementConfig {
        MeasurementConfig::new(self.frequency_hz, self.collection_time_s)
    }

    #[must_use]
    pub fn idle_limit(&self) -> Duration {
        Duration::from_millis(self.idle_limit_ms)
    }
}

impl HostConfig {
    /// Loads `explicit` if given, else `stepscope.toml` when present, else
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigLoadError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load_from_path(path)
        } else {
            info!("config: no {DEFAULT_CONFIG_PATH}, using defaults");
            Ok(Self::default())
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("config: loaded {}", path.display());
        Ok(config)
    }
}

/// Command-line flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub config: Option<PathBuf>,
    pub simulate: bool,
    pub transcript: Option<PathBuf>,
}

pub const USAGE: &str = "Usage: stepscope [--port <name>] [--baud <rate>] [--config <file>] \
                         [--transcript <file.csv>] [--simulate]";

impl CliArgs {
    /// Parses flags in `--name value` or `--name=value` form.
    pub fn parse<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };

            if flag == "--simulate" {
                if inline.is_some() {
                    return Err("--simulate takes no value".to_string());
                }
                parsed.simulate = true;
                continue;
            }

            let mut value = || {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| format!("Expected value after {flag}"))
            };
            match flag.as_str() {
                "--port" => parsed.port = Some(value()?),
                "--baud" => {
                    let raw = value()?;
                    let baud = raw
                        .parse()
                        .map_err(|_| format!("Invalid baud rate `{raw}`"))?;
                    parsed.baud = Some(baud);
                }
                "--config" => parsed.config = Some(PathBuf::from(value()?)),
                "--transcript" => parsed.transcript = Some(PathBuf::from(value()?)),
                other => return Err(format!("Unknown argument `{other}`")),
            }
        }

        Ok(parsed)
    }

    /// Applies flag overrides on top of file settings.
    pub fn apply(&self, config: &mut HostConfig) {
        if let Some(port) = &self.port {
            config.link.port.clone_from(port);
        }
        if let Some(baud) = self.baud {
            config.link.baud_rate = baud;
        }
    }
}
