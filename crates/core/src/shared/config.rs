use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_DETECTOR_BACKEND, DEFAULT_DISTANCE_METRIC, DEFAULT_RECOGNITION_MODEL,
    DEFAULT_REQUEST_TIMEOUT,
};

pub const ENV_SERVICE_ENDPOINT: &str = "FACEGATE_SERVICE_ENDPOINT";
pub const ENV_RECOGNITION_MODEL: &str = "FACEGATE_FACE_RECOGNITION_MODEL";
pub const ENV_DETECTOR_BACKEND: &str = "FACEGATE_DETECTOR_BACKEND";
pub const ENV_DISTANCE_METRIC: &str = "FACEGATE_DISTANCE_METRIC";
pub const ENV_ANTI_SPOOFING: &str = "FACEGATE_ANTI_SPOOFING";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "FACEGATE_REQUEST_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no service endpoint configured (set {ENV_SERVICE_ENDPOINT} or --endpoint)")]
    MissingEndpoint,
    #[error("invalid service endpoint '{0}': must be an absolute http(s) URL")]
    InvalidEndpoint(String),
    #[error("request timeout must be greater than zero")]
    InvalidTimeout,
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// One configuration layer. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub service_endpoint: Option<String>,
    pub recognition_model: Option<String>,
    pub detector_backend: Option<String>,
    pub distance_metric: Option<String>,
    pub anti_spoofing: Option<bool>,
    pub request_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Reads a JSON layer from disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars_os())
    }

    /// Builds a layer from `FACEGATE_*` variables; other keys are ignored,
    /// including ones that are not valid UTF-8.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut layer = Self::default();
        for (key, value) in vars {
            let Ok(key) = key.into().into_string() else {
                continue;
            };
            if !is_known_key(&key) {
                continue;
            }
            let value = value
                .into()
                .into_string()
                .map_err(|raw| ConfigError::InvalidValue {
                    key: key.clone(),
                    value: raw.to_string_lossy().into_owned(),
                })?;
            match key.as_str() {
                ENV_SERVICE_ENDPOINT => layer.service_endpoint = Some(value),
                ENV_RECOGNITION_MODEL => layer.recognition_model = Some(value),
                ENV_DETECTOR_BACKEND => layer.detector_backend = Some(value),
                ENV_DISTANCE_METRIC => layer.distance_metric = Some(value),
                ENV_ANTI_SPOOFING => layer.anti_spoofing = Some(parse_flag(&value)),
                ENV_REQUEST_TIMEOUT_SECS => {
                    let secs = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.clone(),
                        value: value.clone(),
                    })?;
                    layer.request_timeout_secs = Some(secs);
                }
                _ => {}
            }
        }
        Ok(layer)
    }

    /// Returns `self` with every field set in `higher` replaced.
    pub fn merge(self, higher: ConfigOverrides) -> Self {
        Self {
            service_endpoint: higher.service_endpoint.or(self.service_endpoint),
            recognition_model: higher.recognition_model.or(self.recognition_model),
            detector_backend: higher.detector_backend.or(self.detector_backend),
            distance_metric: higher.distance_metric.or(self.distance_metric),
            anti_spoofing: higher.anti_spoofing.or(self.anti_spoofing),
            request_timeout_secs: higher.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

fn is_known_key(key: &str) -> bool {
    matches!(
        key,
        ENV_SERVICE_ENDPOINT
            | ENV_RECOGNITION_MODEL
            | ENV_DETECTOR_BACKEND
            | ENV_DISTANCE_METRIC
            | ENV_ANTI_SPOOFING
            | ENV_REQUEST_TIMEOUT_SECS
    )
}

/// Only `1` or `true` enable a flag; any other value disables it.
fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

/// Static settings for talking to the recognition service.
///
/// Resolved once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteConfiguration {
    pub service_endpoint: String,
    pub recognition_model: String,
    pub detector_backend: String,
    pub distance_metric: String,
    pub anti_spoofing: bool,
    pub request_timeout_secs: u64,
}

impl RemoteConfiguration {
    /// Applies defaults under `layer` and validates the result.
    pub fn resolve(layer: ConfigOverrides) -> Result<Self, ConfigError> {
        let endpoint = layer
            .service_endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or(ConfigError::MissingEndpoint)?;
        let service_endpoint = normalize_endpoint(&endpoint)?;

        let request_timeout_secs = layer
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT.as_secs());
        if request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(Self {
            service_endpoint,
            recognition_model: layer
                .recognition_model
                .unwrap_or_else(|| DEFAULT_RECOGNITION_MODEL.to_string()),
            detector_backend: layer
                .detector_backend
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            distance_metric: layer
                .distance_metric
                .unwrap_or_else(|| DEFAULT_DISTANCE_METRIC.to_string()),
            anti_spoofing: layer.anti_spoofing.unwrap_or(false),
            request_timeout_secs,
        })
    }

    /// Layers file, environment, and `cli` (highest) over the defaults.
    ///
    /// With `config_path == None` the per-user config file is used if it
    /// exists; an explicitly named file must exist.
    pub fn load(config_path: Option<&Path>, cli: ConfigOverrides) -> Result<Self, ConfigError> {
        let file_layer = match config_path {
            Some(path) => ConfigOverrides::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    log::debug!("Loading configuration from {}", path.display());
                    ConfigOverrides::from_file(&path)?
                }
                _ => ConfigOverrides::default(),
            },
        };
        let layer = file_layer.merge(ConfigOverrides::from_env()?).merge(cli);
        Self::resolve(layer)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Joins an absolute API path onto the endpoint.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.service_endpoint, path)
    }
}

/// Per-user config file location.
///
/// - macOS: `~/Library/Application Support/FaceGate/config.json`
/// - Linux: `$XDG_CONFIG_HOME/FaceGate/config.json` or `~/.config/FaceGate/config.json`
/// - Windows: `%APPDATA%/FaceGate/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("FaceGate").join("config.json"))
}

fn normalize_endpoint(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|_| ConfigError::InvalidEndpoint(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidEndpoint(raw.to_string()));
    }
    Ok(trimmed.to_string())
}
