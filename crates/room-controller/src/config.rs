//! Room controller configuration.
//!
//! Configuration is loaded from environment variables. Media node secrets
//! are redacted in Debug output.

use crate::media::MediaNodeOptions;

use common::config::ObservabilityConfig;
use common::secret::SecretString;
use common::types::{GeoPosition, MediaNodeId};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Prefix of every variable read here.
pub const ENV_PREFIX: &str = "RC";

/// Default load balancing strategies.
pub const DEFAULT_LB_STRATEGIES: &str = "geo";

/// Default media node RPC timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

/// Default Geo strategy distance threshold in kilometres.
pub const DEFAULT_GEO_MAX_DISTANCE_KM: f64 = 2000.0;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default instance ID prefix.
pub const DEFAULT_RC_ID_PREFIX: &str = "rc";

/// Room controller configuration.
#[derive(Clone)]
pub struct Config {
    /// Unique identifier for this instance.
    pub rc_id: String,

    /// Media nodes to register at startup.
    pub media_nodes: Vec<MediaNodeConfig>,

    /// Configured strategy names, in declaration order (default: "geo").
    pub lb_strategies: Vec<String>,

    /// Media node RPC timeout (default: 3000 ms).
    pub request_timeout: Duration,

    /// Geo strategy distance threshold (default: 2000 km).
    pub geo_max_distance_km: f64,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    pub observability: ObservabilityConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rc_id", &self.rc_id)
            .field("media_nodes", &self.media_nodes)
            .field("lb_strategies", &self.lb_strategies)
            .field("request_timeout", &self.request_timeout)
            .field("geo_max_distance_km", &self.geo_max_distance_km)
            .field("health_bind_address", &self.health_bind_address)
            .field("observability", &self.observability)
            .finish()
    }
}

/// One entry of `RC_MEDIA_NODES`.
#[derive(Clone)]
pub struct MediaNodeConfig {
    pub id: MediaNodeId,
    pub hostname: String,
    pub port: u16,
    /// Shared secret presented as a bearer token.
    pub secret: SecretString,
    pub tls: bool,
    pub location: Option<GeoPosition>,
}

impl fmt::Debug for MediaNodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaNodeConfig")
            .field("id", &self.id)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("secret", &"[REDACTED]")
            .field("tls", &self.tls)
            .field("location", &self.location)
            .finish()
    }
}

impl MediaNodeConfig {
    #[must_use]
    pub fn to_media_node_options(&self, request_timeout: Duration) -> MediaNodeOptions {
        MediaNodeOptions {
            id: self.id.clone(),
            hostname: self.hostname.clone(),
            port: self.port,
            secret: self.secret.clone(),
            tls: self.tls,
            location: self.location,
            request_timeout,
        }
    }
}

/// Wire shape of a media node entry.
#[derive(Deserialize)]
struct RawMediaNode {
    id: String,
    hostname: String,
    port: u16,
    secret: String,
    #[serde(default = "default_tls")]
    tls: bool,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

fn default_tls() -> bool {
    true
}

impl TryFrom<RawMediaNode> for MediaNodeConfig {
    type Error = ConfigError;

    fn try_from(raw: RawMediaNode) -> Result<Self, Self::Error> {
        let location = match (raw.latitude, raw.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPosition::new(latitude, longitude)),
            (None, None) => None,
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "media node {} needs both latitude and longitude",
                    raw.id
                )))
            }
        };
        Ok(Self {
            id: MediaNodeId::new(raw.id),
            hostname: raw.hostname,
            port: raw.port,
            secret: SecretString::from(raw.secret),
            tls: raw.tls,
            location,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// `MissingEnvVar` without `RC_MEDIA_NODES`; `InvalidValue` for malformed
    /// JSON, numbers or booleans.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw_nodes = vars
            .get("RC_MEDIA_NODES")
            .ok_or_else(|| ConfigError::MissingEnvVar("RC_MEDIA_NODES".to_string()))?;
        let media_nodes = serde_json::from_str::<Vec<RawMediaNode>>(raw_nodes)
            .map_err(|e| ConfigError::InvalidValue(format!("RC_MEDIA_NODES: {e}")))?
            .into_iter()
            .map(MediaNodeConfig::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let lb_strategies = vars
            .get("RC_LB_STRATEGIES")
            .map_or(DEFAULT_LB_STRATEGIES, String::as_str)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let request_timeout = Duration::from_millis(parse_or(
            vars,
            "RC_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?);

        let geo_max_distance_km =
            parse_or(vars, "RC_GEO_MAX_DISTANCE_KM", DEFAULT_GEO_MAX_DISTANCE_KM)?;
        if !geo_max_distance_km.is_finite() || geo_max_distance_km < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "RC_GEO_MAX_DISTANCE_KM: {geo_max_distance_km}"
            )));
        }

        let health_bind_address = vars
            .get("RC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let observability = ObservabilityConfig::from_vars(vars, ENV_PREFIX)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let rc_id = vars.get("RC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            rc_id,
            media_nodes,
            lb_strategies,
            request_timeout,
            geo_max_distance_km,
            health_bind_address,
            observability,
        })
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}: {value}"))),
        None => Ok(default),
    }
}
