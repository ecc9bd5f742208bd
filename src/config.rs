//! Configuration management with serde serialization/deserialization
//!
//! Settings can come from a JSON file and are then overridden by command-line
//! flags. Everything has a sensible default so a bare `harvest --output DIR`
//! works against the public meteo.gr index.

use crate::{CameraSelector, HarvestError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Index page listing every public webcam.
pub const DEFAULT_INDEX_URL: &str = "http://meteo.gr/webcameras.cfm";

/// Slightly above a multiple of the 3s TCP retransmission window.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(31);

pub const DEFAULT_CACHE_CONTROL: &str = "no-cache, no-store, no-transform";

/// Main configuration structure for a harvest run
///
/// # Examples
///
/// ```rust
/// use webcam_harvester::Config;
///
/// let config = Config {
///     pool_size: 4,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Page listing the cameras (default: meteo.gr webcams)
    pub index_url: String,

    /// Number of concurrent camera workers (default: min(32, cpus + 4))
    ///
    /// The coordinator never starts more workers than there are tasks.
    pub pool_size: usize,

    /// Upper bound for one whole request, body included (default: 31s)
    pub request_timeout: Duration,

    /// Upper bound for establishing the connection (default: 31s)
    pub connect_timeout: Duration,

    /// Cache-Control header sent with every request so intermediate caches
    /// never hand back a stale frame
    pub cache_control: String,

    /// Custom User-Agent string (default: reqwest default)
    pub user_agent: Option<String>,

    /// Only harvest these cameras
    pub include: Option<CameraSelector>,

    /// Never harvest these cameras
    pub exclude: Option<CameraSelector>,

    /// Write a Prometheus text exposition here after each run
    pub metrics_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            pool_size: default_pool_size(),
            request_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            user_agent: None,
            include: None,
            exclude: None,
            metrics_file: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.pool_size == 0 {
            return Err(HarvestError::ConfigurationError(
                "Pool size must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(HarvestError::ConfigurationError(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        crate::validate_url(&self.index_url).map_err(|e| {
            HarvestError::ConfigurationError(format!(
                "Invalid index URL {}: {e}",
                self.index_url
            ))
        })?;

        Ok(())
    }

    pub fn from_json(content: &str) -> Result<Self, HarvestError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Same sizing rule as a default thread pool executor: enough workers to keep
/// the network busy without spawning hundreds on large machines.
pub fn default_pool_size() -> usize {
    (num_cpus::get() + 4).min(32)
}
