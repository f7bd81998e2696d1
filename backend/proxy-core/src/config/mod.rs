use crate::error::config::ConfigError;

use common::{ErrorLocation, RedactedAuthKey};

use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{LevelFilter, info, warn};
use serde::Deserialize;
use url::Url;

const STATE_DIR_NAME: &str = "tsdproxy";
const MAX_HOSTNAME_LEN: usize = 63;
const DEFAULT_CONTROL_URL: &str = "https://controlplane.tailscale.com";

// ============================================
// ENUMS WITH DEFAULTS
// ============================================

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

// ============================================
// CONFIG STRUCTS
// ============================================

/// Identity provider settings.
///
/// Only `funnel` is read by the proxy itself. The rest are validated here and
/// consumed by whatever constructs the [`IdentityServer`](crate::provider::IdentityServer)
/// handed to [`Proxy::new`](crate::Proxy::new), together with
/// [`ProxyConfig::state_dir`].
#[derive(Debug, Clone, Deserialize)]
pub struct TailscaleConfig {
    /// Pre-authorized key; without one the provider asks for interactive login.
    #[serde(default)]
    pub auth_key: Option<RedactedAuthKey>,
    /// Remove the node from the tailnet when it goes offline.
    #[serde(default)]
    pub ephemeral: bool,
    /// Expose TLS listeners outside the overlay network.
    #[serde(default)]
    pub funnel: bool,
    /// Serve the provider's own web client on the node.
    #[serde(default)]
    pub run_web_client: bool,
    #[serde(default = "default_control_url")]
    pub control_url: String,
}

impl Default for TailscaleConfig {
    fn default() -> Self {
        Self {
            auth_key: None,
            ephemeral: false,
            funnel: false,
            run_web_client: false,
            control_url: default_control_url(),
        }
    }
}

/// Read by [`logger::initialize_from`](crate::logger::initialize_from).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Defaults to the state dir.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Node name on the overlay network, a single DNS label.
    pub hostname: String,

    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub tailscale: TailscaleConfig,

    #[serde(default)]
    pub log: LogConfig,
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_control_url() -> String {
    DEFAULT_CONTROL_URL.to_string()
}

// ============================================
// IMPLEMENTATION
// ============================================

impl ProxyConfig {
    /// Config with defaults for everything but the hostname.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            state_dir: None,
            tailscale: TailscaleConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Load and validate a TOML config file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ReadError`] - file missing or unreadable
    /// - [`ConfigError::ParseError`] - not valid TOML for this schema
    /// - [`ConfigError::ValidationError`] - values out of range
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::parse(&contents, path)?;
        info!("Proxy config loaded from {}", path.display());
        Ok(config)
    }

    /// Parse and validate config held in memory.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Path::new("<memory>"))
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: ProxyConfig = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_hostname(&self.hostname)?;

        let control_url =
            Url::parse(&self.tailscale.control_url).map_err(|e| ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Invalid control_url '{}': {e}", self.tailscale.control_url),
            })?;

        if control_url.scheme() != "https" && control_url.scheme() != "http" {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("control_url must be http(s): {control_url}"),
            });
        }

        if let Some(ref key) = self.tailscale.auth_key {
            if key.is_empty() {
                return Err(ConfigError::ValidationError {
                    location: ErrorLocation::from(Location::caller()),
                    reason: "auth_key cannot be empty string".to_string(),
                });
            }

            if !key.has_expected_prefix() {
                warn!("auth_key for {} does not look like a tskey", self.hostname);
            }
        }

        Ok(())
    }

    /// Directory the identity provider keeps its node state in.
    ///
    /// Falls back to `{data_dir}/tsdproxy/{hostname}`; `None` if the platform
    /// has no data directory.
    pub fn state_dir(&self) -> Option<PathBuf> {
        self.state_dir.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join(STATE_DIR_NAME).join(&self.hostname))
        })
    }

    /// Directory the log file goes in: `log.dir`, else the state dir.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log.dir.clone().or_else(|| self.state_dir())
    }
}

fn validate_hostname(hostname: &str) -> Result<(), ConfigError> {
    let reason = if hostname.is_empty() {
        Some("hostname cannot be empty".to_string())
    } else if hostname.len() > MAX_HOSTNAME_LEN {
        Some(format!(
            "hostname '{hostname}' is longer than {MAX_HOSTNAME_LEN} characters"
        ))
    } else if hostname.starts_with('-') || hostname.ends_with('-') {
        Some(format!("hostname '{hostname}' cannot start or end with '-'"))
    } else if !hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        Some(format!(
            "hostname '{hostname}' may only contain letters, digits and '-'"
        ))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::ValidationError {
            location: ErrorLocation::from(Location::caller()),
            reason,
        }),
        None => Ok(()),
    }
}
