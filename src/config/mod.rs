//! Configuration management for PM33 Connect
//!
//! Loads and manages configuration from pm33.config.json (or YAML)

use crate::constants::{
    self, DEFAULT_FLOW_TTL_SECS, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_SIMULATED_DELAY_MS, DEFAULT_SWEEP_INTERVAL_SECS, MAX_FLOW_TTL_SECS,
};
use crate::model::Provider;
use crate::{ConnectError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Complete PM33 Connect configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Storage configuration (required)
    pub storage: StorageConfig,

    /// HTTP server configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// OAuth flow configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthConfig>,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Driver name (sqlite, memory)
    pub driver: String,

    /// Data source name / connection string
    pub dsn: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible base URL used for OAuth redirect URIs
    /// (e.g. https://app.pm33.ai). Defaults to http://host:port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// Allowed CORS origins. Defaults to localhost origins for development
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            allowed_origins: None,
        }
    }
}

fn default_host() -> String {
    DEFAULT_HTTP_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}

/// OAuth flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    /// Lifetime of a pending authorization flow, in seconds
    #[serde(default = "default_flow_ttl_secs")]
    pub flow_ttl_secs: u64,

    /// Timeout for token exchange and identity requests, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Route every provider through the simulated adapter
    #[serde(default)]
    pub demo_mode: bool,

    /// Delay before a simulated connection completes, in milliseconds
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,

    /// Interval between expired pending-flow sweeps, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Per-provider credential and endpoint overrides, keyed by provider id
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub providers: HashMap<String, ProviderOverride>,
}

/// Overrides for a registered provider. String values accept `$env:NAME`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

fn default_flow_ttl_secs() -> u64 {
    DEFAULT_FLOW_TTL_SECS
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_simulated_delay_ms() -> u64 {
    DEFAULT_SIMULATED_DELAY_MS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            flow_ttl_secs: default_flow_ttl_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            demo_mode: false,
            simulated_delay_ms: default_simulated_delay_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            providers: HashMap::new(),
        }
    }
}

impl OAuthConfig {
    pub fn flow_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.flow_ttl_secs as i64)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl Config {
    /// OAuth settings (with defaults if not configured)
    pub fn get_oauth(&self) -> OAuthConfig {
        self.oauth.clone().unwrap_or_default()
    }

    /// HTTP settings (with defaults if not configured)
    pub fn get_http(&self) -> HttpConfig {
        self.http.clone().unwrap_or_default()
    }

    /// Base URL the provider redirects back to
    pub fn public_base_url(&self) -> String {
        let http = self.get_http();
        http.public_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}:{}", http.host, http.port))
    }

    /// Full redirect URI registered with a provider
    pub fn redirect_uri(&self, provider: Provider) -> String {
        format!(
            "{}{}",
            self.public_base_url(),
            constants::callback_path(provider.as_str())
        )
    }

    /// Load configuration from the default file
    pub fn load() -> Result<Self> {
        Self::load_from_path(constants::CONFIG_FILE_NAME)
    }

    /// Load configuration from specific path
    ///
    /// `.yaml`/`.yml` files are parsed as YAML, everything else as JSON.
    /// A missing file yields the default configuration.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;

        let config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                ConnectError::config(format!("Failed to parse YAML config: {}", e))
            })?,
            _ => serde_json::from_str(&content).map_err(|e| {
                ConnectError::config(format!("Failed to parse JSON config: {}", e))
            })?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to specific path, format chosen by extension
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = match path_ref.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => serde_json::to_string_pretty(self)?,
        };

        std::fs::write(path_ref, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.driver.is_empty() {
            return Err(ConnectError::config("storage.driver is required"));
        }

        match self.storage.driver.as_str() {
            constants::STORAGE_DRIVER_MEMORY => {}
            constants::STORAGE_DRIVER_SQLITE => {
                if self.storage.dsn.is_empty() {
                    return Err(ConnectError::config(
                        "storage.dsn is required for the sqlite driver",
                    ));
                }
            }
            _ => {
                return Err(ConnectError::config(format!(
                    "Unsupported storage driver: '{}'. Supported: sqlite, memory",
                    self.storage.driver
                )));
            }
        }

        if let Some(ref http) = self.http {
            if http.port == 0 {
                return Err(ConnectError::config("http.port must be nonzero (1-65535)"));
            }

            if http.host.is_empty() {
                return Err(ConnectError::config("http.host cannot be empty"));
            }

            if let Some(ref public_url) = http.public_url {
                validate_url("http.publicUrl", public_url)?;
            }

            for origin in http.allowed_origins.iter().flatten() {
                if !origin.starts_with("http://") && !origin.starts_with("https://") {
                    return Err(ConnectError::config(format!(
                        "Invalid CORS origin '{}': must start with http:// or https://",
                        origin
                    )));
                }
            }
        }

        if let Some(ref oauth) = self.oauth {
            if oauth.flow_ttl_secs == 0 {
                return Err(ConnectError::config(
                    "oauth.flowTtlSecs must be greater than 0",
                ));
            }

            if oauth.flow_ttl_secs > MAX_FLOW_TTL_SECS {
                return Err(ConnectError::config(format!(
                    "oauth.flowTtlSecs must be at most {}",
                    MAX_FLOW_TTL_SECS
                )));
            }

            if oauth.http_timeout_secs == 0 {
                return Err(ConnectError::config(
                    "oauth.httpTimeoutSecs must be greater than 0",
                ));
            }

            if oauth.sweep_interval_secs == 0 {
                return Err(ConnectError::config(
                    "oauth.sweepIntervalSecs must be greater than 0",
                ));
            }

            for (key, provider_override) in &oauth.providers {
                key.parse::<Provider>().map_err(|_| {
                    ConnectError::config(format!(
                        "oauth.providers.{} is not a registered provider",
                        key
                    ))
                })?;

                for (field, value) in [
                    ("authorizeEndpoint", &provider_override.authorize_endpoint),
                    ("tokenEndpoint", &provider_override.token_endpoint),
                    ("apiBaseUrl", &provider_override.api_base_url),
                ] {
                    if let Some(value) = value {
                        validate_url(&format!("oauth.providers.{}.{}", key, field), value)?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConnectError::config(format!("{} is not a valid URL: {}", field, e)))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                driver: constants::STORAGE_DRIVER_SQLITE.to_string(),
                dsn: constants::default_sqlite_dsn().to_string(),
            },
            http: Some(HttpConfig::default()),
            oauth: Some(OAuthConfig::default()),
            log: Some(LogConfig {
                level: Some("info".to_string()),
            }),
        }
    }
}
