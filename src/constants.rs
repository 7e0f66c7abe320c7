//! Constants used throughout PM33 Connect
//!
//! This module contains configuration paths, OAuth protocol values, timing defaults
//! and HTTP route fragments.

use once_cell::sync::Lazy;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Get the home directory with fallback to current directory
pub fn get_home_dir() -> &'static str {
    static HOME_DIR: Lazy<String> = Lazy::new(|| {
        dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string())
    });
    &HOME_DIR
}

/// Default data directory (~/.pm33)
pub fn default_data_dir() -> &'static str {
    static DATA_DIR: Lazy<String> = Lazy::new(|| format!("{}/.pm33", get_home_dir()));
    &DATA_DIR
}

/// Default SQLite DSN (~/.pm33/connect.db)
pub fn default_sqlite_dsn() -> &'static str {
    static SQLITE_DSN: Lazy<String> = Lazy::new(|| format!("{}/connect.db", default_data_dir()));
    &SQLITE_DSN
}

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "pm33.config.json";

/// Storage driver: in-memory
pub const STORAGE_DRIVER_MEMORY: &str = "memory";

/// Storage driver: SQLite
pub const STORAGE_DRIVER_SQLITE: &str = "sqlite";

/// Default log filter directive
pub const DEFAULT_LOG_FILTER: &str = "pm33_connect=info";

// ============================================================================
// HTTP
// ============================================================================

/// Default HTTP host
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 3033;

/// Path prefix of the per-provider OAuth callback route
pub const CALLBACK_PATH_PREFIX: &str = "/integrations/oauth/callback";

// ============================================================================
// OAUTH
// ============================================================================

/// Lifetime of a pending authorization flow (10 minutes)
pub const DEFAULT_FLOW_TTL_SECS: u64 = 600;

/// Upper bound for a configured flow lifetime (1 day)
pub const MAX_FLOW_TTL_SECS: u64 = 86_400;

/// Timeout applied to token exchange and identity requests
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Delay before a simulated connection completes
pub const DEFAULT_SIMULATED_DELAY_MS: u64 = 1500;

/// Interval between expired pending-flow sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Tokens expiring within this window are refreshed before use
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// Client id prefix that marks a placeholder (demo) registration
pub const DEMO_CLIENT_ID_PREFIX: &str = "demo_";

/// Bytes of entropy in a PKCE code verifier
pub const PKCE_VERIFIER_BYTES: usize = 32;

/// Bytes of entropy in an anti-CSRF state token
pub const STATE_TOKEN_BYTES: usize = 16;

/// PKCE challenge method
pub const PKCE_METHOD_S256: &str = "S256";

/// OAuth grant type for the authorization code exchange
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// OAuth grant type for refreshing an access token
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Separator placed between provider and workspace in display names
pub const DISPLAY_NAME_SEPARATOR: &str = " – ";

/// Build the callback path for a provider
pub fn callback_path(provider: &str) -> String {
    format!("{}/{}", CALLBACK_PATH_PREFIX, provider)
}
