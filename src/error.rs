//! Error types for PM33 Connect
//!
//! This module provides the error hierarchy for the OAuth connection flow using thiserror.
//! Every fallible operation returns [`ConnectError`], which carries both a stable
//! machine-readable code and a user-facing message.

use thiserror::Error;

/// Main error type for PM33 Connect operations
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Expired, mismatched and replayed state all collapse into this variant
    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    #[error("Token exchange with {provider} failed (status {status:?}): {body}")]
    TokenExchangeFailed {
        provider: String,
        status: Option<u16>,
        body: String,
    },

    #[error("Token response from {0} did not contain an access token")]
    NoAccessToken(String),

    #[error("Identity lookup with {provider} failed: {message}")]
    IdentityFetchFailed { provider: String, message: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<sqlx::Error> for ConnectError {
    fn from(err: sqlx::Error) -> Self {
        ConnectError::StorageUnavailable(StorageError::from(err))
    }
}

impl From<sqlx::migrate::MigrateError> for ConnectError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ConnectError::StorageUnavailable(StorageError::Database(format!(
            "Failed to run migrations: {}",
            err
        )))
    }
}

/// Convenient result type for PM33 Connect operations
pub type Result<T> = std::result::Result<T, ConnectError>;

impl ConnectError {
    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        ConnectError::Config(msg.into())
    }

    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        ConnectError::Validation(msg.into())
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        ConnectError::StorageUnavailable(StorageError::Database(msg.into()))
    }

    /// Create an identity lookup error
    #[inline]
    pub fn identity<P: std::fmt::Display, S: Into<String>>(provider: P, msg: S) -> Self {
        ConnectError::IdentityFetchFailed {
            provider: provider.to_string(),
            message: msg.into(),
        }
    }

    /// Stable machine-readable error code, as reported in `{success: false, error}`
    pub fn code(&self) -> &'static str {
        match self {
            ConnectError::UnknownProvider(_) => "UnknownProvider",
            ConnectError::EntropyUnavailable(_) => "EntropyUnavailable",
            ConnectError::InvalidState => "InvalidState",
            ConnectError::AuthorizationDenied(_) => "AuthorizationDenied",
            ConnectError::TokenExchangeFailed { .. } => "TokenExchangeFailed",
            ConnectError::NoAccessToken(_) => "NoAccessToken",
            ConnectError::IdentityFetchFailed { .. } => "IdentityFetchFailed",
            ConnectError::StorageUnavailable(_) => "StorageUnavailable",
            ConnectError::Config(_) => "ConfigError",
            ConnectError::Validation(_) => "ValidationError",
            ConnectError::Io(_) | ConnectError::Json(_) | ConnectError::Yaml(_) => "InternalError",
        }
    }

    /// Message safe to show to the end user.
    ///
    /// Provider diagnostics are never included; they are logged at the failure site.
    pub fn user_message(&self) -> String {
        match self {
            ConnectError::UnknownProvider(provider) => {
                format!("'{}' is not a supported integration.", provider)
            }
            ConnectError::InvalidState => {
                "This connection attempt expired or was invalid. Please start the connection again."
                    .to_string()
            }
            ConnectError::AuthorizationDenied(_) => {
                "Access was not granted. Please start the connection again to retry.".to_string()
            }
            ConnectError::TokenExchangeFailed { .. }
            | ConnectError::NoAccessToken(_)
            | ConnectError::IdentityFetchFailed { .. } => {
                "Connection failed. Please try again.".to_string()
            }
            _ => "An internal error occurred. Please try again later.".to_string(),
        }
    }
}
