//! PM33 Connect - OAuth connection manager for PM tool integrations
//!
//! Connects a PM33 workspace to Jira, Linear, Monday.com and Asana through the
//! OAuth 2.0 authorization code flow with PKCE, and stores the resulting
//! integration records for downstream sync jobs.
//!
//! # Architecture
//!
//! - **registry**: static provider definitions plus configured credentials
//! - **providers**: one adapter per provider (live or simulated), selected once
//! - **auth**: PKCE, flow initiation, callback handling and token refresh
//! - **storage**: pending flows and integrations behind traits (memory, SQLite)
//! - **http** / **cli**: outer surfaces over [`service::ConnectService`]
//!
//! # Example
//!
//! ```rust,no_run
//! use pm33_connect::config::Config;
//! use pm33_connect::service::ConnectService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let service = ConnectService::from_config(&config).await?;
//!
//!     // Send the user agent to the returned URL
//!     let instruction = service.initiate("jira").await?;
//!     println!("{}", serde_json::to_string_pretty(&instruction)?);
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Infrastructure
pub mod config;
pub mod registry;
pub mod secrets;
pub mod storage;
pub mod telemetry;

// Connection flow
pub mod auth;
pub mod providers;
pub mod service;

// Interface layers
pub mod cli;
pub mod http;

// Re-exports for convenience
pub use error::{ConnectError, Result, StorageError};
pub use model::{Integration, PendingFlow, Provider};
pub use service::ConnectService;

/// Initialize logging for the application
pub fn init_logging() {
    init_logging_with(None);
}

/// Initialize logging with a configured default level.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging_with(level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let default_filter = match level {
        Some(level) => format!("pm33_connect={}", level),
        None => constants::DEFAULT_LOG_FILTER.to_string(),
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
