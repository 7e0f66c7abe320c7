//! Environment variable based secrets provider
//!
//! Reads secrets directly from environment variables, with .env file support via dotenvy.

use super::*;

/// Default secrets provider that reads from environment variables
///
/// The only place in the crate where `std::env::var()` is read for credentials.
pub struct EnvSecretsProvider;

impl EnvSecretsProvider {
    /// Create a new environment-based secrets provider
    ///
    /// Loads the .env file from the current directory or any parent directory.
    /// A missing .env file is not an error.
    pub fn new() -> Self {
        let _ = dotenvy::dotenv();

        Self
    }
}

impl Default for EnvSecretsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SecretsProvider for EnvSecretsProvider {
    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        Ok(std::env::var(key).ok().filter(|v| !v.is_empty()))
    }
}
