//! OAuth connection flow
//!
//! - **pkce**: verifier, challenge and state token generation
//! - **initiator**: starts a flow and returns where to send the user agent
//! - **callback**: completes a flow when the provider redirects back
//! - **client**: hands out access tokens to consumers, refreshing when needed

pub mod callback;
pub mod client;
pub mod initiator;
pub mod pkce;

#[cfg(test)]
pub(crate) mod test_support;

pub use callback::{CallbackHandler, CallbackOutcome, CallbackParams};
pub use client::OAuthClientManager;
pub use initiator::{AuthorizationInitiator, RedirectInstruction};
pub use pkce::{PkcePair, derive_challenge, generate_state, generate_verifier};

use crate::Result;
use crate::model::Integration;
use crate::providers::ProviderAdapter;
use chrono::Utc;

/// Exchange a code, look up the workspace and assemble a ready integration.
///
/// Nothing is persisted here; callers save the result only when every step succeeded.
pub(crate) async fn complete_connection(
    adapter: &dyn ProviderAdapter,
    code: &str,
    code_verifier: &str,
) -> Result<Integration> {
    let provider = adapter.provider();

    let tokens = adapter.exchange_token(code, code_verifier).await?;
    let access_token = tokens.access_token.clone().unwrap_or_default();
    let identity = adapter.fetch_identity(&access_token).await?;

    Integration::connected(
        provider,
        &adapter.config().name,
        tokens,
        identity,
        adapter.is_simulated(),
        Utc::now(),
    )
}
