//! Inbound authentication and token delegation
//!
//! Exactly one [`AuthMode`] is selected at startup. Verified callers are
//! represented by [`VerifiedClaims`]; when delegation is enabled their tokens
//! are exchanged for downstream credentials by [`TokenDelegationExchange`].

pub mod claims;
pub mod delegation;
pub mod discovery;
pub mod jwt;
pub mod metadata;
pub mod oauth_proxy;
pub mod provider;
pub mod static_tokens;

pub use claims::VerifiedClaims;
pub use delegation::{DelegatedToken, TokenDelegationExchange};
pub use discovery::{discover, OidcProviderMetadata};
pub use jwt::JwtVerifier;
pub use metadata::{bearer_challenge, AuthorizationServerMetadata, ProtectedResourceMetadata};
pub use oauth_proxy::{
    AuthorizationRequest, ClientRegistration, OAuthError, OAuthProxy, OAuthTokenResponse, RegistrationRequest,
    TokenRequest, UpstreamProvider,
};
pub use provider::AuthMode;
pub use static_tokens::StaticTokenVerifier;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a token, used wherever a token must be compared or keyed without storing it
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
