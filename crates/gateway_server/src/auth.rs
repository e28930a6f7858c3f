//! Token verification for room verbs.
//!
//! Room lifecycle verbs carry an opaque signed token minted by the platform's
//! account service. The gateway never mints tokens; it only verifies them
//! through the [`TokenVerifier`] seam and trusts the resulting claims for the
//! user's identity and the space the token grants entry to.

use crate::error::GatewayError;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a verified session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Stable user identity, unchanged across reconnects
    pub user_id: String,

    /// The space this token grants entry to
    pub room_id: String,

    /// Display name, carried through for clients
    pub name: String,

    /// Expiry as Unix seconds
    pub exp: u64,
}

/// Verification seam between the wire handlers and the token scheme.
///
/// Injected into the gateway so tests and deployments can choose their own
/// scheme without touching the handlers.
pub trait TokenVerifier: Send + Sync {
    /// Checks the token's signature and expiry and returns its claims.
    fn verify(&self, token: &str) -> Result<Claims, GatewayError>;
}

/// HS256 verifier against a shared secret.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Creates a verifier for tokens signed with the given secret.
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, GatewayError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| GatewayError::AuthenticationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "unit-test-secret";

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_secs()
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("Failed to sign token")
    }

    #[test]
    fn valid_tokens_yield_their_claims() {
        let claims = Claims {
            user_id: "user-1".to_string(),
            room_id: "space-1".to_string(),
            name: "Ada".to_string(),
            exp: now() + 3600,
        };
        let token = sign(&claims, SECRET);

        let verified = JwtVerifier::new(SECRET)
            .verify(&token)
            .expect("Token should verify");
        assert_eq!(verified.user_id, "user-1");
        assert_eq!(verified.room_id, "space-1");
        assert_eq!(verified.name, "Ada");
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let claims = Claims {
            user_id: "user-1".to_string(),
            room_id: "space-1".to_string(),
            name: "Ada".to_string(),
            exp: now().saturating_sub(3600),
        };
        let token = sign(&claims, SECRET);

        let result = JwtVerifier::new(SECRET).verify(&token);
        assert!(matches!(result, Err(GatewayError::AuthenticationFailed(_))));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let claims = Claims {
            user_id: "user-1".to_string(),
            room_id: "space-1".to_string(),
            name: "Ada".to_string(),
            exp: now() + 3600,
        };
        let token = sign(&claims, "some-other-secret");

        let result = JwtVerifier::new(SECRET).verify(&token);
        assert!(matches!(result, Err(GatewayError::AuthenticationFailed(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        let result = JwtVerifier::new(SECRET).verify("not-a-token");
        assert!(matches!(result, Err(GatewayError::AuthenticationFailed(_))));
    }
}
