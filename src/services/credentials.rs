//! Credential resolution for incoming requests.
//!
//! Callers arrive with a user bearer token, the deployment's static API
//! key, or nothing at all. The resolver turns that into an explicit tagged
//! credential so downstream code branches on the tag instead of chained
//! fallbacks: AI calls use the user token when present and the static key
//! otherwise; database writes prefer the user identity, then the elevated
//! service role, then the static key.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub exp: i64,    // expiry timestamp
    pub iat: i64,    // issued at
}

/// A resolved credential, tagged by where it came from in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Bearer token supplied by the caller. `user_id` is set when the
    /// token decodes as one of our access tokens; a foreign token still
    /// counts as a user credential but persists anonymously.
    User {
        token: String,
        user_id: Option<i64>,
    },
    /// Elevated service role (separate pool bypassing row-level security).
    Service,
    /// Static fallback API key baked into the deployment.
    StaticKey { token: String },
}

impl Credential {
    /// Bearer token to attach to outgoing AI calls, when one exists.
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Credential::User { token, .. } => Some(token),
            Credential::StaticKey { token } => Some(token),
            Credential::Service => None,
        }
    }

    /// Decoded user id, when the caller authenticated as a user.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Credential::User { user_id, .. } => *user_id,
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct CredentialResolver {
    jwt_secret: Vec<u8>,
    has_service_role: bool,
    static_key: String,
}

impl CredentialResolver {
    pub fn new(
        jwt_secret: impl Into<Vec<u8>>,
        has_service_role: bool,
        static_key: impl Into<String>,
    ) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            has_service_role,
            static_key: static_key.into(),
        }
    }

    /// Classify the Authorization header, if any, into a tagged credential.
    /// The static key is recognized by value so it never masquerades as a
    /// user token.
    pub fn classify(&self, auth_header: Option<&str>) -> Option<Credential> {
        let token = auth_header?.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            return None;
        }
        if token == self.static_key {
            return Some(Credential::StaticKey {
                token: token.to_string(),
            });
        }
        Some(Credential::User {
            token: token.to_string(),
            user_id: self.decode_user_id(token),
        })
    }

    /// Credential for AI completion calls: user token, else static key.
    pub fn for_ai(&self, auth_header: Option<&str>) -> Credential {
        match self.classify(auth_header) {
            Some(cred) => cred,
            None => Credential::StaticKey {
                token: self.static_key.clone(),
            },
        }
    }

    /// Credential for database writes: user token, else the elevated
    /// service role, else the static key. Anonymous inserts need the
    /// service role to clear row-level security.
    pub fn for_database(&self, auth_header: Option<&str>) -> Credential {
        if let Some(cred @ Credential::User { .. }) = self.classify(auth_header) {
            return cred;
        }
        if self.has_service_role {
            return Credential::Service;
        }
        Credential::StaticKey {
            token: self.static_key.clone(),
        }
    }

    /// Validate a bearer token as an HS256 access token and return the
    /// user id. Foreign or expired tokens yield `None`.
    fn decode_user_id(&self, token: &str) -> Option<i64> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.jwt_secret),
            &validation,
        )
        .ok()?;

        token_data.claims.sub.parse::<i64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &[u8] = b"test-secret";
    const STATIC_KEY: &str = "ik_test_key";

    fn resolver(has_service_role: bool) -> CredentialResolver {
        CredentialResolver::new(SECRET.to_vec(), has_service_role, STATIC_KEY)
    }

    fn user_token(user_id: i64) -> String {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + chrono::Duration::minutes(10)).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .expect("encode token")
    }

    #[test]
    fn user_bearer_wins_everywhere() {
        let token = user_token(42);
        let header = format!("Bearer {token}");
        let r = resolver(true);

        let db = r.for_database(Some(&header));
        assert_eq!(db.user_id(), Some(42));
        let ai = r.for_ai(Some(&header));
        assert_eq!(ai.bearer_token(), Some(token.as_str()));
    }

    #[test]
    fn foreign_token_is_a_user_credential_without_identity() {
        let r = resolver(true);
        let cred = r.for_database(Some("Bearer not-a-jwt"));
        assert!(matches!(cred, Credential::User { user_id: None, .. }));
    }

    #[test]
    fn anonymous_falls_back_to_service_then_static() {
        let with_service = resolver(true);
        assert_eq!(with_service.for_database(None), Credential::Service);

        let without_service = resolver(false);
        assert_eq!(
            without_service.for_database(None),
            Credential::StaticKey {
                token: STATIC_KEY.to_string()
            }
        );
    }

    #[test]
    fn ai_chain_skips_the_service_role() {
        let r = resolver(true);
        let cred = r.for_ai(None);
        assert_eq!(cred, Credential::StaticKey {
            token: STATIC_KEY.to_string()
        });
    }

    #[test]
    fn static_key_bearer_is_recognized_by_value() {
        let r = resolver(false);
        let header = format!("Bearer {STATIC_KEY}");
        assert!(matches!(
            r.classify(Some(&header)),
            Some(Credential::StaticKey { .. })
        ));
        // and it does not count as a user identity for database writes
        assert!(matches!(
            r.for_database(Some(&header)),
            Credential::StaticKey { .. }
        ));
    }

    #[test]
    fn missing_or_malformed_header_classifies_as_none() {
        let r = resolver(false);
        assert!(r.classify(None).is_none());
        assert!(r.classify(Some("Basic abc")).is_none());
        assert!(r.classify(Some("Bearer ")).is_none());
    }
}
