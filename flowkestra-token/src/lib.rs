//! # Flowkestra Token
//!
//! Signs the assertion handed to clients when an authentication flow completes,
//! and validates it again for relying services.

use flowkestra_core::Identity;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while issuing or validating assertions.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid assertion: {0}")]
    Invalid(String),
}

/// Claims carried by a completion assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Subject, the user's id at the identity provider.
    pub sub: String,
    /// Audience, the application the flow ran for.
    pub aud: String,
    /// Issuer, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiry (seconds since epoch).
    pub exp: usize,
    /// Issued at (seconds since epoch).
    pub iat: usize,
    /// Identity provider that authenticated the subject.
    pub idp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Signs and verifies HS256 completion assertions.
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: Option<String>,
}

impl TokenManager {
    /// Create a manager from a shared secret.
    ///
    /// Assertions carry no `iss` claim unless [`TokenManager::with_issuer`] is used.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: None,
        }
    }

    /// Set the `iss` claim placed on every assertion.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Issue an assertion for `identity`, scoped to `app_id`.
    pub fn issue_assertion(
        &self,
        app_id: &str,
        identity: &Identity,
        expires_in_secs: u64,
    ) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = AssertionClaims {
            sub: identity.external_id.clone(),
            aud: app_id.to_string(),
            iss: self.issuer.clone(),
            exp: now + expires_in_secs as usize,
            iat: now,
            idp: identity.provider_id.clone(),
            email: identity.email.clone(),
            username: identity.username.clone(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Validate an assertion issued for `app_id`.
    pub fn validate_assertion(
        &self,
        token: &str,
        app_id: &str,
    ) -> Result<AssertionClaims, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Invalid("empty assertion".into()));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[app_id]);
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }
        let data = decode::<AssertionClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn identity() -> Identity {
        Identity {
            provider_id: "google".into(),
            external_id: "10769150350006150715113082367".into(),
            email: Some("jsmith@example.com".into()),
            username: Some("John Smith".into()),
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn issued_assertion_validates_for_its_app() {
        let manager = TokenManager::new(b"test-secret").with_issuer("flowkestra");
        let token = manager.issue_assertion("app-1", &identity(), 300).unwrap();

        let claims = manager.validate_assertion(&token, "app-1").unwrap();
        assert_eq!(claims.sub, "10769150350006150715113082367");
        assert_eq!(claims.idp, "google");
        assert_eq!(claims.iss.as_deref(), Some("flowkestra"));
        assert_eq!(claims.email.as_deref(), Some("jsmith@example.com"));
    }

    #[test]
    fn assertion_for_another_app_is_rejected() {
        let manager = TokenManager::new(b"test-secret");
        let token = manager.issue_assertion("app-1", &identity(), 300).unwrap();
        assert!(manager.validate_assertion(&token, "app-2").is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = TokenManager::new(b"one")
            .issue_assertion("app-1", &identity(), 300)
            .unwrap();
        let other = TokenManager::new(b"two");
        assert!(matches!(
            other.validate_assertion(&token, "app-1"),
            Err(TokenError::Jwt(_))
        ));
    }

    #[test]
    fn issuer_is_only_set_through_with_issuer() {
        let plain = TokenManager::new(b"test-secret");
        let token = plain.issue_assertion("app-1", &identity(), 300).unwrap();
        assert!(plain.validate_assertion(&token, "app-1").unwrap().iss.is_none());

        let strict = TokenManager::new(b"test-secret").with_issuer("flowkestra");
        assert!(strict.validate_assertion(&token, "app-1").is_err());
    }
}
