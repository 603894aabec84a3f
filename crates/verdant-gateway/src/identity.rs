use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use verdant_types::api::Claims;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing token")]
    Missing,
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token lifetime overflows the clock")]
    Lifetime,
}

/// Issues and checks the HS256 tokens shared by the REST API and the
/// realtime gateway.
#[derive(Clone)]
pub struct IdentityResolver {
    secret: String,
    token_ttl: Duration,
}

impl IdentityResolver {
    pub fn new(secret: impl Into<String>, token_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            token_ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid, username: &str) -> Result<String, AuthError> {
        let exp = Utc::now()
            .checked_add_signed(self.token_ttl)
            .and_then(|at| usize::try_from(at.timestamp()).ok())
            .ok_or(AuthError::Lifetime)?;
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    pub fn resolve(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }
}
