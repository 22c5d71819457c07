//! JWT issue and validation.

use crate::error::{AppError, AppResult};
use crate::models::presence::{UserId, BOT_PEER_ID};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // email or username
    pub id: UserId,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtSecret {
    secret: String,
}

impl JwtSecret {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Mint a 24h token. The identity service owns issuance; this exists for
    /// tests and local tooling that share the secret.
    pub fn issue(&self, user_id: UserId, subject: &str) -> AppResult<String> {
        let exp = (Utc::now() + Duration::hours(24)).timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            id: user_id,
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Jwt(e.to_string()))
    }

    /// Verify signature and expiry, returning the user id the token encodes.
    pub fn validate(&self, token: &str) -> AppResult<UserId> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("exp".to_string());
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AppError::Jwt(e.to_string()))?;
        if data.claims.id == BOT_PEER_ID {
            return Err(AppError::Auth("reserved user id".to_string()));
        }
        Ok(data.claims.id)
    }
}
