use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::Status;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no bearer credential presented")]
    Missing,
    #[error("credential is malformed or its signature is invalid")]
    Invalid,
    #[error("credential has expired")]
    Expired,
    #[error("invalid username or password")]
    Credentials,
    #[error("credential could not be verified")]
    Unexpected,
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::Unexpected => Status::InternalServerError,
            _ => Status::Unauthorized,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub company_id: Option<i64>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub.parse().map_err(|_| AuthError::Invalid)
    }
}

/// Signs and verifies bearer tokens with a shared secret.
pub struct TokenSigner {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], algorithm: Algorithm, ttl: Duration) -> Self {
        Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            config.jwt_algorithm,
            Duration::hours(config.token_ttl_hours),
        )
    }

    pub fn sign(
        &self,
        user_id: i64,
        username: &str,
        role: &str,
        company_id: Option<i64>,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            company_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        self.encode(&claims)
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding).map_err(
            |err| {
                tracing::error!(error = %err, "Failed to sign token");
                AuthError::Unexpected
            },
        )
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        match jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::Expired),
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::ImmatureSignature
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => Err(AuthError::Invalid),
                _ => {
                    tracing::error!(error = %err, "Unexpected token verification failure");
                    Err(AuthError::Unexpected)
                }
            },
        }
    }
}
