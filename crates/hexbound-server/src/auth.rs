//! Seat tokens.
//!
//! Joining a session hands the client an HS256 JWT naming its session and
//! seat. Presenting it again with `Attach` binds a new connection to the same
//! seat, so players can reconnect.

use hexbound_core::Seat;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default token lifetime
pub const TOKEN_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Claims carried by a seat token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatClaims {
    pub session: String,
    pub seat: Seat,
    /// Expiry timestamp (Unix seconds)
    pub exp: u64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid token: {0}")]
    Invalid(String),
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        _ => AuthError::Invalid(err.to_string()),
    }
}

/// Issues and checks seat tokens.
pub struct SeatAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    validity: Duration,
}

impl SeatAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self::with_validity(secret, TOKEN_VALIDITY)
    }

    pub fn with_validity(secret: &str, validity: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            validity,
        }
    }

    /// Token for `seat` in `session`
    pub fn issue(&self, session: &str, seat: Seat) -> Result<String, AuthError> {
        let claims = SeatClaims {
            session: session.to_string(),
            seat,
            exp: jsonwebtoken::get_current_timestamp() + self.validity.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(map_jwt_error)
    }

    /// The (session, seat) a token was issued for
    pub fn authenticate(&self, token: &str) -> Result<(String, Seat), AuthError> {
        let data = decode::<SeatClaims>(token, &self.decoding, &self.validation).map_err(map_jwt_error)?;
        Ok((data.claims.session, data.claims.seat))
    }
}
