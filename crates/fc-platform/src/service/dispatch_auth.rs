//! Dispatch Auth Service
//!
//! Tokens bind a processing call to one dispatch job:
//! `hex(HMAC-SHA256(app_key, job_id))`. The scheduler mints the token when it
//! queues the job and the router forwards it as a Bearer token.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Invalid auth token")]
    InvalidToken,
}

/// Checks that a bearer token was issued for a given job
pub trait AuthValidator: Send + Sync {
    fn validate_auth_token(&self, job_id: &str, token: &str) -> Result<(), AuthError>;
}

pub struct DispatchAuthService {
    app_key: Vec<u8>,
}

impl DispatchAuthService {
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into().into_bytes(),
        }
    }

    /// Service keyed with 32 random bytes, for dev mode without a configured key
    pub fn with_random_key() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { app_key: key.to_vec() }
    }

    pub fn generate_auth_token(&self, job_id: &str) -> String {
        hex::encode(self.sign(job_id))
    }

    fn sign(&self, job_id: &str) -> Vec<u8> {
        // HMAC accepts keys of any length
        let mut mac = match HmacSha256::new_from_slice(&self.app_key) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(job_id.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

impl AuthValidator for DispatchAuthService {
    fn validate_auth_token(&self, job_id: &str, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        // An unconfigured key must not accept the token for HMAC("", id)
        if self.app_key.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let presented = hex::decode(token.trim()).map_err(|_| AuthError::InvalidToken)?;
        let expected = self.sign(job_id);
        if expected.is_empty() || !bool::from(presented.as_slice().ct_eq(expected.as_slice())) {
            return Err(AuthError::InvalidToken);
        }
        Ok(())
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
