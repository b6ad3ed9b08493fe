//! Admin accounts and bearer tokens.

use argon2::{self, Config as ArgonConfig};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::AdminUser;
use crate::store::{AdminRepository, RepositoryError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Admin id.
    pub sub: String,
    pub email: String,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authorization header missing")]
    MissingToken,
    #[error("invalid authorization scheme")]
    InvalidScheme,
    #[error("invalid token")]
    InvalidToken,
    #[error("password hashing failed: {0}")]
    Hashing(#[from] argon2::Error),
    #[error("token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();
    Ok(argon2::hash_encoded(password.as_bytes(), &salt, &config)?)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    argon2::verify_encoded(hash, password.as_bytes()).unwrap_or(false)
}

/// Issues and checks HS256 admin session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>, ttl_minutes: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn issue(&self, admin: &AdminUser) -> Result<String, AuthError> {
        let expiration = (Utc::now() + self.ttl).timestamp().max(0) as usize;
        let claims = Claims {
            sub: admin.id.clone(),
            email: admin.email.clone(),
            exp: expiration,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )?)
    }

    /// Rejects bad signatures and expired tokens alike.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
    }
}

/// Checks credentials and returns a fresh token.
pub async fn login(
    admins: &dyn AdminRepository,
    issuer: &TokenIssuer,
    email: &str,
    password: &str,
) -> Result<String, AuthError> {
    let admin = admins
        .find_admin_by_email(email.trim())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&admin.password, password) {
        warn!("Failed admin login for {}", admin.email);
        return Err(AuthError::InvalidCredentials);
    }

    info!("Admin {} signed in", admin.email);
    issuer.issue(&admin)
}

/// Seeds the first admin account when none exists. Returns whether one was
/// created.
pub async fn ensure_bootstrap_admin(
    admins: &dyn AdminRepository,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<bool, AuthError> {
    if admins.count_admins().await? > 0 {
        return Ok(false);
    }

    let (Some(email), Some(password)) = (email, password) else {
        warn!("No admin account exists; set ADMIN_EMAIL and ADMIN_PASSWORD to create one");
        return Ok(false);
    };

    let admin = AdminUser {
        id: Uuid::new_v4().to_string(),
        email: email.trim().to_lowercase(),
        password: hash_password(password)?,
    };
    admins.create_admin(&admin).await?;
    info!("Created admin account {}", admin.email);
    Ok(true)
}
