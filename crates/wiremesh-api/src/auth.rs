//! JWT authentication for the coordinator API
//!
//! Operators present tokens carrying the `admin` role. Agents present host
//! tokens whose subject is their host ID and which carry the `host` role.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;

/// Token issuer
pub const ISSUER: &str = "wiremesh";

/// Role required by the management API
pub const ROLE_ADMIN: &str = "admin";

/// Role carried by agent tokens
pub const ROLE_HOST: &str = "host";

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (operator name or host ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Issuer
    pub iss: String,
    /// Roles/permissions
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    pub fn new(subject: impl Into<String>, expiry: Duration, roles: Vec<String>) -> Self {
        let now = unix_now();
        Self {
            sub: subject.into(),
            exp: now + expiry.as_secs(),
            iat: now,
            iss: ISSUER.to_string(),
            roles,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp < unix_now()
    }

    /// Check for a role; `admin` implies every role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role || r == ROLE_ADMIN)
    }
}

/// Create a JWT token
pub fn create_token(
    secret: &str,
    subject: impl Into<String>,
    expiry: Duration,
    roles: Vec<String>,
) -> Result<String, ApiError> {
    let claims = Claims::new(subject, expiry, roles);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to create token: {}", e)))
}

/// Create a token an agent uses to sync as `host_id`
pub fn create_host_token(secret: &str, host_id: Uuid, expiry: Duration) -> Result<String, ApiError> {
    create_token(secret, host_id.to_string(), expiry, vec![ROLE_HOST.to_string()])
}

/// Verify and decode a JWT token
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[ISSUER]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        warn!(error = %e, "Token verification failed");
        ApiError::Unauthorized(format!("Invalid token: {}", e))
    })
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: String,
}

fn bearer_claims(parts: &Parts) -> Result<Claims, ApiError> {
    let auth_state = parts
        .extensions
        .get::<AuthState>()
        .ok_or_else(|| ApiError::Internal("Auth state not configured".to_string()))?;

    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized("Invalid Authorization header format".to_string())
    })?;

    let claims = verify_token(&auth_state.jwt_secret, token)?;
    if claims.is_expired() {
        return Err(ApiError::Unauthorized("Token expired".to_string()));
    }
    Ok(claims)
}

/// Authenticated operator; requires the `admin` role
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.claims.sub
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts)?;
        if !claims.has_role(ROLE_ADMIN) {
            return Err(ApiError::Forbidden(format!("Role '{}' required", ROLE_ADMIN)));
        }
        Ok(AuthUser { claims })
    }
}

/// Authenticated agent; the token subject is the host ID
#[derive(Debug, Clone)]
pub struct AuthHost {
    pub host_id: Uuid,
    pub claims: Claims,
}

impl<S> FromRequestParts<S> for AuthHost
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts)?;
        if !claims.has_role(ROLE_HOST) {
            return Err(ApiError::Forbidden(format!("Role '{}' required", ROLE_HOST)));
        }
        let host_id = claims
            .sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("Token subject is not a host ID".to_string()))?;
        Ok(AuthHost { host_id, claims })
    }
}
