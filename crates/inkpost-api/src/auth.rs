//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs minted by the identity service; this API only
//! verifies them and attaches the subject to the request. The `admin`
//! claim gates approver/operator endpoints.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Decoded token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Operator flag
    #[serde(default)]
    pub admin: bool,
    /// Expiration
    pub exp: i64,
    /// Issued at
    #[serde(default)]
    pub iat: i64,
}

/// Authenticated user extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub admin: bool,
}

impl AuthUser {
    /// Reject non-operators.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.admin {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin access required"))
        }
    }

    /// Reject users who neither own the resource nor operate the platform.
    pub fn require_owner_or_admin(&self, owner: &str) -> Result<(), ApiError> {
        if self.admin || self.uid == owner {
            Ok(())
        } else {
            Err(ApiError::forbidden("Access denied"))
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            uid: claims.sub,
            admin: claims.admin,
        }
    }
}

/// Verify a bearer token against the shared secret.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| ApiError::unauthorized(format!("Invalid token: {e}")))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Expected bearer token"))?;

        let claims = verify_token(token, &state.config.jwt_secret)?;
        Ok(AuthUser::from(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn mint(sub: &str, admin: bool, secret: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            admin,
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_round_trip() {
        let token = mint("user-1", true, "s3cret", 3600);
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.admin);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = mint("user-1", false, "s3cret", 3600);
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = mint("user-1", false, "s3cret", -3600);
        assert!(verify_token(&token, "s3cret").is_err());
    }

    #[test]
    fn test_ownership_checks() {
        let user = AuthUser {
            uid: "user-1".into(),
            admin: false,
        };
        assert!(user.require_owner_or_admin("user-1").is_ok());
        assert!(user.require_owner_or_admin("user-2").is_err());
        assert!(user.require_admin().is_err());

        let admin = AuthUser {
            uid: "op-1".into(),
            admin: true,
        };
        assert!(admin.require_owner_or_admin("user-2").is_ok());
        assert!(admin.require_admin().is_ok());
    }
}
