use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{Role, User};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub role: Role,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

/// Identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub username: String,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_duration: Duration,
}

impl JwtService {
    pub fn new(secret: &str, token_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            token_duration: Duration::hours(token_hours),
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user.id.to_string(),
            role: user.role,
            username: user.username.clone(),
            exp: (now + self.token_duration).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    /// Checks signature and expiry. Every failure collapses into
    /// `InvalidToken`; the store is never consulted.
    pub fn verify_token(&self, token: &str) -> Result<Identity> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| {
                tracing::debug!("Token rejected: {}", e);
                AppError::InvalidToken
            })?;

        let claims = token_data.claims;
        let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| AppError::InvalidToken)?;

        Ok(Identity {
            user_id,
            role: claims.role,
            username: claims.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "grace".to_string(),
            email: "grace@example.com".to_string(),
            password_hash: "hash".to_string(),
            role,
            daily_limit: 20,
            last_daily_limit_update: now,
            preferences: HashMap::new(),
            created_at: now,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let jwt_service = JwtService::new("test-secret", 24);
        let user = sample_user(Role::Admin);

        let token = jwt_service.issue_token(&user).unwrap();
        let identity = jwt_service.verify_token(&token).unwrap();

        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.username, "grace");
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let issuer = JwtService::new("secret-a", 24);
        let verifier = JwtService::new("secret-b", 24);
        let token = issuer.issue_token(&sample_user(Role::User)).unwrap();

        assert!(matches!(verifier.verify_token(&token), Err(AppError::InvalidToken)));
        assert!(matches!(verifier.verify_token("not-a-jwt"), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let jwt_service = JwtService::new("test-secret", -2);
        let token = jwt_service.issue_token(&sample_user(Role::User)).unwrap();

        assert!(matches!(jwt_service.verify_token(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_claims_use_camel_case_user_id() {
        let jwt_service = JwtService::new("test-secret", 24);
        let token = jwt_service.issue_token(&sample_user(Role::User)).unwrap();

        let claims = decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap()
        .claims;

        assert!(claims.get("userId").is_some());
        assert_eq!(claims["role"], "user");
    }
}
