use bcrypt::{hash, verify};
use crate::errors::{AppError, Result};

/// bcrypt wrapper. Hashing is deliberately slow, so the async helpers move it
/// off the runtime threads.
#[derive(Debug, Clone, Copy)]
pub struct PasswordService {
    cost: u32,
}

impl PasswordService {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))
    }

    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        verify(password, hash)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to verify password: {}", e)))
    }

    pub async fn hash_password_blocking(&self, password: String) -> Result<String> {
        let service = *self;
        tokio::task::spawn_blocking(move || service.hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
    }

    pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
        tokio::task::spawn_blocking(move || Self::verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
    }
}
