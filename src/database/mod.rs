//! Storage ports for users and flashcard sets, plus the two backends that
//! implement them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    config::{Config, StorageBackend},
    errors::Result,
    models::{FlashcardSet, NewFlashcardSet, NewUser, Role, User, UserChanges},
    services::quota_manager::QuotaWindow,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of the atomic count-and-insert used by set creation.
#[derive(Debug)]
pub enum GuardedInsert {
    Inserted(FlashcardSet),
    LimitReached { limit: u32 },
    UserNotFound,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    async fn user_ids_with_role(&self, role: Role) -> Result<Vec<Uuid>>;

    /// Fails with `AppError::Conflict` when the email is already taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User>;

    /// Returns `None` when no such user exists. A taken email is a conflict.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>>;

    async fn set_daily_limit(
        &self,
        id: Uuid,
        limit: u32,
        at: DateTime<Utc>,
    ) -> Result<Option<User>>;

    /// Returns the number of users updated.
    async fn set_daily_limit_for_all(&self, limit: u32, at: DateTime<Utc>) -> Result<u64>;

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait FlashcardStore: Send + Sync {
    async fn find_set(&self, id: Uuid) -> Result<Option<FlashcardSet>>;

    async fn list_sets(&self) -> Result<Vec<FlashcardSet>>;

    async fn list_sets_by_creators(&self, creators: &[Uuid]) -> Result<Vec<FlashcardSet>>;

    async fn count_created_in(&self, creator: Uuid, window: &QuotaWindow) -> Result<u64>;

    /// Looks up the creator, counts their sets in `window` and inserts the
    /// draft as one atomic step, so concurrent creations cannot overshoot
    /// the limit. The creator's role and username are snapshotted onto the
    /// new set.
    async fn insert_within_quota(
        &self,
        draft: NewFlashcardSet,
        window: &QuotaWindow,
    ) -> Result<GuardedInsert>;

    /// Overwrites the mutable fields of an existing set. Returns `false` when
    /// the set no longer exists.
    async fn save_set(&self, set: &FlashcardSet) -> Result<bool>;

    async fn delete_set(&self, id: Uuid) -> Result<Option<FlashcardSet>>;
}

/// Both stores, backed by the same engine.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub flashcards: Arc<dyn FlashcardStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            flashcards: store,
        }
    }

    pub async fn connect(config: &Config) -> Result<Self> {
        match config.storage_backend {
            StorageBackend::Memory => {
                tracing::warn!("Using the in-memory store; data is lost on restart");
                Ok(Self::in_memory())
            }
            StorageBackend::Postgres => {
                let store = Arc::new(
                    PgStore::new(&config.database_url, config.database_max_connections).await?,
                );
                store.migrate().await?;
                tracing::info!("Connected to PostgreSQL and applied migrations");
                Ok(Self {
                    users: store.clone(),
                    flashcards: store,
                })
            }
        }
    }
}
