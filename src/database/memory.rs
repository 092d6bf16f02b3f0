//! In-process backend for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FlashcardStore, GuardedInsert, UserStore};
use crate::{
    errors::{AppError, Result},
    models::{FlashcardSet, NewFlashcardSet, NewUser, Role, User, UserChanges},
    services::quota_manager::{admits, effective_limit, QuotaWindow},
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    // Insertion order doubles as creation order.
    sets: Vec<FlashcardSet>,
}

/// Both collections sit behind one lock so the guarded insert can read the
/// creator, count, and push without interleaving.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(tables: &Tables, email: &str, except: Option<Uuid>) -> bool {
    tables
        .users
        .values()
        .any(|user| user.email == email && Some(user.id) != except)
}

fn email_conflict() -> AppError {
    AppError::Conflict("Email already registered".to_string())
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|user| user.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by_key(|user| user.created_at);
        Ok(users)
    }

    async fn user_ids_with_role(&self, role: Role) -> Result<Vec<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|user| user.role == role)
            .map(|user| user.id)
            .collect())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if email_taken(&tables, &new_user.email, None) {
            return Err(email_conflict());
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            daily_limit: new_user.daily_limit,
            last_daily_limit_update: now,
            preferences: HashMap::new(),
            created_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(email) = changes.email.as_deref() {
            if email_taken(&tables, email, Some(id)) {
                return Err(email_conflict());
            }
        }

        Ok(tables.users.get_mut(&id).map(|user| {
            changes.apply_to(user);
            user.clone()
        }))
    }

    async fn set_daily_limit(
        &self,
        id: Uuid,
        limit: u32,
        at: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.daily_limit = limit;
            user.last_daily_limit_update = at;
            user.clone()
        }))
    }

    async fn set_daily_limit_for_all(&self, limit: u32, at: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        for user in tables.users.values_mut() {
            user.daily_limit = limit;
            user.last_daily_limit_update = at;
        }
        Ok(tables.users.len() as u64)
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.write().await.users.remove(&id))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl FlashcardStore for MemoryStore {
    async fn find_set(&self, id: Uuid) -> Result<Option<FlashcardSet>> {
        let tables = self.tables.read().await;
        Ok(tables.sets.iter().find(|set| set.id == id).cloned())
    }

    async fn list_sets(&self) -> Result<Vec<FlashcardSet>> {
        Ok(self.tables.read().await.sets.clone())
    }

    async fn list_sets_by_creators(&self, creators: &[Uuid]) -> Result<Vec<FlashcardSet>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sets
            .iter()
            .filter(|set| creators.contains(&set.created_by))
            .cloned()
            .collect())
    }

    async fn count_created_in(&self, creator: Uuid, window: &QuotaWindow) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(count_in_window(&tables, creator, window))
    }

    async fn insert_within_quota(
        &self,
        draft: NewFlashcardSet,
        window: &QuotaWindow,
    ) -> Result<GuardedInsert> {
        let mut tables = self.tables.write().await;

        let Some(creator) = tables.users.get(&draft.created_by) else {
            return Ok(GuardedInsert::UserNotFound);
        };
        let limit = effective_limit(Some(i64::from(creator.daily_limit)));
        let (role, username) = (creator.role, creator.username.clone());

        if !admits(count_in_window(&tables, draft.created_by, window), limit) {
            return Ok(GuardedInsert::LimitReached { limit });
        }

        let set = draft.into_set(role, username);
        tables.sets.push(set.clone());
        Ok(GuardedInsert::Inserted(set))
    }

    async fn save_set(&self, set: &FlashcardSet) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.sets.iter_mut().find(|stored| stored.id == set.id) {
            Some(stored) => {
                stored.title = set.title.clone();
                stored.description = set.description.clone();
                stored.cards = set.cards.clone();
                stored.ratings = set.ratings.clone();
                stored.average_rating = set.average_rating;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_set(&self, id: Uuid) -> Result<Option<FlashcardSet>> {
        let mut tables = self.tables.write().await;
        let position = tables.sets.iter().position(|set| set.id == id);
        Ok(position.map(|index| tables.sets.remove(index)))
    }
}

fn count_in_window(tables: &Tables, creator: Uuid, window: &QuotaWindow) -> u64 {
    tables
        .sets
        .iter()
        .filter(|set| set.created_by == creator && window.contains(set.created_at))
        .count() as u64
}
