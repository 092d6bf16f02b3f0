use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{FlashcardStore, GuardedInsert, UserStore};
use crate::{
    errors::{AppError, Result},
    models::{Card, FlashcardSet, NewFlashcardSet, NewUser, Rating, Role, User, UserChanges},
    services::quota_manager::{admits, effective_limit, QuotaWindow},
};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, daily_limit, \
     last_daily_limit_update, preferences, created_at";

const SET_COLUMNS: &str = "id, title, description, created_by, created_at, cards, role, \
     username, ratings, average_rating";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(())
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    daily_limit: Option<i32>,
    last_daily_limit_update: DateTime<Utc>,
    preferences: Option<Json<HashMap<String, String>>>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self) -> Result<User> {
        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            role: parse_role(&self.role)?,
            daily_limit: effective_limit(self.daily_limit.map(i64::from)),
            last_daily_limit_update: self.last_daily_limit_update,
            preferences: self.preferences.map(|p| p.0).unwrap_or_default(),
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CreatorRow {
    role: String,
    username: String,
    daily_limit: Option<i32>,
}

#[derive(FromRow)]
struct FlashcardSetRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    cards: Json<Vec<Card>>,
    role: String,
    username: Option<String>,
    ratings: Json<Vec<Rating>>,
    average_rating: f64,
}

impl FlashcardSetRow {
    fn into_domain(self) -> Result<FlashcardSet> {
        Ok(FlashcardSet {
            id: self.id,
            title: self.title,
            description: self.description,
            created_by: self.created_by,
            created_at: self.created_at,
            cards: self.cards.0,
            role: parse_role(&self.role)?,
            username: self.username.unwrap_or_default(),
            ratings: self.ratings.0,
            average_rating: self.average_rating,
        })
    }
}

fn parse_role(value: &str) -> Result<Role> {
    Role::parse(value)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Unknown role '{}' in database", value)))
}

fn map_unique_violation(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return AppError::Conflict("Email already registered".to_string());
        }
    }
    AppError::Database(err)
}

fn users_from_rows(rows: Vec<UserRow>) -> Result<Vec<User>> {
    rows.into_iter().map(UserRow::into_domain).collect()
}

fn sets_from_rows(rows: Vec<FlashcardSetRow>) -> Result<Vec<FlashcardSet>> {
    rows.into_iter().map(FlashcardSetRow::into_domain).collect()
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY created_at",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        users_from_rows(rows)
    }

    async fn user_ids_with_role(&self, role: Role) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, daily_limit)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .bind(new_user.daily_limit as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        row.into_domain()
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                preferences = COALESCE($5, preferences)
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.password_hash)
        .bind(changes.preferences.map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        row.map(UserRow::into_domain).transpose()
    }

    async fn set_daily_limit(
        &self,
        id: Uuid,
        limit: u32,
        at: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET daily_limit = $2, last_daily_limit_update = $3
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(limit as i32)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }

    async fn set_daily_limit_for_all(&self, limit: u32, at: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("UPDATE users SET daily_limit = $1, last_daily_limit_update = $2")
                .bind(limit as i32)
                .bind(at)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl FlashcardStore for PgStore {
    async fn find_set(&self, id: Uuid) -> Result<Option<FlashcardSet>> {
        let row = sqlx::query_as::<_, FlashcardSetRow>(&format!(
            "SELECT {} FROM flashcard_sets WHERE id = $1",
            SET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FlashcardSetRow::into_domain).transpose()
    }

    async fn list_sets(&self) -> Result<Vec<FlashcardSet>> {
        let rows = sqlx::query_as::<_, FlashcardSetRow>(&format!(
            "SELECT {} FROM flashcard_sets ORDER BY created_at",
            SET_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        sets_from_rows(rows)
    }

    async fn list_sets_by_creators(&self, creators: &[Uuid]) -> Result<Vec<FlashcardSet>> {
        let rows = sqlx::query_as::<_, FlashcardSetRow>(&format!(
            "SELECT {} FROM flashcard_sets WHERE created_by = ANY($1) ORDER BY created_at",
            SET_COLUMNS
        ))
        .bind(creators)
        .fetch_all(&self.pool)
        .await?;

        sets_from_rows(rows)
    }

    async fn count_created_in(&self, creator: Uuid, window: &QuotaWindow) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM flashcard_sets
            WHERE created_by = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(creator)
        .bind(window.start)
        .bind(window.next_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn insert_within_quota(
        &self,
        draft: NewFlashcardSet,
        window: &QuotaWindow,
    ) -> Result<GuardedInsert> {
        let mut tx = self.pool.begin().await?;

        // The row lock serializes concurrent creations by the same user until
        // this transaction commits or rolls back.
        let creator = sqlx::query_as::<_, CreatorRow>(
            "SELECT role, username, daily_limit FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(draft.created_by)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(creator) = creator else {
            tx.rollback().await?;
            return Ok(GuardedInsert::UserNotFound);
        };
        let limit = effective_limit(creator.daily_limit.map(i64::from));

        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM flashcard_sets
            WHERE created_by = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(draft.created_by)
        .bind(window.start)
        .bind(window.next_start)
        .fetch_one(&mut *tx)
        .await?;

        if !admits(count.max(0) as u64, limit) {
            tx.rollback().await?;
            return Ok(GuardedInsert::LimitReached { limit });
        }

        let set = draft.into_set(parse_role(&creator.role)?, creator.username);
        sqlx::query(
            r#"
            INSERT INTO flashcard_sets
                (id, title, description, created_by, created_at, cards, role, username, ratings, average_rating)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(set.id)
        .bind(&set.title)
        .bind(&set.description)
        .bind(set.created_by)
        .bind(set.created_at)
        .bind(Json(&set.cards))
        .bind(set.role.as_str())
        .bind(&set.username)
        .bind(Json(&set.ratings))
        .bind(set.average_rating)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(GuardedInsert::Inserted(set))
    }

    async fn save_set(&self, set: &FlashcardSet) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE flashcard_sets SET
                title = $2, description = $3, cards = $4, ratings = $5, average_rating = $6
            WHERE id = $1
            "#,
        )
        .bind(set.id)
        .bind(&set.title)
        .bind(&set.description)
        .bind(Json(&set.cards))
        .bind(Json(&set.ratings))
        .bind(set.average_rating)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_set(&self, id: Uuid) -> Result<Option<FlashcardSet>> {
        let row = sqlx::query_as::<_, FlashcardSetRow>(&format!(
            "DELETE FROM flashcard_sets WHERE id = $1 RETURNING {}",
            SET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FlashcardSetRow::into_domain).transpose()
    }
}
