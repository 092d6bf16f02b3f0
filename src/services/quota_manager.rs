use std::sync::Arc;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, SubsecRound, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    database::{FlashcardStore, GuardedInsert, UserStore},
    errors::{AppError, Result},
    models::{FlashcardSet, NewFlashcardSet},
};

pub const DEFAULT_DAILY_LIMIT: u32 = 20;

/// The calendar day a creation is counted against, as `[start, next_start)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    pub start: DateTime<Utc>,
    pub next_start: DateTime<Utc>,
}

impl QuotaWindow {
    /// The day containing `now`, in `now`'s own time zone. Recomputed on
    /// every call.
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let day = now.date_naive();
        let next_day = day.succ_opt().unwrap_or(day);

        Self {
            start: start_of_day(&tz, day),
            next_start: start_of_day(&tz, next_day),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.next_start
    }

    /// Last representable instant of the day, for display.
    pub fn end(&self) -> DateTime<Utc> {
        self.next_start - Duration::milliseconds(1)
    }
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(start) => start.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Midnight skipped by a DST jump: the day begins at the first local
        // time that exists.
        LocalResult::None => (1..=16)
            .map(|step| midnight + Duration::minutes(15 * step))
            .find_map(|local| tz.from_local_datetime(&local).earliest())
            .map(|start| start.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
    }
}

/// Stored limits that are missing or non-positive fall back to the default.
pub fn effective_limit(stored: Option<i64>) -> u32 {
    stored
        .filter(|limit| *limit > 0)
        .and_then(|limit| u32::try_from(limit).ok())
        .unwrap_or(DEFAULT_DAILY_LIMIT)
}

/// The single admission rule shared by the status check and both store
/// backends' guarded insert.
pub fn admits(created_in_window: u64, daily_limit: u32) -> bool {
    created_in_window < u64::from(daily_limit)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    pub daily_limit: u32,
    pub used: u64,
    pub window: QuotaWindow,
}

impl QuotaStatus {
    pub fn remaining(&self) -> u64 {
        u64::from(self.daily_limit).saturating_sub(self.used)
    }

    pub fn is_available(&self) -> bool {
        admits(self.used, self.daily_limit)
    }
}

#[derive(Clone)]
pub struct QuotaManager {
    users: Arc<dyn UserStore>,
    flashcards: Arc<dyn FlashcardStore>,
}

impl QuotaManager {
    pub fn new(users: Arc<dyn UserStore>, flashcards: Arc<dyn FlashcardStore>) -> Self {
        Self { users, flashcards }
    }

    pub async fn status<Tz>(&self, user_id: Uuid, now: DateTime<Tz>) -> Result<QuotaStatus>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(AppError::user_not_found)?;

        let window = QuotaWindow::containing(&now);
        let used = self.flashcards.count_created_in(user_id, &window).await?;

        Ok(QuotaStatus {
            daily_limit: effective_limit(Some(i64::from(user.daily_limit))),
            used,
            window,
        })
    }

    /// Read-only admission check. It does not hold a slot: `create_set` is
    /// the path that counts and inserts atomically.
    pub async fn try_reserve<Tz>(&self, user_id: Uuid, now: DateTime<Tz>) -> Result<QuotaStatus>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let status = self.status(user_id, now).await?;
        if !status.is_available() {
            return Err(AppError::QuotaExceeded {
                limit: status.daily_limit,
            });
        }
        Ok(status)
    }

    pub async fn create_set<Tz>(
        &self,
        mut draft: NewFlashcardSet,
        now: DateTime<Tz>,
    ) -> Result<FlashcardSet>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let window = QuotaWindow::containing(&now);
        // Postgres keeps microseconds; both backends store the same instant.
        draft.created_at = now.with_timezone(&Utc).trunc_subsecs(6);
        let creator = draft.created_by;

        match self.flashcards.insert_within_quota(draft, &window).await? {
            GuardedInsert::Inserted(set) => Ok(set),
            GuardedInsert::LimitReached { limit } => {
                tracing::warn!(user_id = %creator, limit, "Daily creation limit reached");
                Err(AppError::QuotaExceeded { limit })
            }
            GuardedInsert::UserNotFound => Err(AppError::user_not_found()),
        }
    }
}
