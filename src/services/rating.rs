use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::{
    database::{FlashcardStore, UserStore},
    errors::{AppError, Result},
    models::{FlashcardSet, Rating},
};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Accepts integral JSON numbers in `[1, 5]`. `4.0` counts as an integer,
/// `4.5` does not.
pub fn validate_rating(raw: Option<&Value>) -> Result<u8> {
    let value = raw.and_then(|value| {
        value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        })
    });

    match value {
        Some(v) if (i64::from(MIN_RATING)..=i64::from(MAX_RATING)).contains(&v) => Ok(v as u8),
        _ => Err(AppError::Validation(
            "Invalid rating. Must be between 1 and 5.".to_string(),
        )),
    }
}

pub fn average_rating(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let total: u32 = ratings.iter().map(|r| u32::from(r.rating)).sum();
    f64::from(total) / ratings.len() as f64
}

/// Overwrites the rater's existing value or appends a new entry with the
/// given username snapshot, then recomputes the mean.
pub fn upsert_rating(set: &mut FlashcardSet, rater_id: Uuid, rater_username: &str, value: u8) {
    match set.ratings.iter_mut().find(|r| r.rater_id == rater_id) {
        Some(existing) => existing.rating = value,
        None => set.ratings.push(Rating {
            rater_id,
            rater_username: rater_username.to_string(),
            rating: value,
        }),
    }
    set.average_rating = average_rating(&set.ratings);
}

#[derive(Clone)]
pub struct RatingAggregator {
    users: Arc<dyn UserStore>,
    flashcards: Arc<dyn FlashcardStore>,
}

impl RatingAggregator {
    pub fn new(users: Arc<dyn UserStore>, flashcards: Arc<dyn FlashcardStore>) -> Self {
        Self { users, flashcards }
    }

    pub async fn apply_rating(
        &self,
        set_id: Uuid,
        rater_id: Option<&str>,
        raw_rating: Option<&Value>,
    ) -> Result<FlashcardSet> {
        let value = validate_rating(raw_rating)?;

        let mut set = self
            .flashcards
            .find_set(set_id)
            .await?
            .ok_or_else(AppError::set_not_found)?;

        let rater_id = rater_id
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or_else(AppError::user_not_found)?;
        let rater = self
            .users
            .find_user(rater_id)
            .await?
            .ok_or_else(AppError::user_not_found)?;

        upsert_rating(&mut set, rater.id, &rater.username, value);

        if !self.flashcards.save_set(&set).await? {
            return Err(AppError::set_not_found());
        }

        tracing::info!(
            set_id = %set.id,
            rater_id = %rater.id,
            rating = value,
            average = set.average_rating,
            "Rating applied"
        );
        Ok(set)
    }
}
