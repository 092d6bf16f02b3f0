use axum::extract::FromRequest;
use std::sync::Arc;

use crate::{
    auth::{JwtService, PasswordService},
    config::Config,
    database::{FlashcardStore, Stores, UserStore},
    errors::{AppError, Result},
    services::{CardVisibility, MetricsService, QuotaManager, RatingAggregator},
};

pub mod admin;
pub mod auth;
pub mod docs;
pub mod flashcards;
pub mod health;
pub mod metrics;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub flashcards: Arc<dyn FlashcardStore>,
    pub quota: QuotaManager,
    pub ratings: RatingAggregator,
    pub cards: CardVisibility,
    pub jwt: Arc<JwtService>,
    pub passwords: PasswordService,
    pub config: Arc<Config>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores) -> Result<Self> {
        let Stores { users, flashcards } = stores;

        Ok(Self {
            quota: QuotaManager::new(users.clone(), flashcards.clone()),
            ratings: RatingAggregator::new(users.clone(), flashcards.clone()),
            cards: CardVisibility::new(flashcards.clone()),
            jwt: Arc::new(JwtService::new(&config.jwt_secret, config.jwt_expiry_hours)),
            passwords: PasswordService::new(config.bcrypt_cost),
            metrics: Arc::new(MetricsService::new()?),
            config: Arc::new(config),
            users,
            flashcards,
        })
    }
}

/// `axum::Json` whose rejections become 400 responses in the API's error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Trims and rejects blank strings; `None` when the field is missing or empty.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
