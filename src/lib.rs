pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{admin, auth as auth_handlers, docs, flashcards, health, metrics, users, AppState};

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::list_users))
        .route("/register", post(auth_handlers::register))
        .route("/login", post(auth_handlers::login))
        .route("/daily-limit", put(admin::set_daily_limit_for_all))
        .route(
            "/:user_id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/:user_id/daily-limit", put(admin::set_daily_limit))
        .route("/:user_id/quota", get(users::get_quota))
}

fn flashcard_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(flashcards::list_visible).post(flashcards::create_set))
        .route("/all", get(flashcards::list_all))
        .route(
            "/:id",
            get(flashcards::get_set)
                .put(flashcards::update_set)
                .delete(flashcards::delete_set),
        )
        .route("/:id/hide/:card_index", put(flashcards::toggle_hidden))
        .route("/:id/rate", post(flashcards::rate_set))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .nest("/api/users", user_routes())
        .nest("/api/flashcards", flashcard_routes())
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(metrics::metrics_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::metrics_middleware,
        ))
        .merge(docs::create_docs_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
