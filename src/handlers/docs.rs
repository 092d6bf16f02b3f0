use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::AppState;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::liveness,
        crate::handlers::health::readiness,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::admin::list_users,
        crate::handlers::admin::set_daily_limit_for_all,
        crate::handlers::admin::set_daily_limit,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
        crate::handlers::users::get_quota,
        crate::handlers::flashcards::list_all,
        crate::handlers::flashcards::list_visible,
        crate::handlers::flashcards::get_set,
        crate::handlers::flashcards::create_set,
        crate::handlers::flashcards::update_set,
        crate::handlers::flashcards::toggle_hidden,
        crate::handlers::flashcards::rate_set,
        crate::handlers::flashcards::delete_set,
    ),
    components(
        schemas(
            crate::models::Role,
            crate::models::RegisterRequest,
            crate::models::LoginRequest,
            crate::models::LoginResponse,
            crate::models::UpdateUserRequest,
            crate::models::DailyLimitRequest,
            crate::models::UserResponse,
            crate::models::QuotaStatusResponse,
            crate::models::Card,
            crate::models::Rating,
            crate::models::FlashcardSet,
            crate::models::CreateFlashcardSetRequest,
            crate::models::UpdateFlashcardSetRequest,
            crate::models::RateRequest,
            crate::models::DeletedFlashcardResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "users", description = "Registration, login and account endpoints"),
        (name = "admin", description = "Admin-only user management"),
        (name = "flashcards", description = "Flashcard set endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "Flashcard API",
        version = "1.0.0",
        description = "Flashcard study sets with per-user daily creation limits and ratings"
    )
)]
pub struct ApiDoc;

pub fn create_docs_router() -> Router<AppState> {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
