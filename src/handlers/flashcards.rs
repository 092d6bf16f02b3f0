use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Local;
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    handlers::{non_blank, AppJson, AppState},
    middleware::auth::AuthenticatedUser,
    models::{
        Card, CreateFlashcardSetRequest, DeletedFlashcardResponse, FlashcardSet, NewFlashcardSet,
        RateRequest, Role, UpdateFlashcardSetRequest,
    },
    services::parse_card_index,
};

/// A malformed id can never match a stored set.
fn parse_set_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::set_not_found())
}

fn validate_cards(cards: &[Card]) -> Result<()> {
    let incomplete = cards
        .iter()
        .any(|card| card.question.trim().is_empty() || card.answer.trim().is_empty());
    if incomplete {
        return Err(AppError::Validation(
            "Each card needs a question and an answer".to_string(),
        ));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/flashcards/all",
    tag = "flashcards",
    responses((status = 200, description = "Every set", body = [FlashcardSet])),
    security(("bearer" = []))
)]
pub async fn list_all(
    State(state): State<AppState>,
    _caller: AuthenticatedUser,
) -> Result<Json<Vec<FlashcardSet>>> {
    Ok(Json(state.flashcards.list_sets().await?))
}

#[utoipa::path(
    get,
    path = "/api/flashcards",
    tag = "flashcards",
    responses((status = 200, description = "Sets created by admins or the caller", body = [FlashcardSet])),
    security(("bearer" = []))
)]
pub async fn list_visible(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<FlashcardSet>>> {
    let mut creators = state.users.user_ids_with_role(Role::Admin).await?;
    if !creators.contains(&caller.user_id) {
        creators.push(caller.user_id);
    }

    Ok(Json(state.flashcards.list_sets_by_creators(&creators).await?))
}

#[utoipa::path(
    get,
    path = "/api/flashcards/{id}",
    tag = "flashcards",
    params(("id" = String, Path, description = "Set id")),
    responses(
        (status = 200, description = "The set", body = FlashcardSet),
        (status = 404, description = "Flashcard set not found")
    )
)]
pub async fn get_set(
    State(state): State<AppState>,
    Path(set_id): Path<String>,
) -> Result<Json<FlashcardSet>> {
    let set = state
        .flashcards
        .find_set(parse_set_id(&set_id)?)
        .await?
        .ok_or_else(AppError::set_not_found)?;

    Ok(Json(set))
}

#[utoipa::path(
    post,
    path = "/api/flashcards",
    tag = "flashcards",
    request_body = CreateFlashcardSetRequest,
    responses(
        (status = 201, description = "Set created", body = FlashcardSet),
        (status = 400, description = "Missing or malformed fields"),
        (status = 403, description = "Creation limit reached"),
        (status = 404, description = "User not found")
    )
)]
pub async fn create_set(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateFlashcardSetRequest>,
) -> Result<(StatusCode, Json<FlashcardSet>)> {
    let created_by = non_blank(request.created_by).ok_or_else(|| {
        AppError::Validation("User ID (createdBy) is required".to_string())
    })?;
    let created_by = Uuid::parse_str(&created_by)
        .map_err(|_| AppError::Validation("Invalid User ID format".to_string()))?;

    let title = non_blank(request.title)
        .ok_or_else(|| AppError::Validation("Title is required".to_string()))?;
    validate_cards(&request.cards)?;

    let draft = NewFlashcardSet {
        title,
        description: request.description,
        created_by,
        created_at: chrono::Utc::now(),
        cards: request.cards,
    };

    match state.quota.create_set(draft, Local::now()).await {
        Ok(set) => {
            state.metrics.record_set_created();
            tracing::info!(set_id = %set.id, user_id = %created_by, "Flashcard set created");
            Ok((StatusCode::CREATED, Json(set)))
        }
        Err(err) => {
            if matches!(err, AppError::QuotaExceeded { .. }) {
                state.metrics.record_quota_rejection();
            }
            Err(err)
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/flashcards/{id}",
    tag = "flashcards",
    params(("id" = String, Path, description = "Set id")),
    request_body = UpdateFlashcardSetRequest,
    responses(
        (status = 200, description = "Updated set", body = FlashcardSet),
        (status = 400, description = "Blank title or incomplete card"),
        (status = 404, description = "Flashcard set not found")
    )
)]
pub async fn update_set(
    State(state): State<AppState>,
    Path(set_id): Path<String>,
    AppJson(request): AppJson<UpdateFlashcardSetRequest>,
) -> Result<Json<FlashcardSet>> {
    let set_id = parse_set_id(&set_id)?;
    let mut set = state
        .flashcards
        .find_set(set_id)
        .await?
        .ok_or_else(AppError::set_not_found)?;

    if let Some(title) = request.title {
        set.title = non_blank(Some(title))
            .ok_or_else(|| AppError::Validation("Title cannot be empty".to_string()))?;
    }
    if let Some(description) = request.description {
        set.description = description.filter(|d| !d.trim().is_empty());
    }
    if let Some(cards) = request.cards {
        validate_cards(&cards)?;
        set.cards = cards;
    }

    if !state.flashcards.save_set(&set).await? {
        return Err(AppError::set_not_found());
    }

    tracing::info!(set_id = %set.id, "Flashcard set updated");
    Ok(Json(set))
}

#[utoipa::path(
    put,
    path = "/api/flashcards/{id}/hide/{card_index}",
    tag = "flashcards",
    params(
        ("id" = String, Path, description = "Set id"),
        ("card_index" = usize, Path, description = "Zero-based card position")
    ),
    responses(
        (status = 200, description = "Set with the card's hidden flag flipped", body = FlashcardSet),
        (status = 404, description = "Set or card not found")
    )
)]
pub async fn toggle_hidden(
    State(state): State<AppState>,
    Path((set_id, card_index)): Path<(String, String)>,
) -> Result<Json<FlashcardSet>> {
    let set_id = parse_set_id(&set_id)?;
    let card_index = parse_card_index(&card_index)?;

    Ok(Json(state.cards.toggle_hidden(set_id, card_index).await?))
}

#[utoipa::path(
    post,
    path = "/api/flashcards/{id}/rate",
    tag = "flashcards",
    params(("id" = String, Path, description = "Set id")),
    request_body = RateRequest,
    responses(
        (status = 200, description = "Set with the new average", body = FlashcardSet),
        (status = 400, description = "Rating outside 1..=5"),
        (status = 404, description = "Set or user not found")
    )
)]
pub async fn rate_set(
    State(state): State<AppState>,
    Path(set_id): Path<String>,
    AppJson(request): AppJson<RateRequest>,
) -> Result<Json<FlashcardSet>> {
    let set_id = parse_set_id(&set_id)?;
    let set = state
        .ratings
        .apply_rating(set_id, request.rater_id.as_deref(), request.rating.as_ref())
        .await?;

    state.metrics.record_rating();
    Ok(Json(set))
}

#[utoipa::path(
    delete,
    path = "/api/flashcards/{id}",
    tag = "flashcards",
    params(("id" = String, Path, description = "Set id")),
    responses(
        (status = 200, description = "Set deleted", body = DeletedFlashcardResponse),
        (status = 404, description = "Flashcard set not found")
    )
)]
pub async fn delete_set(
    State(state): State<AppState>,
    Path(set_id): Path<String>,
) -> Result<Json<DeletedFlashcardResponse>> {
    let deleted = state
        .flashcards
        .delete_set(parse_set_id(&set_id)?)
        .await?
        .ok_or_else(AppError::set_not_found)?;

    tracing::info!(set_id = %deleted.id, "Flashcard set deleted");
    Ok(Json(DeletedFlashcardResponse {
        message: "Flashcard set deleted".to_string(),
        deleted_flashcard: deleted,
    }))
}
