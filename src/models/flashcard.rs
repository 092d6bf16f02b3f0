use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Card {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Rating {
    #[serde(rename = "userId")]
    pub rater_id: Uuid,
    #[serde(rename = "username")]
    pub rater_username: String,
    pub rating: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSet {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub cards: Vec<Card>,
    pub role: Role,
    pub username: String,
    pub ratings: Vec<Rating>,
    pub average_rating: f64,
}

/// A set waiting for the guarded insert. The creator's role and username are
/// filled in by the store from the same row it locks for the quota check.
#[derive(Debug, Clone)]
pub struct NewFlashcardSet {
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub cards: Vec<Card>,
}

impl NewFlashcardSet {
    pub fn into_set(self, creator_role: Role, creator_username: String) -> FlashcardSet {
        FlashcardSet {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            created_by: self.created_by,
            created_at: self.created_at,
            cards: self.cards,
            role: creator_role,
            username: creator_username,
            ratings: Vec::new(),
            average_rating: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlashcardSetRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateFlashcardSetRequest {
    pub title: Option<String>,
    /// Missing leaves the description alone; `null` clears it.
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub cards: Option<Vec<Card>>,
}

/// Maps a present field to `Some`, so `null` can be told apart from a
/// missing key.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RateRequest {
    /// Kept as text so a malformed id is reported as an unknown user.
    #[serde(rename = "userId", alias = "raterId")]
    pub rater_id: Option<String>,
    #[schema(value_type = Option<u8>)]
    pub rating: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletedFlashcardResponse {
    pub message: String,
    pub deleted_flashcard: FlashcardSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_card_hidden_defaults_to_false() {
        let card: Card = serde_json::from_value(json!({"question": "q", "answer": "a"})).unwrap();
        assert!(!card.hidden);
    }

    #[test]
    fn test_set_serializes_camel_case() {
        let draft = NewFlashcardSet {
            title: "Capitals".into(),
            description: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            cards: vec![],
        };
        let body = serde_json::to_value(draft.into_set(Role::Admin, "root".into())).unwrap();

        assert_eq!(body["averageRating"], 0.0);
        assert_eq!(body["role"], "admin");
        assert!(body.get("createdBy").is_some());
        assert!(body.get("createdAt").is_some());
    }

    #[test]
    fn test_update_request_tells_null_from_missing() {
        let missing: UpdateFlashcardSetRequest = serde_json::from_value(json!({})).unwrap();
        let cleared: UpdateFlashcardSetRequest =
            serde_json::from_value(json!({"description": null})).unwrap();
        let set: UpdateFlashcardSetRequest =
            serde_json::from_value(json!({"description": "new"})).unwrap();

        assert_eq!(missing.description, None);
        assert_eq!(cleared.description, Some(None));
        assert_eq!(set.description, Some(Some("new".to_string())));
    }

    #[test]
    fn test_rate_request_accepts_both_rater_keys() {
        let id = Uuid::new_v4();
        let a: RateRequest = serde_json::from_value(json!({"userId": id, "rating": 4})).unwrap();
        let b: RateRequest = serde_json::from_value(json!({"raterId": id, "rating": 4})).unwrap();
        assert_eq!(a.rater_id, Some(id.to_string()));
        assert_eq!(b.rater_id, Some(id.to_string()));

        let bogus: RateRequest =
            serde_json::from_value(json!({"userId": "bogus", "rating": 4})).unwrap();
        assert_eq!(bogus.rater_id.as_deref(), Some("bogus"));
    }
}
