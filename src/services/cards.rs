use std::sync::Arc;

use uuid::Uuid;

use crate::{
    database::FlashcardStore,
    errors::{AppError, Result},
    models::FlashcardSet,
};

fn card_not_found() -> AppError {
    AppError::NotFound("Card not found".to_string())
}

pub fn toggle_card_hidden(set: &mut FlashcardSet, card_index: usize) -> Result<bool> {
    let card = set.cards.get_mut(card_index).ok_or_else(card_not_found)?;
    card.hidden = !card.hidden;
    Ok(card.hidden)
}

/// Path segments that are not a non-negative integer can never address a
/// card, so they are reported the same way as an out-of-range index.
pub fn parse_card_index(raw: &str) -> Result<usize> {
    raw.parse::<usize>().map_err(|_| card_not_found())
}

#[derive(Clone)]
pub struct CardVisibility {
    flashcards: Arc<dyn FlashcardStore>,
}

impl CardVisibility {
    pub fn new(flashcards: Arc<dyn FlashcardStore>) -> Self {
        Self { flashcards }
    }

    pub async fn toggle_hidden(&self, set_id: Uuid, card_index: usize) -> Result<FlashcardSet> {
        let mut set = self
            .flashcards
            .find_set(set_id)
            .await?
            .ok_or_else(AppError::set_not_found)?;

        let hidden = toggle_card_hidden(&mut set, card_index)?;

        if !self.flashcards.save_set(&set).await? {
            return Err(AppError::set_not_found());
        }

        tracing::debug!(set_id = %set.id, card_index, hidden, "Card visibility toggled");
        Ok(set)
    }
}
