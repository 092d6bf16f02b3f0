pub mod flashcard;
pub mod user;

pub use flashcard::*;
pub use user::*;
