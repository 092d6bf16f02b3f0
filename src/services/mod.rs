pub mod cards;
pub mod metrics;
pub mod quota_manager;
pub mod rating;

pub use cards::*;
pub use metrics::*;
pub use quota_manager::*;
pub use rating::*;
