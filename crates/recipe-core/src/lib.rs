pub mod config;
pub mod error;
pub mod types;

pub use config::RecipeConfig;
pub use error::{CoreError, Result};
pub use types::{Document, MemberId, SessionId, StageName, TokenUsage};
