pub mod db;
pub mod error;
pub mod ledger;
pub mod personalization;
pub mod registry;
pub mod session;
pub mod store;

pub use error::SessionError;
pub use personalization::Personalization;
pub use registry::SessionRegistry;
pub use session::{DialogSession, DialogState, PendingConfirmation};
pub use store::{ChatKind, ChatLogStore, ChatRole, NoopChatLogStore, SqliteChatLogStore};
