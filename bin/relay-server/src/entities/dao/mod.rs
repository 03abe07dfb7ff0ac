pub mod chat;
pub mod user;

pub use chat::{ChatTurn, HistoryEntry};
pub use user::UserRecord;
