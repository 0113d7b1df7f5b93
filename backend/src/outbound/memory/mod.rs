//! In-process adapters used when no database or Redis URL is configured,
//! and by integration tests.
//!
//! Every store keeps its state behind a `tokio::sync::Mutex`; nothing is
//! persisted across restarts.

mod conversations;
mod notifications;
mod users;

pub use conversations::MemoryConversationRepository;
pub use notifications::MemoryNotificationLog;
pub use users::MemoryUserRepository;
