//! Conversation persistence for lokal.
//!
//! All stores implement `lokal_core::ConversationStore`. The agent never
//! writes to a store directly: it hands finished exchanges to a
//! [`ConversationWriter`], which applies them in order off the reply path.

pub mod in_memory;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use writer::ConversationWriter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
