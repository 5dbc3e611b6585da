//! # lokal core
//!
//! Domain types, traits, and error definitions for the lokal agent runtime.
//! This crate has **no framework dependencies**: it defines the vocabulary
//! (turns, tools, model backends, conversation stores) that every other
//! crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here. Implementations
//! live in their respective crates, which keeps the dependency graph
//! pointing inward and lets tests swap in scripted mocks.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Role, Turn};
pub use provider::{GenerationParams, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use store::{ConversationInfo, ConversationStore};
pub use tool::{
    split_artifact, Observation, Tool, ToolArgs, ToolDefinition, ToolRegistry, ToolResult, IMAGE_MARKER,
};
