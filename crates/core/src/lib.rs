//! # Toolwright Core
//!
//! Domain types, traits, and error definitions for the Toolwright agent.
//! This crate has **no framework dependencies**: it defines the domain
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here (`Provider`, `Tool`, `SessionBackend`).
//! Implementations live in their respective crates, so tests can swap in
//! scripted providers and in-memory stores.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod schema;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError, TurnError};
pub use event::{DomainEvent, EventBus};
pub use message::{AssistantBody, Message, Role};
pub use provider::{
    ModelResponse, Provider, ProviderRequest, ProviderResponse, ProviderToolCall, StreamChunk,
    ToolDefinition, Usage,
};
pub use schema::{FieldKind, FieldSpec, ToolSchema};
pub use session::{Session, SessionBackend, SessionId, Snapshot};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, parse_arguments};
