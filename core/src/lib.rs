//! # Akasha Core
//!
//! Core types, provider contracts, and engine logic for the Akasha GraphRAG
//! system: entity/relationship/document extraction over an LLM, hybrid
//! vector + graph retrieval, and answer synthesis. Adapters (storage) and
//! providers (embeddings, LLMs) are supplied by the caller and bound only
//! through the traits in [`traits`].

pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod prompt;
pub mod response;
pub mod traits;
pub mod types;

pub use engine::Akasha;
pub use errors::{AkashaError, AkashaResult};
pub use events::{Event, EventEmitter, EventPayload, EventType};
pub use traits::{DatabaseProvider, EmbeddingProvider, LLMProvider};
pub use types::{Context, Document, Entity, Relationship, Scope, ScopeId};

/// Convenient glob import for downstream adapters and providers.
pub mod prelude {
    pub use crate::api::*;
    pub use crate::config::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
