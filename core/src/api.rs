//! Wire-contract DTOs (§6): the JSON shapes an external HTTP transport
//! would adapt to/from when calling the core. No server, router, or
//! handler code lives here — these are plain serializable structs only.

use crate::types::{Context, Document, Entity, Relationship, ScopeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LearnOptions {
    pub context_id: Option<String>,
    pub context_name: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_embeddings: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LearnBatchItem {
    Text(String),
    Detailed {
        text: String,
        #[serde(default)]
        context_id: Option<String>,
        #[serde(default)]
        context_name: Option<String>,
        #[serde(default)]
        valid_from: Option<DateTime<Utc>>,
        #[serde(default)]
        valid_to: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    Documents,
    Entities,
    Both,
}

impl Default for RetrievalStrategy {
    fn default() -> Self {
        Self::Both
    }
}

fn default_max_depth() -> u32 {
    2
}

fn default_limit() -> usize {
    50
}

fn default_similarity_threshold() -> f32 {
    0.7
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskOptions {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub strategy: RetrievalStrategy,
    #[serde(default)]
    pub contexts: Vec<String>,
    pub valid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_embeddings: bool,
    #[serde(default)]
    pub include_stats: bool,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            limit: default_limit(),
            strategy: RetrievalStrategy::default(),
            contexts: Vec::new(),
            valid_at: None,
            include_embeddings: false,
            include_stats: false,
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// `POST /api/graph/extract` response body.
#[derive(Debug, Clone, Serialize)]
pub struct LearnResponse {
    pub context: Context,
    pub document: Document,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub summary: String,
    pub created: LearnCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnCounters {
    pub document: u8,
    pub entities: usize,
    pub relationships: usize,
}

/// `POST /api/graph/extract/batch` response body.
#[derive(Debug, Clone, Serialize)]
pub struct LearnBatchResponse {
    pub results: Vec<Option<LearnResponse>>,
    pub summary: BatchSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchItemError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_documents_created: usize,
    pub total_documents_reused: usize,
    pub total_entities_created: usize,
    pub total_relationships_created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub text: String,
    pub error: String,
}

/// `POST /api/graphrag/query` response body.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub context: AskContext,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<crate::response::QueryStatistics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskContext {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,
    pub summary: String,
}

/// `DELETE /api/graph/{entities,relationships}/:id` response body.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// `GET /api/health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: ComponentHealth,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `{error, message, hint?}` error envelope returned by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEntityRequest {
    pub label: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub scope_id: Option<ScopeId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRelationshipRequest {
    pub rel_type: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
