//! Provider contracts the Akasha engine binds against: `EmbeddingProvider`,
//! `LLMProvider`, and `DatabaseProvider`. The engine depends only on these
//! traits, never on a concrete adapter, so tests can substitute in-memory
//! stubs (design note: pluggable providers / strategy).

use crate::errors::{DatabaseFailure, EmbeddingFailure, LLMFailure};
use crate::types::{
    DeleteOutcome, Document, Entity, Page, Relationship, ScopeId, Subgraph, SubgraphQuery,
    TemporalFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Deterministic text-to-vector mapping at a fixed dimension (C2).
///
/// Contract: vectors have length `dimensions()`; the same input yields the
/// same output within one provider instance; `embed_batch` preserves input
/// order and never returns a partial batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;
    fn provider(&self) -> &str;
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure>;

    /// Default implementation embeds sequentially; providers with a native
    /// batch API should override this for efficiency.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingFailure> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Prompted text-to-text generation (C3). Does not parse structure — the
/// caller (the extraction pipeline) is responsible for interpreting output.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;

    /// Generate a full textual response.
    ///
    /// `context` is additional grounding material appended after `prompt`
    /// (e.g. the assembled subgraph context for answer synthesis); `system_prompt`
    /// overrides the provider's default system message when present.
    async fn generate(
        &self,
        prompt: &str,
        context: &str,
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<String, LLMFailure>;

    /// Run `prompt` (the extraction system prompt, built from an
    /// `ExtractionTemplate`) against `text` at a low, deterministic
    /// temperature. Returns raw text; the extraction pipeline is responsible
    /// for locating and parsing the JSON payload within it.
    async fn extract(&self, prompt: &str, text: &str) -> Result<String, LLMFailure> {
        self.generate(prompt, text, None, EXTRACTION_TEMPERATURE).await
    }
}

/// Default temperature used for extraction calls (low, favors determinism).
pub const EXTRACTION_TEMPERATURE: f32 = 0.3;
/// Default temperature used for answer generation calls.
pub const ANSWER_TEMPERATURE: f32 = 0.7;

/// Filters shared by the two vector-search operations.
#[derive(Debug, Clone, Default)]
pub struct VectorSearchFilter {
    pub scope_id: Option<ScopeId>,
    pub contexts: Vec<String>,
    pub temporal: TemporalFilter,
}

/// The only interface through which the core touches persistent state (C4).
/// All methods are asynchronous; implementations must enforce invariants
/// 1-3 and 5 and cooperate with invariant 9 (cascading entity deletes).
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    async fn connect(&self) -> Result<(), DatabaseFailure>;
    async fn disconnect(&self) -> Result<(), DatabaseFailure>;
    async fn ping(&self) -> bool;

    /// Creates or verifies the entity and document vector indexes, sized to
    /// `dimensions`. Idempotent.
    async fn ensure_vector_index(
        &self,
        dimensions: usize,
        name: Option<&str>,
    ) -> Result<(), DatabaseFailure>;

    async fn find_entities_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
        similarity_threshold: f32,
        filter: &VectorSearchFilter,
    ) -> Result<Vec<Entity>, DatabaseFailure>;

    async fn find_documents_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
        similarity_threshold: f32,
        filter: &VectorSearchFilter,
    ) -> Result<Vec<Document>, DatabaseFailure>;

    async fn retrieve_subgraph(&self, query: &SubgraphQuery) -> Result<Subgraph, DatabaseFailure>;

    /// Bulk insert/upsert keyed by `(scope_id, lowercased name)` (invariant 3).
    /// Returns final entity records in the same order as `batch`.
    async fn create_entities(
        &self,
        batch: Vec<Entity>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Vec<Entity>, DatabaseFailure>;

    async fn find_entity_by_name(
        &self,
        name: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Entity>, DatabaseFailure>;

    async fn find_entity_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Entity>, DatabaseFailure>;

    /// Returns the entity's actual `scope_id`, ignoring the caller's scope
    /// filter entirely, or `Ok(None)` if no entity with `id` exists at all.
    /// Used only to tell a missing record apart from one that exists but
    /// sits outside the configured scope.
    async fn entity_scope_of(&self, id: &str) -> Result<Option<Option<ScopeId>>, DatabaseFailure>;

    async fn update_entity(
        &self,
        id: &str,
        props: serde_json::Map<String, serde_json::Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Entity, DatabaseFailure>;

    async fn update_entity_context_ids(
        &self,
        id: &str,
        context_id: &str,
    ) -> Result<(), DatabaseFailure>;

    /// Cascades to incident relationships and `CONTAINS_ENTITY` links
    /// (invariant 9).
    async fn delete_entity(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<DeleteOutcome, DatabaseFailure>;

    async fn list_entities(
        &self,
        label: Option<&str>,
        page: Page,
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Entity>, DatabaseFailure>;

    /// Rejects self-references; de-duplicates by `(from, to, type)` within scope.
    async fn create_relationships(
        &self,
        batch: Vec<Relationship>,
    ) -> Result<Vec<Relationship>, DatabaseFailure>;

    async fn find_relationship_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Relationship>, DatabaseFailure>;

    /// See `entity_scope_of`.
    async fn relationship_scope_of(
        &self,
        id: &str,
    ) -> Result<Option<Option<ScopeId>>, DatabaseFailure>;

    async fn update_relationship(
        &self,
        id: &str,
        props: serde_json::Map<String, serde_json::Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Relationship, DatabaseFailure>;

    async fn delete_relationship(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<DeleteOutcome, DatabaseFailure>;

    async fn list_relationships(
        &self,
        rel_type: Option<&str>,
        from_id: Option<&str>,
        to_id: Option<&str>,
        page: Page,
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Relationship>, DatabaseFailure>;

    async fn create_document(
        &self,
        document: Document,
        embedding: Vec<f32>,
    ) -> Result<Document, DatabaseFailure>;

    async fn find_document_by_text(
        &self,
        text: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Document>, DatabaseFailure>;

    async fn find_document_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Document>, DatabaseFailure>;

    /// See `entity_scope_of`.
    async fn document_scope_of(&self, id: &str) -> Result<Option<Option<ScopeId>>, DatabaseFailure>;

    async fn update_document(
        &self,
        id: &str,
        props: serde_json::Map<String, serde_json::Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Document, DatabaseFailure>;

    async fn update_document_context_ids(
        &self,
        id: &str,
        context_id: &str,
    ) -> Result<(), DatabaseFailure>;

    async fn delete_document(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<DeleteOutcome, DatabaseFailure>;

    async fn list_documents(
        &self,
        page: Page,
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Document>, DatabaseFailure>;

    /// Creates/merges a `CONTAINS_ENTITY` edge from `doc_id` to `entity_id`.
    async fn link_entity_to_document(
        &self,
        doc_id: &str,
        entity_id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Relationship, DatabaseFailure>;

    /// Deduplicated set of entities reachable by a single `CONTAINS_ENTITY` hop.
    async fn get_entities_from_documents(
        &self,
        document_ids: &[String],
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Entity>, DatabaseFailure>;
}

/// Helper kept for symmetry with the temporal-point check used by adapters.
pub fn temporal_matches(
    filter: &TemporalFilter,
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
) -> bool {
    filter.matches(valid_from, valid_to)
}
