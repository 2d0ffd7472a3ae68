//! Response shaping (C11): embedding scrubbing and query statistics.

use crate::types::{Document, Entity, Relationship};
use serde::Serialize;

/// Remove `embedding` from an entity, preserving `_similarity` and the
/// temporal fields. A no-op wrapper kept for symmetry with `scrub_document`.
pub fn scrub_entity(entity: Entity, include_embeddings: bool) -> Entity {
    if include_embeddings {
        entity
    } else {
        entity.without_embedding()
    }
}

pub fn scrub_document(document: Document, include_embeddings: bool) -> Document {
    if include_embeddings {
        document
    } else {
        document.without_embedding()
    }
}

/// Relationships carry no embedding (spec.md §3); kept for a uniform scrub
/// call at every response-construction site.
pub fn scrub_relationship(relationship: Relationship, _include_embeddings: bool) -> Relationship {
    relationship
}

pub fn scrub_entities(entities: Vec<Entity>, include_embeddings: bool) -> Vec<Entity> {
    entities
        .into_iter()
        .map(|e| scrub_entity(e, include_embeddings))
        .collect()
}

pub fn scrub_documents(documents: Vec<Document>, include_embeddings: bool) -> Vec<Document> {
    documents
        .into_iter()
        .map(|d| scrub_document(d, include_embeddings))
        .collect()
}

/// Wall-clock timings for one `ask` call, reported when `includeStats` is set.
#[derive(Debug, Clone, Serialize)]
pub struct QueryStatistics {
    pub search_time_ms: u64,
    pub subgraph_retrieval_time_ms: u64,
    pub llm_generation_time_ms: u64,
    pub total_time_ms: u64,
    pub entities_found: usize,
    pub relationships_found: usize,
    pub documents_found: usize,
}

/// Accumulates per-stage timings across one `ask` call.
#[derive(Debug, Default)]
pub struct StatisticsBuilder {
    pub search_time_ms: u64,
    pub subgraph_retrieval_time_ms: u64,
    pub llm_generation_time_ms: u64,
    pub entities_found: usize,
    pub relationships_found: usize,
    pub documents_found: usize,
}

impl StatisticsBuilder {
    pub fn build(self, total_time_ms: u64) -> QueryStatistics {
        QueryStatistics {
            search_time_ms: self.search_time_ms,
            subgraph_retrieval_time_ms: self.subgraph_retrieval_time_ms,
            llm_generation_time_ms: self.llm_generation_time_ms,
            total_time_ms,
            entities_found: self.entities_found,
            relationships_found: self.relationships_found,
            documents_found: self.documents_found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entity;

    #[test]
    fn scrub_removes_embedding_unless_requested() {
        let mut entity = Entity::new("Person", "Alice");
        entity.embedding = Some(vec![0.1, 0.2]);

        let scrubbed = scrub_entity(entity.clone(), false);
        assert!(scrubbed.embedding.is_none());

        let kept = scrub_entity(entity, true);
        assert!(kept.embedding.is_some());
    }
}
