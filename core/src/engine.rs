//! The `Akasha` engine: ingestion (`learn`/`learn_batch`), retrieval
//! (`ask`), and the entity/relationship/document CRUD surface (C7-C9, C12).
//! Holds only `Arc`-wrapped providers and an `Arc<EventEmitter>`, so it is
//! cheaply `Clone` and safely shared across tasks, mirroring the teacher's
//! `Arc<dyn GraphService>` sharing pattern.

use crate::api::*;
use crate::errors::{AkashaError, AkashaResult, ExtractionFailure};
use crate::events::{Event, EventEmitter, EventPayload, EventType};
use crate::prompt::{ExtractionTemplate, PartialExtractionTemplate};
use crate::response::{scrub_documents, scrub_entities, scrub_relationship, StatisticsBuilder};
use crate::traits::{
    DatabaseProvider, EmbeddingProvider, LLMProvider, VectorSearchFilter, ANSWER_TEMPERATURE,
};
use crate::types::{
    is_label_shaped, is_relationship_type_shaped, strip_immutable_fields, validate_property_key,
    Context, DeleteOutcome, Document, Entity, NameIndex, Page, Relationship, Scope, ScopeId,
    Subgraph, SubgraphQuery, TemporalFilter,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_CONTEXT_CHARS: usize = 200_000;

#[derive(Clone)]
pub struct Akasha {
    database: Arc<dyn DatabaseProvider>,
    embedding: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LLMProvider>,
    events: Arc<EventEmitter>,
    scope: Option<Scope>,
    extraction_template: ExtractionTemplate,
}

impl Akasha {
    pub fn new(
        database: Arc<dyn DatabaseProvider>,
        embedding: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LLMProvider>,
        scope: Option<Scope>,
        extraction_override: Option<PartialExtractionTemplate>,
        events_enabled: bool,
    ) -> Self {
        let extraction_template = match extraction_override {
            Some(over) => ExtractionTemplate::default().merge(over),
            None => ExtractionTemplate::default(),
        };
        Self {
            database,
            embedding,
            llm,
            events: Arc::new(EventEmitter::new(events_enabled)),
            scope,
            extraction_template,
        }
    }

    pub fn events(&self) -> Arc<EventEmitter> {
        self.events.clone()
    }

    fn scope_id(&self) -> Option<ScopeId> {
        self.scope.as_ref().map(|s| ScopeId::new(s.id.clone()))
    }

    async fn emit(&self, event_type: EventType, payload: EventPayload) {
        self.events
            .emit(event_type, Event::new(event_type, self.scope_id(), payload))
            .await;
    }

    // ---------------------------------------------------------------
    // Ingestion (C7/C8)
    // ---------------------------------------------------------------

    pub async fn learn(&self, text: &str, opts: LearnOptions) -> AkashaResult<LearnResponse> {
        self.learn_cancellable(text, opts, None).await
    }

    /// `learn` with an optional cooperative cancellation signal, checked
    /// between pipeline stages. On trip, already-persisted work remains and
    /// `learn.failed` is emitted with `AkashaError::Cancelled`.
    pub async fn learn_cancellable(
        &self,
        text: &str,
        opts: LearnOptions,
        mut cancel: Option<oneshot::Receiver<()>>,
    ) -> AkashaResult<LearnResponse> {
        if text.trim().is_empty() {
            return Err(AkashaError::Validation("text must not be empty".to_string()));
        }
        if let (Some(from), Some(to)) = (opts.valid_from, opts.valid_to) {
            if to <= from {
                return Err(AkashaError::Validation(
                    "validTo must be strictly greater than validFrom".to_string(),
                ));
            }
        }

        self.emit(EventType::LearnStarted, EventPayload::Text(text.to_string()))
            .await;

        let result = self.learn_inner(text, &opts, &mut cancel).await;
        if let Err(ref err) = result {
            self.emit(EventType::LearnFailed, EventPayload::Error(err.to_string()))
                .await;
        }
        result
    }

    async fn learn_inner(
        &self,
        text: &str,
        opts: &LearnOptions,
        cancel: &mut Option<oneshot::Receiver<()>>,
    ) -> AkashaResult<LearnResponse> {
        let scope_id = self.scope_id();
        let context_id = resolve_context_id(scope_id.as_ref(), opts);

        if is_cancelled(cancel) {
            return Err(AkashaError::Cancelled);
        }

        // Step 3: document dedup.
        let (document, document_created) = self
            .find_or_create_document(text, opts, &context_id, scope_id.as_ref())
            .await?;

        if is_cancelled(cancel) {
            return Err(AkashaError::Cancelled);
        }

        // Step 4: extraction.
        self.emit(EventType::ExtractionStarted, EventPayload::Empty).await;
        let envelope = self.extract(text).await?;
        self.emit(EventType::ExtractionCompleted, EventPayload::Empty)
            .await;

        if is_cancelled(cancel) {
            return Err(AkashaError::Cancelled);
        }

        // Step 5: entity dedup.
        let mut new_entities: Vec<Entity> = Vec::new();
        let mut existing_entities: Vec<Entity> = Vec::new();
        let mut seen_names: HashSet<String> = HashSet::new();

        for extracted in envelope.entities {
            let Some(name) = extracted
                .properties
                .get("name")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
            else {
                continue;
            };
            let normalized = name.to_lowercase();
            if !seen_names.insert(normalized.clone()) {
                continue;
            }

            match self
                .database
                .find_entity_by_name(&name, scope_id.as_ref())
                .await?
            {
                Some(existing) => existing_entities.push(existing),
                None => {
                    let mut entity = Entity::new(extracted.label, name);
                    entity.properties = scrub_extracted_properties(extracted.properties);
                    entity.scope_id = scope_id.clone();
                    entity.context_ids.insert(context_id.clone());
                    if let Some(valid_from) = opts.valid_from {
                        entity.valid_from = valid_from;
                    }
                    entity.valid_to = opts.valid_to;
                    new_entities.push(entity);
                }
            }
        }

        if is_cancelled(cancel) {
            return Err(AkashaError::Cancelled);
        }

        // Step 6: embed new entities in one batch call.
        let embedding_texts: Vec<String> =
            new_entities.iter().map(Entity::embedding_text).collect();
        let embeddings = if embedding_texts.is_empty() {
            Vec::new()
        } else {
            self.embedding.embed_batch(&embedding_texts).await?
        };

        // Step 7: persist new entities, then touch existing ones.
        let persisted_new = if new_entities.is_empty() {
            Vec::new()
        } else {
            self.database
                .create_entities(new_entities, embeddings)
                .await?
        };
        for entity in &existing_entities {
            self.database
                .update_entity_context_ids(&entity.id, &context_id)
                .await?;
        }
        let existing_entities: Vec<Entity> = existing_entities
            .into_iter()
            .map(|mut e| {
                e.context_ids.insert(context_id.clone());
                e
            })
            .collect();

        for entity in &persisted_new {
            self.emit(EventType::EntityCreated, EventPayload::Entity(entity.clone()))
                .await;
        }

        // Step 8: name -> id map across new and existing entities.
        let mut name_index = NameIndex::default();
        for entity in persisted_new.iter().chain(existing_entities.iter()) {
            if let Some(name) = entity.normalized_name() {
                name_index.insert(&name, entity.id.clone());
            }
        }

        if is_cancelled(cancel) {
            return Err(AkashaError::Cancelled);
        }

        // Step 9: persist relationships.
        let mut rel_batch = Vec::new();
        let mut seen_rel_keys = HashSet::new();
        for extracted in envelope.relationships {
            let from_name = extracted.from.trim().to_lowercase();
            let to_name = extracted.to.trim().to_lowercase();
            if from_name == to_name {
                continue;
            }
            let (Some(from_id), Some(to_id)) =
                (name_index.get(&from_name), name_index.get(&to_name))
            else {
                continue;
            };
            let key = (from_id.clone(), to_id.clone(), extracted.rel_type.clone());
            if !seen_rel_keys.insert(key) {
                continue;
            }
            let mut relationship = Relationship::new(from_id.clone(), to_id.clone(), extracted.rel_type);
            relationship.properties = scrub_extracted_properties(extracted.properties);
            relationship.scope_id = scope_id.clone();
            relationship.context_ids.insert(context_id.clone());
            if let Some(valid_from) = opts.valid_from {
                relationship.valid_from = valid_from;
            }
            relationship.valid_to = opts.valid_to;
            rel_batch.push(relationship);
        }

        let persisted_relationships = if rel_batch.is_empty() {
            Vec::new()
        } else {
            self.database.create_relationships(rel_batch).await?
        };
        for relationship in &persisted_relationships {
            self.emit(
                EventType::RelationshipCreated,
                EventPayload::Relationship(relationship.clone()),
            )
            .await;
        }

        if is_cancelled(cancel) {
            return Err(AkashaError::Cancelled);
        }

        // Step 10: link every touched entity to the document.
        for entity in persisted_new.iter().chain(existing_entities.iter()) {
            self.database
                .link_entity_to_document(&document.id, &entity.id, scope_id.as_ref())
                .await?;
        }

        let new_entity_count = persisted_new.len();
        let all_entities: Vec<Entity> = persisted_new
            .into_iter()
            .chain(existing_entities.into_iter())
            .collect();

        let summary = format!(
            "Learned {} new entities and {} relationships from {} characters of text.",
            all_entities.len(),
            persisted_relationships.len(),
            text.len()
        );

        let context_descriptor = Context {
            id: context_id.clone(),
            scope_id: scope_id.clone(),
            name: opts.context_name.clone(),
            source: None,
        };

        let response = LearnResponse {
            context: context_descriptor,
            document: scrub_documents(vec![document], opts.include_embeddings)
                .into_iter()
                .next()
                .expect("exactly one document"),
            entities: scrub_entities(all_entities.clone(), opts.include_embeddings),
            relationships: persisted_relationships
                .iter()
                .cloned()
                .map(|r| scrub_relationship(r, opts.include_embeddings))
                .collect(),
            summary,
            created: LearnCounters {
                document: if document_created { 1 } else { 0 },
                entities: new_entity_count,
                relationships: persisted_relationships.len(),
            },
        };

        self.emit(
            EventType::LearnCompleted,
            EventPayload::Summary(serde_json::json!({
                "documentCreated": document_created,
                "entities": response.created.entities,
                "relationships": response.created.relationships,
            })),
        )
        .await;

        Ok(response)
    }

    async fn find_or_create_document(
        &self,
        text: &str,
        opts: &LearnOptions,
        context_id: &str,
        scope_id: Option<&ScopeId>,
    ) -> AkashaResult<(Document, bool)> {
        if let Some(existing) = self.database.find_document_by_text(text, scope_id).await? {
            self.database
                .update_document_context_ids(&existing.id, context_id)
                .await?;
            let mut existing = existing;
            existing.context_ids.insert(context_id.to_string());
            return Ok((existing, false));
        }

        let embedding = self.embedding.embed(text).await?;
        let mut document = Document::new(text);
        document.scope_id = scope_id.cloned();
        document.context_ids.insert(context_id.to_string());
        if let Some(valid_from) = opts.valid_from {
            document.valid_from = valid_from;
        }
        document.valid_to = opts.valid_to;

        let created = self.database.create_document(document, embedding).await?;
        self.emit(EventType::DocumentCreated, EventPayload::Document(created.clone()))
            .await;
        Ok((created, true))
    }

    async fn extract(&self, text: &str) -> AkashaResult<ExtractionEnvelope> {
        let prompt = self.extraction_template.to_system_prompt();
        let raw = self.llm.extract(&prompt, text).await?;
        parse_extraction_envelope(&raw)
    }

    pub async fn learn_batch(
        &self,
        items: Vec<LearnBatchItem>,
        opts: LearnOptions,
    ) -> AkashaResult<LearnBatchResponse> {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut errors = Vec::new();
        let mut summary = BatchSummary {
            total,
            succeeded: 0,
            failed: 0,
            total_documents_created: 0,
            total_documents_reused: 0,
            total_entities_created: 0,
            total_relationships_created: 0,
        };

        for (index, item) in items.into_iter().enumerate() {
            let (text, item_opts) = merge_batch_item(item, &opts);
            match self.learn(&text, item_opts).await {
                Ok(response) => {
                    summary.succeeded += 1;
                    if response.created.document == 1 {
                        summary.total_documents_created += 1;
                    } else {
                        summary.total_documents_reused += 1;
                    }
                    summary.total_entities_created += response.created.entities;
                    summary.total_relationships_created += response.created.relationships;
                    results.push(Some(response));
                }
                Err(err) => {
                    summary.failed += 1;
                    errors.push(BatchItemError {
                        index,
                        text: text.clone(),
                        error: err.to_string(),
                    });
                    results.push(None);
                }
            }

            self.emit(
                EventType::BatchProgress,
                EventPayload::Progress {
                    current: index + 1,
                    total,
                    completed: summary.succeeded,
                    failed: summary.failed,
                },
            )
            .await;
        }

        self.emit(
            EventType::BatchCompleted,
            EventPayload::Summary(serde_json::to_value(&summary).unwrap_or(Value::Null)),
        )
        .await;

        Ok(LearnBatchResponse {
            results,
            summary,
            errors,
        })
    }

    // ---------------------------------------------------------------
    // Retrieval (C9)
    // ---------------------------------------------------------------

    pub async fn ask(&self, question: &str, opts: AskOptions) -> AkashaResult<AskResponse> {
        if question.trim().is_empty() {
            return Err(AkashaError::Validation("question must not be empty".to_string()));
        }

        self.emit(EventType::QueryStarted, EventPayload::Text(question.to_string()))
            .await;

        let overall_start = Instant::now();
        let mut stats = StatisticsBuilder::default();
        let scope_id = self.scope_id();
        let filter = VectorSearchFilter {
            scope_id: scope_id.clone(),
            contexts: opts.contexts.clone(),
            temporal: TemporalFilter { valid_at: opts.valid_at },
        };

        let search_start = Instant::now();
        let query_vector = self.embedding.embed(question).await?;

        let search_documents = matches!(
            opts.strategy,
            RetrievalStrategy::Documents | RetrievalStrategy::Both
        );
        let search_entities = matches!(
            opts.strategy,
            RetrievalStrategy::Entities | RetrievalStrategy::Both
        );

        let mut seen_entity_ids = HashSet::new();
        let mut entity_seed = Vec::new();
        let mut surviving_docs = Vec::new();

        if search_documents {
            let found = self
                .database
                .find_documents_by_vector(&query_vector, opts.limit, opts.similarity_threshold, &filter)
                .await?;
            surviving_docs = found
                .into_iter()
                .filter(|d| d.similarity.map_or(false, |s| s >= opts.similarity_threshold))
                .collect::<Vec<_>>();

            if !surviving_docs.is_empty() {
                let doc_ids: Vec<String> = surviving_docs.iter().map(|d| d.id.clone()).collect();
                let linked = self
                    .database
                    .get_entities_from_documents(&doc_ids, scope_id.as_ref())
                    .await?;
                for entity in linked {
                    if seen_entity_ids.insert(entity.id.clone()) {
                        entity_seed.push(entity);
                    }
                }
            }
        }

        if search_entities {
            let found = self
                .database
                .find_entities_by_vector(&query_vector, opts.limit, opts.similarity_threshold, &filter)
                .await?;
            for entity in found {
                if seen_entity_ids.insert(entity.id.clone()) {
                    entity_seed.push(entity);
                }
            }
        }
        stats.search_time_ms = search_start.elapsed().as_millis() as u64;

        let subgraph_start = Instant::now();
        let mut all_entities = entity_seed.clone();
        let mut relationships = Vec::new();
        if !entity_seed.is_empty() {
            let query = SubgraphQuery {
                entity_labels: Vec::new(),
                relationship_types: Vec::new(),
                max_depth: opts.max_depth,
                limit: opts.limit,
                start_entity_ids: entity_seed.iter().map(|e| e.id.clone()).collect(),
                scope_id: scope_id.clone(),
            };
            let subgraph: Subgraph = self.database.retrieve_subgraph(&query).await?;
            for entity in subgraph.entities {
                if seen_entity_ids.insert(entity.id.clone()) {
                    all_entities.push(entity);
                }
            }
            relationships = subgraph.relationships;
        }
        stats.subgraph_retrieval_time_ms = subgraph_start.elapsed().as_millis() as u64;
        stats.entities_found = all_entities.len();
        stats.relationships_found = relationships.len();
        stats.documents_found = surviving_docs.len();

        let preamble = build_preamble(self.scope.as_ref(), &opts.contexts, opts.valid_at);
        let context_text = render_context(&preamble, &all_entities, &relationships, &surviving_docs);

        let llm_start = Instant::now();
        let system_prompt = "Answer the user's question using only the information in the \
                              provided context. If the context is insufficient, say so \
                              explicitly instead of guessing.";
        let answer = self
            .llm
            .generate(question, &context_text, Some(system_prompt), ANSWER_TEMPERATURE)
            .await?;
        stats.llm_generation_time_ms = llm_start.elapsed().as_millis() as u64;

        let statistics = if opts.include_stats {
            Some(stats.build(overall_start.elapsed().as_millis() as u64))
        } else {
            None
        };

        let summary = format!(
            "Retrieved {} entities, {} relationships, {} documents.",
            all_entities.len(),
            relationships.len(),
            surviving_docs.len()
        );

        let response = AskResponse {
            context: AskContext {
                entities: scrub_entities(all_entities, opts.include_embeddings),
                relationships: relationships
                    .into_iter()
                    .map(|r| scrub_relationship(r, opts.include_embeddings))
                    .collect(),
                documents: if search_documents {
                    Some(scrub_documents(surviving_docs, opts.include_embeddings))
                } else {
                    None
                },
                summary,
            },
            answer,
            statistics,
        };

        self.emit(EventType::QueryCompleted, EventPayload::Empty).await;
        Ok(response)
    }

    // ---------------------------------------------------------------
    // Entity/Relationship/Document CRUD surface (C12)
    // ---------------------------------------------------------------

    pub async fn create_entity(
        &self,
        label: String,
        properties: serde_json::Map<String, Value>,
    ) -> AkashaResult<Entity> {
        if !is_label_shaped(&label) {
            return Err(AkashaError::Validation(format!("'{}' is not a valid entity label", label)));
        }
        let name = properties
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AkashaError::Validation("properties.name is required".to_string()))?;

        let mut entity = Entity::new(label, name);
        entity.properties = scrub_extracted_properties(properties);
        entity.scope_id = self.scope_id();

        let embedding = self.embedding.embed(&entity.embedding_text()).await?;
        let mut persisted = self.database.create_entities(vec![entity], vec![embedding]).await?;
        let entity = persisted.pop().ok_or_else(|| {
            AkashaError::Database(crate::errors::DatabaseFailure::Other(
                "create_entities returned no records".to_string(),
            ))
        })?;
        self.emit(EventType::EntityCreated, EventPayload::Entity(entity.clone()))
            .await;
        Ok(entity)
    }

    pub async fn find_entity(&self, id: &str) -> AkashaResult<Entity> {
        if let Some(entity) = self.database.find_entity_by_id(id, self.scope_id().as_ref()).await? {
            return Ok(entity);
        }
        match self.database.entity_scope_of(id).await? {
            Some(actual_scope) if actual_scope != self.scope_id() => Err(AkashaError::ScopeViolation(
                format!("entity '{}' exists outside the configured scope", id),
            )),
            _ => Err(AkashaError::NotFound(format!("entity '{}' not found", id))),
        }
    }

    pub async fn update_entity(
        &self,
        id: &str,
        properties: serde_json::Map<String, Value>,
    ) -> AkashaResult<Entity> {
        let scrubbed = strip_immutable_fields(properties);
        self.database
            .update_entity(id, scrubbed, self.scope_id().as_ref())
            .await
            .map_err(AkashaError::from)
    }

    pub async fn delete_entity(&self, id: &str) -> AkashaResult<DeleteOutcome> {
        let outcome = self
            .database
            .delete_entity(id, self.scope_id().as_ref())
            .await?;
        if outcome.deleted {
            self.emit(
                EventType::EntityDeleted,
                EventPayload::Text(id.to_string()),
            )
            .await;
        }
        Ok(outcome)
    }

    pub async fn list_entities(&self, label: Option<&str>, page: Page) -> AkashaResult<Vec<Entity>> {
        self.database
            .list_entities(label, page, self.scope_id().as_ref())
            .await
            .map_err(AkashaError::from)
    }

    pub async fn create_relationship(
        &self,
        rel_type: String,
        from: String,
        to: String,
        properties: serde_json::Map<String, Value>,
    ) -> AkashaResult<Relationship> {
        if !is_relationship_type_shaped(&rel_type) {
            return Err(AkashaError::Validation(format!(
                "'{}' is not a valid relationship type",
                rel_type
            )));
        }
        if from == to {
            return Err(AkashaError::Validation(
                "relationship from and to must differ".to_string(),
            ));
        }
        let mut relationship = Relationship::new(from, to, rel_type);
        relationship.properties = scrub_extracted_properties(properties);
        relationship.scope_id = self.scope_id();

        let mut persisted = self.database.create_relationships(vec![relationship]).await?;
        let relationship = persisted.pop().ok_or_else(|| {
            AkashaError::Database(crate::errors::DatabaseFailure::Other(
                "create_relationships returned no records".to_string(),
            ))
        })?;
        self.emit(
            EventType::RelationshipCreated,
            EventPayload::Relationship(relationship.clone()),
        )
        .await;
        Ok(relationship)
    }

    pub async fn find_relationship(&self, id: &str) -> AkashaResult<Relationship> {
        if let Some(relationship) = self
            .database
            .find_relationship_by_id(id, self.scope_id().as_ref())
            .await?
        {
            return Ok(relationship);
        }
        match self.database.relationship_scope_of(id).await? {
            Some(actual_scope) if actual_scope != self.scope_id() => Err(AkashaError::ScopeViolation(
                format!("relationship '{}' exists outside the configured scope", id),
            )),
            _ => Err(AkashaError::NotFound(format!("relationship '{}' not found", id))),
        }
    }

    pub async fn update_relationship(
        &self,
        id: &str,
        properties: serde_json::Map<String, Value>,
    ) -> AkashaResult<Relationship> {
        let scrubbed = strip_immutable_fields(properties);
        self.database
            .update_relationship(id, scrubbed, self.scope_id().as_ref())
            .await
            .map_err(AkashaError::from)
    }

    pub async fn delete_relationship(&self, id: &str) -> AkashaResult<DeleteOutcome> {
        let outcome = self
            .database
            .delete_relationship(id, self.scope_id().as_ref())
            .await?;
        if outcome.deleted {
            self.emit(
                EventType::RelationshipDeleted,
                EventPayload::Text(id.to_string()),
            )
            .await;
        }
        Ok(outcome)
    }

    pub async fn list_relationships(
        &self,
        rel_type: Option<&str>,
        from_id: Option<&str>,
        to_id: Option<&str>,
        page: Page,
    ) -> AkashaResult<Vec<Relationship>> {
        self.database
            .list_relationships(rel_type, from_id, to_id, page, self.scope_id().as_ref())
            .await
            .map_err(AkashaError::from)
    }

    pub async fn find_document(&self, id: &str) -> AkashaResult<Document> {
        if let Some(document) = self.database.find_document_by_id(id, self.scope_id().as_ref()).await? {
            return Ok(document);
        }
        match self.database.document_scope_of(id).await? {
            Some(actual_scope) if actual_scope != self.scope_id() => Err(AkashaError::ScopeViolation(
                format!("document '{}' exists outside the configured scope", id),
            )),
            _ => Err(AkashaError::NotFound(format!("document '{}' not found", id))),
        }
    }

    pub async fn update_document(
        &self,
        id: &str,
        properties: serde_json::Map<String, Value>,
    ) -> AkashaResult<Document> {
        let scrubbed = strip_immutable_fields(properties);
        self.database
            .update_document(id, scrubbed, self.scope_id().as_ref())
            .await
            .map_err(AkashaError::from)
    }

    pub async fn delete_document(&self, id: &str) -> AkashaResult<DeleteOutcome> {
        let outcome = self
            .database
            .delete_document(id, self.scope_id().as_ref())
            .await?;
        if outcome.deleted {
            self.emit(
                EventType::DocumentDeleted,
                EventPayload::Text(id.to_string()),
            )
            .await;
        }
        Ok(outcome)
    }

    pub async fn list_documents(&self, page: Page) -> AkashaResult<Vec<Document>> {
        self.database
            .list_documents(page, self.scope_id().as_ref())
            .await
            .map_err(AkashaError::from)
    }
}

fn is_cancelled(cancel: &mut Option<oneshot::Receiver<()>>) -> bool {
    match cancel {
        Some(rx) => matches!(rx.try_recv(), Ok(())),
        None => false,
    }
}

fn resolve_context_id(scope_id: Option<&ScopeId>, opts: &LearnOptions) -> String {
    if let Some(id) = &opts.context_id {
        return id.clone();
    }
    if let Some(name) = &opts.context_name {
        let key = format!("{}:{}", scope_id.map(ScopeId::as_str).unwrap_or(""), name);
        return Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
            .hyphenated()
            .to_string();
    }
    Uuid::new_v4().to_string()
}

fn merge_batch_item(item: LearnBatchItem, defaults: &LearnOptions) -> (String, LearnOptions) {
    match item {
        LearnBatchItem::Text(text) => (text, defaults.clone()),
        LearnBatchItem::Detailed {
            text,
            context_id,
            context_name,
            valid_from,
            valid_to,
        } => {
            let opts = LearnOptions {
                context_id: context_id.or_else(|| defaults.context_id.clone()),
                context_name: context_name.or_else(|| defaults.context_name.clone()),
                valid_from: valid_from.or(defaults.valid_from),
                valid_to: valid_to.or(defaults.valid_to),
                include_embeddings: defaults.include_embeddings,
            };
            (text, opts)
        }
    }
}

/// Drops any property key that is not identifier-shaped or is reserved.
/// Extraction output is untrusted and must pass the same checks as any
/// other user input before it reaches persistence.
fn scrub_extracted_properties(
    properties: serde_json::Map<String, Value>,
) -> serde_json::Map<String, Value> {
    properties
        .into_iter()
        .filter(|(key, _)| key == "name" || validate_property_key(key).is_ok())
        .collect()
}

struct ExtractionEnvelope {
    entities: Vec<ExtractedEntity>,
    relationships: Vec<ExtractedRelationship>,
}

struct ExtractedEntity {
    label: String,
    properties: serde_json::Map<String, Value>,
}

struct ExtractedRelationship {
    rel_type: String,
    from: String,
    to: String,
    properties: serde_json::Map<String, Value>,
}

#[derive(serde::Deserialize)]
struct RawExtractionEnvelope {
    #[serde(default)]
    entities: Vec<RawExtractedEntity>,
    #[serde(default)]
    relationships: Vec<RawExtractedRelationship>,
}

#[derive(serde::Deserialize)]
struct RawExtractedEntity {
    label: String,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

#[derive(serde::Deserialize)]
struct RawExtractedRelationship {
    #[serde(rename = "type")]
    rel_type: String,
    from: String,
    to: String,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

/// Tolerant JSON parsing (accepts ```json fenced blocks, matching the
/// teacher's `parse_extraction_response`), followed by the shape checks
/// spec.md §4.6 step 4 requires. Malformed individual entities/relationships
/// are dropped rather than failing the whole call; a body that is not JSON
/// at all is an `ExtractionFailure`.
fn parse_extraction_envelope(raw: &str) -> AkashaResult<ExtractionEnvelope> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let parsed: RawExtractionEnvelope = serde_json::from_str(cleaned).map_err(|e| {
        warn!("extraction response could not be parsed as JSON: {}", e);
        AkashaError::Extraction(ExtractionFailure::ParseFailed {
            reason: e.to_string(),
        })
    })?;

    let entities = parsed
        .entities
        .into_iter()
        .filter_map(|e| {
            if !is_label_shaped(&e.label) {
                debug!("dropping extracted entity with invalid label '{}'", e.label);
                return None;
            }
            let has_name = e
                .properties
                .get("name")
                .and_then(Value::as_str)
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if !has_name {
                return None;
            }
            Some(ExtractedEntity {
                label: e.label,
                properties: e.properties,
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let relationships = parsed
        .relationships
        .into_iter()
        .filter_map(|r| {
            if !is_relationship_type_shaped(&r.rel_type) {
                return None;
            }
            if r.from.trim().is_empty() || r.to.trim().is_empty() {
                return None;
            }
            if r.from.trim().eq_ignore_ascii_case(r.to.trim()) {
                return None;
            }
            let key = (
                r.from.trim().to_lowercase(),
                r.to.trim().to_lowercase(),
                r.rel_type.clone(),
            );
            if !seen.insert(key) {
                return None;
            }
            Some(ExtractedRelationship {
                rel_type: r.rel_type,
                from: r.from,
                to: r.to,
                properties: r.properties,
            })
        })
        .collect();

    Ok(ExtractionEnvelope {
        entities,
        relationships,
    })
}

fn build_preamble(scope: Option<&Scope>, contexts: &[String], valid_at: Option<DateTime<Utc>>) -> String {
    let mut lines = Vec::new();
    if let Some(scope) = scope {
        lines.push(format!("Scope: {} ({})", scope.name, scope.id));
    }
    if !contexts.is_empty() {
        lines.push(format!("Restricted to contexts: {}", contexts.join(", ")));
    }
    if let Some(valid_at) = valid_at {
        lines.push(format!("Facts must be valid as of: {}", valid_at.to_rfc3339()));
    }
    lines.join("\n")
}

/// Renders entities/relationships/documents into LLM context text, degrading
/// through document excerpts, then relationship lines, then entity
/// properties, to stay within `MAX_CONTEXT_CHARS`.
fn render_context(
    preamble: &str,
    entities: &[Entity],
    relationships: &[Relationship],
    documents: &[Document],
) -> String {
    for degrade in 0..=2 {
        let include_documents = degrade < 1;
        let include_relationships = degrade < 2;
        let minimal_entities = degrade >= 2;
        let text = assemble_context(
            preamble,
            entities,
            relationships,
            documents,
            include_documents,
            include_relationships,
            minimal_entities,
        );
        if text.chars().count() <= MAX_CONTEXT_CHARS || degrade == 2 {
            return hard_truncate(text, MAX_CONTEXT_CHARS);
        }
    }
    unreachable!("loop always returns by degrade == 2")
}

fn assemble_context(
    preamble: &str,
    entities: &[Entity],
    relationships: &[Relationship],
    documents: &[Document],
    include_documents: bool,
    include_relationships: bool,
    minimal_entities: bool,
) -> String {
    let mut out = String::new();
    if !preamble.is_empty() {
        out.push_str(preamble);
        out.push_str("\n\n");
    }

    out.push_str("Entities:\n");
    for entity in entities {
        let name = entity
            .properties
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("(unnamed)");
        if minimal_entities {
            out.push_str(&format!("- {} ({})\n", name, entity.label));
        } else {
            out.push_str(&format!("- {}: {}\n", entity.label, entity.embedding_text()));
        }
    }

    if include_relationships {
        out.push_str("\nRelationships:\n");
        for rel in relationships {
            out.push_str(&format!("- {} --[{}]--> {}\n", rel.from, rel.rel_type, rel.to));
        }
    }

    if include_documents {
        out.push_str("\nDocument excerpts:\n");
        for doc in documents {
            out.push_str(&format!("- {}\n", doc.text));
        }
    }

    out
}

fn hard_truncate(s: String, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_context_id_is_stable_for_same_name() {
        let scope = ScopeId::new("tenant-a");
        let opts = LearnOptions {
            context_name: Some("quarterly-report".to_string()),
            ..Default::default()
        };
        let id1 = resolve_context_id(Some(&scope), &opts);
        let id2 = resolve_context_id(Some(&scope), &opts);
        assert_eq!(id1, id2);
    }

    #[test]
    fn extraction_envelope_drops_self_referential_relationships() {
        let raw = r#"{"entities": [], "relationships": [
            {"type": "KNOWS", "from": "Alice", "to": "Alice", "properties": {}}
        ]}"#;
        let envelope = parse_extraction_envelope(raw).unwrap();
        assert!(envelope.relationships.is_empty());
    }

    #[test]
    fn extraction_envelope_accepts_fenced_json() {
        let raw = "```json\n{\"entities\": [{\"label\": \"Person\", \"properties\": {\"name\": \"Alice\"}}], \"relationships\": []}\n```";
        let envelope = parse_extraction_envelope(raw).unwrap();
        assert_eq!(envelope.entities.len(), 1);
    }

    #[test]
    fn extraction_envelope_rejects_non_json() {
        let result = parse_extraction_envelope("not json at all");
        assert!(result.is_err());
    }

    #[test]
    fn context_rendering_truncates_documents_before_entities() {
        let long_doc = Document::new("x".repeat(MAX_CONTEXT_CHARS + 1000));
        let entity = Entity::new("Person", "Alice");
        let text = render_context("", std::slice::from_ref(&entity), &[], std::slice::from_ref(&long_doc));
        assert!(text.chars().count() <= MAX_CONTEXT_CHARS);
        assert!(text.contains("Alice"));
    }
}
