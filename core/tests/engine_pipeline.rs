//! End-to-end exercise of the `Akasha` engine against the in-memory
//! `DatabaseProvider` and deterministic stub embedding/LLM providers,
//! covering ingestion, retrieval, scope isolation, and the CRUD surface.

use akasha_adapter_memory::InMemoryDatabase;
use akasha_core::api::{AskOptions, LearnOptions};
use akasha_core::engine::Akasha;
use akasha_core::errors::{AkashaError, EmbeddingFailure, LLMFailure};
use akasha_core::traits::{EmbeddingProvider, LLMProvider};
use akasha_core::types::{Entity, Scope};
use async_trait::async_trait;
use std::sync::Arc;

fn entity_name(entity: &Entity) -> Option<&str> {
    entity.properties.get("name").and_then(|v| v.as_str())
}

/// Fixed bag-of-words vocabulary the stub embedder projects text onto, so
/// cosine similarity between a question and ingested text tracks shared
/// keywords without pulling in a real embedding model.
const VOCAB: &[&str] = &[
    "alice", "bob", "acme", "corp", "works", "paris", "france", "capital", "engineer",
];

struct StubEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    fn dimensions(&self) -> usize {
        VOCAB.len()
    }

    fn provider(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-embed-v1"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure> {
        let lowered = text.to_lowercase();
        Ok(VOCAB
            .iter()
            .map(|word| if lowered.contains(word) { 1.0 } else { 0.0 })
            .collect())
    }
}

/// Returns a fixed extraction envelope for `extract`, and a context-echoing
/// answer for `generate`, so ingestion and retrieval are exercised without a
/// real LLM.
struct StubLLMProvider;

#[async_trait]
impl LLMProvider for StubLLMProvider {
    fn provider(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-llm-v1"
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &str,
        _system_prompt: Option<&str>,
        _temperature: f32,
    ) -> Result<String, LLMFailure> {
        if context.is_empty() {
            Ok(format!("no context available for: {}", prompt))
        } else {
            Ok(format!("answer grounded in: {}", context))
        }
    }

    async fn extract(&self, _prompt: &str, text: &str) -> Result<String, LLMFailure> {
        let lowered = text.to_lowercase();
        let mut entities = Vec::new();
        let mut relationships = Vec::new();

        if lowered.contains("alice") {
            entities.push(r#"{"label": "Person", "properties": {"name": "Alice"}}"#);
        }
        if lowered.contains("acme") {
            entities.push(r#"{"label": "Organization", "properties": {"name": "Acme Corp"}}"#);
        }
        if lowered.contains("alice") && lowered.contains("acme") {
            relationships.push(
                r#"{"type": "WORKS_FOR", "from": "Alice", "to": "Acme Corp", "properties": {}}"#,
            );
        }

        Ok(format!(
            r#"{{"entities": [{}], "relationships": [{}]}}"#,
            entities.join(","),
            relationships.join(",")
        ))
    }
}

fn test_engine(scope: Option<Scope>) -> Akasha {
    test_engine_with_database(Arc::new(InMemoryDatabase::default()), scope)
}

fn test_engine_with_database(
    database: Arc<InMemoryDatabase>,
    scope: Option<Scope>,
) -> Akasha {
    Akasha::new(
        database,
        Arc::new(StubEmbeddingProvider),
        Arc::new(StubLLMProvider),
        scope,
        None,
        false,
    )
}

#[tokio::test]
async fn learn_then_ask_recovers_the_ingested_fact() {
    let engine = test_engine(None);

    let learned = engine
        .learn("Alice works for Acme Corp in Paris.", LearnOptions::default())
        .await
        .expect("learn should succeed");
    assert_eq!(learned.entities.len(), 2);
    assert_eq!(learned.relationships.len(), 1);
    assert_eq!(learned.created.entities, 2);
    assert_eq!(learned.created.relationships, 1);

    let answer = engine
        .ask("Where does Alice work?", AskOptions::default())
        .await
        .expect("ask should succeed");
    assert!(answer.context.entities.iter().any(|e| entity_name(e) == Some("Alice")));
    assert!(answer.answer.starts_with("answer grounded in:"));
}

#[tokio::test]
async fn ask_with_no_matching_context_reports_no_context() {
    let engine = test_engine(None);

    let answer = engine
        .ask("Who is the CEO of a company that was never mentioned?", AskOptions::default())
        .await
        .expect("ask should succeed even with nothing ingested");
    assert!(answer.context.entities.is_empty());
    assert!(answer.answer.starts_with("no context available"));
}

#[tokio::test]
async fn learn_rejects_empty_text() {
    let engine = test_engine(None);
    let err = engine.learn("   ", LearnOptions::default()).await.unwrap_err();
    assert!(matches!(err, AkashaError::Validation(_)));
}

#[tokio::test]
async fn scopes_isolate_entities_from_each_other() {
    let tenant_a = Scope {
        id: "tenant-a".to_string(),
        scope_type: "tenant".to_string(),
        name: "Tenant A".to_string(),
        metadata: None,
    };
    let tenant_b = Scope {
        id: "tenant-b".to_string(),
        scope_type: "tenant".to_string(),
        name: "Tenant B".to_string(),
        metadata: None,
    };

    let database = Arc::new(InMemoryDatabase::default());
    let engine_a = test_engine_with_database(database.clone(), Some(tenant_a));
    engine_a
        .learn("Alice works for Acme Corp.", LearnOptions::default())
        .await
        .unwrap();

    let engine_b = test_engine_with_database(database, Some(tenant_b));
    let answer_b = engine_b
        .ask("Where does Alice work?", AskOptions::default())
        .await
        .unwrap();
    assert!(answer_b.context.entities.is_empty());
}

#[tokio::test]
async fn find_entity_outside_configured_scope_is_a_scope_violation_not_a_miss() {
    let tenant_a = Scope {
        id: "tenant-a".to_string(),
        scope_type: "tenant".to_string(),
        name: "Tenant A".to_string(),
        metadata: None,
    };
    let tenant_b = Scope {
        id: "tenant-b".to_string(),
        scope_type: "tenant".to_string(),
        name: "Tenant B".to_string(),
        metadata: None,
    };

    let database = Arc::new(InMemoryDatabase::default());
    let engine_a = test_engine_with_database(database.clone(), Some(tenant_a));
    let bob = engine_a
        .create_entity("Person".to_string(), serde_json::json!({"name": "Bob"}).as_object().unwrap().clone())
        .await
        .unwrap();

    let engine_b = test_engine_with_database(database.clone(), Some(tenant_b));
    let err = engine_b.find_entity(&bob.id).await.unwrap_err();
    assert!(matches!(err, AkashaError::ScopeViolation(_)));

    let unscoped_engine = test_engine_with_database(database, None);
    let err = unscoped_engine.find_entity(&bob.id).await.unwrap_err();
    assert!(matches!(err, AkashaError::ScopeViolation(_)));
}

#[tokio::test]
async fn find_entity_that_truly_does_not_exist_is_not_found() {
    let engine = test_engine(None);
    let err = engine.find_entity("does-not-exist").await.unwrap_err();
    assert!(matches!(err, AkashaError::NotFound(_)));
}

#[tokio::test]
async fn repeated_learn_calls_reuse_the_same_entity_by_name() {
    let engine = test_engine(None);
    let first = engine
        .learn("Alice works for Acme Corp.", LearnOptions::default())
        .await
        .unwrap();
    let second = engine
        .learn("Alice also works for Acme Corp on weekends.", LearnOptions::default())
        .await
        .unwrap();

    let alice_first = first.entities.iter().find(|e| entity_name(e) == Some("Alice")).unwrap();
    let alice_second = second.entities.iter().find(|e| entity_name(e) == Some("Alice")).unwrap();
    assert_eq!(alice_first.id, alice_second.id);
}

#[tokio::test]
async fn crud_surface_round_trips_an_entity() {
    let engine = test_engine(None);
    let entity = engine
        .create_entity("Person".to_string(), serde_json::json!({"name": "Bob"}).as_object().unwrap().clone())
        .await
        .unwrap();

    let found = engine.find_entity(&entity.id).await.unwrap();
    assert_eq!(entity_name(&found), Some("Bob"));

    let updated = engine
        .update_entity(&entity.id, serde_json::json!({"title": "Engineer"}).as_object().unwrap().clone())
        .await
        .unwrap();
    assert_eq!(updated.properties.get("title").and_then(|v| v.as_str()), Some("Engineer"));

    let outcome = engine.delete_entity(&entity.id).await.unwrap();
    assert!(outcome.deleted);
    let err = engine.find_entity(&entity.id).await.unwrap_err();
    assert!(matches!(err, AkashaError::NotFound(_)));
}

#[tokio::test]
async fn ask_with_valid_at_excludes_entities_outside_their_validity_window() {
    use akasha_core::traits::DatabaseProvider;
    use chrono::Duration;

    let now = chrono::Utc::now();
    let alice_dim = VOCAB.iter().position(|w| *w == "alice").unwrap();
    let alice_vector: Vec<f32> = (0..VOCAB.len())
        .map(|i| if i == alice_dim { 1.0 } else { 0.0 })
        .collect();

    let mut expired = Entity::new("Person", "Alice");
    expired.valid_from = now - Duration::days(100);
    expired.valid_to = Some(now - Duration::days(50));

    let mut current = Entity::new("Person", "Zoe");
    current.valid_from = now - Duration::days(10);
    current.valid_to = None;

    let database = Arc::new(InMemoryDatabase::default());
    database
        .create_entities(vec![expired, current], vec![alice_vector.clone(), alice_vector])
        .await
        .unwrap();

    let engine = test_engine_with_database(database, None);
    let mut opts = AskOptions::default();
    opts.valid_at = Some(now);
    let answer = engine.ask("Where is Alice?", opts).await.unwrap();

    assert_eq!(answer.context.entities.len(), 1);
    assert_eq!(entity_name(&answer.context.entities[0]), Some("Zoe"));
}
