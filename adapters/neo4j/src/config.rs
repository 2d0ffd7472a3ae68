//! Configuration for the Neo4j `DatabaseProvider`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    /// Connection URI, e.g. `bolt://localhost:7687` or `neo4j+s://<host>`.
    pub uri: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Maximum number of pooled connections.
    pub max_connections: usize,
    pub connection_timeout_ms: u64,
    /// Name of the vector index created for entity embeddings.
    pub entity_vector_index: String,
    /// Name of the vector index created for document embeddings.
    pub document_vector_index: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: Some("neo4j".to_string()),
            password: Some("neo4j".to_string()),
            max_connections: 10,
            connection_timeout_ms: 5_000,
            entity_vector_index: "akasha_entity_embedding".to_string(),
            document_vector_index: "akasha_document_embedding".to_string(),
        }
    }
}

impl Neo4jConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}
