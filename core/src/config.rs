//! Configuration surface and static validation (C10).
//!
//! `AkashaConfig` mirrors the JSON configuration object in the external
//! interfaces contract: a database selection, embedding/LLM provider
//! selections, an optional scope, an optional extraction template override,
//! and event-emitter settings. `validate_config` is a pure function over an
//! already-deserialized config, matching the teacher's validation style
//! (`kgctl::config::KgctlConfig` loading, generalized into a validator).

use crate::prompt::PartialExtractionTemplate;
use crate::types::Scope;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSelection {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub embedding: ProviderSelection,
    pub llm: ProviderSelection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AkashaConfig {
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub scope: Option<Scope>,
    pub extraction_prompt: Option<PartialExtractionTemplate>,
    #[serde(default)]
    pub events: EventsConfig,
}

/// A single error or warning entry, keyed by the offending configuration field.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<ConfigIssue>,
}

const RECOGNIZED_DATABASE_TYPES: &[&str] = &["neo4j", "ladybug", "memory"];
const RECOGNIZED_EMBEDDING_TYPES: &[&str] = &["openai", "gemini"];
const RECOGNIZED_LLM_TYPES: &[&str] = &["openai", "anthropic", "gemini", "deepseek"];

/// Validate an already-deserialized config against spec.md §4.9's rules.
/// Never performs I/O or network calls.
pub fn validate_config(config: &AkashaConfig) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    validate_database(config, &mut errors, &mut warnings);
    validate_provider(
        "providers.embedding",
        &config.providers.embedding,
        RECOGNIZED_EMBEDDING_TYPES,
        &mut errors,
    );
    validate_provider(
        "providers.llm",
        &config.providers.llm,
        RECOGNIZED_LLM_TYPES,
        &mut errors,
    );

    if let Some(scope) = &config.scope {
        if scope.id.trim().is_empty() {
            errors.push(field_error("scope.id", "must be non-empty"));
        }
        if scope.scope_type.trim().is_empty() {
            errors.push(field_error("scope.type", "must be non-empty"));
        }
        if scope.name.trim().is_empty() {
            errors.push(field_error("scope.name", "must be non-empty"));
        }
    }

    // Extraction template override: shape-check only — deserialization
    // into `PartialExtractionTemplate` already enforces field shapes, so a
    // value that reached this point is structurally valid.

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn validate_database(
    config: &AkashaConfig,
    errors: &mut Vec<ConfigIssue>,
    warnings: &mut Vec<ConfigIssue>,
) {
    let db = &config.database;
    if !RECOGNIZED_DATABASE_TYPES.contains(&db.provider_type.as_str()) {
        errors.push(field_error(
            "database.type",
            &format!(
                "unsupported database type '{}'; supported types: {}",
                db.provider_type,
                RECOGNIZED_DATABASE_TYPES.join(", ")
            ),
        ));
        return;
    }

    match db.provider_type.as_str() {
        "neo4j" => {
            let uri = db.config.get("uri").and_then(|v| v.as_str());
            match uri {
                None | Some("") => errors.push(field_error("database.config.uri", "required")),
                Some(uri) => {
                    if !uri.starts_with("bolt://")
                        && !uri.starts_with("bolt+s://")
                        && !uri.starts_with("neo4j://")
                        && !uri.starts_with("neo4j+s://")
                    {
                        warnings.push(field_error(
                            "database.config.uri",
                            "does not look like a bolt://, bolt+s://, neo4j:// or neo4j+s:// URI",
                        ));
                    }
                }
            }
        }
        "ladybug" => {
            let path = db.config.get("path").and_then(|v| v.as_str());
            if path.map_or(true, str::is_empty) {
                errors.push(field_error("database.config.path", "required, non-empty file path"));
            }
        }
        "memory" => {}
        _ => unreachable!("checked against RECOGNIZED_DATABASE_TYPES above"),
    }
}

fn validate_provider(
    prefix: &str,
    selection: &ProviderSelection,
    recognized: &[&str],
    errors: &mut Vec<ConfigIssue>,
) {
    if !recognized.contains(&selection.provider_type.as_str()) {
        errors.push(field_error(
            &format!("{}.type", prefix),
            &format!(
                "unsupported provider type '{}'; supported types: {}",
                selection.provider_type,
                recognized.join(", ")
            ),
        ));
        return;
    }
    let api_key = selection.config.get("apiKey").and_then(|v| v.as_str());
    if api_key.map_or(true, str::is_empty) {
        errors.push(field_error(&format!("{}.config.apiKey", prefix), "required"));
    }
    let model = selection.config.get("model").and_then(|v| v.as_str());
    if model.map_or(true, str::is_empty) {
        errors.push(field_error(&format!("{}.config.model", prefix), "required"));
    }
}

fn field_error(field: &str, message: &str) -> ConfigIssue {
    ConfigIssue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Errors raised while loading configuration from file/environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl AkashaConfig {
    /// Convenience loader mirroring the teacher's `KgctlConfig::load`:
    /// merges an optional YAML file over environment variables prefixed
    /// `AKASHA_`. `validate_config` is still the source of truth for
    /// semantic validity; this only handles deserialization.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut figment = Figment::new();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigLoadError::FileNotFound(path.display().to_string()));
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed("AKASHA_").split("_"));

        figment
            .extract()
            .map_err(|e| ConfigLoadError::ParseFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AkashaConfig {
        let mut neo4j_config = serde_json::Map::new();
        neo4j_config.insert("uri".to_string(), serde_json::json!("bolt://localhost:7687"));

        let mut embedding_config = serde_json::Map::new();
        embedding_config.insert("apiKey".to_string(), serde_json::json!("sk-test"));
        embedding_config.insert("model".to_string(), serde_json::json!("text-embedding-3-small"));

        let mut llm_config = serde_json::Map::new();
        llm_config.insert("apiKey".to_string(), serde_json::json!("sk-test"));
        llm_config.insert("model".to_string(), serde_json::json!("gpt-4o"));

        AkashaConfig {
            database: DatabaseConfig {
                provider_type: "neo4j".to_string(),
                config: neo4j_config,
            },
            providers: ProvidersConfig {
                embedding: ProviderSelection {
                    provider_type: "openai".to_string(),
                    config: embedding_config,
                },
                llm: ProviderSelection {
                    provider_type: "openai".to_string(),
                    config: llm_config,
                },
            },
            scope: None,
            extraction_prompt: None,
            events: EventsConfig::default(),
        }
    }

    #[test]
    fn well_formed_config_is_valid() {
        let report = validate_config(&valid_config());
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn unsupported_database_type_is_rejected() {
        let mut config = valid_config();
        config.database.provider_type = "sqlite".to_string();
        let report = validate_config(&config);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.field == "database.type"));
    }

    #[test]
    fn missing_embedding_api_key_is_rejected() {
        let mut config = valid_config();
        config.providers.embedding.config.remove("apiKey");
        let report = validate_config(&config);
        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.field == "providers.embedding.config.apiKey"));
    }

    #[test]
    fn non_bolt_neo4j_uri_is_a_warning_not_an_error() {
        let mut config = valid_config();
        config
            .database
            .config
            .insert("uri".to_string(), serde_json::json!("http://localhost:7474"));
        let report = validate_config(&config);
        assert!(report.valid);
        assert!(!report.warnings.is_empty());
    }
}
