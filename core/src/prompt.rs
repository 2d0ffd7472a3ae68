//! Extraction prompt template (C6): the ontology-aware document the
//! ingestion pipeline serialises into the extraction LLM's system prompt.
//! Generalizes the teacher's single hard-coded `build_extraction_prompt`
//! into a user-overridable template.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeSpec {
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub required_properties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipTypeSpec {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub description: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FewShotExample {
    pub text: String,
    pub expected_json: String,
}

/// The extraction ontology: default entity/relationship types, output
/// format, rules, and few-shot examples serialised into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTemplate {
    pub role: String,
    pub task: String,
    pub entity_types: Vec<EntityTypeSpec>,
    pub relationship_types: Vec<RelationshipTypeSpec>,
    pub output_format: String,
    pub rules: Vec<String>,
    pub examples: Vec<FewShotExample>,
}

impl Default for ExtractionTemplate {
    fn default() -> Self {
        Self {
            role: "You are an expert knowledge graph extraction engine.".to_string(),
            task: "Analyze the provided text and identify relevant entities and the \
                   relationships between them."
                .to_string(),
            entity_types: vec![
                EntityTypeSpec {
                    label: "Person".to_string(),
                    description: "A named individual".to_string(),
                    examples: vec!["Alice".to_string()],
                    required_properties: vec!["name".to_string()],
                },
                EntityTypeSpec {
                    label: "Organization".to_string(),
                    description: "A company, institution, or other organized group".to_string(),
                    examples: vec!["Acme Corp".to_string()],
                    required_properties: vec!["name".to_string()],
                },
            ],
            relationship_types: vec![RelationshipTypeSpec {
                rel_type: "WORKS_FOR".to_string(),
                description: "A person is employed by an organization".to_string(),
                from: vec!["Person".to_string()],
                to: vec!["Organization".to_string()],
                examples: Vec::new(),
            }],
            output_format: "Return a single JSON object: {\"entities\": [{\"label\": ..., \
                             \"properties\": {\"name\": ...}}], \"relationships\": \
                             [{\"type\": ..., \"from\": ..., \"to\": ..., \"properties\": {}}]}"
                .to_string(),
            rules: vec![
                "Only extract explicitly mentioned information. Do not infer or hallucinate."
                    .to_string(),
                "Entity labels must start with an uppercase letter.".to_string(),
                "Relationship types must be UPPER_SNAKE_CASE.".to_string(),
                "Never emit a relationship whose from and to are the same entity.".to_string(),
            ],
            examples: Vec::new(),
        }
    }
}

/// A user-supplied partial override. Each present field fully replaces the
/// corresponding default field (array fields are replaced, not merged).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialExtractionTemplate {
    pub role: Option<String>,
    pub task: Option<String>,
    pub entity_types: Option<Vec<EntityTypeSpec>>,
    pub relationship_types: Option<Vec<RelationshipTypeSpec>>,
    pub output_format: Option<String>,
    pub rules: Option<Vec<String>>,
    pub examples: Option<Vec<FewShotExample>>,
}

impl ExtractionTemplate {
    /// Apply `over` on top of `self`: each present field in `over` replaces
    /// the corresponding field in `self` wholesale; absent fields keep the
    /// default.
    pub fn merge(mut self, over: PartialExtractionTemplate) -> Self {
        if let Some(v) = over.role {
            self.role = v;
        }
        if let Some(v) = over.task {
            self.task = v;
        }
        if let Some(v) = over.entity_types {
            self.entity_types = v;
        }
        if let Some(v) = over.relationship_types {
            self.relationship_types = v;
        }
        if let Some(v) = over.output_format {
            self.output_format = v;
        }
        if let Some(v) = over.rules {
            self.rules = v;
        }
        if let Some(v) = over.examples {
            self.examples = v;
        }
        self
    }

    /// Render the template as the extraction system prompt.
    pub fn to_system_prompt(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.role);
        out.push('\n');
        out.push_str(&self.task);
        out.push_str("\n\nEntity types:\n");
        for et in &self.entity_types {
            out.push_str(&format!("- {}: {}", et.label, et.description));
            if !et.examples.is_empty() {
                out.push_str(&format!(" (e.g. {})", et.examples.join(", ")));
            }
            out.push('\n');
        }
        out.push_str("\nRelationship types:\n");
        for rt in &self.relationship_types {
            out.push_str(&format!(
                "- {} ({} -> {}): {}\n",
                rt.rel_type,
                rt.from.join("|"),
                rt.to.join("|"),
                rt.description
            ));
        }
        out.push_str("\nOutput format:\n");
        out.push_str(&self.output_format);
        out.push_str("\n\nRules:\n");
        for rule in &self.rules {
            out.push_str(&format!("- {}\n", rule));
        }
        if !self.examples.is_empty() {
            out.push_str("\nExamples:\n");
            for ex in &self.examples {
                out.push_str(&format!("Text: {}\nJSON: {}\n", ex.text, ex.expected_json));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_mentions_entities_and_relationships() {
        let template = ExtractionTemplate::default();
        let prompt = template.to_system_prompt();
        assert!(prompt.contains("Person"));
        assert!(prompt.contains("WORKS_FOR"));
    }

    #[test]
    fn override_replaces_array_fields_wholesale() {
        let base = ExtractionTemplate::default();
        let over = PartialExtractionTemplate {
            entity_types: Some(vec![EntityTypeSpec {
                label: "Product".to_string(),
                description: "A manufactured item".to_string(),
                examples: Vec::new(),
                required_properties: Vec::new(),
            }]),
            ..Default::default()
        };
        let merged = base.merge(over);
        assert_eq!(merged.entity_types.len(), 1);
        assert_eq!(merged.entity_types[0].label, "Product");
        // relationship types fall back to the default, untouched by the override.
        assert_eq!(merged.relationship_types.len(), 1);
    }
}
