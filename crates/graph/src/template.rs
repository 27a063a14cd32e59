//! Template-gated Cypher access.
//!
//! A template declares its own required/optional parameters and category;
//! the registry enforces that a relation traversal not marked `Temporal`
//! only ever sees the current row (`r.fact_valid_to IS NULL`). This is what
//! prevents agents from being handed superseded relationships — the
//! "temporal amnesia" the design note in the spec warns about.

use std::collections::HashMap;

use neo4rs::BoltType;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TemplateCategory {
  Tracking,
  Relationship,
  Causality,
  Document,
  Temporal,
}

#[derive(Debug, Clone)]
pub struct GraphQueryTemplate {
  pub name: &'static str,
  pub cypher_text: &'static str,
  pub required_params: &'static [&'static str],
  pub optional_params: &'static [(&'static str, &'static str)],
  pub category: TemplateCategory,
  pub description: &'static str,
}

impl GraphQueryTemplate {
  /// Checks that every required parameter is present. Does not check types.
  pub fn validate_params(&self, params: &HashMap<String, Value>) -> Result<(), String> {
    let missing: Vec<&str> = self
      .required_params
      .iter()
      .filter(|p| !params.contains_key(**p))
      .copied()
      .collect();
    if missing.is_empty() {
      Ok(())
    } else {
      Err(format!(
        "template '{}' missing required params: {}",
        self.name,
        missing.join(", ")
      ))
    }
  }

  /// Merges optional-parameter defaults under user-supplied values (user
  /// values win).
  pub fn merge_params(&self, params: &HashMap<String, Value>) -> HashMap<String, Value> {
    let mut merged: HashMap<String, Value> = self
      .optional_params
      .iter()
      .map(|(k, v)| ((*k).to_owned(), Value::String((*v).to_owned())))
      .collect();
    for (k, v) in params {
      merged.insert(k.clone(), v.clone());
    }
    merged
  }

  /// The final query text: current-state templates get the invariant
  /// clause injected, temporal templates run exactly as written.
  pub fn resolved_cypher(&self) -> String {
    if matches!(self.category, TemplateCategory::Temporal) {
      self.cypher_text.to_owned()
    } else {
      self
        .cypher_text
        .replace("/*CURRENT_STATE_FILTER*/", "AND r.fact_valid_to IS NULL")
    }
  }
}

/// Convert a JSON value into a Bolt parameter value for binding. Only
/// scalars and strings are needed by the default template set.
pub fn json_to_bolt(value: &Value) -> BoltType {
  match value {
    Value::String(s) => BoltType::String(s.as_str().into()),
    Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        BoltType::Integer(i.into())
      } else {
        BoltType::Float(n.as_f64().unwrap_or_default().into())
      }
    }
    Value::Bool(b) => BoltType::Boolean((*b).into()),
    Value::Null => BoltType::Null(neo4rs::BoltNull),
    other => BoltType::String(other.to_string().into()),
  }
}

pub struct TemplateRegistry {
  templates: HashMap<&'static str, GraphQueryTemplate>,
}

impl Default for TemplateRegistry {
  fn default() -> Self {
    Self::with_defaults()
  }
}

impl TemplateRegistry {
  pub fn new() -> Self {
    Self {
      templates: HashMap::new(),
    }
  }

  pub fn register(&mut self, template: GraphQueryTemplate) {
    self.templates.insert(template.name, template);
  }

  pub fn get(&self, name: &str) -> Option<&GraphQueryTemplate> {
    self.templates.get(name)
  }

  /// Generalized, domain-agnostic default templates: current/historical
  /// relation queries, neighbor tracking, and causal-chain traversal.
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();

    registry.register(GraphQueryTemplate {
      name: "relation_current",
      cypher_text: "MATCH (s:Entity {name: $subject})-[r:RELATES {predicate: $predicate}]->(o:Entity) \
        WHERE true /*CURRENT_STATE_FILTER*/ \
        RETURN o.name AS object, r.fact_valid_from AS fact_valid_from, r.fact_valid_to AS fact_valid_to",
      required_params: &["subject", "predicate"],
      optional_params: &[],
      category: TemplateCategory::Relationship,
      description: "What does <subject> currently <predicate>?",
    });

    registry.register(GraphQueryTemplate {
      name: "relation_history",
      cypher_text: "MATCH (s:Entity {name: $subject})-[r:RELATES {predicate: $predicate}]->(o:Entity) \
        RETURN o.name AS object, r.fact_valid_from AS fact_valid_from, r.fact_valid_to AS fact_valid_to \
        ORDER BY r.fact_valid_from ASC",
      required_params: &["subject", "predicate"],
      optional_params: &[],
      category: TemplateCategory::Temporal,
      description: "Full history of <subject> <predicate> over time.",
    });

    registry.register(GraphQueryTemplate {
      name: "entity_neighbors",
      cypher_text: "MATCH (s:Entity {name: $subject})-[r:RELATES]-(o:Entity) \
        WHERE true /*CURRENT_STATE_FILTER*/ \
        RETURN DISTINCT o.name AS neighbor, r.predicate AS predicate \
        LIMIT $limit",
      required_params: &["subject"],
      optional_params: &[("limit", "10")],
      category: TemplateCategory::Tracking,
      description: "Entities currently connected to <subject>.",
    });

    registry.register(GraphQueryTemplate {
      name: "causal_chain",
      cypher_text: "MATCH path = (s:Entity {name: $subject})-[r:RELATES*1..4]->(o:Entity) \
        WHERE true /*CURRENT_STATE_FILTER*/ AND ALL(rel IN r WHERE rel.predicate = $predicate) \
        RETURN [n IN nodes(path) | n.name] AS chain \
        LIMIT $limit",
      required_params: &["subject", "predicate"],
      optional_params: &[("limit", "5")],
      category: TemplateCategory::Causality,
      description: "Chain of <predicate> relations reachable from <subject>.",
    });

    registry
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validate_params_reports_missing() {
    let registry = TemplateRegistry::with_defaults();
    let template = registry.get("relation_current").unwrap();
    let params = HashMap::new();
    let err = template.validate_params(&params).unwrap_err();
    assert!(err.contains("subject"));
    assert!(err.contains("predicate"));
  }

  #[test]
  fn non_temporal_template_gets_current_state_filter() {
    let registry = TemplateRegistry::with_defaults();
    let template = registry.get("relation_current").unwrap();
    assert!(template.resolved_cypher().contains("fact_valid_to IS NULL"));
  }

  #[test]
  fn temporal_template_is_unmodified() {
    let registry = TemplateRegistry::with_defaults();
    let template = registry.get("relation_history").unwrap();
    assert_eq!(template.resolved_cypher(), template.cypher_text);
  }

  #[test]
  fn merge_params_prefers_user_values() {
    let registry = TemplateRegistry::with_defaults();
    let template = registry.get("entity_neighbors").unwrap();
    let mut params = HashMap::new();
    params.insert("subject".to_owned(), Value::String("Alice".to_owned()));
    params.insert("limit".to_owned(), Value::from(25));
    let merged = template.merge_params(&params);
    assert_eq!(merged.get("limit").unwrap(), &Value::from(25));
  }
}
