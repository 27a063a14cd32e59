use std::collections::HashMap;

use chrono::{DateTime, Utc};
use neo4rs::{query, Graph};
use serde_json::Value;
use uuid::Uuid;

use crate::template::{json_to_bolt, TemplateRegistry};

/// Bolt-protocol driver for the episodic tier's relationship half.
///
/// Every read goes through [`TemplateRegistry`]; the only hand-authored
/// Cypher outside the registry is the bi-temporal supersession write below,
/// which is structural (not driven by caller-supplied query text) and
/// cannot be expressed as a parameterized read template.
pub struct GraphClient {
  graph: Graph,
  templates: TemplateRegistry,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphRow {
  pub fields: HashMap<String, Value>,
}

impl GraphClient {
  pub async fn connect(uri: &str, user: &str, password: &str) -> anyhow::Result<Self> {
    let graph = Graph::new(uri, user, password).await?;
    Ok(Self {
      graph,
      templates: TemplateRegistry::with_defaults(),
    })
  }

  pub fn templates(&self) -> &TemplateRegistry {
    &self.templates
  }

  /// Execute a named, parameter-validated template. Rejects unknown names
  /// and missing required parameters before ever touching the driver.
  pub async fn query_template(
    &self,
    template_name: &str,
    params: &HashMap<String, Value>,
  ) -> anyhow::Result<Vec<GraphRow>> {
    let template = self
      .templates
      .get(template_name)
      .ok_or_else(|| anyhow::anyhow!("unknown graph template: {template_name}"))?;

    template
      .validate_params(params)
      .map_err(|e| anyhow::anyhow!(e))?;
    let merged = template.merge_params(params);

    let mut q = query(&template.resolved_cypher());
    for (key, value) in &merged {
      q = q.param(key, json_to_bolt(value));
    }

    let mut result = self.graph.execute(q).await?;
    let mut rows = Vec::new();
    while let Some(row) = result.next().await? {
      let mut fields = HashMap::new();
      for key in row.keys() {
        if let Ok(v) = row.get::<String>(key) {
          fields.insert(key.to_owned(), Value::String(v));
        } else if let Ok(v) = row.get::<f64>(key) {
          fields.insert(key.to_owned(), Value::from(v));
        } else if let Ok(v) = row.get::<Vec<String>>(key) {
          fields.insert(key.to_owned(), Value::from(v));
        }
      }
      rows.push(GraphRow { fields });
    }
    Ok(rows)
  }

  /// Write an episode's extracted entities and relationships. Entities are
  /// upserted as nodes; relationships are written current (no supersession
  /// logic here — use [`Self::supersede_relation`] for that).
  pub async fn store_episode_relationships(
    &self,
    episode_id: Uuid,
    relationships: &[(String, String, String, DateTime<Utc>)],
  ) -> anyhow::Result<()> {
    for (subject, predicate, object, valid_from) in relationships {
      let q = query(
        "MERGE (s:Entity {name: $subject}) \
         MERGE (o:Entity {name: $object}) \
         CREATE (s)-[r:RELATES { \
           predicate: $predicate, \
           episode_id: $episode_id, \
           fact_valid_from: $valid_from, \
           fact_valid_to: null \
         }]->(o)",
      )
      .param("subject", subject.as_str())
      .param("object", object.as_str())
      .param("predicate", predicate.as_str())
      .param("episode_id", episode_id.to_string())
      .param("valid_from", valid_from.to_rfc3339());

      self.graph.run(q).await?;
    }
    Ok(())
  }

  /// Bi-temporal supersession: close the old current row and open the new
  /// one in a single Cypher statement, so readers never observe both rows
  /// as current at once.
  pub async fn supersede_relation(
    &self,
    subject: &str,
    predicate: &str,
    new_object: &str,
    new_episode_id: Uuid,
    observed_at: DateTime<Utc>,
  ) -> anyhow::Result<()> {
    let q = query(
      "MATCH (s:Entity {name: $subject})-[r:RELATES {predicate: $predicate}]->(:Entity) \
       WHERE r.fact_valid_to IS NULL \
       SET r.fact_valid_to = $observed_at \
       WITH s \
       MERGE (o2:Entity {name: $new_object}) \
       CREATE (s)-[r2:RELATES { \
         predicate: $predicate, \
         episode_id: $episode_id, \
         fact_valid_from: $observed_at, \
         fact_valid_to: null \
       }]->(o2)",
    )
    .param("subject", subject)
    .param("predicate", predicate)
    .param("new_object", new_object)
    .param("episode_id", new_episode_id.to_string())
    .param("observed_at", observed_at.to_rfc3339());

    self.graph.run(q).await?;
    Ok(())
  }

  pub async fn delete_session(&self, episode_ids: &[Uuid]) -> anyhow::Result<()> {
    for episode_id in episode_ids {
      let q = query("MATCH ()-[r:RELATES {episode_id: $episode_id}]->() DELETE r")
        .param("episode_id", episode_id.to_string());
      self.graph.run(q).await?;
    }
    Ok(())
  }

  pub async fn health_check(&self) -> anyhow::Result<()> {
    self.graph.run(query("RETURN 1")).await?;
    Ok(())
  }
}
