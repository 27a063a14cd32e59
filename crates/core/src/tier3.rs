//! L3 Episodic: dual-write to pgvector (`tetramem_entities::episode`) and a
//! property graph (`tetramem_graph`), in that order. Graph-write failures
//! are queued in `pending_repair` rather than failing the caller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::prelude::PgVector;
use sea_orm::{
  ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
  FromQueryResult, IntoActiveModel, PaginatorTrait, QueryFilter, Set, Statement,
};
use serde_json::Value;
use tetramem_entities::{episode, pending_repair};
use tetramem_graph::{GraphClient, GraphRow};
use tetramem_shared::AppError;
use uuid::Uuid;

/// A relationship extracted from an episode: `(subject, predicate, object, valid_from)`.
pub type Relationship = (String, String, String, DateTime<Utc>);

pub struct EpisodicTier {
  db: DatabaseConnection,
  graph: Arc<GraphClient>,
}

impl EpisodicTier {
  pub fn new(db: DatabaseConnection, graph: Arc<GraphClient>) -> Self {
    Self { db, graph }
  }

  /// Writes the relational/vector row first, then the graph half. A graph
  /// failure is logged and a `pending_repair` row is queued with the
  /// relationships as its payload so the wake-up sweep can retry without
  /// re-deriving them from the episode.
  pub async fn store(&self, model: episode::Model, relationships: &[Relationship]) -> Result<(), AppError> {
    let episode_id = model.id;
    model.into_active_model().insert(&self.db).await?;

    if let Err(err) = self.graph.store_episode_relationships(episode_id, relationships).await {
      tracing::error!(episode_id = %episode_id, error = %err, "graph write failed for episode; queuing repair");
      let payload = serde_json::to_value(
        relationships
          .iter()
          .map(|(s, p, o, t)| serde_json::json!({"subject": s, "predicate": p, "object": o, "valid_from": t}))
          .collect::<Vec<_>>(),
      )?;
      let repair = pending_repair::Model {
        id: Uuid::now_v7(),
        episode_id,
        modality: "graph".to_owned(),
        created_at: Utc::now().into(),
        resolved: false,
        payload: Some(payload),
      };
      repair.into_active_model().insert(&self.db).await?;
    }
    Ok(())
  }

  pub async fn retrieve(&self, episode_id: Uuid) -> Result<Option<episode::Model>, AppError> {
    Ok(episode::Entity::find_by_id(episode_id).one(&self.db).await?)
  }

  /// Total episodes for a session, distilled or not — used by `/memory_state`.
  pub async fn count_by_session(&self, session_id: &str) -> Result<u64, AppError> {
    Ok(
      episode::Entity::find()
        .filter(episode::Column::SessionId.eq(session_id))
        .count(&self.db)
        .await?,
    )
  }

  /// Cosine-similarity nearest neighbors, optionally scoped to one session.
  pub async fn search_similar(
    &self,
    query_vector: &PgVector,
    session_id: Option<&str>,
    k: u64,
  ) -> Result<Vec<(episode::Model, f64)>, AppError> {
    let scope_filter = if session_id.is_some() { "AND session_id = $3" } else { "" };
    let sql = format!(
      r"
      SELECT id, session_id, summary, time_window_start, time_window_end, fact_valid_from,
             fact_valid_to, source_observation_timestamp, importance_score, embedding, entities,
             created_at, 1.0 - (embedding <=> $1) AS score
      FROM episode
      WHERE true {scope_filter}
      ORDER BY embedding <=> $1
      LIMIT $2;
      "
    );

    let mut params: Vec<sea_orm::Value> = vec![query_vector.clone().into(), (k as i64).into()];
    if let Some(sid) = session_id {
      params.push(sid.into());
    }
    let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, params);

    let rows = self.db.query_all(stmt).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
      let model = episode::Model::from_query_result(row, "")?;
      let score: f64 = row.try_get("", "score")?;
      out.push((model, score));
    }
    Ok(out)
  }

  /// Episodes not yet folded into a knowledge document, oldest first — the
  /// distillation engine's candidate set.
  pub async fn undistilled_episodes(&self, session_id: &str, limit: u64) -> Result<Vec<episode::Model>, AppError> {
    use sea_orm::{QueryOrder, QuerySelect};
    Ok(
      episode::Entity::find()
        .filter(episode::Column::SessionId.eq(session_id))
        .filter(episode::Column::Distilled.eq(false))
        .order_by_asc(episode::Column::CreatedAt)
        .limit(limit)
        .all(&self.db)
        .await?,
    )
  }

  /// Marks a batch of episodes as distilled so they drop out of the next
  /// sweep's candidate set.
  pub async fn mark_distilled(&self, episode_ids: &[Uuid]) -> Result<(), AppError> {
    if episode_ids.is_empty() {
      return Ok(());
    }
    episode::Entity::update_many()
      .col_expr(episode::Column::Distilled, sea_orm::sea_query::Expr::value(true))
      .filter(episode::Column::Id.is_in(episode_ids.iter().copied()))
      .exec(&self.db)
      .await?;
    Ok(())
  }

  pub async fn query_graph(
    &self,
    template_name: &str,
    params: &HashMap<String, Value>,
  ) -> Result<Vec<GraphRow>, AppError> {
    Ok(self.graph.query_template(template_name, params).await?)
  }

  /// Deletes the session's episodes from both halves, returning how many
  /// relational rows were removed.
  pub async fn delete(&self, session_id: &str) -> Result<u64, AppError> {
    let ids: Vec<Uuid> = episode::Entity::find()
      .filter(episode::Column::SessionId.eq(session_id))
      .all(&self.db)
      .await?
      .into_iter()
      .map(|e| e.id)
      .collect();

    episode::Entity::delete_many()
      .filter(episode::Column::SessionId.eq(session_id))
      .exec(&self.db)
      .await?;

    self.graph.delete_session(&ids).await?;
    Ok(ids.len() as u64)
  }

  /// Retries every unresolved `graph` repair row, replaying the stored
  /// relationships. Called by the worker's wake-up sweep.
  pub async fn repair_pending(&self) -> Result<u64, AppError> {
    let pending = pending_repair::Entity::find()
      .filter(pending_repair::Column::Resolved.eq(false))
      .filter(pending_repair::Column::Modality.eq("graph"))
      .all(&self.db)
      .await?;

    let mut repaired = 0;
    for row in pending {
      let Some(payload) = &row.payload else {
        continue;
      };
      let relationships: Vec<Relationship> = match serde_json::from_value::<Vec<Value>>(payload.clone()) {
        Ok(entries) => entries
          .into_iter()
          .filter_map(|entry| {
            let subject = entry.get("subject")?.as_str()?.to_owned();
            let predicate = entry.get("predicate")?.as_str()?.to_owned();
            let object = entry.get("object")?.as_str()?.to_owned();
            let valid_from = entry.get("valid_from")?.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok())?;
            Some((subject, predicate, object, valid_from.with_timezone(&Utc)))
          })
          .collect(),
        Err(_) => continue,
      };

      if self.graph.store_episode_relationships(row.episode_id, &relationships).await.is_ok() {
        let mut active = row.into_active_model();
        active.resolved = Set(true);
        active.update(&self.db).await?;
        repaired += 1;
      }
    }
    Ok(repaired)
  }

  pub async fn health_check(&self) -> Result<(), AppError> {
    self.graph.health_check().await?;
    Ok(())
  }
}
