//! L4 Semantic: distilled knowledge documents (`tetramem_entities::knowledge_document`),
//! BM25-searchable by title/content, filterable by `knowledge_type`.

use sea_orm::{
  ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
  FromQueryResult, IntoActiveModel, PaginatorTrait, QueryFilter, Set, Statement,
};
use tetramem_entities::knowledge_document;
use tetramem_shared::AppError;
use uuid::Uuid;

pub struct SemanticTier {
  db: DatabaseConnection,
}

impl SemanticTier {
  pub fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn store(&self, model: knowledge_document::Model) -> Result<(), AppError> {
    model.into_active_model().insert(&self.db).await?;
    Ok(())
  }

  /// Increments `access_count` as part of retrieval, as the spec requires.
  pub async fn retrieve(&self, id: Uuid) -> Result<Option<knowledge_document::Model>, AppError> {
    let Some(model) = knowledge_document::Entity::find_by_id(id).one(&self.db).await? else {
      return Ok(None);
    };
    let access_count = model.access_count;
    let mut active = model.clone().into_active_model();
    active.access_count = Set(access_count + 1);
    let updated = active.update(&self.db).await?;
    Ok(Some(updated))
  }

  /// BM25 full-text search over `title`/`content`, excluding stale documents
  /// unless explicitly requested, optionally filtered by `knowledge_type`.
  pub async fn search(
    &self,
    text: &str,
    knowledge_type: Option<&str>,
    k: u64,
  ) -> Result<Vec<knowledge_document::Model>, AppError> {
    let type_filter = if knowledge_type.is_some() { "AND knowledge_type = $4" } else { "" };
    let sql = format!(
      r"
      SELECT id, title, content, knowledge_type, confidence_score, episode_count, distilled_at,
             access_count, usefulness_score, validation_count, stale
      FROM knowledge_document
      WHERE stale = false AND search_text ||| $1 {type_filter}
      ORDER BY pdb.score(id) DESC
      LIMIT $2;
      "
    );

    let mut params: Vec<sea_orm::Value> = vec![text.into(), (k as i64).into()];
    if let Some(kt) = knowledge_type {
      params.push(kt.into());
    }
    let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, params);
    let rows = self.db.query_all(stmt).await?;
    rows
      .iter()
      .map(|row| knowledge_document::Model::from_query_result(row, "").map_err(AppError::new))
      .collect()
  }

  /// Trigram/full-text overlap on `title`, used by the distillation engine's
  /// conflict detection against active (non-stale) documents.
  pub async fn find_by_title_overlap(&self, title: &str, k: u64) -> Result<Vec<knowledge_document::Model>, AppError> {
    let sql = r"
      SELECT id, title, content, knowledge_type, confidence_score, episode_count, distilled_at,
             access_count, usefulness_score, validation_count, stale,
             similarity(title, $1) AS title_similarity
      FROM knowledge_document
      WHERE stale = false AND similarity(title, $1) > 0.3
      ORDER BY title_similarity DESC
      LIMIT $2;
    ";
    let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [title.into(), (k as i64).into()]);
    let rows = self.db.query_all(stmt).await?;
    rows
      .iter()
      .map(|row| knowledge_document::Model::from_query_result(row, "").map_err(AppError::new))
      .collect()
  }

  pub async fn mark_stale(&self, id: Uuid) -> Result<(), AppError> {
    if let Some(model) = knowledge_document::Entity::find_by_id(id).one(&self.db).await? {
      let mut active = model.into_active_model();
      active.stale = Set(true);
      active.update(&self.db).await?;
    }
    Ok(())
  }

  pub async fn adjust_confidence(&self, id: Uuid, confidence_score: f32) -> Result<(), AppError> {
    if let Some(model) = knowledge_document::Entity::find_by_id(id).one(&self.db).await? {
      let mut active = model.into_active_model();
      active.confidence_score = Set(confidence_score.clamp(0.0, 1.0));
      active.update(&self.db).await?;
    }
    Ok(())
  }

  /// Count of non-stale documents. L4 is not session-partitioned, so this is
  /// a global total, used by `/memory_state`'s `l4_docs` field.
  pub async fn count_active(&self) -> Result<u64, AppError> {
    Ok(
      knowledge_document::Entity::find()
        .filter(knowledge_document::Column::Stale.eq(false))
        .count(&self.db)
        .await?,
    )
  }

  pub async fn health_check(&self) -> Result<(), AppError> {
    self.db.execute(Statement::from_string(DbBackend::Postgres, "SELECT 1")).await?;
    Ok(())
  }
}
