//! L2 Working Memory: persisted facts (`tetramem_entities::fact`), indexed
//! in `tetramem_kv` alongside L1 so a session's data shares one slot.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sea_orm::{
  ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, FromQueryResult,
  IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement, sea_query::OnConflict,
};
use tetramem_entities::fact;
use tetramem_kv::NamespaceManager;
use tetramem_shared::AppError;
use uuid::Uuid;

pub struct WorkingMemoryTier {
  db: DatabaseConnection,
  redis: ConnectionManager,
}

impl WorkingMemoryTier {
  pub fn new(db: DatabaseConnection, redis: ConnectionManager) -> Self {
    Self { db, redis }
  }

  /// Idempotent under `fact.id`: a repeat insert of the same deterministic
  /// id is a no-op (`ON CONFLICT DO NOTHING`).
  pub async fn store(&self, model: fact::Model) -> Result<(), AppError> {
    let session_id = model.session_id.clone();
    let id = model.id;
    let active = model.into_active_model();

    fact::Entity::insert(active)
      .on_conflict(OnConflict::column(fact::Column::Id).do_nothing().to_owned())
      .exec_without_returning(&self.db)
      .await?;

    let index_key = NamespaceManager::l2_facts_index(&session_id);
    let mut conn = self.redis.clone();
    let _: () = conn.sadd(&index_key, id.to_string()).await?;
    Ok(())
  }

  /// Whether `fact_id` is already a member of the session's L2 index set,
  /// i.e. already promoted (or already considered, for the turn-placeholder
  /// ids the promotion engine also inserts — see its module docs).
  pub async fn is_indexed(&self, session_id: &str, fact_id: &str) -> Result<bool, AppError> {
    let index_key = NamespaceManager::l2_facts_index(session_id);
    let mut conn = self.redis.clone();
    Ok(conn.sismember(&index_key, fact_id).await?)
  }

  pub async fn retrieve(&self, fact_id: Uuid) -> Result<Option<fact::Model>, AppError> {
    Ok(fact::Entity::find_by_id(fact_id).one(&self.db).await?)
  }

  /// Total facts for a session regardless of `ciar_score` — used by
  /// `/memory_state`.
  pub async fn count_by_session(&self, session_id: &str) -> Result<u64, AppError> {
    Ok(
      fact::Entity::find()
        .filter(fact::Column::SessionId.eq(session_id))
        .count(&self.db)
        .await?,
    )
  }

  /// Top facts for a session by `ciar_score >= min_ciar`, ties broken by
  /// `extracted_at` descending.
  pub async fn query_by_session(
    &self,
    session_id: &str,
    min_ciar: f32,
    limit: u64,
  ) -> Result<Vec<fact::Model>, AppError> {
    Ok(
      fact::Entity::find()
        .filter(fact::Column::SessionId.eq(session_id))
        .filter(fact::Column::CiarScore.gte(min_ciar))
        .order_by_desc(fact::Column::CiarScore)
        .order_by_desc(fact::Column::ExtractedAt)
        .limit(limit)
        .all(&self.db)
        .await?,
    )
  }

  /// Facts not yet folded into an episode, oldest first — the consolidation
  /// engine's candidate set.
  pub async fn unconsolidated_facts(&self, session_id: &str, limit: u64) -> Result<Vec<fact::Model>, AppError> {
    Ok(
      fact::Entity::find()
        .filter(fact::Column::SessionId.eq(session_id))
        .filter(fact::Column::Consolidated.eq(false))
        .order_by_asc(fact::Column::ExtractedAt)
        .limit(limit)
        .all(&self.db)
        .await?,
    )
  }

  /// Marks a batch of facts as consolidated so they drop out of the next
  /// sweep's candidate set.
  pub async fn mark_consolidated(&self, fact_ids: &[Uuid]) -> Result<(), AppError> {
    if fact_ids.is_empty() {
      return Ok(());
    }
    fact::Entity::update_many()
      .col_expr(fact::Column::Consolidated, sea_orm::sea_query::Expr::value(true))
      .filter(fact::Column::Id.is_in(fact_ids.iter().copied()))
      .exec(&self.db)
      .await?;
    Ok(())
  }

  /// Every `instruction`-typed fact for a session, regardless of `min_ciar`,
  /// for the context assembler's standing-order selection to filter further.
  pub async fn instruction_facts(&self, session_id: &str) -> Result<Vec<fact::Model>, AppError> {
    Ok(
      fact::Entity::find()
        .filter(fact::Column::SessionId.eq(session_id))
        .filter(fact::Column::FactType.eq("instruction"))
        .order_by_desc(fact::Column::ExtractedAt)
        .all(&self.db)
        .await?,
    )
  }

  /// BM25 full-text search over `content`/`fact_type`, scoped to one session.
  pub async fn search(&self, session_id: &str, text: &str, k: u64) -> Result<Vec<fact::Model>, AppError> {
    let sql = r"
      SELECT id, session_id, content, fact_type, category, extracted_at, certainty, impact,
             ciar_score, access_count, last_accessed, source_turn_ids, justification,
             supersedes_fact_id
      FROM fact
      WHERE session_id = $1 AND search_text ||| $2
      ORDER BY pdb.score(id) DESC
      LIMIT $3;
    ";
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      sql,
      [session_id.into(), text.into(), (k as i64).into()],
    );
    let rows = self.db.query_all(stmt).await?;
    rows
      .iter()
      .map(|row| fact::Model::from_query_result(row, "").map_err(AppError::new))
      .collect()
  }

  pub async fn touch_access(&self, fact_id: Uuid) -> Result<(), AppError> {
    use sea_orm::{ActiveModelTrait, Set};
    if let Some(model) = fact::Entity::find_by_id(fact_id).one(&self.db).await? {
      let mut active = model.into_active_model();
      let access_count = match &active.access_count {
        sea_orm::ActiveValue::Set(v) | sea_orm::ActiveValue::Unchanged(v) => *v,
        sea_orm::ActiveValue::NotSet => 0,
      };
      active.access_count = Set(access_count + 1);
      active.last_accessed = Set(chrono::Utc::now().into());
      active.update(&self.db).await?;
    }
    Ok(())
  }

  pub async fn delete(&self, session_id: &str) -> Result<u64, AppError> {
    let result = fact::Entity::delete_many()
      .filter(fact::Column::SessionId.eq(session_id))
      .exec(&self.db)
      .await?;
    let index_key = NamespaceManager::l2_facts_index(session_id);
    let mut conn = self.redis.clone();
    let _: () = conn.del(&index_key).await?;
    Ok(result.rows_affected)
  }

  pub async fn health_check(&self) -> Result<(), AppError> {
    self
      .db
      .execute(Statement::from_string(DbBackend::Postgres, "SELECT 1"))
      .await?;
    Ok(())
  }
}
