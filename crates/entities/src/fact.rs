use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `search_text` is a `GENERATED ALWAYS ... STORED` column backing the BM25
/// index; it is queried directly in raw SQL and deliberately not mapped here
/// since Postgres rejects generated columns in an INSERT column list.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fact")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub session_id: String,
  pub content: String,
  pub fact_type: String,
  pub category: String,
  pub extracted_at: DateTimeWithTimeZone,
  pub certainty: f32,
  pub impact: f32,
  pub ciar_score: f32,
  pub access_count: i32,
  pub last_accessed: DateTimeWithTimeZone,
  pub source_turn_ids: Vec<String>,
  pub justification: Option<String>,
  pub supersedes_fact_id: Option<Uuid>,
  /// Whether this fact has already been folded into an episode by the
  /// consolidation engine; excluded from the next sweep's candidate set.
  pub consolidated: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
