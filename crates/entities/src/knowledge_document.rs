use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `search_text` is a `GENERATED ALWAYS ... STORED` column backing the BM25
/// index; it is queried directly in raw SQL and deliberately not mapped here
/// since Postgres rejects generated columns in an INSERT column list.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "knowledge_document")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub title: String,
  pub content: String,
  pub knowledge_type: String,
  pub confidence_score: f32,
  pub episode_count: i32,
  pub distilled_at: DateTimeWithTimeZone,
  pub access_count: i32,
  pub usefulness_score: f32,
  pub validation_count: i32,
  pub stale: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
