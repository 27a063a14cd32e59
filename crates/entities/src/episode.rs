use sea_orm::entity::prelude::*;
use sea_orm::prelude::PgVector;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "episode")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub session_id: String,
  pub summary: String,
  pub time_window_start: DateTimeWithTimeZone,
  pub time_window_end: DateTimeWithTimeZone,
  pub fact_valid_from: DateTimeWithTimeZone,
  pub fact_valid_to: Option<DateTimeWithTimeZone>,
  pub source_observation_timestamp: DateTimeWithTimeZone,
  pub importance_score: f32,
  #[serde(skip)]
  pub embedding: PgVector,
  pub entities: Vec<String>,
  pub created_at: DateTimeWithTimeZone,
  /// Whether this episode has already contributed to a knowledge document;
  /// excluded from the next distillation sweep's candidate set.
  pub distilled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
