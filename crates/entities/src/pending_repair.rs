use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_repair")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub episode_id: Uuid,
  pub modality: String,
  pub created_at: DateTimeWithTimeZone,
  pub resolved: bool,
  /// Repair payload for the failed modality (e.g. the episode's extracted
  /// relationships, for a graph-write repair). Opaque to everything but the
  /// engine that wrote it.
  pub payload: Option<serde_json::Value>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
