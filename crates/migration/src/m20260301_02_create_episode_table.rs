use sea_orm_migration::{
  prelude::*,
  schema::{array, boolean, custom, float, text, timestamp_with_time_zone, timestamp_with_time_zone_null, uuid},
  sea_orm::Statement,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Episode::Table)
          .if_not_exists()
          .col(uuid(Episode::Id).primary_key())
          .col(text(Episode::SessionId))
          .col(text(Episode::Summary))
          .col(timestamp_with_time_zone(Episode::TimeWindowStart))
          .col(timestamp_with_time_zone(Episode::TimeWindowEnd))
          .col(timestamp_with_time_zone(Episode::FactValidFrom))
          .col(timestamp_with_time_zone_null(Episode::FactValidTo))
          .col(timestamp_with_time_zone(Episode::SourceObservationTimestamp))
          .col(float(Episode::ImportanceScore))
          .col(custom(Episode::Embedding, "vector(1024)").not_null())
          .col(array(Episode::Entities, ColumnType::Text))
          .col(timestamp_with_time_zone(Episode::CreatedAt))
          .col(boolean(Episode::Distilled).default(false))
          .to_owned(),
      )
      .await?;

    let backend = manager.get_database_backend();
    let conn = manager.get_connection();

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_episode_embedding_hnsw ON episode USING hnsw (embedding vector_cosine_ops);",
      ))
      .await?;

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_episode_summary_bm25 ON episode USING bm25 (id, (summary::pdb.icu), created_at) WITH (key_field='id');",
      ))
      .await?;

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_episode_session ON episode (session_id, created_at DESC);",
      ))
      .await?;

    // Partial index: at most one current row per relation is enforced by the
    // graph store's supersession write, but the relational half still wants
    // a fast lookup for "currently valid episodes".
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_episode_current ON episode (session_id) WHERE fact_valid_to IS NULL;",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Episode::Table).to_owned())
      .await?;
    Ok(())
  }
}

#[derive(Iden)]
pub enum Episode {
  Table,
  Id,
  SessionId,
  Summary,
  TimeWindowStart,
  TimeWindowEnd,
  FactValidFrom,
  FactValidTo,
  SourceObservationTimestamp,
  ImportanceScore,
  Embedding,
  Entities,
  CreatedAt,
  Distilled,
}
