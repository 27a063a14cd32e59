use sea_orm_migration::{
  prelude::*,
  schema::{array, boolean, float, integer, json_binary, text, timestamp_with_time_zone, uuid, uuid_null},
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
          .table(Fact::Table)
          .if_not_exists()
          .col(uuid(Fact::Id).primary_key())
          .col(text(Fact::SessionId))
          .col(text(Fact::Content))
          .col(text(Fact::FactType))
          .col(text(Fact::Category))
          .col(timestamp_with_time_zone(Fact::ExtractedAt))
          .col(float(Fact::Certainty))
          .col(float(Fact::Impact))
          .col(float(Fact::CiarScore))
          .col(integer(Fact::AccessCount).default(0))
          .col(timestamp_with_time_zone(Fact::LastAccessed))
          .col(array(Fact::SourceTurnIds, ColumnType::Text))
          .col(text(Fact::Justification).null())
          .col(uuid_null(Fact::SupersedesFactId))
          .col(boolean(Fact::Consolidated).default(false))
          .to_owned(),
      )
      .await?;

    let backend = manager.get_database_backend();
    let conn = manager.get_connection();

    conn
      .execute_raw(Statement::from_string(
        backend,
        "ALTER TABLE fact ADD COLUMN search_text TEXT \
         GENERATED ALWAYS AS (content || ' ' || fact_type) STORED;",
      ))
      .await?;

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_fact_bm25 ON fact USING bm25 (id, (search_text::pdb.icu), extracted_at) WITH (key_field='id');",
      ))
      .await?;

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_fact_session_ciar ON fact (session_id, ciar_score DESC, extracted_at DESC);",
      ))
      .await?;

    manager
      .create_table(
        Table::create()
          .table(PendingRepair::Table)
          .if_not_exists()
          .col(uuid(PendingRepair::Id).primary_key())
          .col(uuid(PendingRepair::EpisodeId))
          .col(text(PendingRepair::Modality))
          .col(timestamp_with_time_zone(PendingRepair::CreatedAt))
          .col(boolean(PendingRepair::Resolved).default(false))
          .col(json_binary(PendingRepair::Payload).null())
          .to_owned(),
      )
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(PendingRepair::Table).to_owned())
      .await?;
    manager
      .drop_table(Table::drop().table(Fact::Table).to_owned())
      .await?;
    Ok(())
  }
}

#[derive(Iden)]
pub enum Fact {
  Table,
  Id,
  SessionId,
  Content,
  FactType,
  Category,
  ExtractedAt,
  Certainty,
  Impact,
  CiarScore,
  AccessCount,
  LastAccessed,
  SourceTurnIds,
  Justification,
  SupersedesFactId,
  Consolidated,
}

#[derive(Iden)]
pub enum PendingRepair {
  Table,
  Id,
  EpisodeId,
  Modality,
  CreatedAt,
  Resolved,
  Payload,
}
