use sea_orm_migration::{
  prelude::*,
  schema::{boolean, float, integer, text, timestamp_with_time_zone, uuid},
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
          .table(KnowledgeDocument::Table)
          .if_not_exists()
          .col(uuid(KnowledgeDocument::Id).primary_key())
          .col(text(KnowledgeDocument::Title))
          .col(text(KnowledgeDocument::Content))
          .col(text(KnowledgeDocument::KnowledgeType))
          .col(float(KnowledgeDocument::ConfidenceScore))
          .col(integer(KnowledgeDocument::EpisodeCount).default(0))
          .col(timestamp_with_time_zone(KnowledgeDocument::DistilledAt))
          .col(integer(KnowledgeDocument::AccessCount).default(0))
          .col(float(KnowledgeDocument::UsefulnessScore).default(0.0))
          .col(integer(KnowledgeDocument::ValidationCount).default(0))
          .col(boolean(KnowledgeDocument::Stale).default(false))
          .to_owned(),
      )
      .await?;

    let backend = manager.get_database_backend();
    let conn = manager.get_connection();

    conn
      .execute_raw(Statement::from_string(
        backend,
        "ALTER TABLE knowledge_document ADD COLUMN search_text TEXT \
         GENERATED ALWAYS AS (title || ' ' || content) STORED;",
      ))
      .await?;

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_knowledge_document_bm25 ON knowledge_document \
         USING bm25 (id, (search_text::pdb.icu), distilled_at) WITH (key_field='id');",
      ))
      .await?;

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_knowledge_document_active ON knowledge_document (knowledge_type) WHERE stale = false;",
      ))
      .await?;

    // Distillation's conflict detection compares incoming titles against
    // existing ones by trigram similarity, not just BM25 token overlap.
    conn
      .execute_raw(Statement::from_string(backend, "CREATE EXTENSION IF NOT EXISTS pg_trgm;"))
      .await?;

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_knowledge_document_title_trgm ON knowledge_document \
         USING gist (title gist_trgm_ops);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(KnowledgeDocument::Table).to_owned())
      .await?;
    Ok(())
  }
}

#[derive(Iden)]
pub enum KnowledgeDocument {
  Table,
  Id,
  Title,
  Content,
  KnowledgeType,
  ConfidenceScore,
  EpisodeCount,
  DistilledAt,
  AccessCount,
  UsefulnessScore,
  ValidationCount,
  Stale,
}
