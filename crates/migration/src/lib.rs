pub use sea_orm_migration::*;

mod m20260301_01_create_fact_table;
mod m20260301_02_create_episode_table;
mod m20260301_03_create_knowledge_document_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260301_01_create_fact_table::Migration),
      Box::new(m20260301_02_create_episode_table::Migration),
      Box::new(m20260301_03_create_knowledge_document_table::Migration),
    ]
  }
}
