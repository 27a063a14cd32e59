use anyhow::anyhow;
use async_openai::types::embeddings::CreateEmbeddingRequestArgs;
use sea_orm::prelude::PgVector;
use tetramem_shared::AppError;

use crate::client::LLM_CLIENT;
use crate::embed_shared::process_embedding;

pub async fn embed(input: &str) -> Result<PgVector, AppError> {
  LLM_CLIENT
    .try_each(|provider| async move {
      let request = CreateEmbeddingRequestArgs::default()
        .model(provider.embedding_model())
        .input(input)
        .dimensions(1024u32)
        .build()?;

      let embedding = provider
        .client()
        .embeddings()
        .create(request)
        .await
        .map(|r| r.data.into_iter())?
        .map(|e| e.embedding)
        .next_back()
        .ok_or_else(|| anyhow!("empty embedding"))?;

      process_embedding(embedding).map_err(|e| anyhow!(e.to_string()))
    })
    .await
    .map(PgVector::from)
    .map_err(AppError::new)
}
