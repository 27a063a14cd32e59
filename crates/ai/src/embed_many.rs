use anyhow::anyhow;
use async_openai::types::embeddings::CreateEmbeddingRequestArgs;
use sea_orm::prelude::PgVector;
use tetramem_shared::AppError;

use crate::client::LLM_CLIENT;

/// Embed multiple texts in a single API call.
///
/// Returns one `PgVector` per input, in the same order.
pub async fn embed_many(inputs: &[String]) -> Result<Vec<PgVector>, AppError> {
  if inputs.is_empty() {
    return Ok(vec![]);
  }

  LLM_CLIENT
    .try_each(|provider| async move {
      let request = CreateEmbeddingRequestArgs::default()
        .model(provider.embedding_model())
        .input(inputs.to_vec())
        .dimensions(1024u32)
        .build()?;

      let response = provider.client().embeddings().create(request).await?;

      // Sort by index to ensure ordering matches input
      let mut data = response.data;
      data.sort_by_key(|e| e.index);

      if data.len() != inputs.len() {
        return Err(anyhow!(
          "embedding count mismatch: expected {}, got {}",
          inputs.len(),
          data.len()
        ));
      }

      Ok(data.into_iter().map(|e| PgVector::from(e.embedding)).collect::<Vec<_>>())
    })
    .await
    .map_err(AppError::new)
}
