use anyhow::anyhow;
use async_openai::types::chat::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs};
use tetramem_shared::AppError;

use crate::client::{LLM_CLIENT, TokenUsage};

/// Result of a single text completion: which provider and model answered, the
/// text itself, and token usage if the provider reported it.
#[derive(Clone, Debug)]
pub struct TextCompletion {
  pub text: String,
  pub provider: String,
  pub model: String,
  pub usage: Option<TokenUsage>,
}

pub async fn generate_text(
  messages: Vec<ChatCompletionRequestMessage>,
) -> Result<TextCompletion, AppError> {
  LLM_CLIENT
    .try_each(|provider| {
      let messages = messages.clone();
      async move {
        let request = CreateChatCompletionRequestArgs::default()
          .model(provider.model())
          .messages(messages)
          .build()?;

        let response = provider.client().chat().create(request).await?;
        let usage = response.usage.as_ref().map(|u| TokenUsage {
          prompt_tokens: u.prompt_tokens,
          completion_tokens: u.completion_tokens,
          total_tokens: u.total_tokens,
        });

        let text = response
          .choices
          .into_iter()
          .filter_map(|c| c.message.content)
          .next_back()
          .ok_or_else(|| anyhow!("empty message content"))?;

        Ok(TextCompletion {
          text,
          provider: provider.base_url().to_owned(),
          model: provider.model().to_owned(),
          usage,
        })
      }
    })
    .await
    .map_err(AppError::new)
}
