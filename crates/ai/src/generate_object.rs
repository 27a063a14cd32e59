use anyhow::anyhow;
use async_openai::types::chat::{
  ChatCompletionRequestMessage, CreateChatCompletionRequestArgs, ResponseFormat,
  ResponseFormatJsonSchema,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tetramem_shared::AppError;

use crate::client::{LLM_CLIENT, TokenUsage};

/// Result of a structured completion: the decoded value plus which provider
/// and model produced it and token usage if reported.
#[derive(Clone, Debug)]
pub struct ObjectCompletion<T> {
  pub value: T,
  pub provider: String,
  pub model: String,
  pub usage: Option<TokenUsage>,
}

/// Recursively fix a JSON schema for OpenAI strict mode:
/// - additionalProperties: false on all objects
/// - required must include all property keys
fn fix_schema_for_strict(schema: &mut serde_json::Value) {
  let Some(obj) = schema.as_object_mut() else { return };

  // OpenAI strict mode (draft 7): $ref must be the only key — strip siblings
  if obj.contains_key("$ref") {
    obj.retain(|k, _| k == "$ref");
    return;
  }

  // Convert oneOf of const strings → enum (OpenAI strict mode forbids oneOf)
  if let Some(one_of) = obj.get("oneOf").and_then(|v| v.as_array()).cloned() {
    let consts: Option<Vec<serde_json::Value>> =
      one_of.iter().map(|v| v.get("const").cloned()).collect();
    if let Some(values) = consts {
      obj.clear();
      obj.insert("type".to_owned(), serde_json::Value::String("string".to_owned()));
      obj.insert("enum".to_owned(), serde_json::Value::Array(values));
      return;
    }
  }

  // Unwrap anyOf [T, null] → T (OpenAI strict mode forbids anyOf; Option<T> uses this pattern)
  if let Some(any_of) = obj.get("anyOf").and_then(|v| v.as_array()).cloned() {
    let non_null: Vec<&serde_json::Value> =
      any_of.iter().filter(|v| v.get("type").and_then(|t| t.as_str()) != Some("null")).collect();
    if non_null.len() == 1 {
      let inner = non_null[0].clone();
      obj.clear();
      obj.extend(inner.as_object().cloned().unwrap_or_default());
      fix_schema_for_strict(schema);
      return;
    }
  }

  if obj.contains_key("properties") {
    let keys: Vec<serde_json::Value> = obj["properties"]
      .as_object()
      .map(|p| p.keys().map(|k| serde_json::Value::String(k.clone())).collect())
      .unwrap_or_default();
    obj.insert("required".to_owned(), serde_json::Value::Array(keys));
    obj.insert("additionalProperties".to_owned(), serde_json::Value::Bool(false));

    // Recurse into property schemas
    if let Some(props) = obj.get_mut("properties").and_then(|p| p.as_object_mut()) {
      for v in props.values_mut() {
        fix_schema_for_strict(v);
      }
    }
  }

  // Recurse into array items
  if let Some(items) = obj.get_mut("items") {
    fix_schema_for_strict(items);
  }

  // Recurse into definitions (schemars 0.x uses "definitions")
  if let Some(defs) = obj.get_mut("definitions").and_then(|d| d.as_object_mut()) {
    for v in defs.values_mut() {
      fix_schema_for_strict(v);
    }
  }

  // Recurse into $defs (schemars 1.x uses "$defs")
  if let Some(defs) = obj.get_mut("$defs").and_then(|d| d.as_object_mut()) {
    for v in defs.values_mut() {
      fix_schema_for_strict(v);
    }
  }
}

/// Generates a structured object, trying configured providers in order and
/// falling back on failure.
///
/// # Type Parameters
///
/// * `T` - The output type that implements `DeserializeOwned` and `JsonSchema`
///
/// # Arguments
///
/// * `messages` - The chat completion messages
/// * `schema_name` - A name for the schema
/// * `schema_description` - A description for the schema
pub async fn generate_object<T>(
  messages: Vec<ChatCompletionRequestMessage>,
  schema_name: String,
  schema_description: Option<String>,
) -> Result<ObjectCompletion<T>, AppError>
where
  T: DeserializeOwned + JsonSchema,
{
  // Generate JSON schema from type once; reused across every provider attempt.
  let schema = schemars::schema_for!(T);
  let mut schema = serde_json::to_value(&schema)?;
  fix_schema_for_strict(&mut schema);

  LLM_CLIENT
    .try_each(|provider| {
      let messages = messages.clone();
      let schema = schema.clone();
      let schema_name = schema_name.clone();
      let schema_description = schema_description.clone();
      async move {
        let request = CreateChatCompletionRequestArgs::default()
          .model(provider.model())
          .messages(messages)
          .response_format(ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
              description: schema_description,
              name: schema_name,
              schema: Some(schema),
              strict: Some(true),
            },
          })
          .build()?;

        let response = provider.client().chat().create(request).await?;
        let usage = response.usage.as_ref().map(|u| TokenUsage {
          prompt_tokens: u.prompt_tokens,
          completion_tokens: u.completion_tokens,
          total_tokens: u.total_tokens,
        });

        let content = response
          .choices
          .into_iter()
          .find_map(|c| c.message.content)
          .ok_or_else(|| anyhow!("empty message content"))?;

        let value: T = serde_json::from_str(&content)?;

        Ok(ObjectCompletion {
          value,
          provider: provider.base_url().to_owned(),
          model: provider.model().to_owned(),
          usage,
        })
      }
    })
    .await
    .map_err(AppError::new)
}
