use std::{sync::Arc, time::Duration};

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use common::storage::types::{agent::Agent, generation_job::ItemContext};
use thiserror::Error;

/// A single field failing to generate. Recorded on the field outcome as data;
/// never propagated past the item-processing step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("generation timed out after {0}s")]
    Timeout(u64),
    #[error("generation API error: {0}")]
    Remote(String),
    #[error("empty response from generation API")]
    EmptyResponse,
}

/// The external generation capability: given an agent, the captured item
/// context and one field name, produce the text for that field.
#[async_trait]
pub trait ContentClient: Send + Sync {
    async fn generate(
        &self,
        agent: &Agent,
        item_name: &str,
        context: &ItemContext,
        field: &str,
        keywords: &[String],
    ) -> Result<String, GenerationFailure>;
}

pub struct OpenAiContentClient {
    openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    timeout: Duration,
}

impl OpenAiContentClient {
    pub fn new(
        openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        timeout: Duration,
    ) -> Self {
        Self {
            openai_client,
            timeout,
        }
    }

    fn build_request(
        &self,
        agent: &Agent,
        item_name: &str,
        context: &ItemContext,
        field: &str,
        keywords: &[String],
    ) -> Result<CreateChatCompletionRequest, GenerationFailure> {
        let mut user_message = format!("Write the `{field}` for the product \"{item_name}\".");
        if let Some(description) = &context.description {
            user_message.push_str(&format!("\nExisting description:\n{description}"));
        }
        if !context.categories.is_empty() {
            user_message.push_str(&format!("\nCategories: {}", context.categories.join(", ")));
        }
        if !keywords.is_empty() {
            user_message.push_str(&format!(
                "\nWork these keywords in naturally: {}",
                keywords.join(", ")
            ));
        }
        if let Some(tone) = &agent.tone {
            user_message.push_str(&format!("\nTone: {tone}"));
        }
        user_message.push_str("\nReturn only the content itself, no preamble.");

        let request = CreateChatCompletionRequestArgs::default()
            .model(&agent.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(agent.system_prompt.clone()).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .build()
            .map_err(|e| GenerationFailure::Remote(e.to_string()))?;

        Ok(request)
    }
}

#[async_trait]
impl ContentClient for OpenAiContentClient {
    async fn generate(
        &self,
        agent: &Agent,
        item_name: &str,
        context: &ItemContext,
        field: &str,
        keywords: &[String],
    ) -> Result<String, GenerationFailure> {
        let request = self.build_request(agent, item_name, context, field, keywords)?;

        // One slow remote call must never stall the rest of the job; expiry
        // is a field-level failure like any other.
        let response = tokio::time::timeout(self.timeout, self.openai_client.chat().create(request))
            .await
            .map_err(|_| GenerationFailure::Timeout(self.timeout.as_secs()))?
            .map_err(|e| GenerationFailure::Remote(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .ok_or(GenerationFailure::EmptyResponse)?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_includes_context_and_keywords() {
        let openai_client = Arc::new(async_openai::Client::new());
        let client = OpenAiContentClient::new(openai_client, Duration::from_secs(30));
        let agent = Agent::new(
            "Copywriter",
            "gpt-4o-mini",
            Some("playful"),
            "You write product copy.",
        );
        let context = ItemContext {
            description: Some("A sturdy garden trowel.".to_string()),
            categories: vec!["Garden".to_string(), "Tools".to_string()],
        };

        let request = client
            .build_request(
                &agent,
                "Trowel Pro",
                &context,
                "seo_title",
                &["ergonomic".to_string()],
            )
            .expect("request builds");

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 2);
        let rendered = serde_json::to_string(&request.messages).expect("serialize messages");
        assert!(rendered.contains("Trowel Pro"));
        assert!(rendered.contains("seo_title"));
        assert!(rendered.contains("sturdy garden trowel"));
        assert!(rendered.contains("ergonomic"));
        assert!(rendered.contains("playful"));
    }
}
