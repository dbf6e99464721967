use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use common::{error::AppError, types::profile::Profile};
use tracing::debug;

use crate::prompt::{create_user_message, DEFAULT_QUERY_SYSTEM_PROMPT};

/// Rough heuristic for chat-model tokenization; used when the provider does
/// not report usage.
const AVG_CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub text: String,
    pub tokens_used: u64,
}

/// The generative model call, behind a seam so orchestration is testable
/// without a provider.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        context: &str,
        query: &str,
        profile: &Profile,
        credential: &str,
    ) -> Result<GenerationOutput, AppError>;
}

/// Rough token estimate for accounting when the provider reports nothing
/// (including transport failures, which still consumed a request upstream).
pub fn estimate_tokens(context: &str, query: &str, answer: &str) -> u64 {
    let chars = context.chars().count() + query.chars().count() + answer.chars().count();
    (chars / AVG_CHARS_PER_TOKEN).max(1) as u64
}

/// OpenAI-compatible chat completion backend. A fresh client is built per
/// call because the credential comes from the quota pool lease.
pub struct OpenAiGenerator {
    base_url: String,
    system_prompt: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(base_url: String, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            base_url,
            system_prompt: DEFAULT_QUERY_SYSTEM_PROMPT.to_string(),
            max_tokens,
            timeout,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: String) -> Self {
        self.system_prompt = system_prompt;
        self
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(
        &self,
        context: &str,
        query: &str,
        profile: &Profile,
        credential: &str,
    ) -> Result<GenerationOutput, AppError> {
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(credential)
                .with_api_base(&self.base_url),
        );

        let user_message = create_user_message(context, query);
        let request = CreateChatCompletionRequestArgs::default()
            .model(&profile.model_name)
            .temperature(profile.temperature)
            .max_tokens(self.max_tokens)
            .messages([
                ChatCompletionRequestSystemMessage::from(self.system_prompt.clone()).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .build()?;

        let response = tokio::time::timeout(self.timeout, client.chat().create(request))
            .await
            .map_err(|_| {
                AppError::ExternalService(format!(
                    "generation timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::ExternalService(format!("generation call failed: {e}")))?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                AppError::ExternalService("no content in generation response".into())
            })?;

        let tokens_used = response
            .usage
            .map(|usage| u64::from(usage.total_tokens))
            .unwrap_or_else(|| estimate_tokens(context, query, &text));

        debug!(tokens_used, model = %profile.model_name, "generation complete");
        Ok(GenerationOutput { text, tokens_used })
    }
}
