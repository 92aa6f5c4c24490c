//! # LLM client
//!
//! Generates a structured JSON answer from a query and an assembled
//! context, using the provider's JSON response-format mode rather than
//! hand-parsing free text out of a chat completion.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LLMError;

/// The model's structured answer, matching the JSON schema requested in
/// the prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredAnswer {
    pub answer: String,
    pub confidence: f32,
    pub citations: Vec<String>,
    pub is_complete: bool,
}

/// LLM contract, implemented by the OpenAI-backed client and a
/// scriptable fake in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate_structured(
        &self,
        query: &str,
        context: &str,
        document_ids: &[Uuid],
    ) -> Result<StructuredAnswer, LLMError>;

    /// Cheap connectivity probe for `/health` and `/ready`, analogous to
    /// the vector store's `ensure_collection`. Auth failures are reported
    /// as `"Invalid API key"` rather than the raw provider error string.
    async fn health_check(&self) -> Result<(), LLMError>;
}

/// OpenAI-backed [`LlmClient`].
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiLlmClient {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

fn system_prompt(document_ids: &[Uuid]) -> String {
    format!(
        "You are a retrieval-augmented assistant. Answer the user's question using \
         only the provided context. If the context is insufficient, say so and set \
         is_complete to false describing what is missing. Respond with a JSON object \
         matching exactly this schema: {{\"answer\": string, \"confidence\": number in \
         [0,1], \"citations\": array of strings drawn only from {:?}, \"is_complete\": \
         boolean}}. Do not include any text outside the JSON object.",
        document_ids
    )
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn generate_structured(
        &self,
        query: &str,
        context: &str,
        document_ids: &[Uuid],
    ) -> Result<StructuredAnswer, LLMError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt(document_ids))
            .build()
            .map_err(|e| LLMError::Request(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(format!("Context:\n{context}\n\nQuestion: {query}"))
            .build()
            .map_err(|e| LLMError::Request(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![system.into(), user.into()])
            .temperature(0.7)
            .max_tokens(500u16)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| LLMError::Request(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LLMError::Request(e.to_string()))?;

        let raw = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LLMError::Parse {
                raw: "<empty response>".to_string(),
            })?;

        parse_structured_answer(&raw)
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        self.client.models().list().await.map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("api key")
                || message.to_lowercase().contains("authentication")
            {
                LLMError::Request("Invalid API key".to_string())
            } else {
                LLMError::Request(message)
            }
        })?;
        Ok(())
    }
}

/// Parse a model response into a [`StructuredAnswer`], truncating the raw
/// content to 200 characters in the error to keep logs bounded.
fn parse_structured_answer(raw: &str) -> Result<StructuredAnswer, LLMError> {
    if raw.trim().is_empty() {
        return Err(LLMError::Parse {
            raw: "<empty response>".to_string(),
        });
    }
    serde_json::from_str(raw).map_err(|_| LLMError::Parse {
        raw: raw.chars().take(200).collect(),
    })
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Scriptable [`LlmClient`] for tests: returns the queued answer, or
    /// fails if none remain.
    #[derive(Clone, Default)]
    pub struct FakeLlmClient {
        queued: Arc<Mutex<Vec<StructuredAnswer>>>,
    }

    impl FakeLlmClient {
        pub fn with_answer(answer: StructuredAnswer) -> Self {
            let client = Self::default();
            client.queued.lock().push(answer);
            client
        }
    }

    #[async_trait]
    impl LlmClient for FakeLlmClient {
        async fn generate_structured(
            &self,
            _query: &str,
            _context: &str,
            _document_ids: &[Uuid],
        ) -> Result<StructuredAnswer, LLMError> {
            self.queued
                .lock()
                .pop()
                .ok_or_else(|| LLMError::Parse {
                    raw: "<no fake answer queued>".to_string(),
                })
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }
}
