use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use nutriflow_core::error::AnalysisError;
use nutriflow_core::nutrition::{NutritionQuery, SYSTEM_PROMPT};
use nutriflow_core::rate_limit::{LLM_SERVICE, RateLimiter};
use nutriflow_core::service::NutritionSource;

use crate::config::LlmConfig;
use crate::http::{build_client, endpoint};

const COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client asking for per-food nutrition as JSON.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    limiter: Arc<RateLimiter>,
}

impl LlmClient {
    pub fn new(config: &LlmConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(30))?,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            limiter,
        })
    }
}

#[async_trait]
impl NutritionSource for LlmClient {
    async fn ask(&self, query: &NutritionQuery) -> Result<String, AnalysisError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AnalysisError::Request(
                "NUTRIFLOW_LLM_API_KEY is not set".to_string(),
            ));
        };
        if !self.limiter.can_call(LLM_SERVICE) {
            return Err(AnalysisError::RateLimited {
                service: LLM_SERVICE.to_string(),
            });
        }

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": query.prompt() }
            ],
            "temperature": 0.2,
            "max_tokens": 500,
            "response_format": { "type": "json_object" }
        });

        debug!(food = %query.name, model = %self.model, "requesting nutrition estimate");
        let resp = self
            .client
            .post(endpoint(&self.base_url, COMPLETIONS_PATH))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::Request(format!("{status}: {text}")));
        }

        let data: ChatResponse = resp
            .json()
            .await
            .map_err(|e| AnalysisError::Request(e.to_string()))?;

        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AnalysisError::Request("empty completion".to_string()))
    }
}
