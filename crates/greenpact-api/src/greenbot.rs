use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use greenpact_types::api::{ChatTurn, GreenbotRequest, GreenbotResponse};

use crate::config::Config;
use crate::error::{ApiResult, ValidJson};
use crate::state::AppState;

const SYSTEM_PROMPT: &str = "You are GreenBot, a helpful assistant for farmers and crop buyers. \
Answer questions about crops, farming practice, market prices and contracts clearly and briefly.";

/// Language-model upstream for the advisory chat.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<String>;
}

/// Any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiAdvisor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    referer: String,
}

impl OpenAiAdvisor {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.llm_base_url.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            referer: config.public_url.clone(),
        }
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatTurn,
}

#[async_trait]
impl Advisor for OpenAiAdvisor {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", "GreenBot Chat API")
            .json(&json!({ "model": self.model, "messages": messages }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("language model returned {}: {}", status, body);
        }

        let completion: Completion = response.json().await.context("unreadable completion")?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("completion carried no choices")
    }
}

pub async fn chat(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<GreenbotRequest>,
) -> ApiResult<Json<GreenbotResponse>> {
    let user_turn = ChatTurn { role: "user".into(), content: req.message };

    let mut messages = Vec::with_capacity(req.history.len() + 2);
    messages.push(ChatTurn { role: "system".into(), content: SYSTEM_PROMPT.into() });
    messages.extend(req.history.iter().cloned());
    messages.push(user_turn.clone());

    debug!("greenbot request with {} prior turns", req.history.len());
    let reply = state.advisor.complete(&messages).await.map_err(|e| {
        warn!("greenbot upstream failed: {}", e);
        e
    })?;

    let mut history = req.history;
    history.push(user_turn);
    history.push(ChatTurn { role: "assistant".into(), content: reply.clone() });

    Ok(Json(GreenbotResponse { reply, history }))
}
