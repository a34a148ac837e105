use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::error::JudgeError;
use crate::judge::{Judge, Judgment};
use crate::parse::parse_judgment;
use crate::prompt::{SYSTEM_PROMPT, build_user_prompt};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for [`OpenAIJudge`]. Empty fields use OpenAI defaults.
#[derive(Debug, Clone, Default)]
pub struct OpenAIJudgeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
}

/// Judge backed by any OpenAI-compatible chat completions endpoint.
pub struct OpenAIJudge {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OpenAIJudge {
    pub fn new(cfg: OpenAIJudgeConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: cfg.api_key,
            model: if cfg.model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                cfg.model
            },
            base_url: if cfg.base_url.is_empty() {
                OPENAI_BASE_URL.to_string()
            } else {
                cfg.base_url
            },
            temperature: cfg.temperature.unwrap_or(0.1),
        }
    }

    fn request_body(&self, segment_text: &str, passage_text: &str) -> Value {
        json!({
            "model": self.model,
            "stream": false,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_prompt(segment_text, passage_text) },
            ],
        })
    }
}

#[async_trait]
impl Judge for OpenAIJudge {
    async fn judge(&self, segment_text: &str, passage_text: &str) -> Result<Judgment, JudgeError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(segment_text, passage_text))
            .send()
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Http { status, body });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| JudgeError::InvalidVerdict(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| JudgeError::InvalidVerdict("missing message content".into()))?;

        parse_judgment(content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let j = OpenAIJudge::new(OpenAIJudgeConfig::default());
        assert_eq!(j.model(), DEFAULT_MODEL);
        assert_eq!(j.base_url, OPENAI_BASE_URL);
    }

    #[test]
    fn test_request_body() {
        let j = OpenAIJudge::new(OpenAIJudgeConfig {
            model: "qwen-flash".into(),
            ..Default::default()
        });
        let body = j.request_body("we traded early", "Insider trading is prohibited.");
        assert_eq!(body["model"], "qwen-flash");
        assert_eq!(body["response_format"]["type"], "json_object");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("we traded early"));
        assert!(user.contains("Insider trading is prohibited."));
    }
}
