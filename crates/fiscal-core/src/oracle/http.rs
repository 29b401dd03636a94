//! OpenAI-compatible chat completions client.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{Oracle, OracleRequest};
use crate::error::OracleError;
use crate::models::config::OracleConfig;

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Oracle backed by an HTTP chat completions endpoint (Groq by default).
pub struct HttpOracle {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl HttpOracle {
    /// Build a client from configuration; the key comes from `api_key_env`.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = config.api_key().ok_or_else(|| {
            OracleError::NotConfigured(format!(
                "API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Request(format!("failed to create HTTP client: {}", e)))?;

        info!(model = %config.model, "Oracle client initialized");

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }

    fn body(&self, request: &OracleRequest) -> Value {
        let content = match &request.image {
            Some(png) => json!([
                {"type": "text", "text": request.prompt},
                {
                    "type": "image_url",
                    "image_url": {"url": format!("data:image/png;base64,{}", STANDARD.encode(png))}
                }
            ]),
            None => Value::String(request.prompt.clone()),
        };

        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": content}],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }
}

impl Oracle for HttpOracle {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| OracleError::NotConfigured("invalid API key format".to_string()))?,
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&self.body(request))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout_secs)
                } else {
                    OracleError::Request(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(OracleError::Request(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = resp.json().map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(self.timeout_secs)
            } else {
                OracleError::Request(format!("failed to parse response: {}", e))
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(OracleError::EmptyReply)?;

        debug!(chars = content.len(), "Oracle reply received");
        Ok(content)
    }
}
