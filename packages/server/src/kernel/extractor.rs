//! LLM extractor - structured pantry data from scraped Markdown.
//!
//! Calls the OpenAI chat completions API with a `json_schema` response
//! format so the model is constrained to the pantry update shape. The raw
//! payload stays dict-shaped; the validation gate decides what to trust.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::kernel::traits::BaseExtractor;
use crate::kernel::EXTRACTION_MODEL;

const SYSTEM_PROMPT: &str = "\
You extract structured information about food pantries from scraped webpage \
content. Today is {current_date} ({day_of_week}). Report the operational \
status, the full weekly schedule, today's hours based on that schedule, every \
eligibility rule mentioned, whether ID or documentation is required, any \
residency requirement, and any special notes such as temporary closures. \
Score confidence 1-10 by how much pantry-specific information the page \
contains: 1 means a generic site with no pantry details, 9-10 a dedicated \
pantry page with hours and rules.";

/// JSON schema the model output must conform to.
fn response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "enum": ["OPEN", "CLOSED", "WAITLIST", "UNKNOWN"],
            },
            "hours_notes": { "type": "string" },
            "hours_today": { "type": "string" },
            "eligibility_rules": {
                "type": "array",
                "items": { "type": "string" },
            },
            "is_id_required": { "type": "boolean" },
            "residency_req": { "type": ["string", "null"] },
            "special_notes": { "type": ["string", "null"] },
            "confidence": { "type": "integer" },
        },
        "required": [
            "status",
            "hours_notes",
            "hours_today",
            "eligibility_rules",
            "is_id_required",
            "confidence",
        ],
        "additionalProperties": false,
    })
}

/// Extractor backed by OpenAI structured outputs.
pub struct OpenAiExtractor {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: EXTRACTION_MODEL.to_string(),
        }
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Build the system prompt with the current date injected.
    fn build_system_prompt() -> String {
        let now = chrono::Local::now();
        SYSTEM_PROMPT
            .replace("{current_date}", &now.format("%A, %B %d, %Y").to_string())
            .replace("{day_of_week}", &now.format("%A").to_string())
    }
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl BaseExtractor for OpenAiExtractor {
    async fn extract(&self, markdown: &str) -> anyhow::Result<Option<Value>> {
        let start = Instant::now();

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                Message { role: "system", content: Self::build_system_prompt() },
                Message {
                    role: "user",
                    content: format!(
                        "Extract structured food pantry information from this scraped webpage content:\n\n{}",
                        markdown
                    ),
                },
            ],
            "temperature": 0,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "pantry_update",
                    "strict": false,
                    "schema": response_schema(),
                }
            },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %detail, "OpenAI API error");
            anyhow::bail!("OpenAI API error ({}): {}", status, detail);
        }

        let chat: ChatResponse = response.json().await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let Some(content) = chat.choices.into_iter().next().and_then(|c| c.message.content)
        else {
            error!(duration_ms, "Extraction failed: empty response from model");
            return Ok(None);
        };

        let data: Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                error!(duration_ms, error = %e, "Extraction failed: JSON parse error");
                return Ok(None);
            }
        };

        let confidence = data.get("confidence").and_then(Value::as_i64).unwrap_or(0);
        info!(
            confidence,
            status = data.get("status").and_then(Value::as_str).unwrap_or(""),
            duration_ms,
            "Extraction complete"
        );

        if confidence <= 4 {
            warn!(confidence, "Low confidence extraction");
        }

        debug!(content_length = markdown.len(), "Extraction input size");

        Ok(Some(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_injects_date() {
        let prompt = OpenAiExtractor::build_system_prompt();
        assert!(!prompt.contains("{current_date}"));
        assert!(!prompt.contains("{day_of_week}"));
    }

    #[test]
    fn schema_requires_core_fields() {
        let schema = response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();

        assert!(required.contains(&"status"));
        assert!(required.contains(&"confidence"));
        assert!(required.contains(&"eligibility_rules"));
    }

    #[test]
    fn chat_response_parses() {
        let raw = r#"{"choices":[{"message":{"content":"{\"status\":\"OPEN\"}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let content = parsed.choices[0].message.content.as_deref().unwrap();
        assert!(content.contains("OPEN"));
    }
}
