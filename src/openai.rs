use std::time::Duration;

use anyhow::Context as _;

use crate::cli::OracleArgs;

/// Minimal client for the OpenAI Responses API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: String, model: &str, temperature: f32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("build OpenAI http client")?;
        Ok(Self {
            client,
            endpoint: responses_endpoint(base_url),
            api_key,
            model: model.to_owned(),
            temperature,
        })
    }

    pub fn from_args(args: &OracleArgs) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        Self::new(
            &args.openai_base_url,
            api_key,
            &args.openai_model,
            args.openai_temperature,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn respond(&self, instructions: &str, input: &str) -> anyhow::Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "instructions": instructions,
            "input": input,
            "text": { "format": { "type": "text" } },
            "store": false,
        });

        // GPT-5 family models reject sampling params.
        if !self.model.starts_with("gpt-5")
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("temperature".to_owned(), serde_json::json!(self.temperature));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read OpenAI response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("OpenAI API error ({status}): {message}");
        }

        let value: serde_json::Value = serde_json::from_str(&raw).context("parse OpenAI response")?;
        extract_output_text(&value).context("extract output text")
    }
}

pub fn responses_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/responses")
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_output_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let mut text = String::new();
    if let Some(output) = value.get("output").and_then(|v| v.as_array()) {
        let parts = output
            .iter()
            .filter(|item| item.get("type").and_then(|v| v.as_str()) == Some("message"))
            .filter_map(|item| item.get("content").and_then(|v| v.as_array()))
            .flatten()
            .filter(|part| part.get("type").and_then(|v| v.as_str()) == Some("output_text"))
            .filter_map(|part| part.get("text").and_then(|v| v.as_str()));
        for part in parts {
            text.push_str(part);
        }
    } else if let Some(output_text) = value.get("output_text").and_then(|v| v.as_str()) {
        text.push_str(output_text);
    } else {
        anyhow::bail!("missing `output` array in response");
    }

    if text.trim().is_empty() {
        anyhow::bail!("OpenAI output text is empty");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            responses_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/responses"
        );
    }

    #[test]
    fn output_text_is_concatenated_from_message_parts() -> anyhow::Result<()> {
        let value = serde_json::json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "Shibuya Crossing, " },
                    { "type": "output_text", "text": "Tokyo, Japan" }
                ] }
            ]
        });
        assert_eq!(extract_output_text(&value)?, "Shibuya Crossing, Tokyo, Japan");
        Ok(())
    }

    #[test]
    fn blank_output_is_an_error() {
        let value = serde_json::json!({
            "output": [{ "type": "message", "content": [{ "type": "output_text", "text": "  " }] }]
        });
        assert!(extract_output_text(&value).is_err());
    }
}
