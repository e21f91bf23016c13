//! Gemini provider implementation
//!
//! Calls the `generateContent` REST endpoint with the MediMate instruction
//! prompt and `responseMimeType: application/json`, then parses the
//! candidate text as an [`AiPayload`]. A data-URI image is sent inline;
//! other image references are described in a text part.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{prompts, Config};
use crate::conversation::AiPayload;

use super::{AiResponder, ResponderError};

pub struct GeminiResponder {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiResponder {
    pub fn from_config(config: &Config) -> Result<Self, ResponderError> {
        let api_key = config
            .gemini_api_key
            .clone()
            .ok_or_else(|| ResponderError::NotConfigured("GEMINI_API_KEY is not set".into()))?;

        Ok(Self {
            client: Client::new(),
            base_url: config.gemini_base_url.clone(),
            model: config.gemini_model.clone(),
            api_key,
        })
    }

    fn request_body(&self, symptoms: &str, image_url: Option<&str>) -> Value {
        let mut parts = vec![json!({ "text": prompts::advice_prompt(symptoms) })];

        if let Some(image) = image_url {
            match split_data_uri(image) {
                Some((mime_type, data)) => parts.push(json!({
                    "inline_data": { "mime_type": mime_type, "data": data }
                })),
                None => parts.push(json!({
                    "text": format!("An image related to the symptoms is available at: {image}")
                })),
            }
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "responseMimeType": "application/json" }
        })
    }
}

#[async_trait]
impl AiResponder for GeminiResponder {
    async fn respond(
        &self,
        symptoms: &str,
        image_url: Option<&str>,
    ) -> Result<AiPayload, ResponderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(symptoms, image_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ResponderError::Api(format!("{}: {}", status, body)));
        }

        let body: GenerateContentResponse = response.json().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .ok_or(ResponderError::EmptyAdvice)?;

        parse_payload(&text)
    }
}

/// Parses the model's JSON answer, backfilling the fixed knowledge and
/// disclaimer statements when the model leaves them out.
fn parse_payload(text: &str) -> Result<AiPayload, ResponderError> {
    let mut payload: AiPayload = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ResponderError::InvalidPayload(e.to_string()))?;

    if payload.advice.trim().is_empty() {
        return Err(ResponderError::EmptyAdvice);
    }
    if payload.knowledge_sources.trim().is_empty() {
        payload.knowledge_sources = prompts::DEFAULT_KNOWLEDGE_SOURCES.to_string();
    }
    if payload.disclaimer.trim().is_empty() {
        payload.disclaimer = prompts::STANDARD_DISCLAIMER.to_string();
    }

    Ok(payload)
}

/// Models sometimes wrap JSON in a markdown fence despite the response MIME
/// type; strip it before parsing.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|inner| inner.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Splits `data:<mime>;base64,<data>` into its mime type and payload.
fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime_type, data) = rest.split_once(";base64,")?;
    if mime_type.is_empty() || data.is_empty() {
        return None;
    }
    Some((mime_type, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_payload() {
        let text = r#"{
            "advice": "Apply a cold compress.",
            "suggestions": ["Has the swelling spread?"],
            "knowledge_sources": "Medical texts.",
            "disclaimer": "See a doctor."
        }"#;

        let payload = parse_payload(text).unwrap();
        assert_eq!(payload.advice, "Apply a cold compress.");
        assert_eq!(payload.suggestions.len(), 1);
    }

    #[test]
    fn backfills_missing_statements() {
        let payload = parse_payload(r#"{"advice": "Rest."}"#).unwrap();
        assert_eq!(payload.knowledge_sources, prompts::DEFAULT_KNOWLEDGE_SOURCES);
        assert_eq!(payload.disclaimer, prompts::STANDARD_DISCLAIMER);
        assert!(payload.suggestions.is_empty());
    }

    #[test]
    fn empty_advice_is_a_failure() {
        let result = parse_payload(r#"{"advice": "  "}"#);
        assert!(matches!(result, Err(ResponderError::EmptyAdvice)));
    }

    #[test]
    fn invalid_json_is_a_failure() {
        let result = parse_payload("not json");
        assert!(matches!(result, Err(ResponderError::InvalidPayload(_))));
    }

    #[test]
    fn strips_markdown_fences() {
        let fenced = "```json\n{\"advice\": \"Hydrate.\"}\n```";
        let payload = parse_payload(fenced).unwrap();
        assert_eq!(payload.advice, "Hydrate.");
    }

    #[test]
    fn splits_data_uris() {
        assert_eq!(
            split_data_uri("data:image/png;base64,QUJD"),
            Some(("image/png", "QUJD"))
        );
        assert_eq!(split_data_uri("https://example.com/rash.png"), None);
        assert_eq!(split_data_uri("data:;base64,QUJD"), None);
    }
}
