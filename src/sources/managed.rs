use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{Availability, Cue, FetchRequest, RuntimeEnv, SourceError, SourceTranscript, TranscriptSource};
use crate::config::ManagedServiceConfig;

/// Third-party transcript API (Supadata-compatible)
pub struct ManagedServiceSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ManagedServiceSource {
    pub fn new(client: Client, config: &ManagedServiceConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Offsets and durations are reported in milliseconds
fn parse_content(body: &Value) -> Result<SourceTranscript, SourceError> {
    let entries = body["content"]
        .as_array()
        .ok_or_else(|| SourceError::Parse("response has no content array".to_string()))?;

    let cues = entries
        .iter()
        .filter_map(|entry| {
            let text = entry["text"].as_str()?;
            let offset_ms = entry["offset"].as_f64().unwrap_or(0.0);
            let duration_ms = entry["duration"].as_f64().unwrap_or(0.0);
            Some(Cue::new(text, offset_ms / 1000.0, duration_ms / 1000.0))
        })
        .collect();

    let language = body["lang"]
        .as_str()
        .or_else(|| entries.first().and_then(|entry| entry["lang"].as_str()))
        .map(str::to_string);

    Ok(SourceTranscript { cues, language })
}

#[async_trait]
impl TranscriptSource for ManagedServiceSource {
    fn name(&self) -> &'static str {
        "managed-service"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(&self, _env: &RuntimeEnv) -> Availability {
        match self.api_key {
            Some(_) => Availability::Ready,
            None => Availability::Unavailable(
                "no API key configured (sources.managed.api_key or TRANSCRIPT_API_KEY)".to_string(),
            ),
        }
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<SourceTranscript, SourceError> {
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let url = format!("{}/transcript", self.base_url);

        tracing::debug!(content_id = %request.content_id, "Requesting managed transcript");

        let response = self
            .client
            .get(&url)
            .header("x-api-key", api_key)
            .query(&[
                ("videoId", request.content_id.as_str()),
                ("lang", request.primary_language()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::from_response(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("invalid JSON: {}", e)))?;

        parse_content(&body)
    }
}
