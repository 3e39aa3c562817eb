use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{Cue, FetchRequest, SourceError, SourceTranscript, TranscriptSource};
use crate::config::InnertubeConfig;

/// Reimplementation of the platform's internal web client transcript call
pub struct InnertubeSource {
    client: Client,
    base_url: String,
    api_key: String,
    client_version: String,
    timeout: Duration,
}

impl InnertubeSource {
    pub fn new(client: Client, config: &InnertubeConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client_version: config.client_version.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn request_body(&self, request: &FetchRequest) -> Value {
        json!({
            "context": {
                "client": {
                    "clientName": "WEB",
                    "clientVersion": self.client_version,
                    "hl": request.primary_language(),
                }
            },
            "params": encode_params(&request.content_id),
        })
    }
}

/// Protobuf-framed content id: field 1, length-delimited
fn encode_params(content_id: &str) -> String {
    let mut bytes = vec![0x0a, content_id.len() as u8];
    bytes.extend_from_slice(content_id.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn parse_segments(body: &Value) -> Result<Vec<Cue>, SourceError> {
    let segments = body
        .pointer("/actions/0/updateEngagementPanelAction/content/transcriptRenderer/content/transcriptSearchPanelRenderer/body/transcriptSegmentListRenderer/initialSegments")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::NoCaptions("transcript panel missing from response".to_string()))?;

    let cues = segments
        .iter()
        .filter_map(|segment| {
            let renderer = segment.get("transcriptSegmentRenderer")?;
            let text: String = renderer
                .pointer("/snippet/runs")?
                .as_array()?
                .iter()
                .filter_map(|run| run["text"].as_str())
                .collect();
            let start_ms = millis(&renderer["startMs"]);
            let end_ms = millis(&renderer["endMs"]).max(start_ms);
            Some(Cue::new(text, start_ms / 1000.0, (end_ms - start_ms) / 1000.0))
        })
        .collect();

    Ok(cues)
}

/// Millisecond fields arrive as strings ("1234") or occasionally numbers
fn millis(value: &Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .unwrap_or(0.0)
}

#[async_trait]
impl TranscriptSource for InnertubeSource {
    fn name(&self) -> &'static str {
        "innertube"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<SourceTranscript, SourceError> {
        let url = format!("{}/youtubei/v1/get_transcript", self.base_url);

        tracing::debug!(content_id = %request.content_id, "Calling internal transcript endpoint");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str()), ("prettyPrint", "false")])
            .json(&self.request_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::from_response(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("invalid JSON: {}", e)))?;

        Ok(SourceTranscript {
            cues: parse_segments(&body)?,
            language: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn segment(text: &str, start_ms: &str, end_ms: &str) -> Value {
        json!({
            "transcriptSegmentRenderer": {
                "snippet": {"runs": [{"text": text}]},
                "startMs": start_ms,
                "endMs": end_ms
            }
        })
    }

    fn panel(segments: Vec<Value>) -> Value {
        json!({
            "actions": [{
                "updateEngagementPanelAction": {
                    "content": {"transcriptRenderer": {"content": {"transcriptSearchPanelRenderer": {
                        "body": {"transcriptSegmentListRenderer": {"initialSegments": segments}}
                    }}}}
                }
            }]
        })
    }

    fn source(base_url: &str) -> InnertubeSource {
        let config = InnertubeConfig {
            base_url: base_url.to_string(),
            ..InnertubeConfig::default()
        };
        InnertubeSource::new(Client::new(), &config)
    }

    #[test]
    fn test_encode_params_frames_content_id() {
        // "\n\x0b" + id, base64
        assert_eq!(encode_params("dQw4w9WgXcQ"), "CgtkUXc0dzlXZ1hjUQ==");
    }

    #[test]
    fn test_parse_segments_joins_runs() {
        let split_runs = json!({
            "transcriptSegmentRenderer": {
                "snippet": {"runs": [{"text": "fir"}, {"text": "st"}]},
                "startMs": "0",
                "endMs": "1200"
            }
        });
        let body = panel(vec![split_runs, segment("ignored", "x", "y")]);

        let cues = parse_segments(&body).unwrap();

        assert_eq!(cues[0], Cue::new("first", 0.0, 1.2));
        // Unparseable timings fall back to zero rather than failing
        assert_eq!(cues[1], Cue::new("ignored", 0.0, 0.0));
    }

    #[test]
    fn test_parse_segments_without_panel() {
        let err = parse_segments(&json!({"responseContext": {}})).unwrap_err();
        assert!(matches!(err, SourceError::NoCaptions(_)));
    }

    #[tokio::test]
    async fn test_fetch_posts_client_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/youtubei/v1/get_transcript"))
            .and(query_param("key", InnertubeConfig::default().api_key.as_str()))
            .and(body_partial_json(json!({
                "context": {"client": {"clientName": "WEB"}},
                "params": "CgtkUXc0dzlXZ1hjUQ=="
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(panel(vec![
                segment("hello", "500", "1500"),
                segment("world", "1500", "2500"),
            ])))
            .mount(&server)
            .await;

        let transcript = source(&server.uri())
            .fetch(&FetchRequest::new("dQw4w9WgXcQ", vec!["en".into()]))
            .await
            .unwrap();

        assert_eq!(
            transcript.cues,
            vec![Cue::new("hello", 0.5, 1.0), Cue::new("world", 1.5, 1.0)]
        );
    }
}
