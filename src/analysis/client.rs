use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    parse_analysis, parse_verifications, Analysis, AnalysisError, Claim, ClaimVerifier, ContentGenerator,
    VerifiedClaim,
};
use crate::config::AnalysisConfig;

const ANALYSIS_PROMPT: &str = r#"You analyze video transcripts. Reply with a single JSON object:
{"topicTags": [{"name": string, "confidence": 0-1, "relevance": 0-1}],
 "sentimentTone": {"overall": "positive"|"negative"|"neutral"|"mixed", "confidence": 0-1, "emotions": [string], "energyLevel": "low"|"medium"|"high"},
 "insights": [{"text": string, "category": "prediction"|"observation"|"recommendation"|"analysis", "importance": 1-5, "timestamp": "MM:SS"}],
 "claims": [{"text": string, "type": "prediction"|"fact"|"opinion"|"projection", "confidence": 0-1, "verifiable": bool, "timeframe": string}]}
Use short, reusable topic names (3-8 topics)."#;

const VERIFY_PROMPT: &str = r#"You fact-check claims. Reply with a single JSON object:
{"verifications": [{"index": number, "status": "supported"|"disputed"|"unverifiable", "explanation": string, "sources": [string]}]}
Return one entry per claim, using the claim's index."#;

/// OpenAI-compatible chat completions endpoint acting as both the content
/// generator and the claim verifier
pub struct ChatCompletionsClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(AnalysisError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Send one system + user exchange and return the assistant's text
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body: crate::utils::truncate_chars(body.trim(), 200),
            });
        }

        let payload: Value = response.json().await?;
        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|content| !content.trim().is_empty())
            .map(str::to_string)
            .ok_or(AnalysisError::EmptyResponse)
    }
}

#[async_trait]
impl ContentGenerator for ChatCompletionsClient {
    async fn analyze(&self, title: &str, transcript_excerpt: &str) -> Analysis {
        let user = format!("Title: {}\n\nTranscript:\n{}", title, transcript_excerpt);

        match self.complete(ANALYSIS_PROMPT, &user).await {
            Ok(content) => parse_analysis(&content),
            Err(e) => {
                tracing::warn!(error = %e, "Content generator call failed; using empty analysis");
                Analysis::default()
            }
        }
    }
}

#[async_trait]
impl ClaimVerifier for ChatCompletionsClient {
    async fn verify(&self, claims: &[Claim]) -> Vec<VerifiedClaim> {
        let listing: String = claims
            .iter()
            .enumerate()
            .map(|(index, claim)| format!("{}. {}\n", index, claim.text))
            .collect();

        match self.complete(VERIFY_PROMPT, &listing).await {
            Ok(content) => parse_verifications(&content, claims),
            Err(e) => {
                tracing::warn!(error = %e, "Claim verifier call failed; claims stay pending");
                claims.iter().cloned().map(VerifiedClaim::pending).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ClaimKind, VerificationStatus};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> ChatCompletionsClient {
        ChatCompletionsClient::new(&AnalysisConfig {
            base_url: base_url.to_string(),
            api_key: Some("sk-test".to_string()),
            ..AnalysisConfig::default()
        })
        .unwrap()
    }

    fn completion(content: &str) -> Value {
        json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]})
    }

    #[test]
    fn test_requires_api_key() {
        let result = ChatCompletionsClient::new(&AnalysisConfig {
            api_key: None,
            ..AnalysisConfig::default()
        });
        assert!(matches!(result, Err(AnalysisError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_analyze_parses_model_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"topicTags": [{"name": "Robotaxis", "confidence": 0.9, "relevance": 0.7}]}"#,
            )))
            .mount(&server)
            .await;

        let analysis = client(&server.uri()).analyze("Title", "transcript").await;

        assert_eq!(analysis.topic_names().collect::<Vec<_>>(), vec!["Robotaxis"]);
    }

    #[tokio::test]
    async fn test_analyze_downgrades_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let analysis = client(&server.uri()).analyze("Title", "transcript").await;

        assert_eq!(analysis, Analysis::default());
    }

    #[tokio::test]
    async fn test_verify_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"verifications": [{"index": 0, "status": "supported", "explanation": "ok"}]}"#,
            )))
            .mount(&server)
            .await;

        let claims = vec![Claim {
            text: "Deliveries grew 30%".to_string(),
            kind: ClaimKind::Fact,
            confidence: 0.8,
            verifiable: true,
            timeframe: None,
        }];

        let verified = client(&server.uri()).verify(&claims).await;

        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].status, VerificationStatus::Supported);
        assert_eq!(verified[0].explanation, "ok");
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server.uri()).complete("s", "u").await.unwrap_err();

        assert!(matches!(err, AnalysisError::EmptyResponse));
    }
}
