//! Narrative analysis of a transcript by external model-backed collaborators.
//!
//! The collaborators are untrusted: whatever they return is parsed field by
//! field and anything malformed is replaced with a default, so analysis never
//! fails an ingestion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod client;
mod parse;

pub use client::ChatCompletionsClient;
pub use parse::{parse_analysis, parse_verifications};

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("No API key configured for the analysis endpoint")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned no content")]
    EmptyResponse,
}

/// Structured output of the content generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "serde_json::Value")]
pub struct Analysis {
    pub topic_tags: Vec<TopicTag>,

    #[serde(rename = "sentimentTone")]
    pub sentiment: SentimentTone,

    pub insights: Vec<Insight>,
    pub claims: Vec<Claim>,
}

impl From<serde_json::Value> for Analysis {
    fn from(value: serde_json::Value) -> Self {
        parse::analysis_from_value(&value)
    }
}

impl Analysis {
    pub fn topic_names(&self) -> impl Iterator<Item = &str> {
        self.topic_tags.iter().map(|tag| tag.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTag {
    pub name: String,
    pub confidence: f64,
    pub relevance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Positive,
    Negative,
    #[default]
    Neutral,
    Mixed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentTone {
    pub overall: Tone,
    pub confidence: f64,
    pub emotions: Vec<String>,
    pub energy_level: EnergyLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Prediction,
    Observation,
    Recommendation,
    #[default]
    Analysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub text: String,
    pub category: InsightCategory,

    /// 1 (minor) to 5 (critical)
    pub importance: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    Prediction,
    #[default]
    Fact,
    Opinion,
    Projection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub text: String,

    #[serde(rename = "type")]
    pub kind: ClaimKind,

    pub confidence: f64,
    pub verifiable: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Supported,
    Disputed,
    Unverifiable,
    #[default]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedClaim {
    pub claim: Claim,
    pub status: VerificationStatus,
    pub explanation: String,
    pub sources: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl VerifiedClaim {
    pub fn pending(claim: Claim) -> Self {
        Self {
            claim,
            status: VerificationStatus::Pending,
            explanation: String::new(),
            sources: Vec::new(),
            checked_at: Utc::now(),
        }
    }
}

/// Turns a transcript excerpt into topics, sentiment, insights and claims
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn analyze(&self, title: &str, transcript_excerpt: &str) -> Analysis;
}

/// Annotates claims with a verification status; returns one entry per claim
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    async fn verify(&self, claims: &[Claim]) -> Vec<VerifiedClaim>;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub analysis: Analysis,
    pub verified_claims: Vec<VerifiedClaim>,
}

/// Run the generator over a bounded excerpt, then verify the verifiable claims
pub async fn analyze_transcript(
    generator: &dyn ContentGenerator,
    verifier: &dyn ClaimVerifier,
    title: &str,
    full_text: &str,
    max_excerpt_chars: usize,
) -> AnalysisReport {
    let excerpt = crate::utils::truncate_chars(full_text, max_excerpt_chars);
    let analysis = generator.analyze(title, &excerpt).await;

    let verifiable: Vec<Claim> = analysis.claims.iter().filter(|claim| claim.verifiable).cloned().collect();
    let verified_claims = if verifiable.is_empty() {
        Vec::new()
    } else {
        verifier.verify(&verifiable).await
    };

    tracing::info!(
        topics = analysis.topic_tags.len(),
        insights = analysis.insights.len(),
        claims = analysis.claims.len(),
        verified = verified_claims.len(),
        "Analysis complete"
    );

    AnalysisReport {
        analysis,
        verified_claims,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn claim(text: &str, verifiable: bool) -> Claim {
        Claim {
            text: text.to_string(),
            kind: ClaimKind::Fact,
            confidence: 0.9,
            verifiable,
            timeframe: None,
        }
    }

    #[tokio::test]
    async fn test_analyze_transcript_verifies_only_verifiable_claims() {
        let mut generator = MockContentGenerator::new();
        generator
            .expect_analyze()
            .with(eq("Episode 12"), eq("abcde…"))
            .times(1)
            .returning(|_, _| Analysis {
                claims: vec![claim("sales doubled", true), claim("it feels great", false)],
                ..Analysis::default()
            });

        let mut verifier = MockClaimVerifier::new();
        verifier
            .expect_verify()
            .withf(|claims| claims.len() == 1 && claims[0].text == "sales doubled")
            .times(1)
            .returning(|claims| claims.iter().cloned().map(VerifiedClaim::pending).collect());

        let report = analyze_transcript(&generator, &verifier, "Episode 12", "abcdefghij", 5).await;

        assert_eq!(report.analysis.claims.len(), 2);
        assert_eq!(report.verified_claims.len(), 1);
        assert_eq!(report.verified_claims[0].status, VerificationStatus::Pending);
    }

    #[tokio::test]
    async fn test_analyze_transcript_skips_verifier_without_claims() {
        let mut generator = MockContentGenerator::new();
        generator.expect_analyze().returning(|_, _| Analysis::default());

        let mut verifier = MockClaimVerifier::new();
        verifier.expect_verify().times(0);

        let report = analyze_transcript(&generator, &verifier, "t", "text", 100).await;

        assert!(report.verified_claims.is_empty());
    }

    #[test]
    fn test_analysis_deserializes_leniently() {
        let analysis: Analysis = serde_json::from_str(r#"{"topicTags": [{"name": "EVs", "confidence": 7}], "claims": "nope"}"#).unwrap();

        assert_eq!(analysis.topic_tags.len(), 1);
        assert_eq!(analysis.topic_tags[0].confidence, 1.0);
        assert!(analysis.claims.is_empty());
    }
}
