use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::segment::{full_text, ParagraphSegment, ParagraphSegmenter};
use crate::sources::{AttemptRecord, Cue, FetchError, FetchOrchestrator, FetchRequest, FetchSuccess, RuntimeEnv};
use crate::utils::{extract_content_id, watch_url, word_count};

/// A transcript acquired, cleaned and segmented for one content id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedTranscript {
    /// Unique id of this ingestion run
    pub ingest_id: Uuid,

    pub content_id: String,
    pub source_url: String,

    /// Name of the strategy that produced the cues
    pub strategy: String,

    pub language: Option<String>,
    pub cues: Vec<Cue>,
    pub paragraphs: Vec<ParagraphSegment>,
    pub full_text: String,
    pub word_count: usize,
    pub character_count: usize,

    /// Every strategy tried, the successful one last
    pub attempts: Vec<AttemptRecord>,

    pub ingested_at: DateTime<Utc>,
}

impl IngestedTranscript {
    /// Time covered by the paragraphs, in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.paragraphs.last().map(ParagraphSegment::end_seconds).unwrap_or(0.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("Not a valid content id or video URL: {0}")]
    InvalidContentId(String),

    #[error("Transcript unavailable: every source was skipped or failed ({} attempted)", .attempts.len())]
    AllSourcesExhausted { attempts: Vec<AttemptRecord> },

    #[error("Ingestion was cancelled")]
    Cancelled { attempts: Vec<AttemptRecord> },
}

impl IngestError {
    /// Diagnostic trail, empty when no source was reached
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            IngestError::InvalidContentId(_) => &[],
            IngestError::AllSourcesExhausted { attempts } | IngestError::Cancelled { attempts } => attempts,
        }
    }
}

impl From<FetchError> for IngestError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::AllSourcesExhausted { attempts } => IngestError::AllSourcesExhausted { attempts },
            FetchError::Cancelled { attempts } => IngestError::Cancelled { attempts },
        }
    }
}

/// Fetch, then segment. Holds no per-call state, so one pipeline can serve
/// concurrent ingestions.
pub struct IngestPipeline {
    orchestrator: FetchOrchestrator,
    segmenter: ParagraphSegmenter,
    languages: Vec<String>,
}

impl IngestPipeline {
    pub fn new(orchestrator: FetchOrchestrator, segmenter: ParagraphSegmenter, languages: Vec<String>) -> Self {
        Self {
            orchestrator,
            segmenter,
            languages,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            FetchOrchestrator::from_config(&config.sources),
            ParagraphSegmenter::new(config.segmenter.clone()),
            config.sources.languages.clone(),
        )
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    /// Ingest a content id or video URL
    pub async fn ingest(&self, input: &str, cancel: &CancellationToken) -> Result<IngestedTranscript, IngestError> {
        let request = self.request_for(input)?;
        let result = self.orchestrator.fetch(&request, cancel).await;
        self.finish(request, result)
    }

    /// Ingest against an already probed runtime
    pub async fn ingest_in(
        &self,
        input: &str,
        env: &RuntimeEnv,
        cancel: &CancellationToken,
    ) -> Result<IngestedTranscript, IngestError> {
        let request = self.request_for(input)?;
        let result = self.orchestrator.fetch_in(&request, env, cancel).await;
        self.finish(request, result)
    }

    fn request_for(&self, input: &str) -> Result<FetchRequest, IngestError> {
        let content_id = extract_content_id(input).ok_or_else(|| IngestError::InvalidContentId(input.trim().to_string()))?;
        Ok(FetchRequest::new(content_id, self.languages.clone()))
    }

    fn finish(
        &self,
        request: FetchRequest,
        result: Result<FetchSuccess, FetchError>,
    ) -> Result<IngestedTranscript, IngestError> {
        let success = result?;

        let paragraphs = self.segmenter.merge(&success.cues);
        let text = full_text(&paragraphs);
        let words = word_count(&text);
        let characters = text.chars().count();

        tracing::info!(
            content_id = %request.content_id,
            strategy = %success.strategy,
            cues = success.cues.len(),
            paragraphs = paragraphs.len(),
            words,
            "Ingested transcript"
        );

        Ok(IngestedTranscript {
            ingest_id: Uuid::new_v4(),
            source_url: watch_url(&request.content_id),
            content_id: request.content_id,
            strategy: success.strategy,
            language: success.language,
            cues: success.cues,
            paragraphs,
            full_text: text,
            word_count: words,
            character_count: characters,
            attempts: success.attempts,
            ingested_at: Utc::now(),
        })
    }
}
