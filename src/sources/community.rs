use async_trait::async_trait;
use std::time::Duration;
use yt_transcript_rs::api::YouTubeTranscriptApi;

use super::{Cue, FetchRequest, SourceError, SourceTranscript, TranscriptSource};
use crate::config::CommunityConfig;

/// Community-maintained transcript client (`yt-transcript-rs`)
pub struct CommunityLibrarySource {
    timeout: Duration,
}

impl CommunityLibrarySource {
    pub fn new(config: &CommunityConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl TranscriptSource for CommunityLibrarySource {
    fn name(&self) -> &'static str {
        "community-library"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<SourceTranscript, SourceError> {
        // No cookies, proxy or custom HTTP client
        let api = YouTubeTranscriptApi::new(None, None, None)
            .map_err(|e| SourceError::Library(e.to_string()))?;

        let languages: Vec<&str> = request.languages.iter().map(String::as_str).collect();

        let transcript = api
            .fetch_transcript(&request.content_id, &languages, false)
            .await
            .map_err(|e| SourceError::Library(e.to_string()))?;

        tracing::debug!(
            language = %transcript.language_code,
            generated = transcript.is_generated,
            snippets = transcript.snippets.len(),
            "Community library returned transcript"
        );

        let cues = transcript
            .snippets
            .iter()
            .map(|snippet| Cue::new(snippet.text.clone(), snippet.start, snippet.duration))
            .collect();

        Ok(SourceTranscript {
            cues,
            language: Some(transcript.language_code.clone()),
        })
    }
}
