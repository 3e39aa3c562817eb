use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::{sanitize_cues, Availability, Cue, FetchRequest, RuntimeEnv, SourceRegistry, TranscriptSource};
use crate::config::SourcesConfig;
use crate::utils::truncate_chars;

const MAX_DETAIL_CHARS: usize = 300;
const MAX_CHECK_TIME: Duration = Duration::from_secs(10);

/// Time allowed for a source's capability check, never more than its fetch
pub fn check_limit(source: &dyn TranscriptSource) -> Duration {
    source.timeout().min(MAX_CHECK_TIME)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Skipped,
    Failed,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Skipped => "skipped",
            AttemptOutcome::Failed => "failed",
        })
    }
}

/// One entry of the diagnostic trail a fetch returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    #[serde(rename = "strategyName")]
    pub strategy: String,
    pub outcome: AttemptOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Truncated error text or result summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    pub elapsed_ms: u64,
}

impl AttemptRecord {
    fn new(strategy: &str, outcome: AttemptOutcome, reason: Option<String>, detail: Option<String>, elapsed_ms: u64) -> Self {
        Self {
            strategy: strategy.to_string(),
            outcome,
            reason,
            detail: detail.map(|detail| truncate_chars(&detail, MAX_DETAIL_CHARS)),
            elapsed_ms,
        }
    }

    fn skipped(strategy: &str, reason: impl Into<String>) -> Self {
        Self::new(strategy, AttemptOutcome::Skipped, Some(reason.into()), None, 0)
    }

    fn failed(strategy: &str, reason: impl Into<String>, detail: Option<String>, elapsed_ms: u64) -> Self {
        Self::new(strategy, AttemptOutcome::Failed, Some(reason.into()), detail, elapsed_ms)
    }
}

/// Cues from the first strategy that produced any
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    pub cues: Vec<Cue>,
    pub language: Option<String>,
    pub strategy: String,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("No transcript source succeeded ({} attempted)", .attempts.len())]
    AllSourcesExhausted { attempts: Vec<AttemptRecord> },

    #[error("Transcript fetch was cancelled")]
    Cancelled { attempts: Vec<AttemptRecord> },
}

impl FetchError {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            FetchError::AllSourcesExhausted { attempts } | FetchError::Cancelled { attempts } => attempts,
        }
    }
}

/// Runs transcript sources one at a time, in registry order, until one
/// yields cues
pub struct FetchOrchestrator {
    registry: SourceRegistry,
    config: SourcesConfig,
}

impl FetchOrchestrator {
    pub fn new(registry: SourceRegistry, config: SourcesConfig) -> Self {
        Self { registry, config }
    }

    /// Orchestrator over every built-in source
    pub fn from_config(config: &SourcesConfig) -> Self {
        Self::new(SourceRegistry::new(config), config.clone())
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Probe the runtime and fetch
    pub async fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchSuccess, FetchError> {
        let env = RuntimeEnv::probe(&self.config);
        self.fetch_in(request, &env, cancel).await
    }

    /// Fetch against an already probed runtime
    pub async fn fetch_in(
        &self,
        request: &FetchRequest,
        env: &RuntimeEnv,
        cancel: &CancellationToken,
    ) -> Result<FetchSuccess, FetchError> {
        let mut attempts = Vec::with_capacity(self.registry.len());

        for source in self.registry.iter() {
            let name = source.name();

            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { attempts });
            }

            if env.is_disabled(name) {
                tracing::debug!(strategy = name, "Skipping disabled source");
                attempts.push(AttemptRecord::skipped(name, "disabled by configuration"));
                continue;
            }

            let check_time = check_limit(source);
            let availability = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(strategy = name, "Capability check cancelled");
                    attempts.push(AttemptRecord::failed(name, "cancelled", None, 0));
                    return Err(FetchError::Cancelled { attempts });
                }
                availability = tokio::time::timeout(check_time, source.check(env)) => availability,
            };
            match availability {
                Ok(Availability::Ready) => {}
                Ok(Availability::Unavailable(reason)) => {
                    tracing::debug!(strategy = name, %reason, "Skipping unavailable source");
                    attempts.push(AttemptRecord::skipped(name, reason));
                    continue;
                }
                Err(_) => {
                    tracing::warn!(strategy = name, timeout = ?check_time, "Capability check timed out");
                    attempts.push(AttemptRecord::skipped(name, "capability check timed out"));
                    continue;
                }
            }

            let limit = source.timeout();
            tracing::info!(strategy = name, content_id = %request.content_id, "Trying transcript source");
            let started = Instant::now();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(limit, source.fetch(request)) => Some(result),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let transcript = match result {
                None => {
                    tracing::warn!(strategy = name, "Fetch cancelled");
                    attempts.push(AttemptRecord::failed(name, "cancelled", None, elapsed_ms));
                    return Err(FetchError::Cancelled { attempts });
                }
                Some(Err(_)) => {
                    tracing::warn!(strategy = name, timeout = ?limit, "Transcript source timed out");
                    attempts.push(AttemptRecord::failed(name, format!("timed out after {:?}", limit), None, elapsed_ms));
                    continue;
                }
                Some(Ok(Err(e))) => {
                    tracing::warn!(strategy = name, error = %e, "Transcript source failed");
                    attempts.push(AttemptRecord::failed(name, e.reason(), Some(e.to_string()), elapsed_ms));
                    continue;
                }
                Some(Ok(Ok(transcript))) => transcript,
            };

            let cues = sanitize_cues(transcript.cues);
            if cues.is_empty() {
                tracing::warn!(strategy = name, "Transcript source returned no cues");
                attempts.push(AttemptRecord::failed(name, "returned no cues", None, elapsed_ms));
                continue;
            }

            tracing::info!(strategy = name, cues = cues.len(), elapsed_ms, "Transcript acquired");
            attempts.push(AttemptRecord::new(
                name,
                AttemptOutcome::Success,
                None,
                Some(format!("{} cues", cues.len())),
                elapsed_ms,
            ));

            return Ok(FetchSuccess {
                cues,
                language: transcript.language,
                strategy: name.to_string(),
                attempts,
            });
        }

        tracing::warn!(attempts = attempts.len(), "All transcript sources exhausted");
        Err(FetchError::AllSourcesExhausted { attempts })
    }
}
