use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

pub mod community;
pub mod downloader;
pub mod innertube;
pub mod interpreter;
pub mod managed;
pub mod orchestrator;
pub mod scrape;

use crate::config::SourcesConfig;
use crate::utils::collapse_whitespace;

pub use orchestrator::{check_limit, AttemptOutcome, AttemptRecord, FetchError, FetchOrchestrator, FetchSuccess};

/// A single timestamped caption fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cue {
    pub text: String,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

impl Cue {
    pub fn new(text: impl Into<String>, start_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            duration_seconds,
        }
    }

    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }
}

/// Cues plus whatever the source knows about them
#[derive(Debug, Clone, Default)]
pub struct SourceTranscript {
    pub cues: Vec<Cue>,

    /// Language code reported by the source, if any
    pub language: Option<String>,
}

/// What to fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub content_id: String,

    /// Preferred caption languages, most preferred first
    pub languages: Vec<String>,
}

impl FetchRequest {
    pub fn new(content_id: impl Into<String>, languages: Vec<String>) -> Self {
        Self {
            content_id: content_id.into(),
            languages,
        }
    }

    pub fn primary_language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("en")
    }
}

/// Capabilities of the process we are running in, probed once per fetch
#[derive(Debug, Clone, Default)]
pub struct RuntimeEnv {
    /// Serverless hosts forbid subprocesses and persistent disk
    pub serverless: bool,

    /// Whether a temp directory can be created and written
    pub writable_temp: bool,

    /// Strategy names turned off by configuration
    pub disabled: HashSet<String>,
}

impl RuntimeEnv {
    /// Inspect the current process environment
    pub fn probe(config: &SourcesConfig) -> Self {
        let serverless = ["VERCEL", "AWS_LAMBDA_FUNCTION_NAME", "NETLIFY"]
            .iter()
            .any(|name| std::env::var_os(name).is_some())
            || std::env::var("TUBESCRIBE_SERVERLESS").map(|v| v == "1").unwrap_or(false);

        let writable_temp = tempfile::tempdir().is_ok();

        let env = Self {
            serverless,
            writable_temp,
            disabled: config.disabled.iter().cloned().collect(),
        };
        tracing::debug!(serverless, writable_temp, disabled = env.disabled.len(), "Probed runtime");
        env
    }

    /// A runtime where every capability is present
    pub fn unrestricted() -> Self {
        Self {
            serverless: false,
            writable_temp: true,
            disabled: HashSet::new(),
        }
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }
}

/// Result of a strategy's capability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Ready,
    Unavailable(String),
}

/// Why a strategy that ran produced no cues
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("No captions available: {0}")]
    NoCaptions(String),

    #[error("Subprocess failed: {0}")]
    Process(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transcript library error: {0}")]
    Library(String),
}

impl SourceError {
    /// Build a status error from a failed response, keeping a short body excerpt
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        SourceError::Status {
            status,
            body: crate::utils::truncate_chars(body.trim(), 200),
        }
    }

    /// Short classification used as the attempt reason
    pub fn reason(&self) -> String {
        match self {
            SourceError::Http(e) if e.is_timeout() => "request timed out".to_string(),
            SourceError::Http(e) if e.is_connect() => "connection failed".to_string(),
            SourceError::Http(_) => "request failed".to_string(),
            SourceError::Status { status, .. } => format!("HTTP {}", status),
            SourceError::Parse(_) => "unexpected response".to_string(),
            SourceError::NoCaptions(_) => "no captions".to_string(),
            SourceError::Process(_) => "subprocess failed".to_string(),
            SourceError::Io(_) => "I/O error".to_string(),
            SourceError::Library(_) => "library error".to_string(),
        }
    }
}

/// One way of acquiring a transcript
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Stable name used in attempt records and configuration
    fn name(&self) -> &'static str;

    /// Hard limit on a single `fetch`
    fn timeout(&self) -> Duration;

    /// Whether this source can run in the given runtime
    async fn check(&self, _env: &RuntimeEnv) -> Availability {
        Availability::Ready
    }

    /// Fetch raw cues for a content id
    async fn fetch(&self, request: &FetchRequest) -> Result<SourceTranscript, SourceError>;
}

/// Acquisition methods in priority order: cheapest and most reliable first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    ManagedService,
    Innertube,
    CommunityLibrary,
    PageScrape,
    LocalInterpreter,
    Downloader,
}

impl SourceKind {
    pub const PRIORITY: [SourceKind; 6] = [
        SourceKind::ManagedService,
        SourceKind::Innertube,
        SourceKind::CommunityLibrary,
        SourceKind::PageScrape,
        SourceKind::LocalInterpreter,
        SourceKind::Downloader,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SourceKind::ManagedService => "managed-service",
            SourceKind::Innertube => "innertube",
            SourceKind::CommunityLibrary => "community-library",
            SourceKind::PageScrape => "page-scrape",
            SourceKind::LocalInterpreter => "local-interpreter",
            SourceKind::Downloader => "downloader",
        }
    }

    fn build(self, config: &SourcesConfig, client: &reqwest::Client) -> Box<dyn TranscriptSource> {
        match self {
            SourceKind::ManagedService => Box::new(managed::ManagedServiceSource::new(client.clone(), &config.managed)),
            SourceKind::Innertube => Box::new(innertube::InnertubeSource::new(client.clone(), &config.innertube)),
            SourceKind::CommunityLibrary => Box::new(community::CommunityLibrarySource::new(&config.community)),
            SourceKind::PageScrape => Box::new(scrape::PageScrapeSource::new(client.clone(), &config.scrape)),
            SourceKind::LocalInterpreter => Box::new(interpreter::LocalInterpreterSource::new(&config.interpreter)),
            SourceKind::Downloader => Box::new(downloader::DownloaderSource::new(&config.downloader)),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered set of transcript sources
pub struct SourceRegistry {
    sources: Vec<Box<dyn TranscriptSource>>,
}

impl SourceRegistry {
    /// Create a registry with every built-in source in priority order
    pub fn new(config: &SourcesConfig) -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::empty();

        for kind in SourceKind::PRIORITY {
            registry.register(kind.build(config, &client));
        }

        registry
    }

    pub fn empty() -> Self {
        Self { sources: Vec::new() }
    }

    /// Append a source; it runs after every source registered before it
    pub fn register(&mut self, source: Box<dyn TranscriptSource>) {
        self.sources.push(source);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn TranscriptSource> {
        self.sources.iter().map(|boxed| boxed.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl FromIterator<Box<dyn TranscriptSource>> for SourceRegistry {
    fn from_iter<I: IntoIterator<Item = Box<dyn TranscriptSource>>>(iter: I) -> Self {
        Self {
            sources: iter.into_iter().collect(),
        }
    }
}

/// Normalize cues at the source boundary: collapse whitespace, drop empty
/// text, clamp bad timings and order by start
pub fn sanitize_cues(cues: Vec<Cue>) -> Vec<Cue> {
    let mut cleaned: Vec<Cue> = cues
        .into_iter()
        .filter_map(|cue| {
            let text = collapse_whitespace(&cue.text);
            (!text.is_empty()).then(|| Cue {
                text,
                start_seconds: non_negative(cue.start_seconds),
                duration_seconds: non_negative(cue.duration_seconds),
            })
        })
        .collect();

    cleaned.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
    cleaned
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Decode the HTML entities caption payloads commonly carry
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            ch.map(|ch| (ch, end))
        });

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_is_fixed() {
        let registry = SourceRegistry::new(&SourcesConfig::default());
        assert_eq!(
            registry.names(),
            vec![
                "managed-service",
                "innertube",
                "community-library",
                "page-scrape",
                "local-interpreter",
                "downloader",
            ]
        );
    }

    #[test]
    fn test_sanitize_cues() {
        let cues = vec![
            Cue::new("  second\n line ", 2.0, 1.0),
            Cue::new("   ", 0.5, 1.0),
            Cue::new("first", -1.0, f64::NAN),
        ];

        let cleaned = sanitize_cues(cues);

        assert_eq!(cleaned, vec![Cue::new("first", 0.0, 0.0), Cue::new("second line", 2.0, 1.0)]);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("it&#39;s &quot;fine&quot;"), "it's \"fine\"");
        assert_eq!(decode_entities("&lt;b&gt; &#x41;"), "<b> A");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
        assert_eq!(decode_entities("AT&T;"), "AT&T;");
    }

    #[test]
    fn test_primary_language_defaults_to_english() {
        assert_eq!(FetchRequest::new("abc", vec![]).primary_language(), "en");
        assert_eq!(FetchRequest::new("abc", vec!["de".into()]).primary_language(), "de");
    }
}
