//! Tubescribe - fetch video transcripts through a cascade of acquisition
//! strategies, merge captions into paragraphs and rank recurring topics.
//!
//! The ingestion path is `sources` (strategies plus the fetch orchestrator),
//! then `segment`, wrapped by `ingest`. Topic labels produced by the `analysis`
//! collaborators are normalized and counted across a corpus by `topics`.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod ingest;
pub mod output;
pub mod segment;
pub mod sources;
pub mod topics;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat, TopicFormat};
pub use config::Config;
pub use ingest::{IngestError, IngestPipeline, IngestedTranscript};
pub use segment::{merge, ParagraphSegment, ParagraphSegmenter, SegmenterConfig};
pub use sources::{AttemptOutcome, AttemptRecord, Cue, FetchError, FetchOrchestrator, TranscriptSource};
pub use topics::{aggregate, normalize, NormalizedTopic, TopicAggregator, TopicNormalizer};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
