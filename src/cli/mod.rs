use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tubescribe",
    about = "Fetch video transcripts through a cascade of sources, merge captions into paragraphs and rank recurring topics",
    version,
    long_about = "Acquires a time-aligned transcript for a video by trying several acquisition strategies in a fixed order \
(managed service, internal client, community library, page scrape, local interpreter, downloader), stopping at the first \
that yields captions. Captions are merged into readable paragraphs. Topic labels across a corpus can be normalized and ranked."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (defaults to ./tubescribe.yaml, then the user config dir)
    #[arg(short, long, global = true, value_name = "FILE", env = "TUBESCRIBE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and segment the transcript of a video
    Ingest {
        /// Content id or watch/short/embed/youtu.be URL
        #[arg(value_name = "ID_OR_URL")]
        input: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Prefix paragraphs with [MM:SS] timestamps
        #[arg(long)]
        timestamps: bool,

        /// Run the content generator and claim verifier over the transcript
        #[arg(long)]
        analyze: bool,

        /// Title passed to the content generator
        #[arg(long, value_name = "TITLE", requires = "analyze")]
        title: Option<String>,

        /// Analysis API key
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// List acquisition strategies in priority order with their availability
    Strategies,

    /// Rank topic labels across a corpus file
    Topics {
        /// JSON corpus: an array of items, or {"items": [...]}
        #[arg(value_name = "CORPUS_JSON")]
        corpus: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: TopicFormat,

        /// Show only the N most frequent topics
        #[arg(short, long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// Paragraphs separated by blank lines
    Paragraphs,
    /// JSON with cues, paragraphs and attempts
    Json,
    /// SRT subtitle format
    Srt,
    /// WebVTT format
    Vtt,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Paragraphs => write!(f, "paragraphs"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Srt => write!(f, "srt"),
            OutputFormat::Vtt => write!(f, "vtt"),
        }
    }
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum TopicFormat {
    /// Aligned table
    Table,
    /// JSON array of {normalizedKey, canonicalDisplay, count}
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from([
            "tubescribe",
            "ingest",
            "dQw4w9WgXcQ",
            "--format",
            "paragraphs",
            "--timestamps",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Ingest {
                input,
                format,
                timestamps,
                analyze,
                ..
            } => {
                assert_eq!(input, "dQw4w9WgXcQ");
                assert_eq!(format, OutputFormat::Paragraphs);
                assert!(timestamps);
                assert!(!analyze);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_title_requires_analyze() {
        assert!(Cli::try_parse_from(["tubescribe", "ingest", "dQw4w9WgXcQ", "--title", "x"]).is_err());
    }

    #[test]
    fn test_parse_topics() {
        let cli = Cli::try_parse_from(["tubescribe", "topics", "corpus.json", "--limit", "5", "-f", "json"]).unwrap();
        match cli.command {
            Commands::Topics { corpus, format, limit } => {
                assert_eq!(corpus, PathBuf::from("corpus.json"));
                assert_eq!(format, TopicFormat::Json);
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected topics"),
        }
    }
}
