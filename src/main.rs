use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tubescribe::analysis::{analyze_transcript, AnalysisReport, ChatCompletionsClient};
use tubescribe::cli::{Cli, Commands, TopicFormat};
use tubescribe::config::Config;
use tubescribe::ingest::{IngestError, IngestPipeline};
use tubescribe::output;
use tubescribe::sources::{check_limit, Availability, RuntimeEnv, SourceRegistry};
use tubescribe::topics::{ranked_topics, JsonFileCorpus, TopicAggregator, TopicNormalizer};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = match (&cli.command, cli.config.as_deref()) {
        // `config` may be asked to create the file it is pointed at
        (Commands::Config { show: false }, Some(path)) if !path.exists() => Config::default(),
        (_, explicit) => Config::load(explicit)?,
    };

    match cli.command {
        Commands::Ingest {
            input,
            format,
            output,
            timestamps,
            analyze,
            title,
            api_key,
        } => {
            let pipeline = IngestPipeline::from_config(&config);
            let cancel = cancel_on_ctrl_c();

            let progress = spinner(cli.quiet);
            progress.set_message(format!("Fetching transcript for {}...", input));
            let result = pipeline.ingest(&input, &cancel).await;
            progress.finish_and_clear();

            let transcript = match result {
                Ok(transcript) => transcript,
                Err(e) => return Err(report_ingest_failure(&input, e)),
            };

            tracing::info!(
                "Transcript via {}: {} paragraphs, {} words",
                transcript.strategy,
                transcript.paragraphs.len(),
                transcript.word_count
            );

            let analysis = if analyze {
                let mut analysis_config = config.analysis.clone();
                if api_key.is_some() {
                    analysis_config.api_key = api_key;
                }
                let title = title.as_deref().unwrap_or(&transcript.content_id);
                run_analysis(&analysis_config, title, &transcript.full_text, cli.quiet).await
            } else {
                None
            };

            let content = output::render(&transcript, &format, timestamps, analysis.as_ref())?;
            match output {
                Some(path) => {
                    output::save_to_file(&content, &path).await?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => output::print_to_console(&content),
            }

            if cli.verbose {
                eprintln!("{}", output::format_attempt_table(&transcript.attempts));
            }
        }
        Commands::Strategies => {
            let env = RuntimeEnv::probe(&config.sources);
            let registry = SourceRegistry::new(&config.sources);

            println!("Strategies in priority order:");
            for (index, source) in registry.iter().enumerate() {
                let status = if env.is_disabled(source.name()) {
                    style("disabled by configuration".to_string()).dim()
                } else {
                    match tokio::time::timeout(check_limit(source), source.check(&env)).await {
                        Ok(Availability::Ready) => style("ready".to_string()).green(),
                        Ok(Availability::Unavailable(reason)) => style(format!("unavailable: {}", reason)).yellow(),
                        Err(_) => style("capability check timed out".to_string()).yellow(),
                    }
                };
                println!(
                    "  {}. {:<18} timeout {:>3}s  {}",
                    index + 1,
                    source.name(),
                    source.timeout().as_secs(),
                    status
                );
            }
            if env.serverless {
                println!("\nServerless runtime detected: subprocess strategies are skipped.");
            }
        }
        Commands::Topics { corpus, format, limit } => {
            let store = JsonFileCorpus::new(corpus);
            let aggregator = TopicAggregator::new(TopicNormalizer::with_aliases(&config.topics.aliases));

            let mut topics = ranked_topics(&store, &aggregator).await?;
            if let Some(limit) = limit {
                topics.truncate(limit);
            }

            let content = match format {
                TopicFormat::Table => output::format_topics_table(&topics),
                TopicFormat::Json => output::format_topics_json(&topics)?,
            };
            output::print_to_console(&content);
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::default_path()?,
                };
                if path.exists() {
                    println!("Configuration already exists at: {}", path.display());
                    println!("Use `tubescribe config --show` to inspect it.");
                } else {
                    let path = config.save(Some(&path)).context("Failed to write default configuration")?;
                    println!("Default configuration written to: {}", path.display());
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "tubescribe=debug"
    } else if cli.quiet {
        "tubescribe=warn"
    } else {
        "tubescribe=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.log_json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        progress.set_style(style);
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, abandoning remaining strategies");
            token.cancel();
        }
    });
    cancel
}

/// Print the diagnostic trail and turn the failure into the process error
fn report_ingest_failure(input: &str, error: IngestError) -> anyhow::Error {
    if let IngestError::InvalidContentId(_) = error {
        return error.into();
    }

    eprintln!("{}", style(&error).red().bold());
    eprintln!("{}", output::format_attempt_table(error.attempts()));

    match error {
        IngestError::Cancelled { .. } => anyhow::anyhow!("Ingestion cancelled"),
        _ => anyhow::anyhow!(
            "transcript unavailable, try again: tubescribe ingest {}",
            shell_quote(input)
        ),
    }
}

fn shell_quote(input: &str) -> String {
    if input.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:".contains(c)) {
        input.to_string()
    } else {
        format!("'{}'", input.replace('\'', r"'\''"))
    }
}

async fn run_analysis(
    config: &tubescribe::config::AnalysisConfig,
    title: &str,
    full_text: &str,
    quiet: bool,
) -> Option<AnalysisReport> {
    let client = match ChatCompletionsClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping analysis");
            return None;
        }
    };

    let progress = spinner(quiet);
    progress.set_message("Analyzing transcript...");
    let report = analyze_transcript(&client, &client, title, full_text, config.max_excerpt_chars).await;
    progress.finish_and_clear();
    Some(report)
}
