use anyhow::{Context, Result};
use std::path::Path;

use crate::analysis::AnalysisReport;
use crate::cli::OutputFormat;
use crate::ingest::IngestedTranscript;

pub mod formatters;

pub use formatters::*;

/// Render a transcript in the requested format. Text formats append the
/// analysis summary when one was run; JSON embeds it.
pub fn render(
    transcript: &IngestedTranscript,
    format: &OutputFormat,
    timestamps: bool,
    analysis: Option<&AnalysisReport>,
) -> Result<String> {
    let mut content = match format {
        OutputFormat::Text => format_as_text(transcript),
        OutputFormat::Paragraphs => format_as_paragraphs(&transcript.paragraphs, timestamps),
        OutputFormat::Json => return format_as_json(transcript, analysis),
        OutputFormat::Srt => return Ok(format_as_srt(&transcript.paragraphs)),
        OutputFormat::Vtt => return Ok(format_as_vtt(&transcript.paragraphs)),
    };

    if let Some(report) = analysis {
        content.push_str("\n\n---\n");
        content.push_str(&format_analysis(report));
    }
    Ok(content)
}

/// Save rendered output to file
pub async fn save_to_file(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::tokio::create_dir_all(parent).await?;
    }
    fs_err::tokio::write(path, content)
        .await
        .with_context(|| format!("Failed to write output to {}", path.display()))?;
    Ok(())
}

/// Print rendered output to console
pub fn print_to_console(content: &str) {
    println!("{}", content);
}
