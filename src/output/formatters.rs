use anyhow::Result;
use console::style;
use serde::Serialize;
use std::fmt::Write;

use crate::analysis::AnalysisReport;
use crate::ingest::IngestedTranscript;
use crate::segment::ParagraphSegment;
use crate::sources::{AttemptOutcome, AttemptRecord};
use crate::topics::NormalizedTopic;
use crate::utils::{format_elapsed, format_timestamp};

/// Full transcript text
pub fn format_as_text(transcript: &IngestedTranscript) -> String {
    transcript.full_text.clone()
}

/// Paragraphs separated by blank lines, optionally prefixed `[MM:SS]`
pub fn format_as_paragraphs(paragraphs: &[ParagraphSegment], timestamps: bool) -> String {
    paragraphs
        .iter()
        .map(|paragraph| {
            if timestamps {
                format!("[{}] {}", format_timestamp(paragraph.start_seconds), paragraph.text)
            } else {
                paragraph.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    #[serde(flatten)]
    transcript: &'a IngestedTranscript,

    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a AnalysisReport>,
}

/// The whole ingestion result, plus the analysis when one was run
pub fn format_as_json(transcript: &IngestedTranscript, analysis: Option<&AnalysisReport>) -> Result<String> {
    let document = JsonDocument { transcript, analysis };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// One SRT entry per paragraph
pub fn format_as_srt(paragraphs: &[ParagraphSegment]) -> String {
    let mut srt = String::new();
    for (index, paragraph) in paragraphs.iter().enumerate() {
        let _ = writeln!(srt, "{}", index + 1);
        let _ = writeln!(
            srt,
            "{} --> {}",
            subtitle_timestamp(paragraph.start_seconds, ','),
            subtitle_timestamp(paragraph.end_seconds(), ',')
        );
        let _ = writeln!(srt, "{}\n", paragraph.text);
    }
    srt
}

/// One WebVTT cue per paragraph
pub fn format_as_vtt(paragraphs: &[ParagraphSegment]) -> String {
    let mut vtt = String::from("WEBVTT\n\n");
    for paragraph in paragraphs {
        let _ = writeln!(
            vtt,
            "{} --> {}",
            subtitle_timestamp(paragraph.start_seconds, '.'),
            subtitle_timestamp(paragraph.end_seconds(), '.')
        );
        let _ = writeln!(vtt, "{}\n", paragraph.text);
    }
    vtt
}

/// HH:MM:SS plus milliseconds after `separator`
fn subtitle_timestamp(seconds: f64, separator: char) -> String {
    let millis = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        millis / 3_600_000,
        (millis % 3_600_000) / 60_000,
        (millis % 60_000) / 1000,
        separator,
        millis % 1000
    )
}

/// Aligned table of the strategies a fetch tried
pub fn format_attempt_table(attempts: &[AttemptRecord]) -> String {
    if attempts.is_empty() {
        return "  (no strategy was attempted)".to_string();
    }

    let name_width = attempts.iter().map(|a| a.strategy.len()).max().unwrap_or(0).max("STRATEGY".len());
    let mut table = String::new();
    let _ = writeln!(table, "  {:<name_width$}  {:<7}  {:>7}  REASON", "STRATEGY", "OUTCOME", "TIME");

    for attempt in attempts {
        let outcome = format!("{:<7}", attempt.outcome.to_string());
        let outcome = match attempt.outcome {
            AttemptOutcome::Success => style(outcome).green(),
            AttemptOutcome::Skipped => style(outcome).dim(),
            AttemptOutcome::Failed => style(outcome).red(),
        };

        let mut reason = attempt.reason.clone().unwrap_or_default();
        if let Some(detail) = &attempt.detail {
            if !reason.is_empty() {
                reason.push_str(": ");
            }
            reason.push_str(detail);
        }

        let _ = writeln!(
            table,
            "  {:<name_width$}  {}  {:>7}  {}",
            attempt.strategy,
            outcome,
            format_elapsed(attempt.elapsed_ms),
            reason
        );
    }

    table.trim_end().to_string()
}

/// Ranked topics as an aligned table
pub fn format_topics_table(topics: &[NormalizedTopic]) -> String {
    if topics.is_empty() {
        return "No topics found among imported items.".to_string();
    }

    let display_width = topics
        .iter()
        .map(|t| t.canonical_display.chars().count())
        .max()
        .unwrap_or(0)
        .max("TOPIC".len());

    let mut table = String::new();
    let _ = writeln!(table, "{:>5}  {:<display_width$}  KEY", "COUNT", "TOPIC");
    for topic in topics {
        let _ = writeln!(
            table,
            "{:>5}  {:<display_width$}  {}",
            topic.count, topic.canonical_display, topic.normalized_key
        );
    }
    table.trim_end().to_string()
}

pub fn format_topics_json(topics: &[NormalizedTopic]) -> Result<String> {
    Ok(serde_json::to_string_pretty(topics)?)
}

/// Human-readable summary of an analysis report
pub fn format_analysis(report: &AnalysisReport) -> String {
    let analysis = &report.analysis;
    let mut out = String::new();

    let topics: Vec<&str> = analysis.topic_names().collect();
    let _ = writeln!(out, "Topics: {}", if topics.is_empty() { "-".to_string() } else { topics.join(", ") });
    let _ = writeln!(
        out,
        "Tone: {} ({:.0}% confidence, {} energy)",
        label(&analysis.sentiment.overall),
        analysis.sentiment.confidence * 100.0,
        label(&analysis.sentiment.energy_level)
    );

    if !analysis.insights.is_empty() {
        let _ = writeln!(out, "\nInsights:");
        for insight in &analysis.insights {
            let at = insight.timestamp.as_deref().map(|t| format!(" [{}]", t)).unwrap_or_default();
            let _ = writeln!(
                out,
                "  - ({}, {}/5){} {}",
                label(&insight.category),
                insight.importance,
                at,
                insight.text
            );
        }
    }

    if !report.verified_claims.is_empty() {
        let _ = writeln!(out, "\nClaims:");
        for verified in &report.verified_claims {
            let _ = writeln!(out, "  - [{}] {}", label(&verified.status), verified.claim.text);
            if !verified.explanation.is_empty() {
                let _ = writeln!(out, "      {}", verified.explanation);
            }
        }
    }

    out.trim_end().to_string()
}

/// Serialized name of a unit enum variant
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => String::from("?"),
    }
}
