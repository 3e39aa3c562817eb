use chrono::Utc;
use serde_json::Value;

use super::{
    Analysis, Claim, ClaimKind, EnergyLevel, Insight, InsightCategory, SentimentTone, Tone, TopicTag,
    VerificationStatus, VerifiedClaim,
};
use crate::utils::balanced_json;

/// Score used when a field is missing or unreadable
const DEFAULT_SCORE: f64 = 0.5;
const DEFAULT_IMPORTANCE: u8 = 3;

/// The first JSON value embedded in model output that `accept` takes;
/// prose and code fences around it are ignored
fn find_json(raw: &str, accept: fn(&Value) -> bool) -> Option<Value> {
    raw.match_indices(['{', '['])
        .filter_map(|(idx, _)| balanced_json(&raw[idx..]))
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find(|value| accept(value))
}

/// Parse content generator output; malformed input yields `Analysis::default()`
pub fn parse_analysis(raw: &str) -> Analysis {
    match find_json(raw, Value::is_object) {
        Some(value) => analysis_from_value(&value),
        None => {
            tracing::warn!(
                excerpt = %crate::utils::truncate_chars(raw.trim(), 120),
                "Content generator returned no JSON object; using empty analysis"
            );
            Analysis::default()
        }
    }
}

pub(crate) fn analysis_from_value(value: &Value) -> Analysis {
    let mut topic_tags: Vec<TopicTag> = array(value, "topicTags").filter_map(topic_tag).collect();
    if topic_tags.is_empty() {
        // Older outputs carried bare topic strings
        topic_tags = array(value, "topics").filter_map(topic_tag).collect();
    }

    let mut insights: Vec<Insight> = array(value, "insights").filter_map(insight).collect();
    if insights.is_empty() {
        insights = array(value, "keyInsights").filter_map(insight).collect();
    }

    Analysis {
        topic_tags,
        sentiment: sentiment(value),
        insights,
        claims: array(value, "claims").filter_map(claim).collect(),
    }
}

fn array<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| entries.iter())
        .into_iter()
        .flatten()
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Number or numeric string, clamped into [0, 1]
fn score(value: Option<&Value>) -> f64 {
    let parsed = value.and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())));
    match parsed {
        Some(score) if score.is_finite() => score.clamp(0.0, 1.0),
        _ => DEFAULT_SCORE,
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("yes"),
        _ => false,
    }
}

fn label(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default()
}

fn topic_tag(entry: &Value) -> Option<TopicTag> {
    let name = match entry {
        Value::String(name) => Some(name.trim().to_string()).filter(|name| !name.is_empty()),
        _ => text(entry, "name"),
    }?;

    Some(TopicTag {
        name,
        confidence: score(entry.get("confidence")),
        relevance: score(entry.get("relevance")),
    })
}

fn sentiment(value: &Value) -> SentimentTone {
    let Some(tone) = value.get("sentimentTone").filter(|tone| tone.is_object()) else {
        // Legacy outputs only listed emotion words
        return SentimentTone {
            emotions: array(value, "sentiment").filter_map(Value::as_str).map(str::to_string).collect(),
            ..SentimentTone::default()
        };
    };

    let overall = match label(tone, "overall").as_str() {
        "positive" => Tone::Positive,
        "negative" => Tone::Negative,
        "mixed" => Tone::Mixed,
        _ => Tone::Neutral,
    };
    let energy_level = match label(tone, "energyLevel").as_str() {
        "low" => EnergyLevel::Low,
        "high" => EnergyLevel::High,
        _ => EnergyLevel::Medium,
    };

    SentimentTone {
        overall,
        confidence: score(tone.get("confidence")),
        emotions: array(tone, "emotions").filter_map(Value::as_str).map(str::to_string).collect(),
        energy_level,
    }
}

fn insight(entry: &Value) -> Option<Insight> {
    let body = text(entry, "text")?;

    let category_label = match label(entry, "category") {
        category if category.is_empty() => label(entry, "type"),
        category => category,
    };
    let category = match category_label.as_str() {
        "prediction" => InsightCategory::Prediction,
        "observation" => InsightCategory::Observation,
        "recommendation" | "tip" => InsightCategory::Recommendation,
        _ => InsightCategory::Analysis,
    };

    let importance = entry
        .get("importance")
        .and_then(Value::as_f64)
        .filter(|importance| importance.is_finite())
        .map(|importance| importance.round().clamp(1.0, 5.0) as u8)
        .unwrap_or(DEFAULT_IMPORTANCE);

    Some(Insight {
        text: body,
        category,
        importance,
        timestamp: text(entry, "timestamp"),
    })
}

fn claim(entry: &Value) -> Option<Claim> {
    let body = text(entry, "text")?;

    let kind = match label(entry, "type").as_str() {
        "prediction" => ClaimKind::Prediction,
        "opinion" => ClaimKind::Opinion,
        "projection" => ClaimKind::Projection,
        _ => ClaimKind::Fact,
    };

    Some(Claim {
        text: body,
        kind,
        confidence: score(entry.get("confidence")),
        verifiable: flag(entry.get("verifiable")),
        timeframe: text(entry, "timeframe"),
    })
}

fn status(label: &str) -> VerificationStatus {
    match label {
        "supported" | "verified" | "true" => VerificationStatus::Supported,
        "disputed" | "false" | "refuted" | "partially_true" | "partially true" => VerificationStatus::Disputed,
        "unverifiable" | "unknown" => VerificationStatus::Unverifiable,
        _ => VerificationStatus::Pending,
    }
}

/// Parse claim verifier output. Always returns exactly one entry per claim,
/// matched by `index`, then by claim text, then by position; claims the
/// output says nothing about stay `Pending`.
pub fn parse_verifications(raw: &str, claims: &[Claim]) -> Vec<VerifiedClaim> {
    let entries: Vec<Value> = match find_json(raw, |value| value.is_object() || value.is_array()) {
        Some(Value::Array(entries)) => entries,
        Some(value) => array(&value, "verifications").cloned().collect(),
        None => {
            tracing::warn!("Claim verifier returned no JSON; leaving claims pending");
            Vec::new()
        }
    };

    let checked_at = Utc::now();

    claims
        .iter()
        .enumerate()
        .map(|(position, claim)| {
            let entry = entries
                .iter()
                .find(|entry| entry.get("index").and_then(Value::as_u64) == Some(position as u64))
                .or_else(|| {
                    entries
                        .iter()
                        .find(|entry| text(entry, "claim").map_or(false, |t| t.eq_ignore_ascii_case(&claim.text)))
                })
                .or_else(|| {
                    entries
                        .get(position)
                        .filter(|entry| entry.get("index").is_none() && entry.get("claim").is_none())
                });

            match entry {
                Some(entry) => VerifiedClaim {
                    claim: claim.clone(),
                    status: status(&label(entry, "status")),
                    explanation: text(entry, "explanation").unwrap_or_default(),
                    sources: array(entry, "sources").filter_map(Value::as_str).map(str::to_string).collect(),
                    checked_at,
                },
                None => VerifiedClaim {
                    checked_at,
                    ..VerifiedClaim::pending(claim.clone())
                },
            }
        })
        .collect()
}
