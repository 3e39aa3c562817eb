use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

use super::{decode_entities, Cue, FetchRequest, SourceError, SourceTranscript, TranscriptSource};
use crate::config::ScrapeConfig;
use crate::utils::balanced_json;

/// Watch page scraping followed by a caption asset download
pub struct PageScrapeSource {
    client: Client,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

/// Caption track as embedded in the watch page player response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,

    /// "asr" for auto-generated tracks
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

impl PageScrapeSource {
    pub fn new(client: Client, config: &ScrapeConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header("User-Agent", &self.user_agent)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::from_response(response).await);
        }

        Ok(response.text().await?)
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            url.to_string()
        }
    }
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static caption regex"))
}

/// Pull the `captionTracks` JSON array out of the watch page HTML
fn extract_caption_tracks(html: &str) -> Result<Vec<CaptionTrack>, SourceError> {
    static TRACKS: OnceLock<Regex> = OnceLock::new();
    let start = cached(&TRACKS, r#""captionTracks"\s*:\s*\["#)
        .find(html)
        .map(|m| m.end() - 1)
        .ok_or_else(|| SourceError::NoCaptions("no caption tracks in watch page".to_string()))?;

    let array = balanced_json(&html[start..])
        .ok_or_else(|| SourceError::Parse("unterminated captionTracks array".to_string()))?;

    serde_json::from_str(array).map_err(|e| SourceError::Parse(format!("caption tracks: {}", e)))
}

/// Preferred language first (manual over generated), then a regional
/// variant, then whatever the first track is
fn choose_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    for language in languages {
        let exact = tracks
            .iter()
            .filter(|track| track.language_code.eq_ignore_ascii_case(language))
            .min_by_key(|track| track.is_generated());
        if exact.is_some() {
            return exact;
        }

        let prefix = format!("{}-", language.to_lowercase());
        if let Some(regional) = tracks
            .iter()
            .find(|track| track.language_code.to_lowercase().starts_with(&prefix))
        {
            return Some(regional);
        }
    }
    tracks.first()
}

/// Timedtext payloads are often escaped twice (`&amp;#39;`)
fn decode_nested_entities(text: &str) -> String {
    let mut decoded = decode_entities(text);
    for _ in 0..2 {
        let again = decode_entities(&decoded);
        if again == decoded {
            break;
        }
        decoded = again;
    }
    decoded
}

/// Parse a timedtext document: classic `<text start dur>` or srv3 `<p t d>`
fn parse_timed_text(xml: &str) -> Vec<Cue> {
    static CLASSIC: OnceLock<Regex> = OnceLock::new();
    static SRV3: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();

    let tags = cached(&TAGS, r"<[^>]+>");
    let clean = |raw: &str| decode_nested_entities(&tags.replace_all(raw, "")).replace('\n', " ");

    let classic = cached(&CLASSIC, r#"(?s)<text start="([^"]*)"(?:\s+dur="([^"]*)")?[^>]*>(.*?)</text>"#);
    let cues: Vec<Cue> = classic
        .captures_iter(xml)
        .filter_map(|caps| {
            let start = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let duration = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0);
            let text = clean(caps.get(3)?.as_str());
            (!text.trim().is_empty()).then(|| Cue::new(text.trim(), start, duration))
        })
        .collect();

    if !cues.is_empty() {
        return cues;
    }

    let srv3 = cached(&SRV3, r#"(?s)<p t="(\d+)"(?:\s+d="(\d+)")?[^>]*>(.*?)</p>"#);
    srv3.captures_iter(xml)
        .filter_map(|caps| {
            let start_ms = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let duration_ms = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0);
            let text = clean(caps.get(3)?.as_str());
            (!text.trim().is_empty()).then(|| Cue::new(text.trim(), start_ms / 1000.0, duration_ms / 1000.0))
        })
        .collect()
}

#[async_trait]
impl TranscriptSource for PageScrapeSource {
    fn name(&self) -> &'static str {
        "page-scrape"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<SourceTranscript, SourceError> {
        let watch_url = format!("{}/watch", self.base_url);
        let html = self
            .get_text(&watch_url, &[("v", request.content_id.as_str())])
            .await?;

        let tracks = extract_caption_tracks(&html)?;
        let track = choose_track(&tracks, &request.languages)
            .ok_or_else(|| SourceError::NoCaptions("caption track list is empty".to_string()))?;

        tracing::debug!(
            language = %track.language_code,
            generated = track.is_generated(),
            available = tracks.len(),
            "Selected caption track"
        );

        let xml = self.get_text(&self.absolute_url(&track.base_url), &[]).await?;

        Ok(SourceTranscript {
            cues: parse_timed_text(&xml),
            language: Some(track.language_code.clone()).filter(|code| !code.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn track(language_code: &str, kind: Option<&str>) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://example.test/{}", language_code),
            language_code: language_code.to_string(),
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn test_extract_caption_tracks_from_player_response() {
        let html = r#"<script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en","name":{"simpleText":"English [auto] ]"},"vssId":"a.en","languageCode":"en","kind":"asr"},{"baseUrl":"/api/timedtext?v=abc&lang=de","name":{"simpleText":"Deutsch"},"languageCode":"de"}],"audioTracks":[]}}};</script>"#;

        let tracks = extract_caption_tracks(html).unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].base_url, "https://www.youtube.com/api/timedtext?v=abc&lang=en");
        assert!(tracks[0].is_generated());
        assert_eq!(tracks[1].language_code, "de");
    }

    #[test]
    fn test_extract_caption_tracks_missing() {
        let err = extract_caption_tracks("<html>consent wall</html>").unwrap_err();
        assert!(matches!(err, SourceError::NoCaptions(_)));
    }

    #[test]
    fn test_choose_track_prefers_manual_then_regional_then_first() {
        let tracks = vec![track("fr", None), track("en", Some("asr")), track("en", None), track("pt-BR", None)];

        let chosen = choose_track(&tracks, &["en".to_string()]).unwrap();
        assert!(!chosen.is_generated());
        assert_eq!(chosen.language_code, "en");

        let chosen = choose_track(&tracks, &["pt".to_string()]).unwrap();
        assert_eq!(chosen.language_code, "pt-BR");

        let chosen = choose_track(&tracks, &["ja".to_string()]).unwrap();
        assert_eq!(chosen.language_code, "fr");

        assert!(choose_track(&[], &["en".to_string()]).is_none());
    }

    #[test]
    fn test_parse_classic_timed_text() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.5" dur="2.1">it&amp;#39;s a
test</text><text start="2.6" dur="1.0">   </text><text start="3.6">Tom &amp; Jerry</text></transcript>"#;

        let cues = parse_timed_text(xml);

        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_seconds, 0.5);
        assert_eq!(cues[0].duration_seconds, 2.1);
        assert_eq!(cues[0].text, "it's a test");
        assert_eq!(cues[1], Cue::new("Tom & Jerry", 3.6, 0.0));
    }

    #[test]
    fn test_double_escaped_entities_are_decoded() {
        assert_eq!(decode_nested_entities("&amp;quot;quoted&amp;quot; &amp;amp; more"), "\"quoted\" & more");
        assert_eq!(decode_nested_entities("AT&amp;T"), "AT&T");

        let xml = r#"<timedtext format="3"><body><p t="0" d="900">don&amp;#39;t stop</p></body></timedtext>"#;
        assert_eq!(parse_timed_text(xml), vec![Cue::new("don't stop", 0.0, 0.9)]);
    }

    #[test]
    fn test_parse_srv3_timed_text() {
        let xml = r#"<timedtext format="3"><body><p t="1200" d="2400"><s>hello</s><s t="400"> world</s></p><p t="3600" d="800"></p></body></timedtext>"#;

        let cues = parse_timed_text(xml);

        assert_eq!(cues, vec![Cue::new("hello world", 1.2, 2.4)]);
    }

    #[tokio::test]
    async fn test_fetch_scrapes_page_then_track() {
        let server = MockServer::start().await;
        let html = format!(
            r#"<html>"captionTracks":[{{"baseUrl":"{}/api/timedtext?v=dQw4w9WgXcQ&lang=en","languageCode":"en"}}]</html>"#,
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/watch"))
            .and(query_param("v", "dQw4w9WgXcQ"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .and(query_param("lang", "en"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<transcript><text start="0" dur="1.5">never gonna</text><text start="1.5" dur="1.5">give you up</text></transcript>"#,
            ))
            .mount(&server)
            .await;

        let config = ScrapeConfig {
            base_url: server.uri(),
            ..ScrapeConfig::default()
        };
        let source = PageScrapeSource::new(Client::new(), &config);

        let transcript = source
            .fetch(&FetchRequest::new("dQw4w9WgXcQ", vec!["en".to_string()]))
            .await
            .unwrap();

        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert_eq!(
            transcript.cues,
            vec![Cue::new("never gonna", 0.0, 1.5), Cue::new("give you up", 1.5, 1.5)]
        );
    }
}
