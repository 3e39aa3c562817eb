use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{Availability, Cue, FetchRequest, RuntimeEnv, SourceError, SourceTranscript, TranscriptSource};
use crate::config::DownloaderConfig;
use crate::utils::{check_command_available, watch_url};

/// Subtitle download through the external `yt-dlp` binary
pub struct DownloaderSource {
    yt_dlp_path: String,
    timeout: Duration,
}

impl DownloaderSource {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn download_subtitles(&self, request: &FetchRequest, dir: &Path) -> Result<(), SourceError> {
        let languages = sub_languages(&request.languages);
        let template = dir.join("%(id)s");

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--skip-download",
                "--write-sub",
                "--write-auto-sub",
                "--sub-format",
                "vtt",
                "--sub-lang",
                languages.as_str(),
                "--no-playlist",
                "--no-progress",
                "--output",
            ])
            .arg(&template)
            .arg(watch_url(&request.content_id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Process(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                crate::utils::truncate_chars(error.trim(), 200)
            )));
        }

        Ok(())
    }
}

/// `en` also asks for regional variants (`en.*`) since auto captions are
/// frequently tagged `en-US` or `en-orig`
fn sub_languages(languages: &[String]) -> String {
    let languages: Vec<String> = if languages.is_empty() {
        vec!["en".to_string()]
    } else {
        languages.to_vec()
    };

    languages
        .iter()
        .flat_map(|lang| [lang.clone(), format!("{}.*", lang)])
        .collect::<Vec<_>>()
        .join(",")
}

/// `<id>.<lang>.vtt` files, ordered by language preference
fn pick_subtitle_file(files: &[PathBuf], languages: &[String]) -> Option<(PathBuf, Option<String>)> {
    let tagged: Vec<(&PathBuf, String)> = files
        .iter()
        .filter(|path| path.extension().map_or(false, |ext| ext == "vtt"))
        .map(|path| {
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let lang = stem.rsplit_once('.').map(|(_, lang)| lang.to_string()).unwrap_or_default();
            (path, lang)
        })
        .collect();

    let preferred = languages.iter().find_map(|wanted| {
        let regional = format!("{}-", wanted);
        tagged
            .iter()
            .find(|(_, lang)| lang == wanted)
            .or_else(|| tagged.iter().find(|(_, lang)| lang.starts_with(&regional)))
    });

    preferred
        .or_else(|| tagged.first())
        .map(|(path, lang)| ((*path).clone(), Some(lang.clone()).filter(|l| !l.is_empty())))
}

/// `HH:MM:SS.mmm` or `MM:SS.mmm`
fn parse_vtt_timestamp(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for ch in line.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Auto-generated tracks carry inline word timings such as `<00:00:01.520>`
fn has_word_timings(content: &str) -> bool {
    content
        .split('<')
        .skip(1)
        .any(|chunk| chunk.split_once('>').is_some_and(|(tag, _)| parse_vtt_timestamp(tag).is_some()))
}

/// Parse WebVTT into cues.
///
/// Auto-generated tracks repeat the previous line at the top of every cue
/// ("rolling" captions) and emit ~10ms transition cues; both are dropped.
/// Elsewhere a repeated line is only dropped when its cue overlaps the
/// previous one.
pub(crate) fn parse_vtt(content: &str) -> Vec<Cue> {
    let rolling = has_word_timings(content);
    let mut cues = Vec::new();
    let mut previous_lines: Vec<String> = Vec::new();
    let mut previous_end = f64::NEG_INFINITY;
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        let Some((start, end)) = line.split_once("-->") else {
            continue;
        };
        let (Some(start), Some(end)) = (
            parse_vtt_timestamp(start),
            // Cue settings may follow the end timestamp
            end.split_whitespace().next().and_then(parse_vtt_timestamp),
        ) else {
            continue;
        };

        let mut text_lines = Vec::new();
        while let Some(next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            let cleaned = crate::utils::collapse_whitespace(&super::decode_entities(&strip_tags(next)));
            if !cleaned.is_empty() {
                text_lines.push(cleaned);
            }
            lines.next();
        }

        if end - start < 0.02 {
            continue;
        }

        let dedupe = rolling || start < previous_end;
        let fresh: Vec<String> = text_lines
            .iter()
            .filter(|line| !(dedupe && previous_lines.contains(*line)))
            .cloned()
            .collect();
        if !text_lines.is_empty() {
            previous_lines = text_lines;
            previous_end = end;
        }
        if fresh.is_empty() {
            continue;
        }

        cues.push(Cue::new(fresh.join(" "), start, (end - start).max(0.0)));
    }

    cues
}

#[async_trait]
impl TranscriptSource for DownloaderSource {
    fn name(&self) -> &'static str {
        "downloader"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(&self, env: &RuntimeEnv) -> Availability {
        if env.serverless {
            return Availability::Unavailable("subprocesses are not allowed in serverless runtimes".to_string());
        }
        if !env.writable_temp {
            return Availability::Unavailable("no writable temp directory".to_string());
        }
        if !check_command_available(&self.yt_dlp_path).await {
            return Availability::Unavailable(format!("'{}' not found", self.yt_dlp_path));
        }
        Availability::Ready
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<SourceTranscript, SourceError> {
        // Removed on drop, including when the attempt times out
        let workdir = tempfile::Builder::new().prefix("tubescribe-subs-").tempdir()?;
        tracing::debug!(dir = %workdir.path().display(), "Downloading subtitles with yt-dlp");

        self.download_subtitles(request, workdir.path()).await?;

        let mut files = Vec::new();
        let mut entries = fs_err::tokio::read_dir(workdir.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            files.push(entry.path());
        }
        files.sort();

        let (path, language) = pick_subtitle_file(&files, &request.languages)
            .ok_or_else(|| SourceError::NoCaptions("yt-dlp wrote no subtitle files".to_string()))?;

        let content = fs_err::tokio::read_to_string(&path).await?;

        Ok(SourceTranscript {
            cues: parse_vtt(&content),
            language,
        })
    }
}
