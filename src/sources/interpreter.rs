use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{Availability, Cue, FetchRequest, RuntimeEnv, SourceError, SourceTranscript, TranscriptSource};
use crate::config::InterpreterConfig;
use crate::utils::check_command_available;

/// Runs `youtube_transcript_api` inside a local Python interpreter
pub struct LocalInterpreterSource {
    python_path: String,
    timeout: Duration,
}

/// Passed to `python -c`; argv is `<content id> [language ...]`
const FETCH_SCRIPT: &str = r#"
import json, sys

def main():
    video_id = sys.argv[1]
    languages = sys.argv[2:] or ["en"]
    try:
        from youtube_transcript_api import YouTubeTranscriptApi
        transcript = YouTubeTranscriptApi().fetch(video_id, languages=languages)
        segments = [
            {"text": s.text, "start": s.start, "duration": s.duration}
            for s in transcript.snippets
        ]
        print(json.dumps({
            "success": True,
            "segments": segments,
            "language": getattr(transcript, "language_code", None),
        }))
    except Exception as e:
        print(json.dumps({"success": False, "error": str(e), "errorType": type(e).__name__}))
        sys.exit(1)

main()
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptOutput {
    success: bool,
    #[serde(default)]
    segments: Vec<ScriptSegment>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptSegment {
    text: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    duration: f64,
}

impl LocalInterpreterSource {
    pub fn new(config: &InterpreterConfig) -> Self {
        Self {
            python_path: config.python_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// The script reports failures as JSON too, so stdout is parsed regardless
/// of exit status; stderr only matters when stdout is unusable
fn parse_output(stdout: &str, stderr: &str) -> Result<SourceTranscript, SourceError> {
    let line = stdout.lines().rev().find(|line| !line.trim().is_empty());

    let output = match line.map(|line| serde_json::from_str::<ScriptOutput>(line)) {
        Some(Ok(output)) => output,
        Some(Err(e)) => return Err(SourceError::Parse(format!("interpreter output: {}", e))),
        None => {
            let stderr = stderr.trim();
            return Err(SourceError::Process(if stderr.is_empty() {
                "interpreter produced no output".to_string()
            } else {
                crate::utils::truncate_chars(stderr, 200)
            }));
        }
    };

    if !output.success {
        return Err(SourceError::Process(format!(
            "{}: {}",
            output.error_type.as_deref().unwrap_or("Error"),
            output.error.as_deref().unwrap_or("unknown failure")
        )));
    }

    Ok(SourceTranscript {
        cues: output
            .segments
            .into_iter()
            .map(|segment| Cue::new(segment.text, segment.start, segment.duration))
            .collect(),
        language: output.language,
    })
}

#[async_trait]
impl TranscriptSource for LocalInterpreterSource {
    fn name(&self) -> &'static str {
        "local-interpreter"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(&self, env: &RuntimeEnv) -> Availability {
        if env.serverless {
            return Availability::Unavailable("subprocesses are not allowed in serverless runtimes".to_string());
        }
        if !check_command_available(&self.python_path).await {
            return Availability::Unavailable(format!("interpreter '{}' not found", self.python_path));
        }
        Availability::Ready
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<SourceTranscript, SourceError> {
        tracing::debug!(python = %self.python_path, content_id = %request.content_id, "Running transcript script");

        // Dropping the future on timeout must not leave the child behind
        let output = Command::new(&self.python_path)
            .arg("-c")
            .arg(FETCH_SCRIPT)
            .arg(&request.content_id)
            .args(&request.languages)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            tracing::debug!(status = ?output.status.code(), "Transcript script exited with failure");
        }

        parse_output(&stdout, &stderr)
    }
}
