use url::Url;

/// Length of a platform content id (e.g. `dQw4w9WgXcQ`)
const CONTENT_ID_LEN: usize = 11;

/// Check whether a string has the shape of a platform content id
pub fn is_content_id(candidate: &str) -> bool {
    candidate.len() == CONTENT_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract a content id from a bare id or any watch/short/embed URL
pub fn extract_content_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_content_id(input) {
        return Some(input.to_string());
    }

    // Accept scheme-less inputs like "youtu.be/abc" or "www.youtube.com/watch?v=abc"
    let parsed = Url::parse(input)
        .or_else(|_| Url::parse(&format!("https://{}", input)))
        .ok()?;

    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            match segments.next() {
                Some("watch") => parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    }?;

    is_content_id(&candidate).then_some(candidate)
}

/// Canonical watch URL for a content id
pub fn watch_url(content_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", content_id)
}

/// Format seconds as MM:SS, or HH:MM:SS past the hour
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Format elapsed milliseconds for diagnostics
pub fn format_elapsed(millis: u64) -> String {
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.1}s", millis as f64 / 1000.0)
    }
}

/// Collapse all whitespace runs to single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Count whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// The JSON array or object opening at the first byte of `text`, found by
/// bracket matching outside of string literals
pub fn balanced_json(text: &str) -> Option<&str> {
    if !text.starts_with(['[', '{']) {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content_id() {
        assert_eq!(extract_content_id("dQw4w9WgXcQ"), Some("dQw4w9WgXcQ".to_string()));
        assert_eq!(
            extract_content_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_content_id("https://youtu.be/dQw4w9WgXcQ?si=abc"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_content_id("youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_content_id("https://m.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(extract_content_id("https://vimeo.com/123456"), None);
        assert_eq!(extract_content_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(extract_content_id("not a video"), None);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(75.9), "01:15");
        assert_eq!(format_timestamp(3661.0), "01:01:01");
        assert_eq!(format_timestamp(-4.0), "00:00");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(250), "250ms");
        assert_eq!(format_elapsed(1500), "1.5s");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  hello \n\t world  "), "hello world");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc…");
        // Multi-byte characters are never split
        assert_eq!(truncate_chars("ééééé", 2), "éé…");
    }

    #[test]
    fn test_balanced_json() {
        assert_eq!(balanced_json(r#"[{"a":"]"}, 2] trailing"#), Some(r#"[{"a":"]"}, 2]"#));
        assert_eq!(balanced_json(r#"{"q":"say \"}\""} rest"#), Some(r#"{"q":"say \"}\""}"#));
        assert_eq!(balanced_json("[1, [2"), None);
        assert_eq!(balanced_json("text [1]"), None);
    }
}
