//! Paragraph segmentation of caption cues.
//!
//! Caption sources emit short, fragmentary cues (a few words each). `merge`
//! folds them into readable paragraphs in a single left-to-right pass, breaking
//! on long pauses, on sentence ends once a paragraph has enough words, and on a
//! hard word ceiling.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::sources::Cue;

/// Thresholds driving paragraph breaks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Silence (seconds) that ends a paragraph once `min_words` is reached
    pub pause_threshold_secs: f64,

    /// Silence that, after a sentence end, is enough to break
    pub short_pause_secs: f64,

    pub min_words: usize,

    /// Past this many words any sentence end breaks
    pub soft_max_words: usize,

    /// Past this many words a break is forced
    pub hard_max_words: usize,

    /// Slack above `hard_max_words` while waiting for a sentence end
    pub hard_max_grace: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            pause_threshold_secs: 1.5,
            short_pause_secs: 0.8,
            min_words: 30,
            soft_max_words: 80,
            hard_max_words: 150,
            hard_max_grace: 30,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.pause_threshold_secs.is_finite() && self.short_pause_secs.is_finite()) {
            anyhow::bail!("Segmenter pause thresholds must be finite");
        }
        if self.short_pause_secs < 0.0 || self.pause_threshold_secs < self.short_pause_secs {
            anyhow::bail!("Segmenter requires 0 <= short_pause_secs <= pause_threshold_secs");
        }
        if self.hard_max_words == 0 {
            anyhow::bail!("Segmenter hard_max_words must be greater than zero");
        }
        if !(self.min_words <= self.soft_max_words && self.soft_max_words <= self.hard_max_words) {
            anyhow::bail!("Segmenter requires min_words <= soft_max_words <= hard_max_words");
        }
        Ok(())
    }

    /// Largest paragraph, in words, `merge` can emit
    pub fn max_paragraph_words(&self) -> usize {
        self.hard_max_words + self.hard_max_grace
    }
}

/// A merged, human-readable block of transcript text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphSegment {
    pub text: String,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

impl ParagraphSegment {
    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }
}

/// Merges cues into paragraphs with a fixed set of thresholds
#[derive(Debug, Clone, Default)]
pub struct ParagraphSegmenter {
    config: SegmenterConfig,
}

impl ParagraphSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn merge(&self, cues: &[Cue]) -> Vec<ParagraphSegment> {
        merge(cues, &self.config)
    }
}

/// One cue as held by the accumulator
#[derive(Debug, Clone)]
struct Piece {
    text: String,
    start: f64,
    end: f64,
    words: usize,
}

impl Piece {
    fn ends_sentence(&self) -> bool {
        ends_sentence(&self.text)
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    pieces: Vec<Piece>,
    words: usize,
}

impl Accumulator {
    fn seeded(piece: Piece) -> Self {
        let words = piece.words;
        Self { pieces: vec![piece], words }
    }

    fn push(&mut self, piece: Piece) {
        self.words += piece.words;
        self.pieces.push(piece);
    }

    fn ends_sentence(&self) -> bool {
        self.pieces.last().map(Piece::ends_sentence).unwrap_or(false)
    }

    /// Index of the last piece ending a sentence whose cumulative word count
    /// lies strictly past the midpoint (and before the final piece)
    fn sentence_split_point(&self) -> Option<usize> {
        let mut running = 0;
        let mut best = None;
        for (idx, piece) in self.pieces.iter().enumerate() {
            running += piece.words;
            if idx + 1 < self.pieces.len() && piece.ends_sentence() && running * 2 > self.words {
                best = Some(idx);
            }
        }
        best
    }

    /// Split off everything after `idx` into a new accumulator
    fn split_after(&mut self, idx: usize) -> Accumulator {
        let tail: Vec<Piece> = self.pieces.split_off(idx + 1);
        let tail_words: usize = tail.iter().map(|piece| piece.words).sum();
        self.words -= tail_words;
        Accumulator { pieces: tail, words: tail_words }
    }

    fn into_paragraph(self) -> Option<ParagraphSegment> {
        let first = self.pieces.first()?;
        let last = self.pieces.last()?;
        let start = first.start;
        let duration = (last.end - start).max(0.0);

        let mut text = String::new();
        for piece in &self.pieces {
            join_text(&mut text, &piece.text);
        }
        let text = text.trim().to_string();

        (!text.is_empty()).then_some(ParagraphSegment {
            text,
            start_seconds: start,
            duration_seconds: duration,
        })
    }
}

/// Merge an ordered cue sequence into paragraphs.
///
/// Never fails: negative or non-finite timings are clamped to zero, blank cues
/// are dropped, and cues longer than `hard_max_words` are split into word
/// chunks with their time spread proportionally.
pub fn merge(cues: &[Cue], config: &SegmenterConfig) -> Vec<ParagraphSegment> {
    let pieces = prepare(cues, config.hard_max_words.max(1));

    let mut paragraphs = Vec::new();
    let mut iter = pieces.into_iter();
    let Some(first) = iter.next() else {
        return paragraphs;
    };

    let mut prev_end = first.end;
    let mut acc = Accumulator::seeded(first);

    for piece in iter {
        let gap = piece.start - prev_end;
        prev_end = piece.end;
        let words = acc.words;

        let long_pause = gap > config.pause_threshold_secs && words >= config.min_words;
        let sentence_break = acc.ends_sentence()
            && words >= config.min_words
            && (gap > config.short_pause_secs || words >= config.soft_max_words);

        if long_pause || sentence_break {
            flush(&mut paragraphs, std::mem::replace(&mut acc, Accumulator::seeded(piece)));
            continue;
        }

        if words >= config.hard_max_words {
            if let Some(idx) = acc.sentence_split_point() {
                let tail = acc.split_after(idx);
                flush(&mut paragraphs, std::mem::replace(&mut acc, tail));
            }
        }

        if acc.words + piece.words > config.max_paragraph_words() {
            flush(&mut paragraphs, std::mem::replace(&mut acc, Accumulator::seeded(piece)));
            continue;
        }

        acc.push(piece);
    }

    flush(&mut paragraphs, acc);
    paragraphs
}

/// Space-join every paragraph, the full transcript text
pub fn full_text(paragraphs: &[ParagraphSegment]) -> String {
    paragraphs
        .iter()
        .map(|paragraph| paragraph.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn flush(paragraphs: &mut Vec<ParagraphSegment>, acc: Accumulator) {
    if let Some(paragraph) = acc.into_paragraph() {
        paragraphs.push(paragraph);
    }
}

fn prepare(cues: &[Cue], max_words: usize) -> Vec<Piece> {
    let mut pieces: Vec<Piece> = Vec::with_capacity(cues.len());

    for cue in cues {
        let text = cue.text.trim();
        if text.is_empty() {
            continue;
        }
        let start = clamp_seconds(cue.start_seconds);
        let duration = clamp_seconds(cue.duration_seconds);
        let words: Vec<&str> = text.split_whitespace().collect();

        if words.len() <= max_words {
            pieces.push(Piece {
                text: text.to_string(),
                start,
                end: start + duration,
                words: words.len(),
            });
            continue;
        }

        let per_word = duration / words.len() as f64;
        for (chunk_idx, chunk) in words.chunks(max_words).enumerate() {
            let chunk_start = start + per_word * (chunk_idx * max_words) as f64;
            pieces.push(Piece {
                text: chunk.join(" "),
                start: chunk_start,
                end: chunk_start + per_word * chunk.len() as f64,
                words: chunk.len(),
            });
        }
    }

    // Sources should already be ordered; a stable sort keeps equal starts in input order
    pieces.sort_by(|a, b| a.start.total_cmp(&b.start));
    pieces
}

fn clamp_seconds(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn join_text(buffer: &mut String, text: &str) {
    let needs_space = !buffer.is_empty()
        && !buffer.ends_with(char::is_whitespace)
        && !text.starts_with(char::is_whitespace);
    if needs_space {
        buffer.push(' ');
    }
    buffer.push_str(text);
}

fn ends_sentence(text: &str) -> bool {
    let trimmed = text.trim_end_matches(|c: char| {
        c.is_whitespace() || matches!(c, '"' | '\'' | ')' | ']' | '”' | '’' | '»')
    });
    trimmed.ends_with(['.', '!', '?', '…'])
}
