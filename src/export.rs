//! Exports derived from an already fetched transcription.
//!
//! Nothing in here talks to the network, every artifact is computed from the
//! segment list of the response.

use anyhow::Result;
use serde_json::Value;

use crate::transcript::{Segment, TranscriptionResult};

struct Timestamp {
    hours: u64,
    minutes: u64,
    seconds: u64,
    millis: u64,
}

impl Timestamp {
    // Truncates at the millisecond. Rounding to whole microseconds first absorbs
    // float noise such as 0.29 * 1000 == 289.99999999999994.
    fn from_seconds(seconds: f64) -> Self {
        let seconds = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let total_micros = (seconds * 1_000_000.0).round() as u64;
        let total_millis = total_micros / 1_000;

        Self {
            hours: total_millis / 3_600_000,
            minutes: (total_millis / 60_000) % 60,
            seconds: (total_millis / 1_000) % 60,
            millis: total_millis % 1_000,
        }
    }
}

/// Formats seconds as `HH:MM:SS,mmm`, the SubRip timestamp layout.
pub fn format_srt_time(seconds: f64) -> String {
    let t = Timestamp::from_seconds(seconds);
    format!(
        "{:02}:{:02}:{:02},{:03}",
        t.hours, t.minutes, t.seconds, t.millis
    )
}

/// Formats seconds as `MM:SS.mmm`, minutes keep counting past the hour.
pub fn format_time(seconds: f64) -> String {
    let t = Timestamp::from_seconds(seconds);
    format!(
        "{:02}:{:02}.{:03}",
        t.hours * 60 + t.minutes,
        t.seconds,
        t.millis
    )
}

/// Segment texts in order, one per line, without timestamps.
pub fn to_plain_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.trim())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered SubRip blocks, one per segment, starting at 1.
pub fn to_srt(segments: &[Segment]) -> String {
    let mut srt = String::new();
    for (index, segment) in segments.iter().enumerate() {
        srt.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(segment.start),
            format_srt_time(segment.end),
            segment.text.trim()
        ));
    }
    srt
}

/// `[MM:SS.mmm --> MM:SS.mmm]  text` lines, one per segment.
pub fn to_subtitle_lines(segments: &[Segment]) -> Vec<String> {
    segments
        .iter()
        .map(|segment| {
            format!(
                "[{} --> {}]  {}",
                format_time(segment.start),
                format_time(segment.end),
                segment.text.trim()
            )
        })
        .collect()
}

/// The raw response, pretty printed and otherwise untouched.
pub fn to_json(raw_response: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(raw_response)?)
}

/// Every downloadable artifact for a response as `(file name, contents)` pairs.
pub fn artifacts(
    stem: &str,
    result: &TranscriptionResult,
    raw_response: &Value,
) -> Result<Vec<(String, String)>> {
    let json = (format!("{stem}_full_transcript.json"), to_json(raw_response)?);
    if result.segments.is_empty() {
        return Ok(vec![(format!("{stem}_transcript.txt"), result.text.clone()), json]);
    }
    Ok(vec![
        (
            format!("{stem}_transcript.txt"),
            to_plain_text(&result.segments),
        ),
        (format!("{stem}.srt"), to_srt(&result.segments)),
        (
            format!("{stem}_subtitles.txt"),
            to_subtitle_lines(&result.segments).join("\n"),
        ),
        json,
    ])
}
