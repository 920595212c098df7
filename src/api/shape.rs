use crate::error::TranscribeError;
use crate::inference::engine::{RawSegment, RawTranscription, RawWord, TranscribeOptions};
use crate::transcript::{Segment, TranscriptionResult, Word};

fn checked_span(start: f64, end: f64) -> Result<(f64, f64), TranscribeError> {
    if !start.is_finite() || !end.is_finite() {
        return Err(TranscribeError::TranscriptionFailed(
            "engine returned a non-finite timestamp".into(),
        ));
    }
    Ok((start, end.max(start)))
}

fn shape_word(raw: RawWord) -> Result<Word, TranscribeError> {
    let (start, end) = checked_span(raw.start, raw.end)?;
    Ok(Word {
        start,
        end,
        text: raw.word,
        confidence: raw.probability.filter(|p| p.is_finite()),
    })
}

fn shape_segment(raw: RawSegment, with_words: bool) -> Result<Segment, TranscribeError> {
    let (start, end) = checked_span(raw.start, raw.end)?;
    let words = match raw.words {
        Some(words) if with_words && !words.is_empty() => Some(
            words
                .into_iter()
                .map(shape_word)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => None,
    };
    Ok(Segment {
        start,
        end,
        text: raw.text,
        words,
    })
}

/// Maps engine output onto the response schema.
///
/// Segments keep the engine's order; an engine handing back segments that go
/// back in time is treated as a failed transcription.
pub(crate) fn shape_result(
    raw: RawTranscription,
    options: &TranscribeOptions,
) -> Result<TranscriptionResult, TranscribeError> {
    let mut segments: Vec<Segment> = Vec::with_capacity(raw.segments.len());
    for raw_segment in raw.segments {
        let segment = shape_segment(raw_segment, options.word_timestamps)?;
        if let Some(previous) = segments.last() {
            if segment.start < previous.start {
                return Err(TranscribeError::TranscriptionFailed(format!(
                    "engine returned segments out of order ({} after {})",
                    segment.start, previous.start
                )));
            }
        }
        segments.push(segment);
    }

    let text = if segments.is_empty() {
        raw.text.trim().to_string()
    } else {
        segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<String>()
            .trim()
            .to_string()
    };
    let language = options
        .language
        .clone()
        .or(raw.language)
        .unwrap_or_else(|| "unknown".to_string());

    Ok(TranscriptionResult {
        text,
        language,
        segments,
    })
}
