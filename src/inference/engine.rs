use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Options resolved from a transcription request.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    /// Language code, `None` lets the engine detect it
    pub language: Option<String>,
    pub word_timestamps: bool,
    /// Half precision hint, engines without support fall back to full precision
    pub fp16: bool,
    /// Candidates sampled per window once decoding falls back to a non-zero temperature
    pub best_of: usize,
    pub no_speech_threshold: f64,
    /// Seconds of silence after which a low confidence segment is treated as hallucinated
    pub hallucination_silence_threshold: Option<f64>,
    pub condition_on_previous_text: bool,
    /// Parameters forwarded as-is, engines ignore the ones they do not know
    pub extra: BTreeMap<String, String>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: None,
            word_timestamps: false,
            fp16: true,
            best_of: 5,
            no_speech_threshold: 0.6,
            hallucination_silence_threshold: None,
            condition_on_previous_text: true,
            extra: BTreeMap::new(),
        }
    }
}

/// Engine output in Whisper's native layout.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct RawTranscription {
    pub text: String,
    pub language: Option<String>,
    pub segments: Vec<RawSegment>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct RawSegment {
    pub id: usize,
    pub seek: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub tokens: Vec<u32>,
    pub temperature: f64,
    pub avg_logprob: f64,
    pub compression_ratio: f64,
    pub no_speech_prob: f64,
    pub words: Option<Vec<RawWord>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct RawWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub probability: Option<f64>,
}

/// A speech recognition engine working on an audio file on disk.
///
/// Calls block until the whole file has been processed, callers run them on a
/// blocking worker.
pub trait TranscriptionEngine: Send + Sync {
    fn transcribe(&self, path: &Path, options: &TranscribeOptions) -> Result<RawTranscription>;
}
