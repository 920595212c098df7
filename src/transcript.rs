use serde::{Deserialize, Serialize};

/// The response body of a successful transcription.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    /// Full transcript, the ordered concatenation of the segment texts
    pub text: String,

    /// The requested language code, or the one the engine detected
    pub language: String,

    /// Segments in audio timeline order
    pub segments: Vec<Segment>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Word {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}
