use std::path::Path;

use anyhow::Result;
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use rand::SeedableRng;

use crate::inference::audio_pipeline::AudioGeneratorPipeline;
use crate::inference::engine::{RawTranscription, TranscribeOptions, TranscriptionEngine};
use crate::inference::models::model::ModelBase;

/// Files making up a quantized Whisper checkpoint inside a model repository.
#[derive(Debug, Clone)]
pub struct WhisperFiles {
    pub config: String,
    pub tokenizer: String,
    pub weights: String,
    pub mel_filters: String,
}

// Taken from https://github.com/huggingface/candle/blob/main/candle-examples/examples/whisper/main.rs
#[derive(Clone)]
pub struct WhisperModel {
    base: ModelBase,
    generator_pipeline: AudioGeneratorPipeline,
}

impl WhisperModel {
    #[tracing::instrument(level = "info", skip(api))]
    pub fn new(api: &Api, base: ModelBase, files: &WhisperFiles) -> Result<Self> {
        let repo = api.repo(Repo::with_revision(
            base.repo_id.clone(),
            RepoType::Model,
            base.repo_revision.clone(),
        ));
        let generator_pipeline = AudioGeneratorPipeline::with_gguf_model(
            &repo,
            &files.config,
            &files.tokenizer,
            &files.weights,
            &files.mel_filters,
            rand::rngs::StdRng::from_seed([0; 32]),
        )?;

        Ok(Self {
            base,
            generator_pipeline,
        })
    }
}

impl TranscriptionEngine for WhisperModel {
    #[tracing::instrument(level = "info", skip(self, options), fields(model = %self.base.name))]
    fn transcribe(&self, path: &Path, options: &TranscribeOptions) -> Result<RawTranscription> {
        // Every request decodes with its own pipeline, the weights are shared.
        let mut pipeline = self.generator_pipeline.clone();
        pipeline.transcribe(path, options)
    }
}
