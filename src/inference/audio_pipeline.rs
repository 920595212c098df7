#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

use std::path::Path;

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor, D};
use candle_nn::ops::softmax;
use candle_transformers::models::whisper::quantized_model::Whisper;
use candle_transformers::models::whisper::{
    audio, Config, COMPRESSION_RATIO_THRESHOLD, EOT_TOKEN, HOP_LENGTH, LOGPROB_THRESHOLD,
    NO_SPEECH_TOKENS, NO_TIMESTAMPS_TOKEN, N_FRAMES, SAMPLE_RATE, SOT_TOKEN, TEMPERATURES,
    TRANSCRIBE_TOKEN,
};
use candle_transformers::quantized_var_builder::VarBuilder;
use hf_hub::api::sync::ApiRepo;
use rand::distributions::Distribution;
use tokenizers::Tokenizer;
use tracing::{debug, error};

use crate::inference::engine::{RawSegment, RawTranscription, RawWord, TranscribeOptions};
use crate::inference::language::LANGUAGES;
use crate::inference::pcm_decode::{pcm_decode, resample};

const SOT_PREV_TOKEN: &str = "<|startofprev|>";
// Timestamp tokens advance in 20 ms steps.
const TIMESTAMP_RESOLUTION: f64 = 0.02;
// Half the text context minus the <|startofprev|> token.
const MAX_PROMPT_TOKENS: usize = 223;
// Scripts written without spaces between words.
const NO_SPACE_LANGUAGES: [&str; 6] = ["zh", "ja", "th", "lo", "my", "yue"];

// Taken from https://github.com/huggingface/candle/blob/main/candle-examples/examples/whisper/main.rs
pub struct AudioGeneratorPipeline {
    model: Whisper,
    tokenizer: Tokenizer,
    config: Config,
    mel_filters: Vec<f32>,
    suppress_tokens: Tensor,
    sot_token: u32,
    sot_prev_token: Option<u32>,
    transcribe_token: u32,
    eot_token: u32,
    no_speech_token: u32,
    no_timestamps_token: u32,
    language_tokens: Vec<(&'static str, u32)>,
    seed: rand::rngs::StdRng,
}

impl Clone for AudioGeneratorPipeline {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            tokenizer: self.tokenizer.clone(),
            config: self.config.clone(),
            mel_filters: self.mel_filters.clone(),
            suppress_tokens: self.suppress_tokens.clone(),
            sot_token: self.sot_token,
            sot_prev_token: self.sot_prev_token,
            transcribe_token: self.transcribe_token,
            eot_token: self.eot_token,
            no_speech_token: self.no_speech_token,
            no_timestamps_token: self.no_timestamps_token,
            language_tokens: self.language_tokens.clone(),
            seed: self.seed.clone(),
        }
    }
}

impl AudioGeneratorPipeline {
    pub fn with_gguf_model(
        repo: &ApiRepo,
        config_filename: &str,
        tokenizer_filename: &str,
        gguf_filename: &str,
        mel_filters_filename: &str,
        seed: rand::rngs::StdRng,
    ) -> Result<Self> {
        let config_path = repo.get(config_filename)?;
        let tokenizer_path = repo.get(tokenizer_filename)?;
        let model_path = repo.get(gguf_filename)?;
        let mel_filters_path = repo.get(mel_filters_filename)?;

        let config: Config = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(anyhow::Error::msg)?;

        let vb = VarBuilder::from_gguf(model_path, &Device::Cpu)?;
        let model = Whisper::load(&vb, config.clone())?;

        let mel_bytes = &*std::fs::read(mel_filters_path)?;
        let mut mel_filters = vec![0f32; mel_bytes.len() / 4];
        <byteorder::LittleEndian as byteorder::ByteOrder>::read_f32_into(
            mel_bytes,
            &mut mel_filters,
        );

        // Timestamps are always predicted, they delimit the returned segments.
        let no_timestamps_token = token_id(&tokenizer, NO_TIMESTAMPS_TOKEN)?;
        let suppress_tokens: Vec<f32> = (0..model.config.vocab_size as u32)
            .map(|i| {
                if model.config.suppress_tokens.contains(&i) || i == no_timestamps_token {
                    f32::NEG_INFINITY
                } else {
                    0f32
                }
            })
            .collect();
        let suppress_tokens = Tensor::new(suppress_tokens.as_slice(), &Device::Cpu)?;
        let start_of_transcript_token = token_id(&tokenizer, SOT_TOKEN)?;
        let transcribe_token = token_id(&tokenizer, TRANSCRIBE_TOKEN)?;
        let end_of_text_token = token_id(&tokenizer, EOT_TOKEN)?;
        let no_speech_token = NO_SPEECH_TOKENS
            .iter()
            .find_map(|token| token_id(&tokenizer, token).ok())
            .ok_or_else(|| anyhow!("Unable to find any non-speech token"))?;
        // English only checkpoints carry no language tokens.
        let language_tokens = LANGUAGES
            .iter()
            .filter_map(|(code, _)| {
                token_id(&tokenizer, &format!("<|{code}|>"))
                    .ok()
                    .map(|id| (*code, id))
            })
            .collect();

        Ok(Self {
            model,
            sot_prev_token: token_id(&tokenizer, SOT_PREV_TOKEN).ok(),
            tokenizer,
            config,
            mel_filters,
            suppress_tokens,
            sot_token: start_of_transcript_token,
            transcribe_token,
            eot_token: end_of_text_token,
            no_speech_token,
            no_timestamps_token,
            language_tokens,
            seed,
        })
    }

    pub fn transcribe(
        &mut self,
        path: &Path,
        options: &TranscribeOptions,
    ) -> Result<RawTranscription> {
        if options.fp16 {
            debug!("fp16 requested, the CPU backend decodes in fp32");
        }
        for key in options.extra.keys() {
            debug!(parameter = %key, "ignoring unknown engine parameter");
        }

        let (pcm_data, sample_rate) = pcm_decode(path)?;
        let pcm_data = resample(&pcm_data, sample_rate, SAMPLE_RATE as u32);
        if pcm_data.is_empty() {
            return Ok(RawTranscription {
                language: options.language.clone(),
                ..RawTranscription::default()
            });
        }

        let mel = self.load_mel(&pcm_data)?;
        let (_, _, content_frames) = mel.dims3()?;

        let (language, language_token) = self.resolve_language(&mel, options.language.as_deref())?;
        debug!(language = %language, "decoding");
        let split_on_spaces = !NO_SPACE_LANGUAGES.contains(&language.as_str());

        let timestamp_begin = self.no_timestamps_token + 1;
        let mut seek = 0;
        let mut segments: Vec<RawSegment> = vec![];
        let mut prompt: Vec<u32> = vec![];

        while seek < content_frames {
            let window_seek = seek;
            let time_offset = (seek * HOP_LENGTH) as f64 / SAMPLE_RATE as f64;
            let segment_size = usize::min(content_frames - seek, N_FRAMES);
            let mel_segment = mel.narrow(2, seek, segment_size)?;
            let segment_duration = (segment_size * HOP_LENGTH) as f64 / SAMPLE_RATE as f64;
            let window_prompt: &[u32] = if options.condition_on_previous_text {
                &prompt
            } else {
                &[]
            };
            let dr = self.decode_with_fallback(&mel_segment, language_token, window_prompt, options)?;
            seek += segment_size;
            if dr.no_speech_prob > options.no_speech_threshold
                && dr.avg_logprob < LOGPROB_THRESHOLD
            {
                debug!("no speech detected, skipping {seek} {dr:?}");
                continue;
            }

            let generated: Vec<(u32, f64)> = dr
                .tokens
                .iter()
                .copied()
                .zip(dr.probs.iter().copied())
                .collect();
            for span in split_on_timestamps(&generated, timestamp_begin) {
                let ids: Vec<u32> = span.tokens.iter().map(|(id, _)| *id).collect();
                let text = self.tokenizer.decode(&ids, true).map_err(anyhow::Error::msg)?;
                if text.trim().is_empty() {
                    continue;
                }
                // Keeps segment starts monotonic even when the model emits an earlier timestamp.
                let previous_start = segments.last().map_or(0.0, |s| s.start);
                let start = (time_offset + span.start.min(segment_duration)).max(previous_start);
                let end = time_offset + span.end.unwrap_or(segment_duration).min(segment_duration);
                let end = end.max(start);
                let avg_logprob = span.tokens.iter().map(|(_, p)| p.ln()).sum::<f64>()
                    / span.tokens.len() as f64;

                if let Some(threshold) = options.hallucination_silence_threshold {
                    let previous_end = segments.last().map_or(0.0, |s| s.end);
                    if start - previous_end > threshold && avg_logprob < LOGPROB_THRESHOLD {
                        debug!(start, end, text = %text, "dropping likely hallucination");
                        continue;
                    }
                }

                let words = if options.word_timestamps {
                    let tokenizer = &self.tokenizer;
                    Some(word_timings(
                        &span.tokens,
                        start,
                        end,
                        split_on_spaces,
                        |ids| tokenizer.decode(ids, true).map_err(anyhow::Error::msg),
                    )?)
                } else {
                    None
                };

                segments.push(RawSegment {
                    id: segments.len(),
                    seek: window_seek,
                    start,
                    end,
                    text,
                    tokens: ids,
                    temperature: dr.temperature,
                    avg_logprob,
                    compression_ratio: dr.compression_ratio,
                    no_speech_prob: dr.no_speech_prob,
                    words,
                });
            }

            if dr.temperature > 0.5 {
                prompt.clear();
            } else {
                prompt.extend(dr.tokens.iter().filter(|t| **t < self.eot_token));
                let overflow = prompt.len().saturating_sub(MAX_PROMPT_TOKENS);
                prompt.drain(..overflow);
            }
        }

        let text = segments.iter().map(|s| s.text.as_str()).collect::<String>();
        Ok(RawTranscription {
            text,
            language: Some(language),
            segments,
        })
    }

    fn resolve_language(
        &mut self,
        mel: &Tensor,
        requested: Option<&str>,
    ) -> Result<(String, Option<u32>)> {
        if self.language_tokens.is_empty() {
            return match requested {
                None | Some("en") => Ok(("en".to_string(), None)),
                Some(language) => Err(anyhow!(
                    "language {language} is not supported by this English only model"
                )),
            };
        }
        match requested {
            Some(language) => {
                let token = self
                    .language_tokens
                    .iter()
                    .find(|(code, _)| *code == language)
                    .map(|(_, id)| *id)
                    .ok_or_else(|| anyhow!("language {language} is not supported"))?;
                Ok((language.to_string(), Some(token)))
            }
            None => {
                let (language, token) = self.detect_language(mel)?;
                Ok((language.to_string(), Some(token)))
            }
        }
    }

    // Adapted from https://github.com/huggingface/candle/blob/main/candle-examples/examples/whisper/multilingual.rs
    fn detect_language(&mut self, mel: &Tensor) -> Result<(&'static str, u32)> {
        let (_, _, seq_len) = mel.dims3()?;
        let mel = mel.narrow(2, 0, usize::min(seq_len, N_FRAMES))?;
        let device = mel.device();

        let language_token_ids: Vec<u32> = self.language_tokens.iter().map(|(_, id)| *id).collect();
        let language_token_ids = Tensor::new(language_token_ids.as_slice(), device)?;
        let audio_features = self.model.encoder.forward(&mel, true)?;
        let tokens = Tensor::new(&[[self.sot_token]], device)?;
        let ys = self.model.decoder.forward(&tokens, &audio_features, true)?;
        let logits = self.model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
        let logits = logits.index_select(&language_token_ids, 0)?;
        let probs: Vec<f32> = softmax(&logits, D::Minus1)?.to_vec1()?;

        let (best, probability) = probs
            .iter()
            .enumerate()
            .max_by(|(_, u), (_, v)| u.total_cmp(v))
            .ok_or_else(|| anyhow!("No language probabilities computed"))?;
        let (code, token) = self.language_tokens[best];
        debug!(language = code, probability, "detected language");
        Ok((code, token))
    }

    fn decode_with_fallback(
        &mut self,
        segment: &Tensor,
        language_token: Option<u32>,
        prompt: &[u32],
        options: &TranscribeOptions,
    ) -> Result<DecodingResult> {
        // The encoder output only depends on the window, every candidate reuses it.
        let audio_features = self.model.encoder.forward(segment, true)?;
        debug!("audio features: {:?}", audio_features.dims());
        for (i, &t) in TEMPERATURES.iter().enumerate() {
            let dr = self.decode_best_of(&audio_features, t, language_token, prompt, options.best_of);
            if i == TEMPERATURES.len() - 1 {
                return dr;
            }
            // On errors, we try again with a different temperature.
            match dr {
                Ok(dr) => {
                    debug!(temperature = t, text = %dr.text, "decoded window");
                    let needs_fallback = dr.compression_ratio > COMPRESSION_RATIO_THRESHOLD
                        || dr.avg_logprob < LOGPROB_THRESHOLD;
                    if !needs_fallback || dr.no_speech_prob > options.no_speech_threshold {
                        return Ok(dr);
                    }
                }
                Err(err) => {
                    error!("Error running at {t}: {err}");
                }
            }
        }
        Err(anyhow!("No decoding temperatures configured"))
    }

    fn decode_best_of(
        &mut self,
        audio_features: &Tensor,
        t: f64,
        language_token: Option<u32>,
        prompt: &[u32],
        best_of: usize,
    ) -> Result<DecodingResult> {
        // Greedy decoding is deterministic, a single candidate is enough.
        let candidates = if t > 0f64 { best_of.max(1) } else { 1 };
        let mut best: Option<DecodingResult> = None;
        for _ in 0..candidates {
            let dr = self.decode(audio_features, t, language_token, prompt)?;
            if best
                .as_ref()
                .map_or(true, |current| dr.avg_logprob > current.avg_logprob)
            {
                best = Some(dr);
            }
        }
        best.ok_or_else(|| anyhow!("No decoding candidate produced"))
    }

    fn decode(
        &mut self,
        audio_features: &Tensor,
        t: f64,
        language_token: Option<u32>,
        prompt: &[u32],
    ) -> Result<DecodingResult> {
        let model = &mut self.model;

        let sample_len = model.config.max_target_positions / 2;
        let mut sum_logprob = 0f64;
        let mut no_speech_prob = f64::NAN;
        let mut tokens = vec![];
        match self.sot_prev_token {
            Some(sot_prev_token) if !prompt.is_empty() => {
                tokens.push(sot_prev_token);
                tokens.extend_from_slice(prompt);
            }
            _ => {}
        }
        let sot_index = tokens.len();
        tokens.push(self.sot_token);
        if let Some(language_token) = language_token {
            tokens.push(language_token);
        }
        tokens.push(self.transcribe_token);
        let prefix_len = tokens.len();
        let mut probs = vec![];

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), audio_features.device())?;

            // The model expects a batch dim but this inference loop does not handle
            // it so we add it at this point.
            let tokens_t = tokens_t.unsqueeze(0)?;
            let ys = model.decoder.forward(&tokens_t, audio_features, i == 0)?;

            // Extract the no speech probability on the first iteration by looking at the
            // logits of the start of transcript position.
            if i == 0 {
                let logits = model
                    .decoder
                    .final_linear(&ys.i((..1, sot_index..sot_index + 1))?)?
                    .i(0)?
                    .i(0)?;
                no_speech_prob = f64::from(
                    softmax(&logits, 0)?
                        .i(self.no_speech_token as usize)?
                        .to_scalar::<f32>()?,
                );
            }

            let (_, seq_len, _) = ys.dims3()?;
            let logits = model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let logits = logits.broadcast_add(&self.suppress_tokens)?;
            let next_token = if t > 0f64 {
                let prs = softmax(&(&logits / t)?, 0)?;
                let logits_v: Vec<f32> = prs.to_vec1()?;
                let distr = rand::distributions::WeightedIndex::new(&logits_v)?;
                u32::try_from(distr.sample(&mut self.seed))?
            } else {
                let logits_v: Vec<f32> = logits.to_vec1()?;
                logits_v
                    .iter()
                    .enumerate()
                    .max_by(|(_, u), (_, v)| u.total_cmp(v))
                    .map(|(i, _)| i as u32)
                    .ok_or_else(|| anyhow!("Empty logits"))?
            };
            let prob = f64::from(
                softmax(&logits, D::Minus1)?
                    .i(next_token as usize)?
                    .to_scalar::<f32>()?,
            );
            if next_token == self.eot_token {
                break;
            }
            tokens.push(next_token);
            probs.push(prob);
            sum_logprob += prob.ln();
            if tokens.len() > model.config.max_target_positions {
                break;
            }
        }
        let generated = tokens.split_off(prefix_len);
        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(anyhow::Error::msg)?;
        let avg_logprob = sum_logprob / generated.len().max(1) as f64;

        Ok(DecodingResult {
            tokens: generated,
            probs,
            text,
            avg_logprob,
            no_speech_prob,
            temperature: t,
            compression_ratio: f64::NAN,
        })
    }

    fn load_mel(&self, pcm_data: &[f32]) -> Result<Tensor> {
        let mel = audio::pcm_to_mel(&self.config, pcm_data, &self.mel_filters);
        let mel_len = mel.len();
        let mel = Tensor::from_vec(
            mel,
            (
                1,
                self.config.num_mel_bins,
                mel_len / self.config.num_mel_bins,
            ),
            &Device::Cpu,
        )?;
        debug!("loaded mel: {:?}", mel.dims());
        Ok(mel)
    }
}

#[derive(Debug, Clone)]
struct DecodingResult {
    tokens: Vec<u32>,
    probs: Vec<f64>,
    text: String,
    avg_logprob: f64,
    no_speech_prob: f64,
    temperature: f64,
    compression_ratio: f64,
}

/// Text tokens between two timestamp tokens, times relative to the window.
#[derive(Debug, PartialEq)]
struct TokenSpan {
    start: f64,
    end: Option<f64>,
    tokens: Vec<(u32, f64)>,
}

fn split_on_timestamps(tokens: &[(u32, f64)], timestamp_begin: u32) -> Vec<TokenSpan> {
    let mut spans = vec![];
    let mut start = 0f64;
    let mut pending = vec![];
    for &(token, prob) in tokens {
        if token >= timestamp_begin {
            let time = f64::from(token - timestamp_begin) * TIMESTAMP_RESOLUTION;
            if !pending.is_empty() {
                spans.push(TokenSpan {
                    start,
                    end: Some(time),
                    tokens: std::mem::take(&mut pending),
                });
            }
            start = time;
        } else {
            pending.push((token, prob));
        }
    }
    if !pending.is_empty() {
        spans.push(TokenSpan {
            start,
            end: None,
            tokens: pending,
        });
    }
    spans
}

/// Groups tokens so that every group decodes to whole characters.
///
/// Byte level BPE splits multi-byte characters across tokens, a group grows
/// until its text carries no replacement character that is absent from the
/// decoding of all tokens.
fn split_on_unicode<F>(tokens: &[(u32, f64)], decode: &F) -> Result<Vec<(String, Vec<(u32, f64)>)>>
where
    F: Fn(&[u32]) -> Result<String>,
{
    let all_ids: Vec<u32> = tokens.iter().map(|(id, _)| *id).collect();
    let full: Vec<char> = decode(&all_ids)?.chars().collect();

    let mut pieces = vec![];
    let mut current: Vec<(u32, f64)> = vec![];
    let mut offset = 0;
    for &token in tokens {
        current.push(token);
        let ids: Vec<u32> = current.iter().map(|(id, _)| *id).collect();
        let text = decode(&ids)?;
        let complete = match text.chars().position(|c| c == char::REPLACEMENT_CHARACTER) {
            None => true,
            Some(index) => full.get(offset + index) == Some(&char::REPLACEMENT_CHARACTER),
        };
        if complete {
            offset += text.chars().count();
            pieces.push((text, std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        let ids: Vec<u32> = current.iter().map(|(id, _)| *id).collect();
        pieces.push((decode(&ids)?, current));
    }
    Ok(pieces)
}

/// A piece starting with a space opens a new word, anything else (punctuation,
/// word pieces) is glued to the current one.
fn merge_on_spaces(pieces: Vec<(String, Vec<(u32, f64)>)>) -> Vec<(String, Vec<(u32, f64)>)> {
    let mut words: Vec<(String, Vec<(u32, f64)>)> = vec![];
    for (text, tokens) in pieces {
        if let (Some((word, word_tokens)), false) = (words.last_mut(), text.starts_with(' ')) {
            word.push_str(&text);
            word_tokens.extend(tokens);
            continue;
        }
        words.push((text, tokens));
    }
    words
}

/// Words of a segment with their timings spread evenly over the segment's tokens.
///
/// Confidence is the mean probability of the word's tokens.
fn word_timings<F>(
    tokens: &[(u32, f64)],
    start: f64,
    end: f64,
    split_on_spaces: bool,
    decode: F,
) -> Result<Vec<RawWord>>
where
    F: Fn(&[u32]) -> Result<String>,
{
    if tokens.is_empty() {
        return Ok(vec![]);
    }
    let pieces = split_on_unicode(tokens, &decode)?;
    let groups = if split_on_spaces {
        merge_on_spaces(pieces)
    } else {
        pieces
    };

    let step = (end - start) / tokens.len() as f64;
    let mut consumed = 0;
    let mut words = Vec::with_capacity(groups.len());
    for (text, group) in groups {
        let first = consumed;
        consumed += group.len();
        if text.is_empty() {
            continue;
        }
        let probability = group.iter().map(|(_, p)| p).sum::<f64>() / group.len() as f64;
        words.push(RawWord {
            word: text,
            start: start + step * first as f64,
            end: (start + step * consumed as f64).min(end),
            probability: Some(probability),
        });
    }
    Ok(words)
}

pub fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    match tokenizer.token_to_id(token) {
        None => Err(anyhow!("no token-id for {token}")),
        Some(id) => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: u32 = 50364;

    #[test]
    fn timestamps_delimit_spans() {
        let tokens = vec![
            (TS, 0.9),
            (10, 0.8),
            (11, 0.7),
            (TS + 50, 0.9),
            (TS + 50, 0.9),
            (12, 0.6),
            (TS + 120, 0.9),
        ];
        let spans = split_on_timestamps(&tokens, TS);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].start, 0.0);
        assert_eq!(spans[0].end, Some(1.0));
        assert_eq!(spans[0].tokens, vec![(10, 0.8), (11, 0.7)]);
        assert_eq!(spans[1].start, 1.0);
        assert!((spans[1].end.unwrap() - 2.4).abs() < 1e-9);
        assert_eq!(spans[1].tokens, vec![(12, 0.6)]);
    }

    #[test]
    fn trailing_tokens_form_an_open_span() {
        let spans = split_on_timestamps(&[(TS + 25, 0.9), (7, 0.5)], TS);
        assert_eq!(
            spans,
            vec![TokenSpan {
                start: 0.5,
                end: None,
                tokens: vec![(7, 0.5)],
            }]
        );
    }

    #[test]
    fn text_without_timestamps_is_one_span() {
        let spans = split_on_timestamps(&[(1, 0.5), (2, 0.5)], TS);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0.0);
        assert_eq!(spans[0].end, None);
    }

    // Byte level vocabulary where " 日本" and "語" are split mid-character.
    const BYTE_LEVEL_TOKENIZER: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": {"type": "ByteLevel", "add_prefix_space": false, "trim_offsets": true, "use_regex": true},
  "post_processor": null,
  "decoder": {"type": "ByteLevel", "add_prefix_space": true, "trim_offsets": true, "use_regex": true},
  "model": {
    "type": "BPE",
    "dropout": null,
    "unk_token": null,
    "continuing_subword_prefix": null,
    "end_of_word_suffix": null,
    "fuse_unk": false,
    "byte_fallback": false,
    "ignore_merges": false,
    "vocab": {"ĠæĹ": 0, "¥æľ": 1, "¬": 2, "èª": 3, "ŀ": 4, "ĠHello": 5, "Ġworld": 6, "!": 7},
    "merges": []
  }
}"#;

    fn byte_level_words(ids: &[u32], split_on_spaces: bool) -> Vec<RawWord> {
        let tokenizer = Tokenizer::from_bytes(BYTE_LEVEL_TOKENIZER).unwrap();
        let tokens: Vec<(u32, f64)> = ids.iter().map(|id| (*id, 0.5)).collect();
        word_timings(
            &tokens,
            0.0,
            ids.len() as f64,
            split_on_spaces,
            |ids| tokenizer.decode(ids, true).map_err(anyhow::Error::msg),
        )
        .unwrap()
    }

    #[test]
    fn multi_byte_characters_survive_token_splits() {
        let words = byte_level_words(&[0, 1, 2, 3, 4], false);
        let texts: Vec<&str> = words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(texts, vec![" 日本", "語"]);
        assert!(words
            .iter()
            .all(|w| !w.word.contains(char::REPLACEMENT_CHARACTER)));

        assert_eq!((words[0].start, words[0].end), (0.0, 3.0));
        assert_eq!((words[1].start, words[1].end), (3.0, 5.0));
    }

    #[test]
    fn spaced_languages_glue_pieces_to_the_previous_word() {
        let words = byte_level_words(&[0, 1, 2, 3, 4], true);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, " 日本語");

        let words = byte_level_words(&[5, 6, 7], true);
        let texts: Vec<&str> = words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(texts, vec![" Hello", " world!"]);
    }

    #[test]
    fn words_cover_the_segment_with_mean_confidence() {
        let decode = |ids: &[u32]| -> Result<String> {
            Ok(ids
                .iter()
                .map(|id| match *id {
                    1 => " Hel",
                    2 => "lo",
                    3 => " world",
                    _ => "!",
                })
                .collect())
        };
        let tokens = vec![(1, 0.5), (2, 1.0), (3, 0.8), (4, 0.6)];
        let words = word_timings(&tokens, 2.0, 4.0, true, decode).unwrap();
        assert_eq!(words.len(), 2);

        assert_eq!(words[0].word, " Hello");
        assert_eq!(words[0].start, 2.0);
        assert_eq!(words[0].end, 3.0);
        assert!((words[0].probability.unwrap() - 0.75).abs() < 1e-9);

        assert_eq!(words[1].word, " world!");
        assert_eq!(words[1].start, 3.0);
        assert_eq!(words[1].end, 4.0);
        assert!((words[1].probability.unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn words_from_nothing_is_empty() {
        let words = word_timings(&[], 0.0, 1.0, true, |_| Ok(String::new())).unwrap();
        assert!(words.is_empty());
    }
}
