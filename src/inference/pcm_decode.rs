use std::borrow::Cow;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::{debug, warn};

#[allow(clippy::cast_precision_loss)]
fn downmix<T>(samples: &mut Vec<f32>, data: &Cow<AudioBuffer<T>>)
where
    T: Sample,
    f32: FromSample<T>,
{
    let channels = data.spec().channels.count().max(1);
    samples.reserve(data.frames());
    for frame in 0..data.frames() {
        let sum: f32 = (0..channels)
            .map(|channel| f32::from_sample(data.chan(channel)[frame]))
            .sum();
        samples.push(sum / channels as f32);
    }
}

fn push_buffer(samples: &mut Vec<f32>, buffer: &AudioBufferRef<'_>) {
    match buffer {
        AudioBufferRef::F32(data) => downmix(samples, data),
        AudioBufferRef::F64(data) => downmix(samples, data),
        AudioBufferRef::U8(data) => downmix(samples, data),
        AudioBufferRef::U16(data) => downmix(samples, data),
        AudioBufferRef::U24(data) => downmix(samples, data),
        AudioBufferRef::U32(data) => downmix(samples, data),
        AudioBufferRef::S8(data) => downmix(samples, data),
        AudioBufferRef::S16(data) => downmix(samples, data),
        AudioBufferRef::S24(data) => downmix(samples, data),
        AudioBufferRef::S32(data) => downmix(samples, data),
    }
}

// Adapted from https://github.com/huggingface/candle/blob/main/candle-examples/src/audio.rs
/// Decodes the first audio track of a file into mono samples and its sample rate.
pub(crate) fn pcm_decode(path: &Path) -> Result<(Vec<f32>, u32)> {
    let src = File::open(path).context("Failed to open audio file")?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized audio container")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No supported audio track found"))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported audio codec")?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut pcm_data = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        };

        while !format.metadata().is_latest() {
            format.metadata().pop();
        }

        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(buffer) => {
                if sample_rate.is_none() {
                    sample_rate = Some(buffer.spec().rate);
                }
                push_buffer(&mut pcm_data, &buffer);
            }
            Err(SymphoniaError::DecodeError(err)) => {
                warn!(error = err, "skipping undecodable packet");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| anyhow!("Unknown sample rate"))?;
    debug!(samples = pcm_data.len(), sample_rate, "decoded audio");
    Ok((pcm_data, sample_rate))
}

/// Linear interpolation resampler, good enough for speech at the model's 16 kHz.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let step = f64::from(from_rate) / f64::from(to_rate);
    let out_len = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = (position.floor() as usize).min(last);
            let frac = (position - index as f64) as f32;
            let current = samples[index];
            let next = samples[(index + 1).min(last)];
            current + (next - current) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_keeps_matching_rates() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn resample_scales_length_and_keeps_level() {
        let samples = vec![0.5f32; 48_000];
        let out = resample(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 16_000);
        assert!(out.iter().all(|s| (s - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn resample_interpolates_between_samples() {
        let out = resample(&[0.0, 1.0], 8_000, 16_000);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn decode_reports_garbage_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();
        assert!(pcm_decode(&path).is_err());
    }
}
