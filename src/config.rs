use std::path::PathBuf;

use anyhow::Result;
use clap_serde_derive::ClapSerde;
use serde::Deserialize;

#[derive(ClapSerde, Deserialize, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub(crate) address: String,

    /// The port the listener binds to
    #[arg(short, long, env, default_value = "8000")]
    pub(crate) port: u16,

    /// Largest accepted upload in MiB
    #[arg(long, env, default_value = "100")]
    pub(crate) max_upload_mb: usize,

    /// Seconds a client gets to finish sending the multipart body
    #[arg(long, env, default_value = "300")]
    pub(crate) upload_timeout_secs: u64,

    /// Directory for the per request scratch files, defaults to the system temp directory
    #[arg(long, env)]
    pub(crate) scratch_dir: Option<PathBuf>,

    /// Hugging Face repository holding the Whisper weights
    #[arg(long, env, default_value = "lmz/candle-whisper")]
    pub(crate) model_repo: String,

    /// Revision of the model repository
    #[arg(long, env, default_value = "main")]
    pub(crate) model_revision: String,

    #[arg(long, env, default_value = "config-tiny.json")]
    pub(crate) model_config_file: String,

    #[arg(long, env, default_value = "tokenizer-tiny.json")]
    pub(crate) model_tokenizer_file: String,

    #[arg(long, env, default_value = "model-tiny-q4k.gguf")]
    pub(crate) model_weights_file: String,

    #[arg(long, env, default_value = "melfilters.bytes")]
    pub(crate) model_mel_filters_file: String,

    /// OTLP collector endpoint, telemetry export is disabled when unset
    #[arg(long, env)]
    pub(crate) otel_endpoint: Option<String>,

    /// Keep logging to the console while exporting telemetry
    #[arg(long, env, default_value = "false")]
    pub(crate) console: bool,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&str)?;
        Ok(config)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
