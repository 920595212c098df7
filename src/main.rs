use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use clap_serde_derive::ClapSerde;
use hf_hub::api::sync::Api;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::AppState;
use crate::config::Config;
use crate::inference::models::model::ModelBase;
use crate::inference::models::whisper::{WhisperFiles, WhisperModel};
use crate::telemetry::init_telemetry;

mod api;
mod config;
mod error;
mod inference;
mod scratch;
mod telemetry;
mod transcript;

#[macro_export]
macro_rules! exit_err {
    ($code:expr, $fmt:expr $(, $arg:expr)*) => {
        {
            error!($fmt $(, $arg)*);
            std::process::exit($code);
        }
    };
}

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const DEFAULT_CONFIG_FILE: &str = "Transcriber.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_result = Config::from_toml(&args.config_file);
    let config_missing = config_result.is_err();
    let config = match config_result {
        Ok(conf) => conf.merge(args.opt_config),
        Err(_) if args.config_file == DEFAULT_CONFIG_FILE => {
            Config::default().merge(args.opt_config)
        }
        Err(err) => {
            // The subscriber is not installed yet.
            eprintln!(
                "Failed to read configuration file {} with error: {}",
                args.config_file, err
            );
            std::process::exit(1);
        }
    };

    init_telemetry(&config.otel_endpoint, config.console)?;
    if config_missing {
        info!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
    }
    info!(
        "Supported features: avx: {}, neon: {}, simd128: {}, f16c: {}",
        candle_core::utils::with_avx(),
        candle_core::utils::with_neon(),
        candle_core::utils::with_simd128(),
        candle_core::utils::with_f16c()
    );

    let model = match load_whisper(&config) {
        Ok(model) => model,
        Err(err) => exit_err!(1, "Failed to load the Whisper model: {:#}", err),
    };

    if let Some(dir) = &config.scratch_dir {
        if let Err(err) = std::fs::create_dir_all(dir) {
            exit_err!(
                1,
                "Failed to create scratch directory {}: {}",
                dir.display(),
                err
            );
        }
    }

    let state = AppState {
        engine: Arc::new(model),
        scratch_dir: config.scratch_dir.clone(),
        max_upload_bytes: config.max_upload_bytes(),
        upload_timeout: Duration::from_secs(config.upload_timeout_secs),
    };

    let listener = TcpListener::bind(format!("{}:{}", config.address, config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn load_whisper(config: &Config) -> Result<WhisperModel> {
    let api = Api::new()?;
    let base = ModelBase {
        name: "Candle Whisper".into(),
        repo_id: config.model_repo.clone(),
        repo_revision: config.model_revision.clone(),
    };
    let files = WhisperFiles {
        config: config.model_config_file.clone(),
        tokenizer: config.model_tokenizer_file.clone(),
        weights: config.model_weights_file.clone(),
        mel_filters: config.model_mel_filters_file.clone(),
    };
    WhisperModel::new(&api, base, &files)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
