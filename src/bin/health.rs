use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use reqwest::Url;
use serde_json::Value;

/// Exits non-zero unless the transcription API answers on its root route.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the transcription API
    #[arg(env = "TRANSCRIBE_API_URL", default_value = "http://localhost:8000")]
    url: Url,

    /// Seconds to wait for an answer
    #[arg(short, long, default_value = "5")]
    timeout_secs: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;
    let response = client.get(args.url).send()?;
    if !response.status().is_success() {
        bail!("Request failed with status {}", response.status());
    }

    let body: Value = response.json()?;
    match body.get("message").and_then(Value::as_str) {
        Some(message) => println!("{message}"),
        None => bail!("Unexpected health response {body}"),
    }
    Ok(())
}
