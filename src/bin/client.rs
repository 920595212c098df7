use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use reqwest::blocking::multipart::Form;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::transcript::TranscriptionResult;

#[path = "../export.rs"]
mod export;
#[path = "../transcript.rs"]
mod transcript;

const ALLOWED_EXTENSIONS: [&str; 5] = ["mp3", "wav", "m4a", "flac", "mov"];

/// Uploads an audio or video file to the transcription API and saves the
/// transcript next to it as plain text, SubRip subtitles and JSON.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The file to transcribe
    file: PathBuf,

    /// Base URL of the transcription API
    #[arg(short, long, env = "TRANSCRIBE_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Language code or name, detected by the server when omitted
    #[arg(short, long)]
    language: Option<String>,

    /// Ask for per word timings
    #[arg(short, long)]
    word_timestamps: bool,

    /// Disable half precision decoding
    #[arg(long)]
    no_fp16: bool,

    #[arg(long)]
    best_of: Option<usize>,

    #[arg(long)]
    no_speech_threshold: Option<f64>,

    #[arg(long)]
    hallucination_silence_threshold: Option<f64>,

    /// Decode every window without the previous text as prompt
    #[arg(long)]
    no_condition_on_previous_text: bool,

    /// Extra engine parameter as key=value, may be repeated
    #[arg(short = 'P', long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Directory the exports are written to, defaults to the directory of the input file
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Seconds to wait for the server to answer
    #[arg(long, default_value = "1000")]
    timeout_secs: u64,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

impl Args {
    fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("word_timestamps".to_string(), self.word_timestamps.to_string()),
            ("fp16".to_string(), (!self.no_fp16).to_string()),
            (
                "condition_on_previous_text".to_string(),
                (!self.no_condition_on_previous_text).to_string(),
            ),
        ];
        if let Some(language) = &self.language {
            fields.push(("language".into(), language.clone()));
        }
        if let Some(best_of) = self.best_of {
            fields.push(("best_of".into(), best_of.to_string()));
        }
        if let Some(threshold) = self.no_speech_threshold {
            fields.push(("no_speech_threshold".into(), threshold.to_string()));
        }
        if let Some(threshold) = self.hallucination_silence_threshold {
            fields.push(("hallucination_silence_threshold".into(), threshold.to_string()));
        }
        fields.extend(self.params.iter().cloned());
        fields
    }
}

fn check_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("File {} does not exist", path.display());
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Unsupported file format .{}. Allowed formats: {}",
            extension,
            ALLOWED_EXTENSIONS.map(|ext| format!(".{ext}")).join(", ")
        );
    }
    Ok(())
}

fn endpoint(api_url: &str) -> String {
    format!("{}/transcribe/", api_url.trim_end_matches('/'))
}

/// Server errors carry their message in `detail`, anything else is shown as is.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn transcribe(args: &Args) -> Result<(TranscriptionResult, Value)> {
    let client = Client::builder()
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    let mut form = Form::new()
        .file("file", &args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    for (name, value) in args.form_fields() {
        form = form.text(name, value);
    }

    let response = client
        .post(endpoint(&args.api_url))
        .multipart(form)
        .send()
        .with_context(|| format!("Failed to reach {}", args.api_url))?;
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        bail!("{}", error_detail(&body));
    }

    let raw: Value = serde_json::from_str(&body).context("Server answered with invalid JSON")?;
    let result = serde_json::from_value(raw.clone())
        .context("Server answered with an unexpected transcript layout")?;
    Ok((result, raw))
}

fn run(args: &Args) -> Result<()> {
    check_file(&args.file)?;
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    println!("Transcribing {file_name}... this may take a while");

    let (result, raw) = transcribe(args)?;

    println!("Language: {}", result.language);
    println!("Segments: {}", result.segments.len());
    println!();
    println!("{}", result.text);

    let stem = args
        .file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".into());
    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => args
            .file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    println!();
    for (name, contents) in export::artifacts(&stem, &result, &raw)? {
        let path = output_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
