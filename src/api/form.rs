use std::collections::BTreeMap;
use std::path::Path;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::error::TranscribeError;
use crate::inference::engine::TranscribeOptions;
use crate::inference::language::normalize_language;

pub(crate) const ALLOWED_EXTENSIONS: [&str; 5] = ["mp3", "wav", "m4a", "flac", "mov"];

const MAX_BEST_OF: usize = 50;

/// An uploaded file as it came off the wire.
#[derive(Debug)]
pub(crate) struct Upload {
    pub(crate) file_name: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) bytes: Bytes,
}

/// Multipart fields before any validation happened.
#[derive(Debug, Default)]
pub(crate) struct RawForm {
    pub(crate) file: Option<Upload>,
    pub(crate) fields: BTreeMap<String, String>,
}

#[derive(Debug)]
pub(crate) struct TranscriptionRequest {
    pub(crate) file_name: String,
    pub(crate) extension: String,
    pub(crate) bytes: Bytes,
    pub(crate) options: TranscribeOptions,
}

pub(crate) fn allowed_formats() -> String {
    ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn too_large(max_upload_bytes: usize) -> TranscribeError {
    TranscribeError::InvalidInput(format!(
        "File too large (max {}MB)",
        max_upload_bytes / (1024 * 1024)
    ))
}

fn multipart_error(err: &MultipartError, max_upload_bytes: usize) -> TranscribeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_upload_bytes)
    } else {
        TranscribeError::InvalidInput(format!("Malformed multipart body: {}", err.body_text()))
    }
}

pub(crate) async fn read_form(
    multipart: &mut Multipart,
    max_upload_bytes: usize,
) -> Result<RawForm, TranscribeError> {
    let mut form = RawForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(&err, max_upload_bytes))?
    {
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };
        if name == "file" {
            if form.file.is_some() {
                return Err(TranscribeError::InvalidInput(
                    "Duplicate file field in multipart form".into(),
                ));
            }
            let file_name = field.file_name().map(ToString::to_string);
            let content_type = field.content_type().map(ToString::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| multipart_error(&err, max_upload_bytes))?;
            if bytes.len() > max_upload_bytes {
                return Err(too_large(max_upload_bytes));
            }
            form.file = Some(Upload {
                file_name,
                content_type,
                bytes,
            });
        } else {
            if form.fields.contains_key(&name) {
                return Err(TranscribeError::InvalidInput(format!(
                    "Duplicate field {name} in multipart form"
                )));
            }
            let value = field
                .text()
                .await
                .map_err(|err| multipart_error(&err, max_upload_bytes))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, TranscribeError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(TranscribeError::InvalidInput(format!(
            "Field {name} must be a boolean, got {value:?}"
        ))),
    }
}

fn parse_unit_interval(name: &str, value: &str) -> Result<f64, TranscribeError> {
    match value.trim().parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(TranscribeError::InvalidInput(format!(
            "Field {name} must be a number between 0 and 1, got {value:?}"
        ))),
    }
}

impl RawForm {
    /// Checks the upload first, then its format, then the options.
    pub(crate) fn validate(mut self) -> Result<TranscriptionRequest, TranscribeError> {
        let upload = match self.file.take() {
            Some(upload) if !upload.bytes.is_empty() => upload,
            Some(_) => {
                return Err(TranscribeError::InvalidInput(
                    "Uploaded file is empty".into(),
                ))
            }
            None => {
                return Err(TranscribeError::InvalidInput(
                    "Missing field file in multipart form".into(),
                ))
            }
        };

        let file_name = upload.file_name.unwrap_or_default();
        let extension = Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(TranscribeError::UnsupportedFormat {
                extension,
                allowed: allowed_formats(),
            });
        }
        tracing::debug!(content_type = ?upload.content_type, "accepted upload format");

        let options = self.options()?;
        Ok(TranscriptionRequest {
            file_name,
            extension,
            bytes: upload.bytes,
            options,
        })
    }

    fn options(self) -> Result<TranscribeOptions, TranscribeError> {
        let mut fields = self.fields;
        let mut options = TranscribeOptions::default();

        if let Some(language) = fields.remove("language") {
            let language = language.trim();
            if !language.is_empty() {
                let code = normalize_language(language).ok_or_else(|| {
                    TranscribeError::InvalidInput(format!("Unknown language {language:?}"))
                })?;
                options.language = Some(code.to_string());
            }
        }
        if let Some(value) = fields.remove("word_timestamps") {
            options.word_timestamps = parse_bool("word_timestamps", &value)?;
        }
        if let Some(value) = fields.remove("fp16") {
            options.fp16 = parse_bool("fp16", &value)?;
        }
        if let Some(value) = fields.remove("condition_on_previous_text") {
            options.condition_on_previous_text =
                parse_bool("condition_on_previous_text", &value)?;
        }
        if let Some(value) = fields.remove("best_of") {
            options.best_of = match value.trim().parse::<usize>() {
                Ok(n) if (1..=MAX_BEST_OF).contains(&n) => n,
                _ => {
                    return Err(TranscribeError::InvalidInput(format!(
                        "Field best_of must be an integer between 1 and {MAX_BEST_OF}, got {value:?}"
                    )))
                }
            };
        }
        if let Some(value) = fields.remove("no_speech_threshold") {
            options.no_speech_threshold = parse_unit_interval("no_speech_threshold", &value)?;
        }
        if let Some(value) = fields.remove("hallucination_silence_threshold") {
            if !value.trim().is_empty() {
                options.hallucination_silence_threshold = match value.trim().parse::<f64>() {
                    Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
                    _ => {
                        return Err(TranscribeError::InvalidInput(format!(
                            "Field hallucination_silence_threshold must be a non-negative number, got {value:?}"
                        )))
                    }
                };
            }
        }

        options.extra = fields;
        Ok(options)
    }
}
