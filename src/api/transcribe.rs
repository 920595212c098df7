use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, info};

use crate::api::form::read_form;
use crate::api::shape::shape_result;
use crate::api::AppState;
use crate::error::{ServerResult, TranscribeError};
use crate::inference::engine::RawTranscription;
use crate::scratch::ScratchFile;
use crate::transcript::TranscriptionResult;

#[axum_macros::debug_handler]
#[tracing::instrument(level = "info", skip_all)]
pub(crate) async fn handle_transcribe_request(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<(StatusCode, Json<TranscriptionResult>)> {
    let mut multipart =
        multipart.map_err(|rejection| TranscribeError::InvalidInput(rejection.body_text()))?;

    let form = tokio::time::timeout(
        state.upload_timeout,
        read_form(&mut multipart, state.max_upload_bytes),
    )
    .await
    .map_err(|_| {
        TranscribeError::InvalidInput(format!(
            "Upload not completed within {:?}",
            state.upload_timeout
        ))
    })??;
    let request = form.validate()?;

    info!(
        file_name = %request.file_name,
        size = request.bytes.len(),
        language = request.options.language.as_deref().unwrap_or("auto"),
        word_timestamps = request.options.word_timestamps,
        "received transcribe request"
    );

    let options = request.options.clone();
    let engine = state.engine.clone();
    let scratch_dir = state.scratch_dir.clone();
    // The scratch file lives inside the worker so it is removed once the engine
    // returns, even when the client is long gone.
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<RawTranscription> {
        let scratch =
            ScratchFile::create(scratch_dir.as_deref(), &request.extension, &request.bytes)?;
        let outcome = engine.transcribe(scratch.path(), &request.options);
        scratch.release();
        outcome
    })
    .await;

    let raw = match outcome {
        Ok(Ok(raw)) => raw,
        Ok(Err(err)) => {
            error!(error = %err, "transcription failed");
            return Err(TranscribeError::TranscriptionFailed(format!("{err:#}")).into());
        }
        Err(err) => {
            error!(error = %err, "transcription worker crashed");
            return Err(TranscribeError::TranscriptionFailed(format!(
                "transcription worker crashed: {err}"
            ))
            .into());
        }
    };

    let result = shape_result(raw, &options)?;
    info!(
        segment_count = result.segments.len(),
        language = %result.language,
        "transcribe request completed"
    );
    Ok((StatusCode::OK, Json(result)))
}
