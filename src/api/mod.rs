use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::transcribe::handle_transcribe_request;
use crate::inference::engine::TranscriptionEngine;

pub(crate) mod form;
pub(crate) mod shape;
pub(crate) mod transcribe;

// Room for the non-file form fields and multipart framing.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) engine: Arc<dyn TranscriptionEngine>,
    pub(crate) scratch_dir: Option<PathBuf>,
    pub(crate) max_upload_bytes: usize,
    pub(crate) upload_timeout: Duration,
}

pub(crate) fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(handle_root_request))
        .route("/transcribe", post(handle_transcribe_request))
        .route("/transcribe/", post(handle_transcribe_request))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_root_request() -> Json<Value> {
    Json(json!({ "message": "Whisper Transcription API" }))
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use anyhow::bail;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use futures::StreamExt;
    use tower::ServiceExt;

    use super::*;
    use crate::inference::engine::{
        RawSegment, RawTranscription, RawWord, TranscribeOptions, TranscriptionEngine,
    };

    const BOUNDARY: &str = "X-TRANSCRIBE-BOUNDARY";

    /// Records what it was called with and answers with a canned result or error.
    #[derive(Default)]
    struct FakeEngine {
        fail_with: Option<String>,
        panic_with: Option<String>,
        calls: Mutex<Vec<Call>>,
    }

    #[derive(Clone)]
    struct Call {
        path: PathBuf,
        existed: bool,
        contents: Vec<u8>,
        options: TranscribeOptions,
    }

    impl FakeEngine {
        fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Self::default()
            }
        }

        fn panicking(message: &str) -> Self {
            Self {
                panic_with: Some(message.to_string()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TranscriptionEngine for FakeEngine {
        fn transcribe(
            &self,
            path: &Path,
            options: &TranscribeOptions,
        ) -> anyhow::Result<RawTranscription> {
            self.calls.lock().unwrap().push(Call {
                path: path.to_path_buf(),
                existed: path.exists(),
                contents: std::fs::read(path).unwrap_or_default(),
                options: options.clone(),
            });
            if let Some(message) = &self.fail_with {
                bail!("{message}");
            }
            if let Some(message) = &self.panic_with {
                panic!("{message}");
            }
            Ok(RawTranscription {
                text: " Hello there. General Kenobi.".into(),
                language: Some("en".into()),
                segments: vec![
                    RawSegment {
                        id: 0,
                        start: 0.0,
                        end: 1.2,
                        text: " Hello there.".into(),
                        words: Some(vec![RawWord {
                            word: " Hello".into(),
                            start: 0.0,
                            end: 0.6,
                            probability: Some(0.93),
                        }]),
                        ..RawSegment::default()
                    },
                    RawSegment {
                        id: 1,
                        start: 1.2,
                        end: 2.5,
                        text: " General Kenobi.".into(),
                        ..RawSegment::default()
                    },
                ],
            })
        }
    }

    struct Fixture {
        engine: Arc<FakeEngine>,
        scratch: tempfile::TempDir,
        router: Router,
    }

    fn fixture(engine: FakeEngine) -> Fixture {
        fixture_with_timeout(engine, Duration::from_secs(5))
    }

    fn fixture_with_timeout(engine: FakeEngine, upload_timeout: Duration) -> Fixture {
        let engine = Arc::new(engine);
        let scratch = tempfile::tempdir().unwrap();
        let router = router(AppState {
            engine: engine.clone(),
            scratch_dir: Some(scratch.path().to_path_buf()),
            max_upload_bytes: 1024,
            upload_timeout,
        });
        Fixture {
            engine,
            scratch,
            router,
        }
    }

    fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = file {
            body.extend(file_part(file_name, bytes));
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn file_part(file_name: &str, bytes: &[u8]) -> Vec<u8> {
        let mut part = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        part.extend_from_slice(bytes);
        part.extend_from_slice(b"\r\n");
        part
    }

    async fn post_transcribe(router: &Router, body: Vec<u8>) -> (StatusCode, Value) {
        post_transcribe_body(router, Body::from(body)).await
    }

    async fn post_transcribe_body(router: &Router, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/transcribe/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn scratch_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn transcribes_and_removes_the_scratch_file() {
        let f = fixture(FakeEngine::default());
        let body = multipart_body(
            Some(("talk.mp3", b"ID3 fake audio")),
            &[("word_timestamps", "true"), ("language", "en")],
        );

        let (status, json) = post_transcribe(&f.router, body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["text"], "Hello there. General Kenobi.");
        assert_eq!(json["language"], "en");
        assert_eq!(json["segments"].as_array().unwrap().len(), 2);
        assert_eq!(json["segments"][0]["words"][0]["text"], " Hello");
        assert_eq!(json["segments"][0]["words"][0]["confidence"], 0.93);
        assert!(json["segments"][1].get("words").is_none());

        let calls = f.engine.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].existed);
        assert_eq!(calls[0].contents, b"ID3 fake audio");
        assert_eq!(calls[0].path.extension().unwrap(), "mp3");
        assert!(calls[0].path.starts_with(f.scratch.path()));
        assert!(!calls[0].path.exists());
        assert!(scratch_is_empty(f.scratch.path()));
    }

    #[tokio::test]
    async fn segments_are_chronological() {
        let f = fixture(FakeEngine::default());
        let body = multipart_body(Some(("talk.wav", b"RIFF")), &[("word_timestamps", "1")]);

        let (status, json) = post_transcribe(&f.router, body).await;
        assert_eq!(status, StatusCode::OK);

        let mut previous_start = f64::MIN;
        for segment in json["segments"].as_array().unwrap() {
            let start = segment["start"].as_f64().unwrap();
            let end = segment["end"].as_f64().unwrap();
            assert!(start >= previous_start);
            assert!(end >= start);
            for word in segment["words"].as_array().into_iter().flatten() {
                assert!(word["end"].as_f64().unwrap() >= word["start"].as_f64().unwrap());
            }
            previous_start = start;
        }
    }

    #[tokio::test]
    async fn engine_failure_is_a_server_error_and_still_cleans_up() {
        let f = fixture(FakeEngine::failing("unsupported codec"));
        let body = multipart_body(Some(("talk.m4a", b"broken")), &[]);

        let (status, json) = post_transcribe(&f.router, body).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["detail"], "Transcription error: unsupported codec");
        let calls = f.engine.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].existed);
        assert!(!calls[0].path.exists());
        assert!(scratch_is_empty(f.scratch.path()));
    }

    #[tokio::test]
    async fn panicking_engine_is_a_server_error_and_still_cleans_up() {
        let f = fixture(FakeEngine::panicking("engine blew up"));
        let body = multipart_body(Some(("talk.wav", b"RIFF")), &[]);

        let (status, json) = post_transcribe(&f.router, body).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json["detail"].as_str().unwrap();
        assert!(detail.starts_with("Transcription error:"), "{detail}");
        let calls = f.engine.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].existed);
        assert!(!calls[0].path.exists());
        assert!(scratch_is_empty(f.scratch.path()));
    }

    #[tokio::test]
    async fn stalled_upload_times_out() {
        let f = fixture_with_timeout(FakeEngine::default(), Duration::from_millis(200));
        // The file part starts but the body never finishes.
        let head = file_part("talk.mp3", b"ID3");
        let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(head) })
            .chain(futures::stream::pending());

        let (status, json) = tokio::time::timeout(
            Duration::from_secs(5),
            post_transcribe_body(&f.router, Body::from_stream(stream)),
        )
        .await
        .expect("request should give up on its own");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"]
            .as_str()
            .unwrap()
            .starts_with("Upload not completed within"));
        assert!(f.engine.calls().is_empty());
        assert!(scratch_is_empty(f.scratch.path()));
    }

    #[tokio::test]
    async fn duplicate_file_field_is_invalid_input() {
        let f = fixture(FakeEngine::default());
        let mut body = file_part("one.mp3", b"ID3");
        body.extend(file_part("two.mp3", b"ID3"));
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let (status, json) = post_transcribe(&f.router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Duplicate file field in multipart form");
        assert!(f.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_option_field_is_invalid_input() {
        let f = fixture(FakeEngine::default());
        let body = multipart_body(
            Some(("talk.mp3", b"ID3")),
            &[("language", "en"), ("language", "de")],
        );

        let (status, json) = post_transcribe(&f.router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Duplicate field language in multipart form");
        assert!(f.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn every_allowed_format_reaches_the_engine() {
        for (i, ext) in form::ALLOWED_EXTENSIONS.iter().enumerate() {
            let f = fixture(FakeEngine::default());
            let name = format!("clip.{ext}");
            let body = multipart_body(Some((&name, b"\0\0\0\0")), &[]);

            let (status, _) = post_transcribe(&f.router, body).await;
            assert_eq!(status, StatusCode::OK, "{ext}");
            assert_eq!(f.engine.calls().len(), 1, "{i}: {ext}");
        }
    }

    #[tokio::test]
    async fn unsupported_format_never_reaches_the_engine() {
        for name in ["notes.txt", "clip.ogg", "clip.mp4", "noextension"] {
            let f = fixture(FakeEngine::default());
            let body = multipart_body(Some((name, b"data")), &[]);

            let (status, json) = post_transcribe(&f.router, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{name}");
            assert!(json["detail"]
                .as_str()
                .unwrap()
                .starts_with("Unsupported file format"));
            assert!(f.engine.calls().is_empty());
            assert!(scratch_is_empty(f.scratch.path()));
        }
    }

    #[tokio::test]
    async fn missing_file_is_invalid_input() {
        let f = fixture(FakeEngine::default());
        let body = multipart_body(None, &[("language", "en")]);

        let (status, json) = post_transcribe(&f.router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Missing field file in multipart form");
        assert!(f.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_file_is_invalid_input() {
        let f = fixture(FakeEngine::default());
        let body = multipart_body(Some(("silence.wav", b"")), &[]);

        let (status, json) = post_transcribe(&f.router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Uploaded file is empty");
        assert!(f.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn bad_option_is_invalid_input() {
        let f = fixture(FakeEngine::default());
        let body = multipart_body(Some(("talk.flac", b"fLaC")), &[("language", "klingon")]);

        let (status, json) = post_transcribe(&f.router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().contains("klingon"));
        assert!(f.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let f = fixture(FakeEngine::default());
        let big = vec![7u8; 2048];
        let body = multipart_body(Some(("long.wav", &big)), &[]);

        let (status, json) = post_transcribe(&f.router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().starts_with("File too large"));
        assert!(f.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn options_and_extra_parameters_reach_the_engine() {
        let f = fixture(FakeEngine::default());
        let body = multipart_body(
            Some(("talk.mov", b"moov")),
            &[
                ("fp16", "false"),
                ("best_of", "2"),
                ("hallucination_silence_threshold", "0.5"),
                ("temperature", "0.4"),
            ],
        );

        let (status, _) = post_transcribe(&f.router, body).await;
        assert_eq!(status, StatusCode::OK);

        let options = &f.engine.calls()[0].options;
        assert!(!options.fp16);
        assert_eq!(options.best_of, 2);
        assert_eq!(options.hallucination_silence_threshold, Some(0.5));
        assert_eq!(options.extra.get("temperature").map(String::as_str), Some("0.4"));
    }

    #[tokio::test]
    async fn non_multipart_body_is_invalid_input() {
        let f = fixture(FakeEngine::default());
        let request = Request::builder()
            .method("POST")
            .uri("/transcribe")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = f.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn root_answers_with_a_message() {
        let f = fixture(FakeEngine::default());
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = f.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["message"], "Whisper Transcription API");
    }
}
