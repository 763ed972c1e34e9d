use async_trait::async_trait;
use axum::extract::Path as UrlPath;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use video_transcriber::config::{AssemblyAiConfig, OpenAiConfig};
use video_transcriber::{
    output_path_for, AssemblyAiBackend, Config, JobStatus, MediaTool, OpenAiDiarizeBackend,
    PollPolicy, Result, TranscriberError, TranscriptionBackend, TranscriptionPipeline,
};

const API_KEY: &str = "test-key";

async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn write_audio(dir: &TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    tokio::fs::write(&path, b"fake mp3 bytes").await.unwrap();
    path
}

fn openai_backend(base: &str) -> OpenAiDiarizeBackend {
    let config = OpenAiConfig {
        endpoint: format!("{}/v1/audio/transcriptions", base),
        ..OpenAiConfig::default()
    };
    OpenAiDiarizeBackend::new(API_KEY.to_string(), &config, Duration::from_secs(10)).unwrap()
}

fn assemblyai_backend(base: &str, policy: PollPolicy) -> AssemblyAiBackend {
    let config = AssemblyAiConfig {
        base_url: base.to_string(),
        speaker_labels: true,
    };
    AssemblyAiBackend::new(API_KEY.to_string(), &config, policy, Duration::from_secs(10)).unwrap()
}

fn fast_polling() -> PollPolicy {
    PollPolicy::fixed(Duration::from_millis(10))
}

/// Router for the job-based protocol; `statuses` are served in order, the
/// last one repeating.
fn assemblyai_router(statuses: Vec<serde_json::Value>, polls: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/v2/upload",
            post(|headers: HeaderMap| async move {
                if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
                }
                (StatusCode::OK, Json(json!({"upload_url": "https://cdn.example/upload/abc"})))
            }),
        )
        .route(
            "/v2/transcript",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["audio_url"], "https://cdn.example/upload/abc");
                assert_eq!(body["speaker_labels"], true);
                Json(json!({"id": "job-1", "status": "queued"}))
            }),
        )
        .route(
            "/v2/transcript/:id",
            get(move |UrlPath(id): UrlPath<String>| {
                let statuses = statuses.clone();
                let polls = polls.clone();
                async move {
                    assert_eq!(id, "job-1");
                    let n = polls.fetch_add(1, Ordering::SeqCst);
                    let mut body = statuses[n.min(statuses.len() - 1)].clone();
                    body["id"] = json!(id);
                    Json(body)
                }
            }),
        )
}

#[tokio::test]
async fn test_openai_success() {
    let router = Router::new().route(
        "/v1/audio/transcriptions",
        post(|headers: HeaderMap| async move {
            let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
            assert_eq!(auth, Some("Bearer test-key"));
            Json(json!({
                "text": "Welcome. Thanks.",
                "segments": [
                    {"speaker": "A", "start": 0.0, "end": 1.5, "text": "Welcome."},
                    {"speaker": "B", "start": 1.5, "end": 2.0, "text": "Thanks."}
                ]
            }))
        }),
    );
    let base = spawn_stub(router).await;
    let temp_dir = TempDir::new().unwrap();
    let audio = write_audio(&temp_dir, "talk.mp3").await;

    let transcript = openai_backend(&base).transcribe(&audio).await.unwrap();

    assert_eq!(transcript.text(), "Welcome. Thanks.");
    assert_eq!(transcript.fragments().len(), 2);
    assert_eq!(transcript.fragments()[1].speaker, "B");
}

#[tokio::test]
async fn test_openai_remote_error_carries_status_and_body() {
    let router = Router::new().route(
        "/v1/audio/transcriptions",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded") }),
    );
    let base = spawn_stub(router).await;
    let temp_dir = TempDir::new().unwrap();
    let audio = write_audio(&temp_dir, "talk.mp3").await;

    let err = openai_backend(&base).transcribe(&audio).await.unwrap_err();

    match err {
        TranscriberError::Remote { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limit exceeded");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_malformed_body_is_parse_error() {
    let router = Router::new().route(
        "/v1/audio/transcriptions",
        post(|| async { "definitely not json" }),
    );
    let base = spawn_stub(router).await;
    let temp_dir = TempDir::new().unwrap();
    let audio = write_audio(&temp_dir, "talk.mp3").await;

    let err = openai_backend(&base).transcribe(&audio).await.unwrap_err();
    assert!(matches!(err, TranscriberError::Parse(_)));
}

#[tokio::test]
async fn test_openai_missing_audio_is_upload_error() {
    let backend = openai_backend("http://127.0.0.1:9");
    let err = backend
        .transcribe(Path::new("/no/such/chunk.mp3"))
        .await
        .unwrap_err();
    assert!(matches!(err, TranscriberError::Upload(_)));
}

#[tokio::test]
async fn test_assemblyai_polls_until_completed() {
    let polls = Arc::new(AtomicUsize::new(0));
    let statuses = vec![
        json!({"status": "queued"}),
        json!({"status": "processing"}),
        json!({
            "status": "completed",
            "text": "One. Two.",
            "utterances": [
                {"speaker": "A", "start": 0, "end": 1200, "text": "One."},
                {"speaker": "", "start": 1300, "end": 2500, "text": "Two."}
            ]
        }),
    ];
    let base = spawn_stub(assemblyai_router(statuses, polls.clone())).await;
    let temp_dir = TempDir::new().unwrap();
    let audio = write_audio(&temp_dir, "talk.mp3").await;

    let transcript = assemblyai_backend(&base, fast_polling())
        .transcribe(&audio)
        .await
        .unwrap();

    assert_eq!(polls.load(Ordering::SeqCst), 3);
    assert_eq!(transcript.text(), "One. Two.");
    assert_eq!(transcript.fragments()[0].end, 1.2);
    assert_eq!(transcript.fragments()[1].start, 1.3);
    assert_eq!(transcript.fragments()[1].speaker, "Unknown");
}

#[tokio::test]
async fn test_assemblyai_error_status_surfaces_service_message() {
    let polls = Arc::new(AtomicUsize::new(0));
    let statuses = vec![
        json!({"status": "processing"}),
        json!({"status": "error", "error": "Transcoding failed: unsupported codec"}),
    ];
    let base = spawn_stub(assemblyai_router(statuses, polls.clone())).await;
    let temp_dir = TempDir::new().unwrap();
    let audio = write_audio(&temp_dir, "talk.mp3").await;

    let err = assemblyai_backend(&base, fast_polling())
        .transcribe(&audio)
        .await
        .unwrap_err();

    match err {
        TranscriberError::JobFailed { job_id, message } => {
            assert_eq!(job_id, "job-1");
            assert_eq!(message, "Transcoding failed: unsupported codec");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // polling stopped at the error
    assert_eq!(polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_assemblyai_unknown_status_stops_polling() {
    let polls = Arc::new(AtomicUsize::new(0));
    let base = spawn_stub(assemblyai_router(vec![json!({"status": "paused"})], polls.clone())).await;

    let backend = assemblyai_backend(&base, fast_polling());
    let job = backend.poll("job-1").await.unwrap();
    assert_eq!(job.status, JobStatus::Unknown("paused".to_string()));

    let err = backend.wait_for_completion("job-1").await.unwrap_err();
    assert!(matches!(err, TranscriberError::Poll { ref status, .. } if status == "paused"));
    assert_eq!(polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_assemblyai_poll_timeout() {
    let polls = Arc::new(AtomicUsize::new(0));
    let base = spawn_stub(assemblyai_router(vec![json!({"status": "processing"})], polls.clone())).await;

    let policy = fast_polling().with_timeout(Duration::from_millis(60));
    let err = assemblyai_backend(&base, policy)
        .wait_for_completion("job-1")
        .await
        .unwrap_err();

    match err {
        TranscriberError::Timeout { job_id, waited } => {
            assert_eq!(job_id, "job-1");
            assert!(waited >= Duration::from_millis(40));
            assert!(waited < Duration::from_secs(5));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(polls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_assemblyai_rejected_upload() {
    let polls = Arc::new(AtomicUsize::new(0));
    let base = spawn_stub(assemblyai_router(vec![json!({"status": "queued"})], polls.clone())).await;
    let temp_dir = TempDir::new().unwrap();
    let audio = write_audio(&temp_dir, "talk.mp3").await;

    let config = AssemblyAiConfig {
        base_url: base,
        speaker_labels: true,
    };
    let backend =
        AssemblyAiBackend::new("wrong-key".to_string(), &config, fast_polling(), Duration::from_secs(5))
            .unwrap();

    let err = backend.upload(&audio).await.unwrap_err();
    assert!(matches!(err, TranscriberError::Remote { status: 401, .. }));
    assert_eq!(polls.load(Ordering::SeqCst), 0);
}

/// Converter stand-in: copies the "video" and reports a long duration
struct CopyMedia {
    duration: f64,
}

#[async_trait]
impl MediaTool for CopyMedia {
    async fn probe_duration(&self, _media: &Path) -> Result<f64> {
        Ok(self.duration)
    }

    async fn extract_audio(&self, source: &Path, dest: &Path) -> Result<()> {
        tokio::fs::copy(source, dest).await?;
        Ok(())
    }

    async fn extract_range(
        &self,
        source: &Path,
        dest: &Path,
        _offset_seconds: u64,
        _duration_seconds: f64,
    ) -> Result<()> {
        tokio::fs::copy(source, dest).await?;
        Ok(())
    }
}

fn pipeline_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.chunking.temp_dir = Some(temp_dir.path().join("scratch"));
    config
}

#[tokio::test]
async fn test_pipeline_remote_error_writes_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let router = Router::new().route(
        "/v1/audio/transcriptions",
        post(move || {
            let counter = counter.clone();
            async move {
                // first chunk succeeds, second one is rejected
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::OK, r#"{"text": "ok", "segments": []}"#.to_string())
                } else {
                    (StatusCode::BAD_GATEWAY, "upstream timeout".to_string())
                }
            }
        }),
    );
    let base = spawn_stub(router).await;

    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir(temp_dir.path().join("scratch")).unwrap();
    let video = write_audio(&temp_dir, "lecture.mp4").await;

    let pipeline = TranscriptionPipeline::new(
        Arc::new(CopyMedia { duration: 3600.0 }),
        Arc::new(openai_backend(&base)),
        &pipeline_config(&temp_dir),
    );
    let err = pipeline.run(&video).await.unwrap_err();

    let message = format!("{:#}", anyhow::Error::from(err));
    assert!(message.contains("502"), "{}", message);
    assert!(message.contains("upstream timeout"), "{}", message);
    assert!(!output_path_for(&video).exists());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(std::fs::read_dir(temp_dir.path().join("scratch")).unwrap().next().is_none());
}

#[tokio::test]
async fn test_pipeline_writes_rendered_transcript() {
    let router = Router::new().route(
        "/v1/audio/transcriptions",
        post(|| async {
            Json(json!({
                "text": "Hi. Hello.",
                "segments": [
                    {"speaker": "A", "start": 1.0, "end": 2.9, "text": " Hi. "},
                    {"speaker": "B", "start": 3.0, "end": 4.0, "text": "Hello."}
                ]
            }))
        }),
    );
    let base = spawn_stub(router).await;

    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir(temp_dir.path().join("scratch")).unwrap();
    let video = write_audio(&temp_dir, "standup.mov").await;
    std::fs::write(output_path_for(&video), "stale").unwrap();

    let pipeline = TranscriptionPipeline::new(
        Arc::new(CopyMedia { duration: 120.0 }),
        Arc::new(openai_backend(&base)),
        &pipeline_config(&temp_dir),
    );
    let output = pipeline.run(&video).await.unwrap();

    assert_eq!(output, temp_dir.path().join("standup.txt"));
    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "[00:00:01 - 00:00:02] A:\nHi.\n\n[00:00:03 - 00:00:04] B:\nHello.\n"
    );
    assert!(std::fs::read_dir(temp_dir.path().join("scratch")).unwrap().next().is_none());
}

#[tokio::test]
async fn test_pipeline_missing_video() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline = TranscriptionPipeline::new(
        Arc::new(CopyMedia { duration: 10.0 }),
        Arc::new(openai_backend("http://127.0.0.1:9")),
        &pipeline_config(&temp_dir),
    );

    let err = pipeline.run(&temp_dir.path().join("missing.mp4")).await.unwrap_err();
    assert!(matches!(err, TranscriberError::Input(_)));
}
