//! Integration tests for the resumable transfer engine.
//!
//! These tests drive `TransferEngine` against wiremock servers and, for the
//! stalled-body case, a hand-written TCP server.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coursefetch_core::Session;
use coursefetch_core::download::{
    DownloadError, DownloadTask, RequestClient, RequestOptions, RetryEvent, RetryPolicy,
    TransferEngine, TransferObserver, TransferStatus,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{any, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(10), Duration::from_millis(50))
}

fn engine(attempts: u32) -> TransferEngine {
    TransferEngine::new(
        RequestClient::new(fast_policy(attempts)),
        RequestOptions::default().with_read_timeout(Duration::from_secs(5)),
    )
}

fn task_at(server: &MockServer, route: &str, destination: impl Into<PathBuf>) -> DownloadTask {
    DownloadTask::new(format!("{}{route}", server.uri()), destination)
}

fn session() -> Session {
    Session::unverified("sessionid=abc")
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i % 251).expect("fits in u8")).collect()
}

#[derive(Default)]
struct RecordingObserver {
    retries: Mutex<Vec<RetryEvent>>,
}

impl TransferObserver for RecordingObserver {
    fn on_retry(&self, event: &RetryEvent) {
        self.retries.lock().expect("lock").push(event.clone());
    }
}

#[tokio::test]
async fn test_fresh_download_sends_session_headers_and_finalizes() {
    let server = MockServer::start().await;
    let body = content(4096);
    Mock::given(method("GET"))
        .and(path("/v/intro.mp4"))
        .and(header("cookie", "sessionid=abc"))
        .and(header("referer", "https://learn.example.com/c/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/intro.mp4", dir.path().join("ch/intro.mp4"))
        .with_referer("https://learn.example.com/c/1");

    let status = engine(3).download(&session(), &task, 3).await.expect("download succeeds");

    assert_eq!(status, TransferStatus::Downloaded);
    assert_eq!(std::fs::read(&task.final_path).expect("final file"), body);
    assert!(!task.temporary_path.exists(), "partial file should be renamed away");
}

#[tokio::test]
async fn test_resume_requests_remaining_range_and_appends() {
    let server = MockServer::start().await;
    let body = content(1_000_000);
    let offset = 400_000;

    Mock::given(method("HEAD"))
        .and(path("/v/lecture.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("accept-ranges", "bytes")
                .set_body_bytes(body.clone()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v/lecture.mp4"))
        .and(header("range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-0/1000000")
                .set_body_bytes(body[..1].to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v/lecture.mp4"))
        .and(header("range", "bytes=400000-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 400000-999999/1000000")
                .set_body_bytes(body[offset..].to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/lecture.mp4", dir.path().join("lecture.mp4"));
    std::fs::write(&task.temporary_path, &body[..offset]).expect("seed partial file");

    let status = engine(3).download(&session(), &task, 3).await.expect("resume succeeds");

    assert_eq!(status, TransferStatus::Downloaded);
    let written = std::fs::read(&task.final_path).expect("final file");
    assert_eq!(written.len(), body.len());
    assert!(written == body, "resumed file must match the remote bytes");
}

#[tokio::test]
async fn test_partial_file_is_discarded_when_ranges_are_not_supported() {
    let server = MockServer::start().await;
    let body = content(2048);

    Mock::given(method("HEAD"))
        .and(path("/a/notes.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;
    // Ignores any Range header.
    Mock::given(method("GET"))
        .and(path("/a/notes.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/a/notes.pdf", dir.path().join("notes.pdf"));
    std::fs::write(&task.temporary_path, vec![0xAA; 400]).expect("seed partial file");

    let status = engine(3).download(&session(), &task, 3).await.expect("restart succeeds");

    assert_eq!(status, TransferStatus::Downloaded);
    assert_eq!(std::fs::read(&task.final_path).expect("final file"), body);

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(
        requests
            .iter()
            .all(|request| request.headers.get("range").is_none_or(|value| value != "bytes=400-")),
        "no resume range should be requested from a server without range support"
    );
}

#[tokio::test]
async fn test_sample_cap_truncates_a_full_response() {
    let server = MockServer::start().await;
    let body = content(5000);
    Mock::given(method("GET"))
        .and(path("/v/big.mp4"))
        .and(header("range", "bytes=0-999"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/big.mp4", dir.path().join("big.mp4"))
        .with_sample_cap(1000);

    let status = engine(3).download(&session(), &task, 3).await.expect("sample succeeds");

    assert_eq!(status, TransferStatus::Downloaded);
    assert_eq!(std::fs::read(&task.final_path).expect("final file"), body[..1000].to_vec());
}

#[tokio::test]
async fn test_sample_cap_accepts_partial_content() {
    let server = MockServer::start().await;
    let body = content(5000);
    Mock::given(method("GET"))
        .and(path("/v/big.mp4"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-999/5000")
                .set_body_bytes(body[..1000].to_vec()),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/big.mp4", dir.path().join("big.mp4"))
        .with_sample_cap(1000);

    engine(3).download(&session(), &task, 3).await.expect("sample succeeds");

    assert_eq!(std::fs::read(&task.final_path).expect("final file").len(), 1000);
}

#[tokio::test]
async fn test_existing_sample_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/big.mp4", dir.path().join("big.mp4"))
        .with_sample_cap(1000);
    std::fs::write(&task.final_path, b"already sampled").expect("seed final file");

    let status = engine(3).download(&session(), &task, 3).await.expect("exists");

    assert_eq!(status, TransferStatus::Exists);
}

#[tokio::test]
async fn test_complete_final_file_is_not_downloaded_again() {
    let server = MockServer::start().await;
    let body = content(3000);

    Mock::given(method("HEAD"))
        .and(path("/v/done.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("accept-ranges", "bytes")
                .set_body_bytes(body.clone()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v/done.mp4"))
        .and(header("range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-0/3000")
                .set_body_bytes(body[..1].to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v/done.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/done.mp4", dir.path().join("done.mp4"));
    std::fs::write(&task.final_path, &body).expect("seed final file");

    let status = engine(3).download(&session(), &task, 3).await.expect("exists");

    assert_eq!(status, TransferStatus::Exists);
    assert_eq!(std::fs::read(&task.final_path).expect("final file"), body);
}

async fn mount_range_probe(
    server: &MockServer,
    route: &str,
    head_body: Vec<u8>,
    probe_range: &str,
) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("accept-ranges", "bytes")
                .set_body_bytes(head_body),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", probe_range)
                .set_body_bytes(vec![0u8]),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_short_final_file_is_resumed_in_place() {
    let server = MockServer::start().await;
    let body = content(3000);
    mount_range_probe(&server, "/v/short.mp4", body.clone(), "bytes 0-0/3000").await;
    Mock::given(method("GET"))
        .and(path("/v/short.mp4"))
        .and(header("range", "bytes=1200-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 1200-2999/3000")
                .set_body_bytes(body[1200..].to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/short.mp4", dir.path().join("short.mp4"));
    std::fs::write(&task.final_path, &body[..1200]).expect("seed short final file");

    let status = engine(3).download(&session(), &task, 3).await.expect("resume succeeds");

    assert_eq!(status, TransferStatus::Downloaded);
    assert!(std::fs::read(&task.final_path).expect("final file") == body);
    assert!(!task.temporary_path.exists());
}

#[tokio::test]
async fn test_unsatisfiable_resume_keeps_complete_final_file() {
    let server = MockServer::start().await;
    let body = content(3000);
    mount_range_probe(&server, "/v/sizeless.mp4", Vec::new(), "bytes 0-0/*").await;
    Mock::given(method("GET"))
        .and(path("/v/sizeless.mp4"))
        .and(header("range", "bytes=3000-"))
        .respond_with(ResponseTemplate::new(416).insert_header("content-range", "bytes */3000"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/sizeless.mp4", dir.path().join("sizeless.mp4"));
    std::fs::write(&task.final_path, &body).expect("seed final file");

    let status = engine(3).download(&session(), &task, 3).await.expect("nothing left to fetch");

    assert_eq!(status, TransferStatus::Exists);
    assert!(std::fs::read(&task.final_path).expect("final file") == body);
    assert!(!task.temporary_path.exists());
}

#[tokio::test]
async fn test_rejected_resume_restores_final_file() {
    let server = MockServer::start().await;
    let body = content(3000);
    mount_range_probe(&server, "/v/gone.mp4", Vec::new(), "bytes 0-0/*").await;
    Mock::given(method("GET"))
        .and(path("/v/gone.mp4"))
        .and(header("range", "bytes=3000-"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/gone.mp4", dir.path().join("gone.mp4"));
    std::fs::write(&task.final_path, &body).expect("seed final file");

    let error = engine(3).download(&session(), &task, 3).await.expect_err("404 fails");

    assert_eq!(error.kind(), "HTTP_404");
    assert!(std::fs::read(&task.final_path).expect("final file kept") == body);
    assert!(!task.temporary_path.exists());
}

#[tokio::test]
async fn test_oversized_partial_file_restarts_from_zero() {
    let server = MockServer::start().await;
    let body = content(3000);
    mount_range_probe(&server, "/v/over.mp4", body.clone(), "bytes 0-0/3000").await;
    Mock::given(method("GET"))
        .and(path("/v/over.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/over.mp4", dir.path().join("over.mp4"));
    std::fs::write(&task.temporary_path, vec![0xAA; 5000]).expect("seed partial file");

    let status = engine(3).download(&session(), &task, 3).await.expect("restart succeeds");

    assert_eq!(status, TransferStatus::Downloaded);
    assert!(std::fs::read(&task.final_path).expect("final file") == body);
    let requests = server.received_requests().await.expect("recording enabled");
    assert!(
        requests
            .iter()
            .all(|request| request.headers.get("range").is_none_or(|value| value != "bytes=5000-")),
        "an oversized partial file must not be resumed"
    );
}

#[tokio::test]
async fn test_complete_partial_file_is_finalized_without_fetching() {
    let server = MockServer::start().await;
    let body = content(3000);
    mount_range_probe(&server, "/v/whole.mp4", body.clone(), "bytes 0-0/3000").await;
    Mock::given(method("GET"))
        .and(path("/v/whole.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/whole.mp4", dir.path().join("whole.mp4"));
    std::fs::write(&task.temporary_path, &body).expect("seed partial file");

    let status = engine(3).download(&session(), &task, 3).await.expect("finalized");

    assert_eq!(status, TransferStatus::Downloaded);
    assert!(std::fs::read(&task.final_path).expect("final file") == body);
    assert!(!task.temporary_path.exists());
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v/missing.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/missing.mp4", dir.path().join("missing.mp4"));

    let error = engine(3).download(&session(), &task, 3).await.expect_err("404 fails");

    assert!(matches!(error, DownloadError::HttpStatus { status: 404, .. }));
    assert_eq!(error.kind(), "HTTP_404");
    assert!(!task.final_path.exists());
    assert!(!task.temporary_path.exists());
}

#[tokio::test]
async fn test_server_error_is_retried_once_per_attempt() {
    let server = MockServer::start().await;
    let body = content(512);
    Mock::given(method("GET"))
        .and(path("/v/flaky.mp4"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v/flaky.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let observer = Arc::new(RecordingObserver::default());
    let client = RequestClient::new(fast_policy(3)).with_observer(observer.clone());
    let engine = TransferEngine::new(client, RequestOptions::default());

    let dir = TempDir::new().expect("temp dir");
    let task = task_at(&server, "/v/flaky.mp4", dir.path().join("flaky.mp4"));

    let status = engine.download(&session(), &task, 3).await.expect("second attempt succeeds");

    assert_eq!(status, TransferStatus::Downloaded);
    assert_eq!(std::fs::read(&task.final_path).expect("final file"), body);
    let retries = observer.retries.lock().expect("lock");
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].failed_attempt, 1);
    assert_eq!(retries[0].max_attempts, 3);
}

async fn read_request_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|window| window == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).to_ascii_lowercase()
}

fn range_start(request: &str) -> Option<usize> {
    request
        .lines()
        .find_map(|line| line.strip_prefix("range: bytes="))
        .and_then(|range| range.split('-').next())
        .and_then(|start| start.trim().parse().ok())
}

/// Serves `body` at any path. Plain GETs send the first `stall_after` bytes
/// and then go silent; ranged GETs and HEADs are answered normally.
async fn spawn_stalling_server(body: Vec<u8>, stall_after: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let body = Arc::new(body);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = Arc::clone(&body);
            tokio::spawn(async move {
                let request = read_request_head(&mut socket).await;
                let total = body.len();
                if request.starts_with("head ") {
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                } else if let Some(start) = range_start(&request) {
                    let rest = &body[start..];
                    let head = format!(
                        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {start}-{}/{total}\r\nConnection: close\r\n\r\n",
                        rest.len(),
                        total - 1
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(rest).await;
                } else {
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nConnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body[..stall_after]).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}/v/stall.mp4")
}

#[tokio::test]
async fn test_stalled_body_times_out_and_next_attempt_resumes() {
    let body = content(100);
    let url = spawn_stalling_server(body.clone(), 10).await;

    let observer = Arc::new(RecordingObserver::default());
    let client = RequestClient::new(fast_policy(2)).with_observer(observer.clone());
    let engine = TransferEngine::new(
        client,
        RequestOptions::new(Duration::from_secs(5)).with_read_timeout(Duration::from_millis(300)),
    );

    let dir = TempDir::new().expect("temp dir");
    let task = DownloadTask::new(url, dir.path().join("stall.mp4"));

    let session = session();
    let download = engine.download(&session, &task, 2);
    let status = tokio::time::timeout(Duration::from_secs(10), download)
        .await
        .expect("watchdog must fire well before the server gives up")
        .expect("second attempt resumes and completes");

    assert_eq!(status, TransferStatus::Downloaded);
    assert_eq!(std::fs::read(&task.final_path).expect("final file"), body);
    let retries = observer.retries.lock().expect("lock");
    assert_eq!(retries.len(), 1, "exactly one retry after the idle timeout");
}

#[tokio::test]
async fn test_stalled_body_reports_idle_timeout_when_attempts_run_out() {
    let body = content(100);
    let url = spawn_stalling_server(body, 10).await;

    let engine = TransferEngine::new(
        RequestClient::new(fast_policy(1)),
        RequestOptions::new(Duration::from_secs(5)).with_read_timeout(Duration::from_millis(200)),
    );
    let dir = TempDir::new().expect("temp dir");
    let task = DownloadTask::new(url, dir.path().join("stall.mp4"));

    let error = engine.download(&session(), &task, 1).await.expect_err("idle timeout");

    assert!(matches!(error, DownloadError::IdleTimeout { .. }));
    assert_eq!(error.kind(), "IDLE_TIMEOUT");
    assert_eq!(
        std::fs::read(&task.temporary_path).expect("partial file kept").len(),
        10,
        "bytes received before the stall stay on disk"
    );
}
