use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;

use crate::backend::{BackendSelector, Brand, ClientCredentials, Region};
use crate::clock::SystemClock;
use crate::errors::Error;
use crate::fetcher::{Grant, Identity, TokenFetcher};
use crate::telemetry::refresh::{RefreshTelemetry, RenewalTrigger};
use crate::tests::test_support::{PASSWORD, capture_logs, drain_logs};

/// Answers one request with a 401 whose body is cut short of its Content-Length.
fn truncated_rejection_server() -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = [0u8; 4096];
        while let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
        stream
            .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 64\r\n\r\nshort")
            .unwrap();
        stream.flush().unwrap();
        stream.shutdown(Shutdown::Both).ok();
    });
    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn unreadable_rejection_body_is_logged_and_left_empty() {
    let (base_url, server) = truncated_rejection_server();
    let backend = BackendSelector::new(Brand::Whirlpool, Region::EU)
        .with_base_url(base_url)
        .with_client_credentials(vec![ClientCredentials::new("test_client", "test_secret")]);
    let fetcher = TokenFetcher::new(
        backend,
        Identity::new("user@example.com", PASSWORD),
        Arc::new(SystemClock),
        Duration::from_secs(5),
    )
    .unwrap();

    let (lines, guard) = capture_logs();
    let result = fetcher
        .fetch(&Grant::Password, &RefreshTelemetry::new(RenewalTrigger::Explicit))
        .await;
    drop(guard);
    server.join().unwrap();

    match result {
        Err(Error::Auth { status, body }) => {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(body.is_empty(), "body: {:?}", body);
        }
        other => panic!("expected Error::Auth, got {:?}", other),
    }
    let logs = drain_logs(&lines);
    assert!(
        logs.iter()
            .any(|l| l.contains("DEBUG") && l.contains("could not read rejection body")),
        "logs: {:?}",
        logs
    );
}
