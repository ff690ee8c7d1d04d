use std::{
    fs,
    sync::{Arc, Mutex},
};

use hyper::server::conn::http1;
use hyper_dirserve::{DirServe, ReportSink, ServerConfig, TransferKind, TransferReport};
use hyper_util::rt::TokioIo;
use tempdir::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

#[derive(Default)]
struct RecordingSink {
    reports: Mutex<Vec<(TransferKind, TransferReport)>>,
}

impl ReportSink for RecordingSink {
    fn report(&self, kind: TransferKind, report: &TransferReport) {
        self.reports.lock().unwrap().push((kind, report.clone()));
    }
}

// Serves a single request over a real connection and returns the raw response.
async fn fetch(service: DirServe, path: &str) -> String {
    // Bind to port "0" to allow the OS to pick one that's free, avoiding
    // the risk of collisions.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        http1::Builder::new()
            .serve_connection(TokioIo::new(tcp), service)
            .await
            .unwrap();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    client.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    client.read_to_end(&mut raw).await.unwrap();
    server.await.unwrap();

    String::from_utf8(raw).unwrap()
}

// Drives `DirServe` as a hyper service over a real connection.
#[tokio::test]
async fn test_usable_as_hyper_service() {
    let dir = TempDir::new("hyper-dirserve-tests").unwrap();
    fs::write(dir.path().join("hello.txt"), b"hello over tcp").unwrap();
    let service = DirServe::new(ServerConfig::new(dir.path()));

    let text = fetch(service, "/hello.txt").await;
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert!(text.contains("content-length: 14\r\n"), "{}", text);
    assert!(text.ends_with("\r\n\r\nhello over tcp"), "{}", text);
}

#[tokio::test]
async fn test_downloads_reported_over_connection() {
    let dir = TempDir::new("hyper-dirserve-tests").unwrap();
    fs::write(dir.path().join("hello.txt"), b"hello over tcp").unwrap();
    fs::write(dir.path().join("empty.bin"), b"").unwrap();
    let sink = Arc::new(RecordingSink::default());
    let service = DirServe::new(ServerConfig::new(dir.path())).report_sink(sink.clone());

    let text = fetch(service.clone(), "/hello.txt").await;
    assert!(text.ends_with("\r\n\r\nhello over tcp"), "{}", text);
    let text = fetch(service, "/empty.bin").await;
    assert!(text.contains("content-length: 0\r\n"), "{}", text);

    let reports = sink.reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 2, "{:?}", reports);
    assert_eq!(reports[0].0, TransferKind::Download);
    assert_eq!(reports[0].1.file, "hello.txt");
    assert_eq!(reports[0].1.bytes_sent, 14);
    assert_eq!(reports[1].0, TransferKind::Download);
    assert_eq!(reports[1].1.file, "empty.bin");
    assert_eq!(reports[1].1.bytes_sent, 0);
}
