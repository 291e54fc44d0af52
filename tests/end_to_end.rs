//! Drives the real server over TCP

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use static_file_server::config::{AppState, Config};
use static_file_server::server::{create_reusable_listener, serve_until};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::LocalSet;

struct Reply {
    status: u16,
    /// Status line and headers, lowercased
    head: String,
    body: Vec<u8>,
}

impl Reply {
    fn has_header(&self, line: &str) -> bool {
        self.head.lines().any(|l| l.trim() == line)
    }
}

async fn roundtrip(addr: SocketAddr, request: &str) -> Reply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    let split = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let head = String::from_utf8_lossy(&raw[..split]).to_lowercase();
    let status = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    Reply {
        status,
        head,
        body: raw[split + 4..].to_vec(),
    }
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

fn state_for(root: &Path) -> Arc<AppState> {
    let mut config = Config::load_from("/nonexistent/dir/server").unwrap();
    config.static_files.document_root = root.to_string_lossy().into_owned();
    config.logging.access_log = false;
    Arc::new(AppState::new(&config))
}

/// Start a server on an ephemeral port, run `client` against it, then shut down
async fn with_server<F, Fut>(root: &Path, client: F)
where
    F: FnOnce(SocketAddr) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let listener = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    let state = state_for(root);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let server = tokio::task::spawn_local(serve_until(listener, state, async move {
                let _ = stop_rx.await;
            }));
            client(addr).await;
            stop_tx.send(()).unwrap();
            server.await.unwrap();
        })
        .await;
}

fn docroot() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"0123456789").unwrap();
    dir
}

#[tokio::test]
async fn serves_index_for_root() {
    let dir = docroot();
    with_server(dir.path(), |addr| async move {
        let reply = roundtrip(addr, &get("/")).await;
        assert_eq!(reply.status, 200);
        assert!(reply.has_header("content-length: 10"));
        assert!(reply.has_header("accept-ranges: bytes"));
        assert!(reply.has_header("connection: close"));
        assert_eq!(reply.body, b"0123456789");

        // Second request is a cache hit and must be byte-identical
        let again = roundtrip(addr, &get("/index.html")).await;
        assert_eq!(again.body, reply.body);
    })
    .await;
}

#[tokio::test]
async fn serves_partial_content() {
    let dir = docroot();
    with_server(dir.path(), |addr| async move {
        let request = "GET /index.html HTTP/1.1\r\nHost: localhost\r\nRange: bytes=0-4\r\n\r\n";
        let reply = roundtrip(addr, request).await;
        assert_eq!(reply.status, 206);
        assert!(reply.has_header("content-range: bytes 0-4/10"));
        assert_eq!(reply.body, b"01234");
    })
    .await;
}

#[tokio::test]
async fn head_has_headers_but_no_body() {
    let dir = docroot();
    with_server(dir.path(), |addr| async move {
        let request = "HEAD /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let reply = roundtrip(addr, request).await;
        assert_eq!(reply.status, 200);
        assert!(reply.has_header("content-length: 10"));
        assert!(reply.body.is_empty());
    })
    .await;
}

#[tokio::test]
async fn refuses_traversal_and_reports_missing_files() {
    let dir = docroot();
    with_server(dir.path(), |addr| async move {
        assert_eq!(roundtrip(addr, &get("/../../etc/passwd")).await.status, 403);
        assert_eq!(roundtrip(addr, &get("/%2e%2e%2fetc/passwd")).await.status, 403);

        let missing = roundtrip(addr, &get("/missing.txt")).await;
        assert_eq!(missing.status, 404);
        assert!(String::from_utf8_lossy(&missing.body).contains("Error 404"));
    })
    .await;
}

#[tokio::test]
async fn put_then_delete_round_trip() {
    let dir = docroot();
    let root = dir.path().to_path_buf();
    with_server(dir.path(), |addr| async move {
        let put = "PUT /notes.txt HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(roundtrip(addr, put).await.status, 201);
        assert_eq!(std::fs::read(root.join("notes.txt")).unwrap(), b"hello");

        let fetched = roundtrip(addr, &get("/notes.txt")).await;
        assert_eq!(fetched.body, b"hello");

        let delete = "DELETE /notes.txt HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert_eq!(roundtrip(addr, delete).await.status, 200);
        assert_eq!(roundtrip(addr, &get("/notes.txt")).await.status, 404);
    })
    .await;
}

#[tokio::test]
async fn saves_multipart_upload() {
    let dir = docroot();
    let root = dir.path().to_path_buf();
    with_server(dir.path(), |addr| async move {
        let body = "--b1\r\nContent-Disposition: form-data; name=\"f\"; filename=\"up.txt\"\r\n\r\nuploaded\r\n--b1--\r\n";
        let request = format!(
            "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary=b1\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let reply = roundtrip(addr, &request).await;
        assert_eq!(reply.status, 200);
        assert_eq!(std::fs::read(root.join("uploads/up.txt")).unwrap(), b"uploaded");

        let fetched = roundtrip(addr, &get("/uploads/up.txt")).await;
        assert_eq!(fetched.body, b"uploaded");
    })
    .await;
}

#[tokio::test]
async fn rejects_unsupported_methods() {
    let dir = docroot();
    with_server(dir.path(), |addr| async move {
        let request = "OPTIONS /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let reply = roundtrip(addr, request).await;
        assert_eq!(reply.status, 405);
        assert!(reply.has_header("allow: get, head, post, put, delete"));
    })
    .await;
}
