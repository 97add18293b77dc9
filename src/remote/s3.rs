//! S3 REST client (path-style addressing)
//!
//! Only put, head and delete. Uploads are streamed from disk with an
//! unsigned payload and an explicit Content-Length.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode, Url};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;
use tokio_util::io::ReaderStream;
use crate::core::{object_url, ObjectLocation};
use crate::error::{Result, SyncError};
use crate::remote::sigv4::{Signer, UNSIGNED_PAYLOAD};
use crate::remote::ObjectStore;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct S3Client {
    http: reqwest::Client,
    endpoint: String,
    signer: Signer,
    read_timeout: Duration,
}

impl S3Client {
    pub fn new(http: reqwest::Client, endpoint: &str, signer: Signer, read_timeout: Duration) -> Self {
        Self { http, endpoint: endpoint.trim_end_matches('/').to_string(), signer, read_timeout }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    fn url_for(&self, location: &ObjectLocation) -> Result<(String, Url)> {
        let raw = object_url(&self.endpoint, &location.bucket, &location.key);
        let url = Url::parse(&raw)
            .map_err(|e| SyncError::MalformedInput(format!("object url '{}': {}", raw, e)))?;
        Ok((raw, url))
    }

    /// Signed request with no body
    fn empty_request(&self, method: Method, url: Url) -> Result<reqwest::RequestBuilder> {
        let signed = [("x-amz-content-sha256", UNSIGNED_PAYLOAD)];
        let auth = self.signer.sign(method.as_str(), &url, &signed, UNSIGNED_PAYLOAD, Utc::now())?;

        let mut req = self.http.request(method, url).timeout(self.read_timeout);
        for (k, v) in signed {
            req = req.header(k, v);
        }
        for (k, v) in auth {
            req = req.header(k, v);
        }
        Ok(req)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_file(&self, location: &ObjectLocation, source: &Path, content_type: &str) -> Result<String> {
        let (locator, url) = self.url_for(location)?;

        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();
        let progress = Arc::new(Mutex::new(Instant::now()));
        let content_type = if content_type.trim().is_empty() { DEFAULT_CONTENT_TYPE } else { content_type.trim() };

        let signed = [
            ("x-amz-content-sha256", UNSIGNED_PAYLOAD),
            ("x-amz-acl", "private"),
            ("content-type", content_type),
        ];
        let auth = self.signer.sign("PUT", &url, &signed, UNSIGNED_PAYLOAD, Utc::now())?;

        let mut req = self.http
            .put(url)
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(ProgressReader::new(file, &progress))));
        for (k, v) in signed {
            req = req.header(k, v);
        }
        for (k, v) in auth {
            req = req.header(k, v);
        }

        // No overall cap: the upload only fails once the body stops moving, or
        // once the response is overdue after the last chunk went out.
        let send = req.send();
        tokio::pin!(send);
        let resp = loop {
            let deadline = last_read(&progress) + self.read_timeout;
            tokio::select! {
                resp = &mut send => break resp?,
                _ = tokio::time::sleep_until(deadline) => {
                    if last_read(&progress) + self.read_timeout <= Instant::now() {
                        tracing::warn!("[S3] Put {} stalled for {:?}", location, self.read_timeout);
                        return Err(SyncError::Transport(format!(
                            "timed out: upload of {} stalled for {:?}", location, self.read_timeout
                        )));
                    }
                }
            }
        };
        if !resp.status().is_success() {
            return Err(service_error("PutObject", resp).await);
        }

        tracing::debug!("[S3] Put {} ({} bytes)", location, length);
        Ok(locator)
    }

    async fn exists(&self, location: &ObjectLocation) -> Result<bool> {
        let (_, url) = self.url_for(location)?;
        let resp = self.empty_request(Method::HEAD, url)?.send().await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(service_error("HeadObject", resp).await),
        }
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<()> {
        let (_, url) = self.url_for(location)?;
        let resp = self.empty_request(Method::DELETE, url)?.send().await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(service_error("DeleteObject", resp).await),
        }
    }
}

/// Stamps `last` whenever a read completes, so the uploader can tell a slow
/// body from a stalled one.
struct ProgressReader<R> {
    inner: R,
    last: Arc<Mutex<Instant>>,
}

impl<R> ProgressReader<R> {
    fn new(inner: R, last: &Arc<Mutex<Instant>>) -> Self {
        Self { inner, last: Arc::clone(last) }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if poll.is_ready() {
            if let Ok(mut last) = self.last.lock() {
                *last = Instant::now();
            }
        }
        poll
    }
}

fn last_read(progress: &Mutex<Instant>) -> Instant {
    progress.lock().map(|last| *last).unwrap_or_else(|_| Instant::now())
}

pub(crate) async fn service_error(operation: &'static str, resp: reqwest::Response) -> SyncError {
    let status = resp.status().as_u16();
    let mut message = resp.text().await.unwrap_or_default();
    if message.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !message.is_char_boundary(cut) { cut -= 1; }
        message.truncate(cut);
    }
    SyncError::Service { operation, status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::remote::build_storage_client;
    use mockito::{Matcher, Server};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const BIG_FILE: usize = 32 * 1024 * 1024;

    fn client_at(endpoint: String) -> S3Client {
        let mut config = Config::default();
        config.storage.access_key_id = "AKID".into();
        config.storage.secret_access_key = "secret".into();
        config.storage.scheme = "http".into();
        config.storage.bucket = "media".into();
        config.storage.endpoint = Some(endpoint);
        build_storage_client(&config).unwrap()
    }

    fn client_for(server: &Server) -> S3Client {
        client_at(server.url())
    }

    /// Accepts one request, reads its body at most `chunk` bytes at a time with
    /// `pause` before each read, then answers 200. Yields the body size received.
    async fn draining_server(chunk: usize, pause: Duration) -> (String, JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; chunk];
            let mut head = Vec::new();
            let header_end = loop {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                head.extend_from_slice(&buf[..n]);
                if let Some(pos) = head.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let length = String::from_utf8_lossy(&head[..header_end])
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap())
                })
                .unwrap();

            let mut received = head.len() - header_end;
            while received < length {
                tokio::time::sleep(pause).await;
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received += n;
            }
            stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await.unwrap();
            received
        });

        (endpoint, handle)
    }

    fn big_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let source = dir.path().join("big.bin");
        std::fs::write(&source, vec![7u8; BIG_FILE]).unwrap();
        source
    }

    #[tokio::test]
    async fn test_put_streams_file_with_private_acl() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/media/5000/5123/42.jpg")
            .match_header("x-amz-acl", "private")
            .match_header("content-type", "image/jpeg")
            .match_header("content-length", "5")
            .match_header("authorization", Matcher::Regex("^AWS4-HMAC-SHA256 Credential=AKID/".into()))
            .match_body("hello")
            .with_status(200)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("42.jpg");
        std::fs::write(&source, "hello").unwrap();

        let client = client_for(&server);
        let locator = client
            .put_file(&ObjectLocation::new("media", "5000/5123/42.jpg"), &source, "image/jpeg")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(locator, format!("{}/media/5000/5123/42.jpg", server.url()));
        assert_eq!(
            crate::core::parse_locator(&locator).unwrap(),
            ObjectLocation::new("media", "5000/5123/42.jpg")
        );
    }

    #[tokio::test]
    async fn test_put_reports_permission_error() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/media/k.txt")
            .with_status(403)
            .with_body("<Error><Code>AccessDenied</Code></Error>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("k.txt");
        std::fs::write(&source, "x").unwrap();

        let err = client_for(&server)
            .put_file(&ObjectLocation::new("media", "k.txt"), &source, "")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Service { status: 403, operation: "PutObject", .. }));
    }

    #[tokio::test]
    async fn test_exists_maps_status() {
        let mut server = Server::new_async().await;
        server.mock("HEAD", "/media/present").with_status(200).create_async().await;
        server.mock("HEAD", "/media/absent").with_status(404).create_async().await;
        server.mock("HEAD", "/media/denied").with_status(403).create_async().await;

        let client = client_for(&server);
        assert!(client.exists(&ObjectLocation::new("media", "present")).await.unwrap());
        assert!(!client.exists(&ObjectLocation::new("media", "absent")).await.unwrap());
        assert!(client.exists(&ObjectLocation::new("media", "denied")).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_object() {
        let mut server = Server::new_async().await;
        server.mock("DELETE", "/media/gone").with_status(404).create_async().await;
        server.mock("DELETE", "/media/here").with_status(204).create_async().await;
        server.mock("DELETE", "/media/broken").with_status(500).create_async().await;

        let client = client_for(&server);
        assert!(client.delete(&ObjectLocation::new("media", "gone")).await.is_ok());
        assert!(client.delete(&ObjectLocation::new("media", "here")).await.is_ok());
        assert!(client.delete(&ObjectLocation::new("media", "broken")).await.is_err());
    }

    #[tokio::test]
    async fn test_slow_upload_outlives_read_timeout() {
        // 256 KiB per 20ms: at least 2.5s to drain the body
        let (endpoint, server) = draining_server(256 * 1024, Duration::from_millis(20)).await;
        let dir = tempfile::tempdir().unwrap();
        let source = big_file(&dir);

        let client = client_at(endpoint).with_read_timeout(Duration::from_secs(2));
        let started = Instant::now();
        let locator = client
            .put_file(&ObjectLocation::new("media", "1/7/9.bin"), &source, "")
            .await
            .unwrap();

        assert!(started.elapsed() > client.read_timeout());
        assert!(locator.ends_with("/media/1/7/9.bin"));
        assert_eq!(server.await.unwrap(), BIG_FILE);
    }

    #[tokio::test]
    async fn test_stalled_upload_times_out() {
        // Reads the headers, then goes quiet
        let (endpoint, server) = draining_server(64 * 1024, Duration::from_secs(60)).await;
        let dir = tempfile::tempdir().unwrap();
        let source = big_file(&dir);

        let client = client_at(endpoint).with_read_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let err = client
            .put_file(&ObjectLocation::new("media", "1/7/9.bin"), &source, "")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)), "got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(10));
        server.abort();
    }

    #[tokio::test]
    async fn test_head_bounded_by_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(stream);
        });

        let client = client_at(endpoint).with_read_timeout(Duration::from_millis(300));
        let err = client.exists(&ObjectLocation::new("media", "k")).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)), "got {:?}", err);
        server.abort();
    }
}
