//! Remote input downloads
//!
//! Inputs given as URLs are downloaded into temporary files before the
//! worker sees them. The files are removed when the returned [`TempPath`]
//! is dropped.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ClientError, Result};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Downloads a remote input into a local temporary file
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<TempPath>;
}

/// Plain HTTP(S) downloader
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<TempPath> {
        let parsed =
            Url::parse(url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", url, e)))?;

        let suffix = file_suffix(&parsed);
        let mut response = self.client.get(parsed).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status.as_u16(), body));
        }

        let path = tempfile::Builder::new()
            .prefix("input-")
            .suffix(&suffix)
            .tempfile()?
            .into_temp_path();
        let mut file = tokio::fs::File::create(&path).await?;

        let mut written = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        debug!("Downloaded {} bytes from {}", written, url);

        Ok(path)
    }
}

/// Extension of the last path segment, dot included, so the worker can
/// sniff the format from the local file name
fn file_suffix(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| format!(".{}", ext))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_suffix() {
        let url = Url::parse("https://x.test/images/cat.png?sig=1").unwrap();
        assert_eq!(file_suffix(&url), ".png");

        let url = Url::parse("https://x.test/images/cat").unwrap();
        assert_eq!(file_suffix(&url), "");

        let url = Url::parse("https://x.test/").unwrap();
        assert_eq!(file_suffix(&url), "");
    }

    /// Serves `body` once over a bare HTTP/1.1 connection
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            let reply = format!(
                "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/inputs/cat.txt", addr)
    }

    #[tokio::test]
    async fn test_fetch_writes_body_to_temp_file() {
        let url = serve_once("200 OK", "meow").await;
        let fetcher = HttpFetcher::new().unwrap();

        let path = fetcher.fetch(&url).await.unwrap();

        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("txt"));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "meow");
        let kept = path.to_path_buf();
        drop(path);
        assert!(!kept.exists());
    }

    #[tokio::test]
    async fn test_fetch_reports_http_errors() {
        let url = serve_once("404 Not Found", "no such input").await;
        let fetcher = HttpFetcher::new().unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, ClientError::ApiError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let fetcher = HttpFetcher::with_client(Client::new());
        let err = fetcher.fetch("::not a url::").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }
}
