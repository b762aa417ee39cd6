//! Direct-link HTTP fetcher.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex_lite::Regex;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use url::Url;

use super::error::TransferError;
use super::part_path;
use super::traits::Fetcher;
use super::types::FetchedArtifact;
use crate::config::FetchConfig;

/// Downloads a URL straight to disk.
///
/// The body is streamed into a hidden per-attempt `.part` file and renamed
/// once complete, so an interrupted download never shows up under its final
/// name and leaves nothing behind.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| TransferError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a fetcher with default configuration.
    pub fn with_defaults() -> Result<Self, TransferError> {
        Self::new(&FetchConfig::default())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<FetchedArtifact, TransferError> {
        let url = Url::parse(source.trim()).map_err(|e| TransferError::InvalidSource {
            source_ref: source.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransferError::InvalidSource {
                source_ref: source.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let file_name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(&url))
            .unwrap_or_else(|| format!("download_{}", chrono::Utc::now().timestamp()));

        fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| TransferError::io(dest_dir, e))?;

        let final_path = dest_dir.join(&file_name);
        let part = part_path(&final_path);
        debug!("Downloading {} to {}", url, part.display());

        let written = match write_body(response, &part).await {
            Ok(bytes) => fs::rename(&part, &final_path)
                .await
                .map(|_| bytes)
                .map_err(|e| TransferError::io(&final_path, e)),
            Err(e) => Err(e),
        };
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                return Err(e);
            }
        };

        info!("Downloaded {} ({} bytes) to {}", url, bytes, final_path.display());
        Ok(FetchedArtifact {
            path: final_path,
            bytes,
        })
    }
}

/// Streams the response body into `part_path` and syncs it to disk.
async fn write_body(response: reqwest::Response, part_path: &Path) -> Result<u64, TransferError> {
    let file = File::create(part_path)
        .await
        .map_err(|e| TransferError::io(part_path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(part_path, e))?;
        bytes += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| TransferError::io(part_path, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| TransferError::io(part_path, e))?;
    Ok(bytes)
}

/// Extracts a file name from a `Content-Disposition` header value.
fn filename_from_disposition(header: &str) -> Option<String> {
    let extended = Regex::new(r#"(?i)filename\*\s*=\s*(?:[\w-]+'[^']*')?"?([^";]+)"?"#).ok()?;
    if let Some(caps) = extended.captures(header) {
        let raw = caps.get(1)?.as_str();
        let decoded = urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        if let Some(name) = sanitize_file_name(&decoded) {
            return Some(name);
        }
    }

    let plain = Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).ok()?;
    plain
        .captures(header)
        .and_then(|caps| caps.get(1))
        .and_then(|m| sanitize_file_name(m.as_str()))
}

/// Last path segment of the URL, percent-decoded.
fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    sanitize_file_name(&decoded)
}

/// Reduce a server-supplied name to a single safe path component.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name
        .trim()
        .trim_matches(['"', '\''])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_disposition_plain() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="Episode 01.mp4""#),
            Some("Episode 01.mp4".to_string())
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=clip.mkv"),
            Some("clip.mkv".to_string())
        );
    }

    #[test]
    fn test_disposition_extended_wins() {
        assert_eq!(
            filename_from_disposition(
                "attachment; filename=\"fallback.bin\"; filename*=UTF-8''caf%C3%A9.mp4"
            ),
            Some("café.mp4".to_string())
        );
    }

    #[test]
    fn test_disposition_strips_directories() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="../../etc/passwd""#),
            Some("passwd".to_string())
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn test_filename_from_url() {
        let url = Url::parse("https://cdn.example/show/Ep%2001.mp4?token=x").unwrap();
        assert_eq!(filename_from_url(&url), Some("Ep 01.mp4".to_string()));

        let bare = Url::parse("https://cdn.example/").unwrap();
        assert_eq!(filename_from_url(&bare), None);
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let dir = TempDir::new().unwrap();
        let fetcher = HttpFetcher::with_defaults().unwrap();
        let err = fetcher.fetch("ftp://a.example/x", dir.path()).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidSource { .. }));
        assert!(!err.is_retryable());
    }

    /// Serves one canned HTTP response on a local port.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut seen = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_streams_to_disk() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\n\
             Content-Length: 5\r\n\
             Content-Disposition: attachment; filename=\"clip.mp4\"\r\n\
             Connection: close\r\n\r\nhello",
        )
        .await;
        let dir = TempDir::new().unwrap();
        let fetcher = HttpFetcher::with_defaults().unwrap();

        let artifact = fetcher
            .fetch(&format!("{}/show/ignored.bin", base), dir.path())
            .await
            .unwrap();

        assert_eq!(artifact.path, dir.path().join("clip.mp4"));
        assert_eq!(artifact.bytes, 5);
        assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), "hello");
        assert_eq!(entries(dir.path()), vec!["clip.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_truncated_body_leaves_no_part_file() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\n\
             Content-Length: 100\r\n\
             Connection: close\r\n\r\nshort",
        )
        .await;
        let dir = TempDir::new().unwrap();
        let fetcher = HttpFetcher::with_defaults().unwrap();

        let result = fetcher
            .fetch(&format!("{}/show/video.bin", base), dir.path())
            .await;
        assert!(result.is_err());
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_fetches_of_same_name_do_not_collide() {
        let first = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nfirst",
        )
        .await;
        let second = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\nsecond",
        )
        .await;
        let shared = TempDir::new().unwrap();
        let fetcher = HttpFetcher::with_defaults().unwrap();

        let url_a = format!("{}/show/a/video.bin", first);
        let url_b = format!("{}/show/b/video.bin", second);
        let (a, b) = tokio::join!(
            fetcher.fetch(&url_a, shared.path()),
            fetcher.fetch(&url_b, shared.path())
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.path, b.path);
        let body = std::fs::read_to_string(&a.path).unwrap();
        assert!(body == "first" || body == "second", "mixed body {:?}", body);
        assert_eq!(entries(shared.path()), vec!["video.bin".to_string()]);
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_fetch_maps_http_status() {
        let base = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let dir = TempDir::new().unwrap();
        let fetcher = HttpFetcher::with_defaults().unwrap();

        let err = fetcher
            .fetch(&format!("{}/file.bin", base), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Http { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
