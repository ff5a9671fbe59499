//! HTTP upload transport.
//!
//! POSTs `{"image": "<base64 jpeg>"}` to the configured endpoint, which
//! answers `{"key", "url"}` on success or `{"error", "message"}` otherwise.
//! Server errors and network failures are retried with exponential backoff;
//! client errors are final.

use crate::config::Config;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use snapbooth_core::{CapturedImage, ConfigError, RetrievalDescriptor, UploadError, UploadTransport};
use std::time::Duration;
use uuid::Uuid;

const JPEG_MAGIC: [u8; 2] = [0xFF, 0xD8];
const MAX_JITTER: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub url: String,
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
    pub max_image_bytes: usize,
}

impl HttpSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let url = config
            .upload_url
            .clone()
            .ok_or(ConfigError::Missing("upload_url"))?;
        Ok(Self {
            url,
            timeout: Duration::from_secs(config.upload_timeout_secs),
            retries: config.upload_retries,
            backoff: Duration::from_millis(config.upload_backoff_ms),
            max_image_bytes: config.max_image_bytes,
        })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Why a single attempt failed.
enum Attempt {
    Retry(String),
    Fatal(String),
}

pub struct HttpTransport {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("snapboothd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, settings })
    }

    /// Reject what the endpoint would reject before spending a request.
    fn validate(&self, bytes: &[u8]) -> Result<(), UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::InvalidImage("Empty image payload".into()));
        }
        if bytes.len() > self.settings.max_image_bytes {
            return Err(UploadError::ImageTooLarge {
                size: bytes.len(),
                limit: self.settings.max_image_bytes,
            });
        }
        if !bytes.starts_with(&JPEG_MAGIC) {
            return Err(UploadError::InvalidImage("image is not a JPEG".into()));
        }
        Ok(())
    }

    async fn attempt(
        &self,
        body: &serde_json::Value,
        request_id: &str,
    ) -> Result<RetrievalDescriptor, Attempt> {
        let response = self
            .client
            .post(&self.settings.url)
            .header("X-Request-Id", request_id)
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Retry(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<RetrievalDescriptor>()
                .await
                .map_err(|e| Attempt::Fatal(format!("malformed upload response: {e}")));
        }

        let text = response.text().await.unwrap_or_default();
        let reason = error_reason(status, &text);
        if status.is_server_error() {
            Err(Attempt::Retry(reason))
        } else {
            Err(Attempt::Fatal(reason))
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        let base = self.settings.backoff.saturating_mul(1u32 << retry.min(16));
        let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER);
        base.mul_f64(1.0 + jitter)
    }
}

fn error_reason(status: StatusCode, text: &str) -> String {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        _ => format!("upload endpoint returned {status}"),
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(&self, image: &CapturedImage) -> Result<RetrievalDescriptor, UploadError> {
        self.validate(image.as_bytes())?;

        let body = serde_json::json!({ "image": STANDARD.encode(image.as_bytes()) });
        // Same id on every retry so the endpoint can deduplicate.
        let request_id = Uuid::new_v4().to_string();
        let session = image.session();

        let mut retry = 0;
        loop {
            match self.attempt(&body, &request_id).await {
                Ok(descriptor) => return Ok(descriptor),
                Err(Attempt::Fatal(reason)) => {
                    tracing::warn!(%session, request_id = %request_id, %reason, "upload rejected");
                    return Err(UploadError::Failed(reason));
                }
                Err(Attempt::Retry(reason)) if retry < self.settings.retries => {
                    let delay = self.delay(retry);
                    retry += 1;
                    tracing::warn!(
                        %session,
                        request_id = %request_id,
                        %reason,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "upload attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Attempt::Retry(reason)) => {
                    return Err(UploadError::Failed(format!(
                        "{reason} (gave up after {} attempts)",
                        retry + 1
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapbooth_core::SessionId;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn settings(url: String) -> HttpSettings {
        HttpSettings {
            url,
            timeout: Duration::from_secs(5),
            retries: 2,
            backoff: Duration::from_millis(1),
            max_image_bytes: 64,
        }
    }

    fn jpeg() -> CapturedImage {
        CapturedImage::new(SessionId(1), vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3])
    }

    /// Seen by the fake endpoint: request id header and decoded body.
    #[derive(Debug, Clone)]
    struct Seen {
        request_id: String,
        body: serde_json::Value,
    }

    /// Serve one scripted `(status, body)` response per connection.
    async fn endpoint(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/upload", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        (url, seen)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> Seen {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let header = |name: &str| {
            head.lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case(name).then(|| v.trim().to_string())
                })
                .unwrap_or_default()
        };
        let length: usize = header("content-length").parse().unwrap();
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }
        Seen {
            request_id: header("x-request-id"),
            body: serde_json::from_slice(&buf[header_end..header_end + length]).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_success_returns_descriptor() {
        let (url, seen) = endpoint(vec![(
            200,
            r#"{"key":"photos/abc.jpg","url":"https://cdn.example.test/abc.jpg"}"#,
        )])
        .await;
        let transport = HttpTransport::new(settings(url)).unwrap();

        let descriptor = transport.send(&jpeg()).await.unwrap();
        assert_eq!(descriptor.key, "photos/abc.jpg");
        assert_eq!(descriptor.url, "https://cdn.example.test/abc.jpg");

        let seen = seen.lock().unwrap();
        let sent = STANDARD
            .decode(seen[0].body["image"].as_str().unwrap())
            .unwrap();
        assert_eq!(sent, jpeg().as_bytes());
    }

    #[tokio::test]
    async fn test_server_errors_retry_with_same_request_id() {
        let (url, seen) = endpoint(vec![
            (502, r#"{"error":"UploadFailed","message":"bucket unavailable"}"#),
            (500, "oops"),
            (200, r#"{"key":"k","url":"https://cdn.example.test/k"}"#),
        ])
        .await;
        let transport = HttpTransport::new(settings(url)).unwrap();

        let descriptor = transport.send(&jpeg()).await.unwrap();
        assert_eq!(descriptor.key, "k");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(!seen[0].request_id.is_empty());
        assert!(seen.iter().all(|s| s.request_id == seen[0].request_id));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (url, seen) = endpoint(vec![
            (503, r#"{"message":"try later"}"#),
            (503, r#"{"message":"try later"}"#),
            (503, r#"{"message":"try later"}"#),
        ])
        .await;
        let transport = HttpTransport::new(settings(url)).unwrap();

        let err = transport.send(&jpeg()).await.unwrap_err();
        match err {
            UploadError::Failed(reason) => {
                assert!(reason.contains("try later"), "{reason}");
                assert!(reason.contains("3 attempts"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_final() {
        let (url, seen) = endpoint(vec![(
            400,
            r#"{"error":"InvalidImage","message":"Image must be a JPEG"}"#,
        )])
        .await;
        let transport = HttpTransport::new(settings(url)).unwrap();

        let err = transport.send(&jpeg()).await.unwrap_err();
        assert_eq!(err, UploadError::Failed("Image must be a JPEG".into()));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_local_validation_skips_network() {
        // Nothing listens here; validation must fail first.
        let transport = HttpTransport::new(settings("http://127.0.0.1:9/upload".into())).unwrap();

        let empty = CapturedImage::new(SessionId(1), Vec::new());
        assert!(matches!(
            transport.send(&empty).await,
            Err(UploadError::InvalidImage(_))
        ));

        let png = CapturedImage::new(SessionId(2), vec![0x89, b'P', b'N', b'G']);
        assert_eq!(
            transport.send(&png).await,
            Err(UploadError::InvalidImage("image is not a JPEG".into()))
        );

        let huge = CapturedImage::new(SessionId(3), [&JPEG_MAGIC[..], &[0u8; 100]].concat());
        assert_eq!(
            transport.send(&huge).await,
            Err(UploadError::ImageTooLarge {
                size: 102,
                limit: 64
            })
        );
    }

    #[test]
    fn test_error_reason_fallbacks() {
        assert_eq!(
            error_reason(StatusCode::BAD_REQUEST, r#"{"error":"MissingImage"}"#),
            "MissingImage"
        );
        assert_eq!(
            error_reason(StatusCode::BAD_GATEWAY, "<html>"),
            "upload endpoint returned 502 Bad Gateway"
        );
    }

    #[test]
    fn test_backoff_grows_with_bounded_jitter() {
        let mut s = settings("http://unused".into());
        s.backoff = Duration::from_millis(100);
        let transport = HttpTransport::new(s).unwrap();
        for retry in 0..3 {
            let base = Duration::from_millis(100 * (1 << retry));
            let delay = transport.delay(retry);
            assert!(delay >= base && delay <= base.mul_f64(1.0 + MAX_JITTER));
        }
    }
}
