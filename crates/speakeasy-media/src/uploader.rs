//! HTTP upload to the analysis service.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::future::Either;
use reqwest::multipart;
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use speakeasy_config::{ConfigError, ServiceApi, ServiceConfig};
use speakeasy_types::{ArtifactSource, UploadCandidate};

use crate::error::AnalysisError;
use crate::types::{AnalysisService, ProgressReporter, UploadRequest};

/// Size of each body chunk handed to the transport.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ServiceSetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Analysis service reached over HTTP multipart.
pub struct HttpAnalysisService {
    endpoint: url::Url,
    health: url::Url,
    api: ServiceApi,
    client: reqwest::Client,
}

impl HttpAnalysisService {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceSetupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.analyze_url()?,
            health: config.health_url()?,
            api: config.api,
            client,
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// Query the health endpoint and return its `status` string.
    pub async fn health(&self) -> Result<String, AnalysisError> {
        let resp = self
            .client
            .get(self.health.clone())
            .send()
            .await
            .map_err(AnalysisError::network)?;

        let status = resp.status();
        let json = read_json(resp).await;
        if !status.is_success() {
            return Err(AnalysisError::service(status.as_u16(), error_message(json.as_ref())));
        }

        Ok(json
            .as_ref()
            .and_then(|j| j.get("status"))
            .and_then(|s| s.as_str())
            .unwrap_or("unknown")
            .to_string())
    }

    /// Build the multipart body, streaming the artifact through `progress`.
    async fn build_form(
        &self,
        request: UploadRequest,
        mut progress: ProgressReporter,
    ) -> Result<multipart::Form, AnalysisError> {
        let UploadRequest {
            candidate,
            speech_purpose,
        } = request;

        let chunks = match &candidate.source {
            ArtifactSource::File { path } => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    AnalysisError::network(format!("Could not read {}: {e}", path.display()))
                })?;
                Either::Left(ReaderStream::with_capacity(file, CHUNK_SIZE))
            }
            ArtifactSource::Memory { data } => {
                Either::Right(futures::stream::iter(split_chunks(data).into_iter().map(Ok::<Bytes, std::io::Error>)))
            }
        };

        progress.set_total(candidate.size_bytes);
        progress.report(0);
        let tracked = chunks.map(move |chunk: std::io::Result<Bytes>| {
            if let Ok(bytes) = &chunk {
                progress.advance(bytes.len() as u64);
            }
            chunk
        });

        let part = file_part(&candidate, reqwest::Body::wrap_stream(tracked))?;
        let mut form = multipart::Form::new().part(self.api.file_field(), part);
        if let Some(purpose) = speech_purpose.filter(|p| !p.trim().is_empty()) {
            form = form.text("speech_purpose", purpose);
        }
        Ok(form)
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    fn id(&self) -> &str {
        "http"
    }

    async fn analyze(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<Value, AnalysisError> {
        let file_name = request.candidate.file_name.clone();
        let size_bytes = request.candidate.size_bytes;
        let mut finisher = progress.clone();

        let form = self.build_form(request, progress).await?;

        info!(endpoint = %self.endpoint, file = %file_name, size_bytes, "Uploading artifact");
        let resp = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, "Upload failed: {e}");
                AnalysisError::network(e)
            })?;
        finisher.complete();

        let status = resp.status();
        let json = read_json(resp).await;

        if !status.is_success() {
            let message = error_message(json.as_ref());
            warn!(status = status.as_u16(), ?message, "Analysis service returned an error");
            return Err(AnalysisError::service(status.as_u16(), message));
        }

        json.ok_or_else(|| {
            warn!(status = status.as_u16(), "Analysis response was not JSON");
            AnalysisError::service(
                status.as_u16(),
                Some("The analysis service returned an unreadable response.".to_string()),
            )
        })
    }
}

fn file_part(candidate: &UploadCandidate, body: reqwest::Body) -> Result<multipart::Part, AnalysisError> {
    multipart::Part::stream_with_length(body, candidate.size_bytes)
        .file_name(candidate.file_name.clone())
        .mime_str(&candidate.mime_type)
        .map_err(|_| AnalysisError::Validation {
            mime_type: candidate.mime_type.clone(),
        })
}

/// Split an in-memory artifact into transport-sized slices without copying.
fn split_chunks(data: &Bytes) -> Vec<Bytes> {
    (0..data.len())
        .step_by(CHUNK_SIZE)
        .map(|start| data.slice(start..(start + CHUNK_SIZE).min(data.len())))
        .collect()
}

async fn read_json(resp: reqwest::Response) -> Option<Value> {
    let text = resp.text().await.ok()?;
    serde_json::from_str(&text).ok()
}

/// Pull a user-facing message from `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn error_message(json: Option<&Value>) -> Option<String> {
    let error = json?.get("error")?;
    error
        .as_str()
        .or_else(|| error.get("message").and_then(|m| m.as_str()))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn service(base_url: String, api: ServiceApi) -> HttpAnalysisService {
        HttpAnalysisService::from_config(&ServiceConfig {
            base_url,
            api,
            timeout_secs: 10,
        })
        .unwrap()
    }

    /// Echo back what arrived so the test can inspect the multipart body.
    async fn echo(mut multipart: Multipart) -> Json<Value> {
        let mut fields = serde_json::Map::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.unwrap();
            fields.insert(
                name,
                json!({
                    "file_name": file_name,
                    "content_type": content_type,
                    "len": data.len(),
                    "text": String::from_utf8_lossy(&data),
                }),
            );
        }
        Json(json!({ "results": { "audio_grades": { "word_count": 3 } }, "echo": fields }))
    }

    fn reporter() -> (ProgressReporter, mpsc::UnboundedReceiver<crate::ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProgressReporter::new(Uuid::new_v4(), tx), rx)
    }

    fn percents(rx: &mut mpsc::UnboundedReceiver<crate::ProgressUpdate>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update.percent);
        }
        out
    }

    #[test]
    fn test_split_chunks() {
        let data = Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 10]);
        let chunks = split_chunks(&data);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 10);
        assert!(split_chunks(&Bytes::new()).is_empty());
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(Some(&json!({"error": "model unavailable"}))),
            Some("model unavailable".into())
        );
        assert_eq!(
            error_message(Some(&json!({"error": {"message": "quota"}}))),
            Some("quota".into())
        );
        assert_eq!(error_message(Some(&json!({"detail": "x"}))), None);
        assert_eq!(error_message(None), None);
    }

    #[tokio::test]
    async fn test_upload_file_with_progress() {
        let base = serve(Router::new().route("/process", post(echo))).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.mp4");
        std::fs::write(&path, vec![1u8; 200 * 1024]).unwrap();

        let candidate = crate::validator::candidate_from_path(&path).await.unwrap();
        let (progress, mut rx) = reporter();
        let json = service(base, ServiceApi::Process)
            .analyze(
                UploadRequest {
                    candidate,
                    speech_purpose: Some("job interview".into()),
                },
                progress,
            )
            .await
            .unwrap();

        let file = &json["echo"]["file"];
        assert_eq!(file["file_name"], "speech.mp4");
        assert_eq!(file["content_type"], "video/mp4");
        assert_eq!(file["len"], 200 * 1024);
        assert_eq!(json["echo"]["speech_purpose"]["text"], "job interview");

        let seen = percents(&mut rx);
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.len() > 2);
    }

    #[tokio::test]
    async fn test_upload_memory_uses_video_field() {
        let base = serve(Router::new().route("/api/analyze", post(echo))).await;
        let candidate = UploadCandidate::from_memory(
            "recording.webm",
            "video/webm",
            Bytes::from(vec![9u8; 1000]),
        );
        let (progress, mut rx) = reporter();
        let json = service(base, ServiceApi::Analyze)
            .analyze(
                UploadRequest {
                    candidate,
                    speech_purpose: None,
                },
                progress,
            )
            .await
            .unwrap();

        assert_eq!(json["echo"]["video"]["len"], 1000);
        assert!(json["echo"].get("speech_purpose").is_none());
        assert_eq!(percents(&mut rx).last(), Some(&100));
    }

    #[tokio::test]
    async fn test_service_error_message_surfaces() {
        let router = Router::new().route(
            "/process",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "model unavailable"})),
                )
            }),
        );
        let base = serve(router).await;
        let candidate =
            UploadCandidate::from_memory("a.mp4", "video/mp4", Bytes::from_static(b"abc"));
        let (progress, _rx) = reporter();
        let err = service(base, ServiceApi::Process)
            .analyze(
                UploadRequest {
                    candidate,
                    speech_purpose: None,
                },
                progress,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AnalysisError::Service {
                status: 500,
                message: "model unavailable".into()
            }
        );
    }

    #[tokio::test]
    async fn test_service_error_without_body_uses_fallback() {
        let router = Router::new().route(
            "/process",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = serve(router).await;
        let candidate =
            UploadCandidate::from_memory("a.mp4", "video/mp4", Bytes::from_static(b"abc"));
        let (progress, _rx) = reporter();
        let err = service(base, ServiceApi::Process)
            .analyze(
                UploadRequest {
                    candidate,
                    speech_purpose: None,
                },
                progress,
            )
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), crate::error::GENERIC_FAILURE_MESSAGE);
        assert!(matches!(err, AnalysisError::Service { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let candidate =
            UploadCandidate::from_memory("a.mp4", "video/mp4", Bytes::from_static(b"abc"));
        let (progress, _rx) = reporter();
        let err = service(format!("http://{addr}"), ServiceApi::Process)
            .analyze(
                UploadRequest {
                    candidate,
                    speech_purpose: None,
                },
                progress,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Network { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_file_uses_generic_message() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = UploadCandidate {
            source: ArtifactSource::File {
                path: dir.path().join("gone.mp4"),
            },
            file_name: "gone.mp4".into(),
            size_bytes: 10,
            mime_type: "video/mp4".into(),
        };
        let (progress, mut rx) = reporter();
        let err = service("http://127.0.0.1:9".into(), ServiceApi::Process)
            .analyze(
                UploadRequest {
                    candidate,
                    speech_purpose: None,
                },
                progress,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AnalysisError::Network {
                message: crate::error::GENERIC_FAILURE_MESSAGE.into()
            }
        );
        assert!(percents(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let router = Router::new().route(
            "/api/health",
            get(|| async { Json(json!({"status": "healthy"})) }),
        );
        let base = serve(router).await;
        let status = service(base, ServiceApi::Process).health().await.unwrap();
        assert_eq!(status, "healthy");
    }
}
