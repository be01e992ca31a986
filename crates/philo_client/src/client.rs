//! Transport capability: the calls the session controller makes against the
//! question-answering service, and the HTTP implementation of them.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::messages::{
    AskRequest, ErrorBody, Identity, LoginRequest, LoginResponse, ProviderInfo,
    ProvidersResponse, UploadResponse,
};

/// Raw answer fragments in arrival order. The stream ending is the end signal.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn list_providers(&self) -> Result<Vec<ProviderInfo>, TransportError>;

    async fn check_identity(&self) -> Result<Identity, TransportError>;

    async fn login(&self, name: &str) -> Result<Identity, TransportError>;

    async fn logout(&self) -> Result<(), TransportError>;

    /// Convert a document to plain text. Returns the extracted text.
    async fn upload_document(&self, filename: &str, bytes: Vec<u8>)
        -> Result<String, TransportError>;

    /// Start an answer stream. Fails before any fragment is yielded when the
    /// service does not accept the request.
    async fn stream_answer(&self, request: &AskRequest<'_>) -> Result<ByteStream, TransportError>;
}

/// HTTP client for the service. Keeps cookies so the identity session survives
/// between calls.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Client for the service at `base_url` (e.g. `http://127.0.0.1:5000`).
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_connect_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_connect_timeout(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Map a non-2xx response to an error, preferring the service's `{"error": ...}` body.
async fn check_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "service returned an error status");
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) if status.is_client_error() => Err(TransportError::Remote(parsed.error)),
        Ok(parsed) => Err(TransportError::Status {
            status: status.as_u16(),
            body: parsed.error,
        }),
        Err(_) => Err(TransportError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn list_providers(&self) -> Result<Vec<ProviderInfo>, TransportError> {
        let resp = self.http.get(self.url("/api/providers")).send().await?;
        let body: ProvidersResponse = check_status(resp).await?.json().await?;
        debug!(count = body.providers.len(), "loaded providers");
        Ok(body.providers)
    }

    async fn check_identity(&self) -> Result<Identity, TransportError> {
        let resp = self.http.get(self.url("/api/check-session")).send().await?;
        Ok(check_status(resp).await?.json().await?)
    }

    async fn login(&self, name: &str) -> Result<Identity, TransportError> {
        let resp = self
            .http
            .post(self.url("/api/login"))
            .json(&LoginRequest { username: name })
            .send()
            .await?;
        let body: LoginResponse = check_status(resp).await?.json().await?;
        if !body.success {
            return Err(TransportError::Remote(
                body.error.unwrap_or_else(|| "login rejected".into()),
            ));
        }
        Ok(Identity {
            logged_in: true,
            name: body.username.or_else(|| Some(name.to_string())),
        })
    }

    async fn logout(&self) -> Result<(), TransportError> {
        let resp = self.http.post(self.url("/api/logout")).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn upload_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, TransportError> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let resp = self
            .http
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        let body: UploadResponse = check_status(resp).await?.json().await?;
        match (body.text, body.error) {
            (Some(text), _) => Ok(text),
            (None, Some(error)) => Err(TransportError::Remote(error)),
            (None, None) => Err(TransportError::Remote("upload returned no text".into())),
        }
    }

    async fn stream_answer(&self, request: &AskRequest<'_>) -> Result<ByteStream, TransportError> {
        debug!(provider = request.provider, model = request.model, mode = request.mode, "opening answer stream");
        let resp = self
            .http
            .post(self.url("/api/ask"))
            .json(request)
            .send()
            .await?;
        // A refused ask is a failure to open the stream, never a service-side answer.
        let status = resp.status().as_u16();
        let resp = check_status(resp).await.map_err(|e| match e {
            TransportError::Remote(body) => TransportError::Status { status, body },
            other => other,
        })?;
        Ok(Box::pin(
            resp.bytes_stream().map(|chunk| chunk.map_err(TransportError::from)),
        ))
    }
}
