//! HTTP/JSON message types exchanged with the question-answering service.

use serde::{Deserialize, Serialize};

/// Client → server: body of `POST /api/ask`.
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
    pub provider: &'a str,
    pub model: &'a str,
    pub mode: &'a str,
}

/// Client → server: body of `POST /api/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
}

/// One answer provider and the models it offers, in service order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub models: Vec<String>,
}

/// Server → client: `GET /api/providers`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersResponse {
    #[serde(default)]
    pub providers: Vec<ProviderInfo>,
}

/// Server → client: `GET /api/check-session`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub logged_in: bool,
    #[serde(default, rename = "username")]
    pub name: Option<String>,
}

/// Server → client: `POST /api/login` and `POST /api/logout`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Server → client: `POST /api/upload`. Exactly one field is set.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Server → client: error body on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// One decoded unit of the answer stream. The JSON `type` field is the
/// discriminator and `data` carries the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Token(String),
    Sources(Vec<String>),
    Done,
    /// Reported by the service when a provider is unavailable or fails.
    Error(String),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Token(_) => "token",
            StreamEvent::Sources(_) => "sources",
            StreamEvent::Done => "done",
            StreamEvent::Error(_) => "error",
        }
    }
}
