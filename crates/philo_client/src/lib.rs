//! Streaming question-answering session client.
//! Drives a conversation against the service, keeps the transcript and
//! exports it as Markdown or plain text. Used by the `philo` terminal front end.

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod export;
pub mod messages;
pub mod render;
pub mod session;
pub mod transcript;

pub use client::{ByteStream, HttpClient, Transport};
pub use config::{default_config_path, AskSection, Config, ConfigError, ExportSection, ServerSection};
pub use decoder::{DecodedStream, DiagnosticHook, StreamDecoder};
pub use error::{MalformedRecord, SessionError, TransportError};
pub use export::{Document, ExportFormat, ExportLabels};
pub use messages::{Identity, ProviderInfo, StreamEvent};
pub use render::{Presenter, RenderIntent};
pub use session::{AbortHandle, AskDefaults, AskOptions, ExchangeOutcome, Session, SessionState};
pub use transcript::{Exchange, Handle, Message, MessageStatus, Role, Transcript};
