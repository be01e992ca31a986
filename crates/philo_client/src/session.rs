//! Session controller: drives one conversation against the service.
//!
//! One exchange runs at a time: `Idle → Submitting → Streaming → Finalizing → Idle`.
//! A failure or abort at any point settles the placeholder and returns to
//! `Idle` without offering export for that exchange.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Transport;
use crate::decoder::{DecodedStream, DiagnosticHook, StreamDecoder};
use crate::error::SessionError;
use crate::export::{self, Document, ExportFormat, ExportLabels};
use crate::messages::{AskRequest, Identity, ProviderInfo, StreamEvent};
use crate::render::{Presenter, RenderIntent, PENDING_TEXT};
use crate::transcript::{Handle, Message, MessageStatus, Role, Transcript};

/// Suffix written into an answer that was aborted.
pub const CANCELLED_MARK: &str = "[cancelled]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Submitting,
    Streaming,
    Finalizing,
}

/// Values used when a submission leaves provider, model or mode unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskDefaults {
    pub provider: String,
    /// Empty means the provider's default model.
    pub model: String,
    pub mode: String,
}

impl Default for AskDefaults {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: String::new(),
            mode: "basic".into(),
        }
    }
}

/// Per-submission overrides, passed to the service unmodified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AskOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub mode: Option<String>,
}

impl AskOptions {
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }
}

/// How an exchange ended. Every variant carries the assistant message handle.
#[derive(Debug)]
pub enum ExchangeOutcome {
    Completed(Handle),
    Failed { handle: Handle, error: SessionError },
    Cancelled(Handle),
    /// The stream closed before the completion signal.
    Incomplete(Handle),
}

impl ExchangeOutcome {
    pub fn handle(&self) -> Handle {
        match self {
            ExchangeOutcome::Completed(h)
            | ExchangeOutcome::Cancelled(h)
            | ExchangeOutcome::Incomplete(h)
            | ExchangeOutcome::Failed { handle: h, .. } => *h,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExchangeOutcome::Completed(_))
    }
}

/// Aborts the exchange currently in flight. Cloneable and usable from any task.
///
/// Aborting while idle has no effect on later exchanges.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Install a fresh token for a new exchange.
    fn arm(&self) -> CancellationToken {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = CancellationToken::new();
        guard.clone()
    }
}

pub struct Session<T, P> {
    transport: T,
    presenter: P,
    transcript: Transcript,
    state: SessionState,
    defaults: AskDefaults,
    labels: ExportLabels,
    providers: Option<Vec<ProviderInfo>>,
    abort: AbortHandle,
    diagnostics: Option<DiagnosticHook>,
}

impl<T: Transport, P: Presenter> Session<T, P> {
    pub fn new(transport: T, presenter: P) -> Self {
        Self {
            transport,
            presenter,
            transcript: Transcript::new(),
            state: SessionState::Idle,
            defaults: AskDefaults::default(),
            labels: ExportLabels::default(),
            providers: None,
            abort: AbortHandle::default(),
            diagnostics: None,
        }
    }

    pub fn with_defaults(mut self, defaults: AskDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_export_labels(mut self, labels: ExportLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Receive every malformed stream record the decoder drops.
    pub fn with_diagnostics(mut self, hook: DiagnosticHook) -> Self {
        self.diagnostics = Some(hook);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn set_state(&mut self, state: SessionState) {
        debug!(from = ?self.state, to = ?state, "session state");
        self.state = state;
        self.presenter.render(RenderIntent::StateChanged(state));
    }

    // ── Providers and identity ──────────────────────────────────────────

    /// Fetch the provider list on first use; later calls return the cached list.
    pub async fn load_providers(&mut self) -> Result<&[ProviderInfo], SessionError> {
        if self.providers.is_none() {
            let providers = self.transport.list_providers().await?;
            info!(count = providers.len(), "providers loaded");
            self.providers = Some(providers);
        }
        Ok(self.providers.as_deref().unwrap_or_default())
    }

    /// Models offered by `provider`, if the provider list is loaded and has it.
    pub fn models_for(&self, provider: &str) -> Option<&[String]> {
        self.providers
            .as_deref()?
            .iter()
            .find(|p| p.id == provider)
            .map(|p| p.models.as_slice())
    }

    /// First listed provider, else the configured default.
    pub fn default_provider(&self) -> &str {
        self.providers
            .as_deref()
            .and_then(|list| list.first())
            .map_or(self.defaults.provider.as_str(), |p| p.id.as_str())
    }

    pub async fn identity(&mut self) -> Result<Identity, SessionError> {
        let identity = self.transport.check_identity().await?;
        self.presenter
            .render(RenderIntent::UserStatus(identity.clone()));
        Ok(identity)
    }

    pub async fn login(&mut self, name: &str) -> Result<Identity, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        let identity = self.transport.login(name).await?;
        info!(user = ?identity.name, "logged in");
        self.presenter
            .render(RenderIntent::UserStatus(identity.clone()));
        Ok(identity)
    }

    pub async fn logout(&mut self) -> Result<(), SessionError> {
        self.transport.logout().await?;
        self.presenter
            .render(RenderIntent::UserStatus(Identity::default()));
        Ok(())
    }

    // ── Documents ───────────────────────────────────────────────────────

    /// Convert a document to text for use as a question. Submit and upload
    /// controls are disabled while the conversion runs. The abort handle stops
    /// a pending upload with [`SessionError::Aborted`].
    pub async fn upload_document(
        &mut self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::Busy);
        }
        let cancel = self.abort.arm();
        self.presenter.render(RenderIntent::SetControlsEnabled(false));
        let result = {
            let upload = InFlight::new(self, None);
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = upload.transport.upload_document(filename, bytes) => Some(result),
            };
            result
        };
        match result {
            None => {
                info!(filename, "document upload aborted");
                Err(SessionError::Aborted)
            }
            Some(Ok(text)) => {
                debug!(filename, chars = text.len(), "document converted");
                Ok(text)
            }
            Some(Err(e)) => {
                warn!(filename, error = %e, "document upload failed");
                Err(e.into())
            }
        }
    }

    // ── Exchanges ───────────────────────────────────────────────────────

    /// Run one question → answer exchange to completion.
    ///
    /// Transport failures are not errors here: they are written into the
    /// assistant message and reported through [`ExchangeOutcome::Failed`].
    pub async fn submit_question(
        &mut self,
        question: &str,
        options: AskOptions,
    ) -> Result<ExchangeOutcome, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::Busy);
        }
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        let cancel = self.abort.arm();
        self.set_state(SessionState::Submitting);
        self.presenter.render(RenderIntent::SetControlsEnabled(false));

        let user = self.transcript.append(Message::user(question));
        self.presenter.render(RenderIntent::ShowMessage {
            handle: user,
            role: Role::User,
            text: question.to_string(),
        });
        let placeholder = self.transcript.append(Message::assistant_placeholder());
        self.presenter.render(RenderIntent::ShowMessage {
            handle: placeholder,
            role: Role::Assistant,
            text: PENDING_TEXT.to_string(),
        });
        self.presenter.render(RenderIntent::ScrollToLatest);

        let provider = options
            .provider
            .unwrap_or_else(|| self.default_provider().to_string());
        let model = options.model.unwrap_or_else(|| self.defaults.model.clone());
        let mode = options.mode.unwrap_or_else(|| self.defaults.mode.clone());
        info!(%provider, %model, %mode, "submitting question");

        let request = AskRequest {
            question,
            provider: &provider,
            model: &model,
            mode: &mode,
        };
        let result = {
            let mut exchange = InFlight::new(self, Some(placeholder));
            let result = exchange.run_exchange(placeholder, &request, &cancel).await;
            exchange.unsettled = None;
            result
        };
        if let Ok(outcome) = &result {
            info!(completed = outcome.is_completed(), "exchange settled");
        }
        result
    }

    async fn run_exchange(
        &mut self,
        handle: Handle,
        request: &AskRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExchangeOutcome, SessionError> {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            opened = self.transport.stream_answer(request) => Some(opened),
        };
        let bytes = match opened {
            None => return self.settle_cancelled(handle),
            Some(Err(e)) => return self.settle_failed(handle, e.into()),
            Some(Ok(bytes)) => bytes,
        };

        self.set_state(SessionState::Streaming);
        let decoder = match &self.diagnostics {
            Some(hook) => StreamDecoder::with_diagnostics(Arc::clone(hook)),
            None => StreamDecoder::new(),
        };
        let mut events = DecodedStream::new(bytes, decoder);
        let mut first_token = true;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                item = events.next() => Some(item),
            };
            let Some(item) = next else {
                return self.settle_cancelled(handle);
            };

            match item {
                Some(Ok(StreamEvent::Token(text))) => {
                    if first_token {
                        first_token = false;
                        self.presenter.render(RenderIntent::ReplaceMessage {
                            handle,
                            text: String::new(),
                        });
                    }
                    self.transcript.append_content(handle, &text)?;
                    self.presenter
                        .render(RenderIntent::AppendToMessage { handle, text });
                    self.presenter.render(RenderIntent::ScrollToLatest);
                }
                Some(Ok(StreamEvent::Sources(list))) => {
                    let text = list.join(", ");
                    self.transcript.set_sources(handle, text.clone())?;
                    self.presenter
                        .render(RenderIntent::SetSources { handle, text });
                }
                Some(Ok(StreamEvent::Done)) => {
                    self.transcript.finalize(handle, MessageStatus::Complete)?;
                    self.presenter
                        .render(RenderIntent::ShowExportControls { handle });
                    self.set_state(SessionState::Finalizing);
                    return Ok(ExchangeOutcome::Completed(handle));
                }
                Some(Ok(StreamEvent::Error(message))) => {
                    return self.settle_failed(handle, SessionError::Remote(message));
                }
                Some(Err(e)) => return self.settle_failed(handle, e.into()),
                None => {
                    warn!(dropped = events.decoder().dropped(), "answer stream ended without completion");
                    self.transcript.finalize(handle, MessageStatus::Incomplete)?;
                    return Ok(ExchangeOutcome::Incomplete(handle));
                }
            }
        }
    }

    fn settle_failed(
        &mut self,
        handle: Handle,
        error: SessionError,
    ) -> Result<ExchangeOutcome, SessionError> {
        warn!(error = %error, "exchange failed");
        let text = format!("Error: {error}");
        self.transcript.update_content(handle, text.clone())?;
        self.transcript.finalize(handle, MessageStatus::Failed)?;
        self.presenter
            .render(RenderIntent::ReplaceMessage { handle, text });
        Ok(ExchangeOutcome::Failed { handle, error })
    }

    fn settle_cancelled(&mut self, handle: Handle) -> Result<ExchangeOutcome, SessionError> {
        info!("exchange aborted");
        let partial = self.transcript.get(handle)?.content();
        let text = if partial.is_empty() {
            CANCELLED_MARK.to_string()
        } else {
            format!("{partial} {CANCELLED_MARK}")
        };
        self.transcript.update_content(handle, text.clone())?;
        self.transcript.finalize(handle, MessageStatus::Cancelled)?;
        self.presenter
            .render(RenderIntent::ReplaceMessage { handle, text });
        Ok(ExchangeOutcome::Cancelled(handle))
    }

    // ── Transcript ──────────────────────────────────────────────────────

    /// Drop the whole conversation. Handles issued before this call become invalid.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::Busy);
        }
        self.transcript.clear();
        self.presenter.render(RenderIntent::TranscriptCleared);
        Ok(())
    }

    /// Export the whole conversation.
    pub fn export_transcript(&self, format: ExportFormat) -> Result<Document, SessionError> {
        export::export_transcript(
            self.transcript.snapshot(),
            format,
            &self.labels,
            Local::now(),
        )
    }

    /// Export the exchange whose assistant message is `handle`.
    pub fn export_exchange(
        &self,
        handle: Handle,
        format: ExportFormat,
    ) -> Result<Document, SessionError> {
        let exchange = self.transcript.exchange(handle)?;
        export::export_exchange(&exchange, format, &self.labels, Local::now())
    }
}

/// Scope of one exchange or upload. Dropping it re-enables the controls and
/// returns the session to `Idle`, also when the owning future is dropped
/// mid-flight. An exchange still unsettled at that point is cancelled.
struct InFlight<'a, T: Transport, P: Presenter> {
    session: &'a mut Session<T, P>,
    unsettled: Option<Handle>,
}

impl<'a, T: Transport, P: Presenter> InFlight<'a, T, P> {
    fn new(session: &'a mut Session<T, P>, unsettled: Option<Handle>) -> Self {
        Self { session, unsettled }
    }
}

impl<T: Transport, P: Presenter> Deref for InFlight<'_, T, P> {
    type Target = Session<T, P>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<T: Transport, P: Presenter> DerefMut for InFlight<'_, T, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<T: Transport, P: Presenter> Drop for InFlight<'_, T, P> {
    fn drop(&mut self) {
        if let Some(handle) = self.unsettled.take() {
            warn!("exchange dropped before it settled");
            if let Err(e) = self.session.settle_cancelled(handle) {
                debug!(error = %e, "abandoned answer already settled");
            }
        }
        self.session
            .presenter
            .render(RenderIntent::SetControlsEnabled(true));
        if self.session.state != SessionState::Idle {
            self.session.set_state(SessionState::Idle);
        }
    }
}
