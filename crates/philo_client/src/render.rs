//! Render intents emitted by the session controller for the presentation layer.

use tokio::sync::mpsc;

use crate::messages::Identity;
use crate::session::SessionState;
use crate::transcript::{Handle, Role};

/// Text shown in the assistant bubble until the first token arrives.
pub const PENDING_TEXT: &str = "Thinking...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderIntent {
    /// A new message bubble for `handle`.
    ShowMessage {
        handle: Handle,
        role: Role,
        text: String,
    },
    /// Replace the visible text of a message (placeholder clear, error, cancel).
    ReplaceMessage { handle: Handle, text: String },
    AppendToMessage { handle: Handle, text: String },
    /// Citation line under an assistant message; `text` is the joined source list.
    SetSources { handle: Handle, text: String },
    /// The exchange ending at `handle` completed and can be exported.
    ShowExportControls { handle: Handle },
    ScrollToLatest,
    /// Submit and upload affordances.
    SetControlsEnabled(bool),
    StateChanged(SessionState),
    TranscriptCleared,
    UserStatus(Identity),
}

/// Consumer of render intents.
pub trait Presenter: Send {
    fn render(&mut self, intent: RenderIntent);
}

/// Records intents in order; handy for headless use.
impl Presenter for Vec<RenderIntent> {
    fn render(&mut self, intent: RenderIntent) {
        self.push(intent);
    }
}

/// Forwards intents to a UI task. A closed receiver means nobody is watching.
impl Presenter for mpsc::UnboundedSender<RenderIntent> {
    fn render(&mut self, intent: RenderIntent) {
        let _ = self.send(intent);
    }
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn render(&mut self, intent: RenderIntent) {
        (**self).render(intent);
    }
}
