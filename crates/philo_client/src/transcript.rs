//! Ordered, append-only conversation log.
//!
//! Messages are addressed through [`Handle`]s. A handle carries the store
//! generation it was issued in, so every handle from before a [`Transcript::clear`]
//! is rejected with [`SessionError::InvalidHandle`] instead of silently
//! pointing at a newer message in the same slot.

use chrono::{DateTime, Utc};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Lifecycle of a message. Only `Streaming` messages accept mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// In-flight assistant placeholder.
    Streaming,
    Complete,
    Failed,
    Cancelled,
    /// The stream ended without a completion signal.
    Incomplete,
}

impl MessageStatus {
    pub fn is_open(self) -> bool {
        self == MessageStatus::Streaming
    }
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    sources: Option<String>,
    status: MessageStatus,
}

impl Message {
    /// A finished user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            sources: None,
            status: MessageStatus::Complete,
        }
    }

    /// An empty assistant placeholder that will be filled while streaming.
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            sources: None,
            status: MessageStatus::Streaming,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Citation text; `None` until the stream delivered sources.
    pub fn sources(&self) -> Option<&str> {
        self.sources.as_deref()
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }
}

/// Opaque reference to a message inside one [`Transcript`] generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    generation: u64,
    index: usize,
}

/// A user message paired with the assistant message answering it.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    pub user: &'a Message,
    pub assistant: &'a Message,
}

impl Exchange<'_> {
    /// True once the answer stopped changing (completed, failed, cancelled or cut off).
    pub fn is_settled(&self) -> bool {
        !self.assistant.status.is_open()
    }

    /// True only when the answer finished normally.
    pub fn is_complete(&self) -> bool {
        self.assistant.status == MessageStatus::Complete
    }
}

#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    generation: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the end and return a handle for later mutation.
    pub fn append(&mut self, message: Message) -> Handle {
        self.messages.push(message);
        Handle {
            generation: self.generation,
            index: self.messages.len() - 1,
        }
    }

    pub fn get(&self, handle: Handle) -> Result<&Message, SessionError> {
        if handle.generation != self.generation {
            return Err(SessionError::InvalidHandle);
        }
        self.messages
            .get(handle.index)
            .ok_or(SessionError::InvalidHandle)
    }

    fn get_open_mut(&mut self, handle: Handle) -> Result<&mut Message, SessionError> {
        if handle.generation != self.generation {
            return Err(SessionError::InvalidHandle);
        }
        let message = self
            .messages
            .get_mut(handle.index)
            .ok_or(SessionError::InvalidHandle)?;
        if !message.status.is_open() {
            return Err(SessionError::MessageFrozen);
        }
        Ok(message)
    }

    /// Replace the content of an in-flight message.
    pub fn update_content(
        &mut self,
        handle: Handle,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.get_open_mut(handle)?.content = text.into();
        Ok(())
    }

    /// Append to the content of an in-flight message.
    pub fn append_content(&mut self, handle: Handle, text: &str) -> Result<(), SessionError> {
        self.get_open_mut(handle)?.content.push_str(text);
        Ok(())
    }

    /// Set citation text. A second call overwrites the first.
    pub fn set_sources(
        &mut self,
        handle: Handle,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.get_open_mut(handle)?.sources = Some(text.into());
        Ok(())
    }

    /// Freeze an in-flight message with its terminal status.
    pub fn finalize(&mut self, handle: Handle, status: MessageStatus) -> Result<(), SessionError> {
        debug_assert!(!status.is_open(), "finalize needs a terminal status");
        self.get_open_mut(handle)?.status = status;
        Ok(())
    }

    /// Drop every message and invalidate all issued handles.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.generation += 1;
    }

    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Pair consecutive (user, assistant) entries in conversation order.
    pub fn exchanges(&self) -> Vec<Exchange<'_>> {
        pair_exchanges(&self.messages)
    }

    /// The exchange whose assistant message is `handle`.
    pub fn exchange(&self, handle: Handle) -> Result<Exchange<'_>, SessionError> {
        let assistant = self.get(handle)?;
        let user = handle
            .index
            .checked_sub(1)
            .and_then(|i| self.messages.get(i))
            .filter(|m| m.role == Role::User && assistant.role == Role::Assistant)
            .ok_or(SessionError::InvalidHandle)?;
        Ok(Exchange { user, assistant })
    }
}

/// Pair a message sequence into exchanges, skipping any unmatched entry.
pub fn pair_exchanges(messages: &[Message]) -> Vec<Exchange<'_>> {
    let mut exchanges = Vec::with_capacity(messages.len() / 2);
    let mut i = 0;
    while i < messages.len() {
        match (messages.get(i), messages.get(i + 1)) {
            (Some(user), Some(assistant))
                if user.role == Role::User && assistant.role == Role::Assistant =>
            {
                exchanges.push(Exchange { user, assistant });
                i += 2;
            }
            _ => i += 1,
        }
    }
    exchanges
}
