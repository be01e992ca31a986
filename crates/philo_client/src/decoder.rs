//! Incremental decoder for the answer stream.
//!
//! The service sends one record per line: `data: {"type": ..., "data": ...}`.
//! Transport fragments may split a line (or a UTF-8 sequence) anywhere, so
//! bytes are buffered until a newline arrives and only complete lines are
//! parsed. The unterminated tail is kept for the next fragment and discarded
//! when the stream ends.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tracing::{debug, warn};

use crate::error::MalformedRecord;
use crate::messages::StreamEvent;

/// Prefix marking a line as a record. Other lines are keep-alives or comments.
pub const RECORD_MARKER: &str = "data: ";

/// Called for every record line that fails to parse.
pub type DiagnosticHook = Arc<dyn Fn(&MalformedRecord) + Send + Sync>;

/// Push decoder: feed fragments in arrival order, collect events.
#[derive(Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    on_malformed: Option<DiagnosticHook>,
    dropped: usize,
}

impl fmt::Debug for StreamDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("buffered", &self.buffer.len())
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that reports dropped records to `hook` in addition to logging them.
    pub fn with_diagnostics(hook: DiagnosticHook) -> Self {
        Self {
            on_malformed: Some(hook),
            ..Self::default()
        }
    }

    /// Number of malformed records dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Bytes held back waiting for a newline.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Append a fragment and decode every line it completes.
    pub fn feed(&mut self, fragment: &[u8]) -> Vec<StreamEvent> {
        // The retained tail never contains a newline, so only scan the new bytes.
        let mut scan_from = self.buffer.len();
        self.buffer.extend_from_slice(fragment);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[scan_from..].iter().position(|b| *b == b'\n') {
            let end = scan_from + offset;
            let line = self.buffer[consumed..end].to_vec();
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
            consumed = end + 1;
            scan_from = consumed;
        }
        self.buffer.drain(..consumed);
        events
    }

    /// End of stream: discard any unterminated tail. Returns the discarded byte count.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        if discarded > 0 {
            debug!(bytes = discarded, "discarding unterminated trailing stream data");
        }
        self.buffer.clear();
        discarded
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let payload = raw.strip_prefix(RECORD_MARKER.as_bytes())?;

        let parsed = std::str::from_utf8(payload)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<StreamEvent>(text).map_err(|e| e.to_string()));

        match parsed {
            Ok(event) => Some(event),
            Err(reason) => {
                let record = MalformedRecord {
                    line: String::from_utf8_lossy(raw).into_owned(),
                    reason,
                };
                self.report(&record);
                None
            }
        }
    }

    fn report(&mut self, record: &MalformedRecord) {
        self.dropped += 1;
        warn!(line = %record.line, reason = %record.reason, "dropping malformed stream record");
        if let Some(hook) = &self.on_malformed {
            hook(record);
        }
    }
}

/// Pull adapter: turns a stream of byte fragments into a stream of events.
///
/// A transport error is yielded once and ends the stream.
pub struct DecodedStream<S> {
    inner: S,
    decoder: StreamDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S> DecodedStream<S> {
    pub fn new(inner: S, decoder: StreamDecoder) -> Self {
        Self {
            inner,
            decoder,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    pub fn decoder(&self) -> &StreamDecoder {
        &self.decoder
    }
}

impl<S, E> Stream for DecodedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<StreamEvent, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(fragment)) => {
                    debug!(bytes = fragment.len(), "stream fragment");
                    let events = this.decoder.feed(&fragment);
                    this.pending.extend(events);
                }
                Some(Err(e)) => {
                    this.finished = true;
                    this.decoder.finish();
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.finished = true;
                    this.decoder.finish();
                }
            }
        }
    }
}
