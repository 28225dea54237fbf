//! Document lifecycle notification hub.
//!
//! A single process-wide publish/subscribe point: one listener list per
//! named stream, fired synchronously in subscription order. The protocol
//! layer attaches here to learn about lifecycle transitions and to receive
//! update reports carrying outbound diagnostics.

use tower_lsp::lsp_types::{Diagnostic, Url};

use super::document::DocumentId;

/// Payload for document lifecycle notifications.
#[derive(Debug, Clone)]
pub struct DocumentEvent {
    pub identity: DocumentId,
    pub display_uri: Url,
}

/// The named lifecycle streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentStream {
    Created,
    OpenedOnClient,
    OpenedOnServer,
    ContentChanged,
    /// Removed from the registry (both sides closed).
    Closed,
    /// Client side closed, still held by the server.
    ClosedOnClient,
    /// Server side closed, still open in the editor.
    ClosedOnServer,
}

const STREAM_COUNT: usize = 7;

fn stream_index(stream: DocumentStream) -> usize {
    match stream {
        DocumentStream::Created => 0,
        DocumentStream::OpenedOnClient => 1,
        DocumentStream::OpenedOnServer => 2,
        DocumentStream::ContentChanged => 3,
        DocumentStream::Closed => 4,
        DocumentStream::ClosedOnClient => 5,
        DocumentStream::ClosedOnServer => 6,
    }
}

/// Outcome of one update report: the recomputed diagnostics for every
/// client-open document, keyed by display locator.
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub diagnostics: Vec<(Url, Vec<Diagnostic>)>,
}

type DocumentListener = Box<dyn Fn(&DocumentEvent) + Send + Sync>;
type UpdateListener = Box<dyn Fn(&UpdateReport) + Send + Sync>;

/// Handle for detaching a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub struct EventBus {
    next_id: u64,
    document: [Vec<(u64, DocumentListener)>; STREAM_COUNT],
    updated: Vec<(u64, UpdateListener)>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            next_id: 0,
            document: std::array::from_fn(|_| Vec::new()),
            updated: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Attach a listener to one lifecycle stream. Listeners on the same
    /// stream fire in subscription order.
    pub fn subscribe(
        &mut self,
        stream: DocumentStream,
        listener: impl Fn(&DocumentEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_id();
        self.document[stream_index(stream)].push((id, Box::new(listener)));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&mut self, stream: DocumentStream, subscription: SubscriptionId) {
        self.document[stream_index(stream)].retain(|(id, _)| *id != subscription.0);
    }

    /// Attach a listener to the "state updated" stream.
    pub fn subscribe_updated(
        &mut self,
        listener: impl Fn(&UpdateReport) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_id();
        self.updated.push((id, Box::new(listener)));
        SubscriptionId(id)
    }

    pub fn unsubscribe_updated(&mut self, subscription: SubscriptionId) {
        self.updated.retain(|(id, _)| *id != subscription.0);
    }

    pub(crate) fn emit(&self, stream: DocumentStream, event: &DocumentEvent) {
        for (_, listener) in &self.document[stream_index(stream)] {
            listener(event);
        }
    }

    pub(crate) fn emit_updated(&self, report: &UpdateReport) {
        for (_, listener) in &self.updated {
            listener(report);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}
