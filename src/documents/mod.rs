//! The document-state layer.
//!
//! Tracks every text document the server knows about, reconciles the two
//! sources of truth for each one (the editor client and the backing file
//! system), and decides when the compiler collaborator's cached analysis
//! must be discarded and recomputed.
//!
//! Each tracked document carries two independent open flags. The editor
//! owns `open_on_client`; the analysis owns `open_on_server` (roots and
//! transitive dependencies). A document stays registered while either flag
//! is set and is removed the moment both clear. The cached compilation is
//! discarded on any text change, creation, root-set change or removal, and
//! lazily rebuilt on next access; after a rebuild, a mark-and-sweep pass
//! server-closes every document the new compilation no longer references.

mod document;
mod events;
mod gate;

#[cfg(test)]
mod tests;

pub use document::{Document, DocumentId};
pub use events::{DocumentEvent, DocumentStream, EventBus, SubscriptionId, UpdateReport};

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use rayon::prelude::*;
use ropey::Rope;
use tower_lsp::lsp_types::Diagnostic;

use crate::compiler::{Compilation, CompileHost, CompileOptions, Compiler, SourceText};
use crate::host::FileHost;
use crate::locator;

use gate::UpdateGate;

type Registry = HashMap<DocumentId, Document>;

struct CompiledState {
    roots: Vec<DocumentId>,
    compilation: Box<dyn Compilation>,
}

/// What a server-open transition did to the registry.
struct OpenOutcome {
    identity: DocumentId,
    created: bool,
    changed: bool,
}

/// Owner of the registry and the cached compilation state.
///
/// The single writer of process-wide document state: every inbound
/// notification lands here, mutates the registry through the dual-ownership
/// transitions, and may schedule an update report. Single-threaded and
/// synchronous; reentrancy (dependency reads during a rebuild requesting
/// further updates) is absorbed by the update gate.
pub struct DocumentManager {
    registry: Registry,
    events: EventBus,
    gate: UpdateGate,
    host: Arc<dyn FileHost>,
    compiler: Box<dyn Compiler>,
    options: CompileOptions,
    compiled: Option<CompiledState>,
    previous: Option<Box<dyn Compilation>>,
}

impl DocumentManager {
    pub fn new(host: Arc<dyn FileHost>, compiler: Box<dyn Compiler>, options: CompileOptions) -> Self {
        DocumentManager {
            registry: Registry::new(),
            events: EventBus::new(),
            gate: UpdateGate::default(),
            host,
            compiler,
            options,
            compiled: None,
            previous: None,
        }
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Resolve a raw locator to the canonical registry key.
    pub fn normalize_identity(&self, locator: &str) -> Option<DocumentId> {
        locator::normalize_identity(self.host.as_ref(), locator)
    }

    pub fn get(&self, locator: &str) -> Option<&Document> {
        let identity = self.normalize_identity(locator)?;
        self.registry.get(&identity)
    }

    pub fn has(&self, locator: &str) -> bool {
        self.get(locator).is_some()
    }

    /// Snapshot of every tracked document. Order is not meaningful.
    pub fn all(&self) -> Vec<&Document> {
        self.registry.values().collect()
    }

    pub fn keys(&self) -> Vec<DocumentId> {
        self.registry.keys().cloned().collect()
    }

    pub fn document_count(&self) -> usize {
        self.registry.len()
    }

    /// Open a document on the server side, reading its content from the
    /// file system. Returns `None` (and mutates nothing) when the file
    /// cannot be read.
    ///
    /// Returns a snapshot rather than a registry reference: the update
    /// this can trigger runs synchronously, and its rebuild sweep may
    /// already reclaim a document nothing references.
    pub fn open(&mut self, locator: &str) -> Option<Document> {
        let outcome = open_on_server(&mut self.registry, self.host.as_ref(), &self.events, locator)?;
        let snapshot = self.registry.get(&outcome.identity).cloned();
        if outcome.created || outcome.changed {
            self.invalidate();
            self.schedule_update();
        }
        snapshot
    }

    /// Close the server side of a document. Removes it from the registry
    /// when the client no longer holds it open either.
    pub fn close(&mut self, locator: &str) {
        let Some(identity) = self.normalize_identity(locator) else {
            return;
        };
        if close_on_server(&mut self.registry, &self.events, &identity).is_some() {
            self.invalidate();
            self.schedule_update();
        }
    }

    /// The editor opened a document, supplying its buffer content.
    pub fn client_open(&mut self, locator: &str, text: &str) {
        let Some(identity) = self.normalize_identity(locator) else {
            return;
        };
        let Some(display_uri) = locator::display_uri(locator) else {
            return;
        };

        let (created, opened, changed) = match self.registry.get_mut(&identity) {
            Some(doc) => {
                doc.display_uri = display_uri.clone();
                let opened = !doc.open_on_client;
                doc.open_on_client = true;
                let changed = doc.text != text;
                if changed {
                    doc.text = Rope::from_str(text);
                }
                (false, opened, changed)
            }
            None => {
                let mut doc = Document::new(identity.clone(), display_uri.clone(), Rope::from_str(text));
                doc.open_on_client = true;
                self.registry.insert(identity.clone(), doc);
                (true, true, false)
            }
        };

        let event = DocumentEvent { identity, display_uri };
        if created {
            self.events.emit(DocumentStream::Created, &event);
        }
        if opened {
            self.events.emit(DocumentStream::OpenedOnClient, &event);
        }
        if changed {
            self.events.emit(DocumentStream::ContentChanged, &event);
        }
        if created || opened || changed {
            // Creation and client-open transitions change the root set, so
            // they invalidate even when the text is unchanged.
            self.invalidate();
            self.schedule_update();
        }
    }

    /// The editor changed a document. Full-document sync: every entry in
    /// `changes` carries the complete resulting text, so only the last one
    /// is authoritative. Unknown documents are ignored.
    pub fn client_change(&mut self, locator: &str, changes: &[&str]) {
        let Some(text) = changes.last() else {
            return;
        };
        let Some(identity) = self.normalize_identity(locator) else {
            return;
        };
        let Some(display_uri) = locator::display_uri(locator) else {
            return;
        };
        let Some(doc) = self.registry.get_mut(&identity) else {
            return;
        };
        doc.display_uri = display_uri.clone();
        if doc.text == *text {
            return;
        }
        doc.text = Rope::from_str(text);

        let event = DocumentEvent { identity, display_uri };
        self.events.emit(DocumentStream::ContentChanged, &event);
        self.invalidate();
        self.schedule_update();
    }

    /// The editor closed a document. Removes it from the registry when the
    /// server no longer holds it open either.
    pub fn client_close(&mut self, locator: &str) {
        let Some(identity) = self.normalize_identity(locator) else {
            return;
        };
        let still_open_on_server = {
            let Some(doc) = self.registry.get_mut(&identity) else {
                return;
            };
            if !doc.open_on_client {
                return;
            }
            doc.open_on_client = false;
            doc.open_on_server
        };

        if still_open_on_server {
            if let Some(doc) = self.registry.get(&identity) {
                let event = DocumentEvent {
                    identity: identity.clone(),
                    display_uri: doc.display_uri.clone(),
                };
                self.events.emit(DocumentStream::ClosedOnClient, &event);
            }
        } else if let Some(doc) = self.registry.remove(&identity) {
            let event = DocumentEvent {
                identity,
                display_uri: doc.display_uri,
            };
            self.events.emit(DocumentStream::Closed, &event);
        }

        // Either way the root set changed.
        self.invalidate();
        self.schedule_update();
    }

    /// Diagnostics for one tracked document, rebuilding the compilation if
    /// needed. Empty for locators with no corresponding document.
    pub fn diagnostics(&mut self, locator: &str) -> Vec<Diagnostic> {
        let Some(identity) = self.normalize_identity(locator) else {
            return Vec::new();
        };
        if !self.registry.contains_key(&identity) {
            return Vec::new();
        }
        self.ensure_compiled();
        self.compiled
            .as_ref()
            .map(|state| state.compilation.diagnostics(&identity))
            .unwrap_or_default()
    }

    /// Defer update reports until the matching [`resume_updates`].
    ///
    /// [`resume_updates`]: DocumentManager::resume_updates
    pub fn suspend_updates(&mut self) {
        self.gate.suspend();
    }

    /// Drop one suspension level; when the last one clears and an update
    /// was requested meanwhile, the report fires immediately.
    pub fn resume_updates(&mut self) {
        if self.gate.resume() {
            self.report_update();
        }
    }

    /// Request an update report: dispatched immediately when nothing is
    /// suspended or in flight, recorded as pending otherwise.
    pub fn request_update(&mut self) {
        self.schedule_update();
    }

    fn schedule_update(&mut self) {
        if self.gate.request() {
            self.report_update();
        }
    }

    /// Discard the cached compilation, keeping it around as a reuse hint
    /// for the next rebuild.
    fn invalidate(&mut self) {
        if let Some(state) = self.compiled.take() {
            self.previous = Some(state.compilation);
        }
    }

    /// Rebuild the compilation if the cache is invalid: compute the root
    /// set from the client-open documents, run the check (dependency reads
    /// re-enter the registry through [`RebuildHost`]), then sweep.
    fn ensure_compiled(&mut self) {
        if self.compiled.is_some() {
            return;
        }

        let roots: Vec<DocumentId> = self
            .registry
            .values()
            .filter(|doc| doc.is_open_on_client())
            .map(|doc| doc.identity().clone())
            .sorted()
            .collect();

        for doc in self.registry.values_mut() {
            doc.marked = false;
        }
        for identity in &roots {
            if let Some(doc) = self.registry.get_mut(identity) {
                doc.marked = true;
            }
        }

        let previous = if self.options.incremental_reuse {
            self.previous.take()
        } else {
            self.previous = None;
            None
        };

        let mut compilation = self.compiler.create(&roots, &self.options, previous);
        self.gate.begin_rebuild();
        {
            let DocumentManager {
                registry,
                events,
                gate,
                host,
                ..
            } = &mut *self;
            let mut rebuild_host = RebuildHost {
                registry,
                events,
                gate,
                host: host.as_ref(),
            };
            compilation.check(&mut rebuild_host);
        }
        self.gate.end_rebuild();

        self.compiled = Some(CompiledState { roots, compilation });
        self.sweep();
    }

    /// Reclaim documents the latest compilation no longer references:
    /// everything left unmarked and not client-open is server-closed
    /// through the normal transition (which may remove it). The sweep
    /// reconciles the registry *to* the compilation just built, so its
    /// removals do not invalidate it.
    fn sweep(&mut self) {
        let stale: Vec<DocumentId> = self
            .registry
            .values()
            .filter(|doc| !doc.marked && !doc.is_open_on_client() && doc.is_open_on_server())
            .map(|doc| doc.identity().clone())
            .collect();
        for identity in &stale {
            let _ = close_on_server(&mut self.registry, &self.events, identity);
        }
    }

    /// Dispatch one update report: make the compilation fresh, collect
    /// per-root diagnostics, notify the "updated" stream. Requests arriving
    /// while this runs are absorbed as pending by the gate.
    fn report_update(&mut self) {
        self.gate.begin_report();
        self.ensure_compiled();
        let report = self.collect_report();
        self.gate.end_report();
        self.events.emit_updated(&report);
    }

    fn collect_report(&self) -> UpdateReport {
        let Some(state) = self.compiled.as_ref() else {
            return UpdateReport::default();
        };
        let diagnostics = state
            .roots
            .par_iter()
            .filter_map(|identity| {
                let doc = self.registry.get(identity)?;
                Some((doc.display_uri().clone(), state.compilation.diagnostics(identity)))
            })
            .collect();
        UpdateReport { diagnostics }
    }
}

/// The shared server-open transition: create the entity if absent, refresh
/// its display locator, replace its text if the file content differs, set
/// the server flag, and fire the corresponding events in order (created
/// before the open event, content-changed last).
fn open_on_server(
    registry: &mut Registry,
    host: &dyn FileHost,
    events: &EventBus,
    locator: &str,
) -> Option<OpenOutcome> {
    let identity = locator::normalize_identity(host, locator)?;
    let display_uri = locator::display_uri(locator)?;
    let text = host.read_file(identity.as_path())?;

    let (created, opened, changed) = match registry.get_mut(&identity) {
        Some(doc) => {
            doc.display_uri = display_uri.clone();
            let opened = !doc.open_on_server;
            doc.open_on_server = true;
            let changed = doc.text != text.as_str();
            if changed {
                doc.text = Rope::from_str(&text);
            }
            (false, opened, changed)
        }
        None => {
            let mut doc = Document::new(identity.clone(), display_uri.clone(), Rope::from_str(&text));
            doc.open_on_server = true;
            registry.insert(identity.clone(), doc);
            (true, true, false)
        }
    };

    let event = DocumentEvent {
        identity: identity.clone(),
        display_uri,
    };
    if created {
        events.emit(DocumentStream::Created, &event);
    }
    if opened {
        events.emit(DocumentStream::OpenedOnServer, &event);
    }
    if changed {
        events.emit(DocumentStream::ContentChanged, &event);
    }

    Some(OpenOutcome {
        identity,
        created,
        changed,
    })
}

/// The shared server-close transition. Returns `Some(removed)` when a
/// transition actually happened, `None` when the document was untracked or
/// not server-open.
fn close_on_server(registry: &mut Registry, events: &EventBus, identity: &DocumentId) -> Option<bool> {
    let open_on_client = {
        let doc = registry.get_mut(identity)?;
        if !doc.open_on_server {
            return None;
        }
        doc.open_on_server = false;
        doc.open_on_client
    };

    if open_on_client {
        let doc = registry.get(identity)?;
        let event = DocumentEvent {
            identity: identity.clone(),
            display_uri: doc.display_uri.clone(),
        };
        events.emit(DocumentStream::ClosedOnServer, &event);
        Some(false)
    } else {
        let doc = registry.remove(identity)?;
        let event = DocumentEvent {
            identity: identity.clone(),
            display_uri: doc.display_uri,
        };
        events.emit(DocumentStream::Closed, &event);
        Some(true)
    }
}

/// Borrowed view of the manager handed to the compiler during a check.
/// Dependency reads go through the normal open transition (so they create
/// and refresh entities, fire events, and mark what the compilation
/// references); update requests they trigger are absorbed as pending.
struct RebuildHost<'a> {
    registry: &'a mut Registry,
    events: &'a EventBus,
    gate: &'a mut UpdateGate,
    host: &'a dyn FileHost,
}

impl CompileHost for RebuildHost<'_> {
    fn read(&mut self, locator: &str) -> Option<SourceText> {
        let identity = locator::normalize_identity(self.host, locator)?;

        // Client-open documents answer from the in-memory buffer: the
        // editor is authoritative for them, whatever the disk says.
        if let Some(doc) = self.registry.get_mut(&identity) {
            if doc.is_open_on_client() {
                doc.marked = true;
                return Some(SourceText {
                    identity,
                    text: doc.text().clone(),
                });
            }
        }

        let outcome = open_on_server(self.registry, self.host, self.events, locator)?;
        if outcome.created || outcome.changed {
            self.gate.request();
        }
        let doc = self.registry.get_mut(&outcome.identity)?;
        doc.marked = true;
        Some(SourceText {
            identity: outcome.identity,
            text: doc.text().clone(),
        })
    }
}
