//! Shared test utilities for gramarye.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::compiler::CompileOptions;
use crate::documents::{DocumentManager, DocumentStream};
use crate::grammar::GrammarCompiler;
use crate::host::{normalize_lexical, FileHost};

/// In-memory file-system collaborator.
///
/// Files live in a map keyed by normalized absolute path; tests mutate it
/// through `insert`/`remove` to simulate out-of-band writes without
/// touching the disk.
pub struct MemoryFileHost {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryFileHost {
    pub fn new() -> Self {
        MemoryFileHost {
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.lock().unwrap().insert(path.into(), text.into());
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files.lock().unwrap().remove(path.as_ref());
    }
}

impl FileHost for MemoryFileHost {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new("/").join(path)
        }
    }

    fn normalize(&self, path: &Path) -> PathBuf {
        normalize_lexical(path)
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

/// A manager over an in-memory host and the built-in grammar analyzer,
/// with default options.
pub fn memory_manager() -> (Arc<MemoryFileHost>, DocumentManager) {
    let host = Arc::new(MemoryFileHost::new());
    let manager = DocumentManager::new(
        host.clone(),
        Box::new(GrammarCompiler),
        CompileOptions::default(),
    );
    (host, manager)
}

/// Subscribe to every lifecycle stream plus the updated stream, recording
/// event names (and identities) in firing order.
pub fn record_events(manager: &mut DocumentManager) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let streams = [
        (DocumentStream::Created, "created"),
        (DocumentStream::OpenedOnClient, "opened-on-client"),
        (DocumentStream::OpenedOnServer, "opened-on-server"),
        (DocumentStream::ContentChanged, "content-changed"),
        (DocumentStream::Closed, "closed"),
        (DocumentStream::ClosedOnClient, "closed-on-client"),
        (DocumentStream::ClosedOnServer, "closed-on-server"),
    ];
    for (stream, name) in streams {
        let log = log.clone();
        manager.events_mut().subscribe(stream, move |event| {
            log.lock().unwrap().push(format!("{name} {}", event.identity));
        });
    }
    let updated_log = log.clone();
    manager.events_mut().subscribe_updated(move |_| {
        updated_log.lock().unwrap().push("updated".to_string());
    });
    log
}

/// The recorded names only, without identities.
pub fn event_names(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .map(|entry| entry.split(' ').next().unwrap_or(entry).to_string())
        .collect()
}

/// Count occurrences of one event name in the recorded log.
pub fn count_events(log: &Arc<Mutex<Vec<String>>>, name: &str) -> usize {
    event_names(log).iter().filter(|n| *n == name).count()
}
