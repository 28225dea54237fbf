//! The tracked-document record.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ropey::Rope;
use tower_lsp::lsp_types::Url;

/// Canonical identity of a tracked document: the normalized native path.
///
/// Unique within the registry; distinct spellings of the same file resolve
/// to the same `DocumentId`. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Arc<str>);

impl DocumentId {
    pub(crate) fn new(path: impl AsRef<str>) -> Self {
        DocumentId(Arc::from(path.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked file: identity, content, and per-side open flags.
///
/// A document exists in the registry exactly while at least one side holds
/// it open; the moment both flags are false it is removed. `marked` is
/// transient scratch state for the rebuild sweep and carries no meaning
/// between rebuilds.
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) identity: DocumentId,
    pub(crate) display_uri: Url,
    pub(crate) text: Rope,
    pub(crate) open_on_client: bool,
    pub(crate) open_on_server: bool,
    pub(crate) marked: bool,
}

impl Document {
    pub(crate) fn new(identity: DocumentId, display_uri: Url, text: Rope) -> Self {
        Document {
            identity,
            display_uri,
            text,
            open_on_client: false,
            open_on_server: false,
            marked: false,
        }
    }

    pub fn identity(&self) -> &DocumentId {
        &self.identity
    }

    /// The externally visible locator, refreshed on every open/update.
    pub fn display_uri(&self) -> &Url {
        &self.display_uri
    }

    pub fn text(&self) -> &Rope {
        &self.text
    }

    /// True while the interactive editor holds the document open.
    pub fn is_open_on_client(&self) -> bool {
        self.open_on_client
    }

    /// True while analysis needs the document's content (root or
    /// transitive dependency), independent of editor state.
    pub fn is_open_on_server(&self) -> bool {
        self.open_on_server
    }
}
