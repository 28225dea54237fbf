//! Locator normalization.
//!
//! A locator is any externally supplied reference to a document: a
//! `file://` URI from the editor client, or a native path (absolute or
//! relative, e.g. from an `@import` directive). Two derived forms matter:
//!
//! - the **identity**: the canonical, normalized native path used as the
//!   registry key — deterministic and idempotent;
//! - the **display URI**: the externally visible locator used when talking
//!   back to the client (diagnostics, events).

use std::path::PathBuf;

use itertools::Itertools;
use tower_lsp::lsp_types::Url;

use crate::documents::DocumentId;
use crate::host::FileHost;

fn is_uri(locator: &str) -> bool {
    locator.contains("://")
}

/// Convert a native path to its `file://` URI spelling: each path segment
/// percent-encoded independently, joined with `/`, prefixed with `file:///`
/// unless the path already starts with a slash (then `file://`, the slash
/// supplying the third one).
pub fn path_to_uri(path: &str) -> String {
    let encoded = path
        .split('/')
        .map(|segment| urlencoding::encode(segment))
        .join("/");
    if path.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

/// The externally visible locator for a document. URI-form locators are
/// kept as given; native paths are converted with [`path_to_uri`].
pub fn display_uri(locator: &str) -> Option<Url> {
    if is_uri(locator) {
        Url::parse(locator).ok()
    } else {
        Url::parse(&path_to_uri(locator)).ok()
    }
}

/// Resolve a raw locator to the canonical registry key.
///
/// URI-form locators are decoded through the transport's own URL handling,
/// then passed through the file-system collaborator's `resolve` and
/// `normalize`; native paths skip the decoding step. Idempotent:
/// normalizing an identity's own spelling yields the same identity.
pub fn normalize_identity(host: &dyn FileHost, locator: &str) -> Option<DocumentId> {
    let native: PathBuf = if is_uri(locator) {
        let url = Url::parse(locator).ok()?;
        if url.scheme() != "file" {
            return None;
        }
        url.to_file_path().ok()?
    } else {
        PathBuf::from(locator)
    };
    let resolved = host.resolve(&native);
    let normalized = host.normalize(&resolved);
    Some(DocumentId::new(normalized.to_string_lossy()))
}
