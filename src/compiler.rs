//! Compiler collaborator boundary.
//!
//! The document layer treats the grammar engine as an opaque service: it
//! hands over a root list, options and a file-read callback, lets it run,
//! and queries diagnostics afterwards. Reads issued during a check go back
//! through the document layer, which is how transitive dependencies become
//! server-open and how the rebuild sweep learns what is still referenced.

use std::any::Any;

use ropey::Rope;
use tower_lsp::lsp_types::Diagnostic;

use crate::config::Settings;
use crate::documents::DocumentId;

/// Options handed to the compiler collaborator, derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Emit diagnostics for references that resolve to nothing.
    pub unresolved_diagnostics: bool,
    /// Hand the previous compilation to the compiler as a reuse hint.
    pub incremental_reuse: bool,
    /// Cutoff for the transitive import walk.
    pub max_import_depth: usize,
}

impl CompileOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        CompileOptions {
            unresolved_diagnostics: settings.unresolved_diagnostics,
            incremental_reuse: settings.incremental_reuse,
            max_import_depth: settings.max_import_depth,
        }
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions::from_settings(&Settings::default())
    }
}

/// One source read through the document layer. The canonical identity comes
/// back with the text so the compiler keys its results the same way the
/// registry does, whatever spelling the read was issued under.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub identity: DocumentId,
    pub text: Rope,
}

/// The file-read callback a compilation uses while checking.
///
/// Client-open documents come back from the in-memory buffer; anything else
/// is read from the file system with full server-open semantics. `None`
/// means the document does not exist — an ordinary outcome, not an error.
pub trait CompileHost {
    fn read(&mut self, locator: &str) -> Option<SourceText>;
}

/// A compiled analysis over one root set.
pub trait Compilation: Send + Sync {
    /// Run (or refresh) the analysis, reading sources through `host`.
    fn check(&mut self, host: &mut dyn CompileHost);

    /// Diagnostics for one tracked document. Empty for documents the
    /// compilation never saw.
    fn diagnostics(&self, identity: &DocumentId) -> Vec<Diagnostic>;

    /// Downcast hook so a compiler can recognize its own previous state
    /// when it is handed back as a reuse hint.
    fn as_any(&self) -> &dyn Any;
}

/// Factory for [`Compilation`]s.
pub trait Compiler: Send + Sync {
    /// Construct a compilation for `roots`. `previous` is the last
    /// compilation, offered for incremental reuse; honoring it is an
    /// optimization, never a correctness requirement.
    fn create(
        &self,
        roots: &[DocumentId],
        options: &CompileOptions,
        previous: Option<Box<dyn Compilation>>,
    ) -> Box<dyn Compilation>;
}
