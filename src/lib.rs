//! gramarye: a Language Server Protocol implementation for grammar files
//!
//! This crate provides the core functionality for the gramarye LSP server:
//! tracking the set of grammar documents the server knows about,
//! reconciling the editor client and the file system as two independent
//! sources of truth for each one, and deciding when the analyzer's cached
//! compilation must be discarded and recomputed.
//!
//! # Overview
//!
//! - **Document Tracking**: a registry of tracked documents with dual
//!   (client/server) ownership and automatic reclamation
//! - **Invalidation**: lazy rebuild of the analyzer's working set from the
//!   client-open roots, with mark-and-sweep of stale dependencies
//! - **Update Batching**: explicit suspend/resume coalescing of bursts of
//!   mutations into one downstream recompute
//! - **Grammar Analysis**: a built-in analyzer resolving rule references
//!   across `@import`ed grammars and reporting unresolved ones
//!
//! # Architecture
//!
//! The crate is organized around several key modules:
//!
//! - [`documents`]: the document-state layer (registry, events, batching)
//! - [`compiler`]: the analyzer boundary the document layer drives
//! - [`grammar`]: the built-in grammar analyzer behind that boundary
//! - [`backend`]: tower-lsp plumbing between the protocol and the layer
//!
//! # Usage
//!
//! This crate is primarily used as the backing library for the `gramarye`
//! binary. The public API enables programmatic access to the document
//! layer:
//!
//! ```ignore
//! use std::sync::Arc;
//! use gramarye::compiler::CompileOptions;
//! use gramarye::documents::DocumentManager;
//! use gramarye::grammar::GrammarCompiler;
//! use gramarye::host::OsFileHost;
//!
//! let mut manager = DocumentManager::new(
//!     Arc::new(OsFileHost),
//!     Box::new(GrammarCompiler),
//!     CompileOptions::default(),
//! );
//! manager.client_open("file:///work/main.grammar", "X := 'x';");
//! ```

// Document-state core
pub mod documents;

// Analyzer boundary and the built-in analyzer
pub mod compiler;
pub mod grammar;

// Collaborator boundaries
pub mod host;
pub mod locator;

// Protocol layer
pub mod backend;

// Configuration
pub mod config;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
