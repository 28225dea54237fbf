//! tower-lsp plumbing: forwards client notifications into the document
//! layer and ships update reports back out as published diagnostics.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    DidChangeTextDocumentParams, DidChangeWatchedFilesParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, InitializeParams, InitializeResult, InitializedParams, MessageType,
    ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
};
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::compiler::CompileOptions;
use crate::config::Settings;
use crate::documents::{DocumentManager, UpdateReport};
use crate::grammar::GrammarCompiler;
use crate::host::OsFileHost;

pub struct Backend {
    client: Client,
    manager: Arc<RwLock<Option<DocumentManager>>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Backend {
            client,
            manager: Arc::new(RwLock::new(None)),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root: PathBuf = params
            .root_uri
            .as_ref()
            .and_then(|uri| uri.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut settings =
            Settings::new(&root, &params.capabilities).unwrap_or_else(|_| Settings::default());
        if let Some(options) = params.initialization_options.as_ref() {
            settings.apply_overrides(options);
        }

        let mut manager = DocumentManager::new(
            Arc::new(OsFileHost),
            Box::new(GrammarCompiler),
            CompileOptions::from_settings(&settings),
        );

        // Bridge the synchronous "updated" stream onto the async client:
        // reports are queued here and published by the task below.
        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<UpdateReport>();
        manager.events_mut().subscribe_updated(move |report| {
            let _ = report_tx.send(report.clone());
        });
        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(report) = report_rx.recv().await {
                for (uri, diagnostics) in report.diagnostics {
                    client.publish_diagnostics(uri, diagnostics, None).await;
                }
            }
        });

        *self.manager.write().await = Some(manager);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "gramarye".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "gramarye initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let mut guard = self.manager.write().await;
        if let Some(manager) = guard.as_mut() {
            manager.client_open(
                params.text_document.uri.as_str(),
                &params.text_document.text,
            );
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let changes: Vec<&str> = params
            .content_changes
            .iter()
            .map(|change| change.text.as_str())
            .collect();
        let mut guard = self.manager.write().await;
        if let Some(manager) = guard.as_mut() {
            manager.client_change(params.text_document.uri.as_str(), &changes);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let mut guard = self.manager.write().await;
        if let Some(manager) = guard.as_mut() {
            manager.client_close(params.text_document.uri.as_str());
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        // Not wired into the document layer: server-held documents are
        // refreshed on the next explicit open, not on watch notifications.
        self.client
            .log_message(
                MessageType::LOG,
                format!("ignoring {} watched file change(s)", params.changes.len()),
            )
            .await;
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
