use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;
use tower_lsp::lsp_types::ClientCapabilities;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// Emit diagnostics for rule references that resolve to nothing
    pub unresolved_diagnostics: bool,
    /// Offer the previous compilation to the analyzer as a reuse hint
    pub incremental_reuse: bool,
    /// Cutoff for the transitive import walk
    pub max_import_depth: usize,
}

impl Settings {
    pub fn new(root_dir: &Path, capabilities: &ClientCapabilities) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/gramarye/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.gramarye",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("unresolved_diagnostics", true)?
            .set_default("incremental_reuse", true)?
            .set_default("max_import_depth", 16_i64)?
            .set_override_option(
                "unresolved_diagnostics",
                capabilities.text_document.as_ref().and_then(|it| {
                    match it.publish_diagnostics.is_none() {
                        true => Some(false),
                        false => None,
                    }
                }),
            )?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    /// Apply overrides supplied through LSP `initialization_options`.
    pub fn apply_overrides(&mut self, options: &serde_json::Value) {
        if let Some(v) = options
            .get("unresolvedDiagnostics")
            .and_then(|v| v.as_bool())
        {
            self.unresolved_diagnostics = v;
        }
        if let Some(v) = options.get("incrementalReuse").and_then(|v| v.as_bool()) {
            self.incremental_reuse = v;
        }
        if let Some(v) = options.get("maxImportDepth").and_then(|v| v.as_u64()) {
            self.max_import_depth = v as usize;
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            unresolved_diagnostics: true,
            incremental_reuse: true,
            max_import_depth: 16,
        }
    }
}
