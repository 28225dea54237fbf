//! Built-in compiler collaborator: a scanner for `.grammar` files.
//!
//! The dialect is deliberately small. A document is a sequence of rule
//! definitions (`Name := body ;`), `@import "path"` directives pulling
//! another grammar into scope, `//` line comments and quoted literals.
//! Identifiers in rule bodies reference rules visible in the defining
//! document or its transitive imports.
//!
//! The analysis walks imports breadth-first from the roots, reading every
//! source through the document layer (which is what turns dependencies
//! into server-open documents), then extracts rules per document and
//! resolves references against each document's visible scope.

use std::any::Any;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet, VecDeque};

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use ropey::Rope;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::compiler::{Compilation, CompileHost, CompileOptions, Compiler, SourceText};
use crate::documents::DocumentId;

static RULE_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*:=").expect("rule pattern"));
static IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*@import\s+"([^"]+)""#).expect("import pattern"));
static IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("ident pattern"));
static LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).expect("literal pattern"));

const SOURCE: &str = "gramarye";

/// A named occurrence in a grammar: a rule definition or a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Symbol {
    name: String,
    range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportDecl {
    spec: String,
    range: Range,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ParsedGrammar {
    rules: Vec<Symbol>,
    references: Vec<Symbol>,
    imports: Vec<ImportDecl>,
}

fn span(line: usize, start: usize, end: usize) -> Range {
    Range {
        start: Position {
            line: line as u32,
            character: start as u32,
        },
        end: Position {
            line: line as u32,
            character: end as u32,
        },
    }
}

/// Line-based extraction of rules, references and imports.
fn parse_grammar(text: &Rope) -> ParsedGrammar {
    let mut parsed = ParsedGrammar::default();

    for (line_idx, line) in text.lines().enumerate() {
        let line = Cow::from(line);
        let code = match line.find("//") {
            Some(comment) => &line[..comment],
            None => &line[..],
        };

        if let Some(captures) = IMPORT.captures(code) {
            if let Some(spec) = captures.get(1) {
                parsed.imports.push(ImportDecl {
                    spec: spec.as_str().to_string(),
                    range: span(line_idx, spec.start(), spec.end()),
                });
            }
            continue;
        }

        // Blank out quoted literals so their contents are not mistaken for
        // identifiers; equal-length replacement keeps every offset stable.
        let mut masked = code.to_string();
        for literal in LITERAL.find_iter(code) {
            masked.replace_range(literal.range(), &" ".repeat(literal.len()));
        }

        let scan_from = match RULE_DEF.captures(&masked) {
            Some(captures) => {
                let def_end = captures.get(0).map(|m| m.end()).unwrap_or(0);
                if let Some(name) = captures.get(1) {
                    parsed.rules.push(Symbol {
                        name: name.as_str().to_string(),
                        range: span(line_idx, name.start(), name.end()),
                    });
                }
                def_end
            }
            None => 0,
        };

        for ident in IDENT.find_iter(&masked[scan_from..]) {
            let start = scan_from + ident.start();
            let end = scan_from + ident.end();
            parsed.references.push(Symbol {
                name: ident.as_str().to_string(),
                range: span(line_idx, start, end),
            });
        }
    }

    parsed
}

/// Where an import landed: the canonical identity of the target, or the
/// reason it has no target.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ImportTarget {
    Resolved(DocumentId),
    NotFound,
    TooDeep,
}

pub struct GrammarCompiler;

impl Compiler for GrammarCompiler {
    fn create(
        &self,
        roots: &[DocumentId],
        options: &CompileOptions,
        previous: Option<Box<dyn Compilation>>,
    ) -> Box<dyn Compilation> {
        Box::new(GrammarCompilation {
            roots: roots.to_vec(),
            options: options.clone(),
            previous,
            sources: HashMap::new(),
            parsed: HashMap::new(),
            imports: HashMap::new(),
            diagnostics: HashMap::new(),
        })
    }
}

pub struct GrammarCompilation {
    roots: Vec<DocumentId>,
    options: CompileOptions,
    previous: Option<Box<dyn Compilation>>,
    sources: HashMap<DocumentId, Rope>,
    parsed: HashMap<DocumentId, ParsedGrammar>,
    imports: HashMap<DocumentId, Vec<(ImportDecl, ImportTarget)>>,
    diagnostics: HashMap<DocumentId, Vec<Diagnostic>>,
}

impl GrammarCompilation {
    /// Read the roots and everything they transitively import. Each
    /// document is read exactly once; import cycles terminate on the
    /// visited set, the depth cutoff bounds runaway chains.
    fn read_sources(&mut self, host: &mut dyn CompileHost) {
        let mut queue: VecDeque<(DocumentId, usize)> = VecDeque::new();
        let mut visited: HashSet<DocumentId> = HashSet::new();

        for root in self.roots.clone() {
            if let Some(source) = host.read(root.as_str()) {
                if visited.insert(source.identity.clone()) {
                    self.sources.insert(source.identity.clone(), source.text);
                    queue.push_back((source.identity, 0));
                }
            }
        }

        while let Some((identity, depth)) = queue.pop_front() {
            let text = match self.sources.get(&identity) {
                Some(text) => text.clone(),
                None => continue,
            };
            let declared = parse_imports_only(&text);
            let mut resolved = Vec::with_capacity(declared.len());

            for decl in declared {
                if depth + 1 > self.options.max_import_depth {
                    resolved.push((decl, ImportTarget::TooDeep));
                    continue;
                }
                let locator = resolve_import(&identity, &decl.spec);
                match host.read(&locator) {
                    Some(source) => {
                        if visited.insert(source.identity.clone()) {
                            self.sources.insert(source.identity.clone(), source.text);
                            queue.push_back((source.identity.clone(), depth + 1));
                        }
                        resolved.push((decl, ImportTarget::Resolved(source.identity)));
                    }
                    None => resolved.push((decl, ImportTarget::NotFound)),
                }
            }
            self.imports.insert(identity, resolved);
        }
    }

    /// Parse every source, reusing the previous compilation's parse for
    /// documents whose text is unchanged.
    fn parse_sources(&mut self) {
        let reuse: HashMap<DocumentId, (Rope, ParsedGrammar)> = match self.previous.take() {
            Some(previous) => match previous.as_any().downcast_ref::<GrammarCompilation>() {
                Some(prev) => prev
                    .parsed
                    .iter()
                    .filter_map(|(id, parsed)| {
                        let text = prev.sources.get(id)?;
                        Some((id.clone(), (text.clone(), parsed.clone())))
                    })
                    .collect(),
                None => HashMap::new(),
            },
            None => HashMap::new(),
        };

        self.parsed = self
            .sources
            .par_iter()
            .map(|(identity, text)| {
                if let Some((old_text, old_parsed)) = reuse.get(identity) {
                    if old_text == text {
                        return (identity.clone(), old_parsed.clone());
                    }
                }
                (identity.clone(), parse_grammar(text))
            })
            .collect();
    }

    /// The documents whose rules are visible from `identity`: itself plus
    /// the transitive closure of its resolved imports.
    fn visible_scope(&self, identity: &DocumentId) -> HashSet<DocumentId> {
        let mut scope = HashSet::new();
        let mut queue = VecDeque::from([identity.clone()]);
        while let Some(current) = queue.pop_front() {
            if !scope.insert(current.clone()) {
                continue;
            }
            if let Some(imports) = self.imports.get(&current) {
                for (_, target) in imports {
                    if let ImportTarget::Resolved(target) = target {
                        queue.push_back(target.clone());
                    }
                }
            }
        }
        scope
    }

    fn check_document(&self, identity: &DocumentId) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if let Some(imports) = self.imports.get(identity) {
            for (decl, target) in imports {
                let message = match target {
                    ImportTarget::Resolved(_) => continue,
                    ImportTarget::NotFound => {
                        format!("Cannot read imported grammar '{}'", decl.spec)
                    }
                    ImportTarget::TooDeep => {
                        format!(
                            "Import of '{}' exceeds the depth limit of {}",
                            decl.spec, self.options.max_import_depth
                        )
                    }
                };
                diagnostics.push(Diagnostic {
                    range: decl.range,
                    severity: Some(DiagnosticSeverity::ERROR),
                    source: Some(SOURCE.into()),
                    message,
                    ..Default::default()
                });
            }
        }

        let Some(parsed) = self.parsed.get(identity) else {
            return diagnostics;
        };

        let scope = self.visible_scope(identity);
        let mut defined: HashMap<&str, usize> = HashMap::new();
        for scoped in &scope {
            if let Some(scoped_parsed) = self.parsed.get(scoped) {
                for rule in &scoped_parsed.rules {
                    *defined.entry(rule.name.as_str()).or_insert(0) += 1;
                }
            }
        }

        for rule in &parsed.rules {
            if defined.get(rule.name.as_str()).copied().unwrap_or(0) > 1 {
                diagnostics.push(Diagnostic {
                    range: rule.range,
                    severity: Some(DiagnosticSeverity::WARNING),
                    source: Some(SOURCE.into()),
                    message: format!("Duplicate definition of rule '{}'", rule.name),
                    ..Default::default()
                });
            }
        }

        if self.options.unresolved_diagnostics {
            for reference in &parsed.references {
                if !defined.contains_key(reference.name.as_str()) {
                    diagnostics.push(Diagnostic {
                        range: reference.range,
                        severity: Some(DiagnosticSeverity::WARNING),
                        source: Some(SOURCE.into()),
                        message: format!("Cannot find rule '{}'", reference.name),
                        ..Default::default()
                    });
                }
            }
        }

        diagnostics
    }
}

impl Compilation for GrammarCompilation {
    fn check(&mut self, host: &mut dyn CompileHost) {
        self.read_sources(host);
        self.parse_sources();
        self.diagnostics = self
            .sources
            .keys()
            .map(|identity| (identity.clone(), self.check_document(identity)))
            .collect();
    }

    fn diagnostics(&self, identity: &DocumentId) -> Vec<Diagnostic> {
        self.diagnostics.get(identity).cloned().unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Import extraction without the full parse; the read walk needs imports
/// before the parallel parse phase has run.
fn parse_imports_only(text: &Rope) -> Vec<ImportDecl> {
    let mut imports = Vec::new();
    for (line_idx, line) in text.lines().enumerate() {
        let line = Cow::from(line);
        let code = match line.find("//") {
            Some(comment) => &line[..comment],
            None => &line[..],
        };
        if let Some(captures) = IMPORT.captures(code) {
            if let Some(spec) = captures.get(1) {
                imports.push(ImportDecl {
                    spec: spec.as_str().to_string(),
                    range: span(line_idx, spec.start(), spec.end()),
                });
            }
        }
    }
    imports
}

/// Import specs are relative to the importing document's directory.
fn resolve_import(importer: &DocumentId, spec: &str) -> String {
    match importer.as_path().parent() {
        Some(parent) => parent.join(spec).to_string_lossy().into_owned(),
        None => spec.to_string(),
    }
}
