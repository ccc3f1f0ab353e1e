//! The indexer: parse a composite source with tree-sitter and build the
//! symbol database.
//!
//! Traversal carries its own context (open-scope stack plus the set of
//! already-classified node ids); the parsed tree is never mutated. Candidate
//! occurrences accumulate per scope and per name, and are resolved into
//! definition/reference symbols once the walk is done.

use crate::database::Database;
use crate::error::{JscopeError, Result};
use crate::model::{Location, ParseError, Rank, Scope, Symbol, SymbolName};
use crate::source::SourceUnit;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::PathBuf;
use tree_sitter::{Node, Parser};

mod classify;

pub struct Indexer {
    source: SourceUnit,
}

impl Indexer {
    pub fn new(mut source: SourceUnit) -> Self {
        blank_shebang(&mut source.code);
        Indexer { source }
    }

    pub fn index(self) -> Result<Database> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|e| JscopeError::Internal(format!("grammar rejected: {e}")))?;
        let tree = parser
            .parse(self.source.code.as_bytes(), None)
            .ok_or_else(|| JscopeError::Parsing("parser produced no tree".into()))?;

        let root = tree.root_node();
        let errors = collect_parse_errors(root, &self.source);
        let (scopes, symbols, symbol_names) = {
            let mut walker = Walker::new(&self.source);
            walker.visit(root);
            walker.finish()
        };

        Ok(Database {
            source: self.source,
            symbols,
            symbol_names,
            scopes,
            errors,
        })
    }
}

/// Replace a leading `#!` line with spaces, keeping its newline and every
/// later offset intact.
fn blank_shebang(code: &mut String) {
    if code.starts_with("#!") {
        let end = code.find('\n').unwrap_or(code.len());
        code.replace_range(..end, &" ".repeat(end));
    }
}

fn collect_parse_errors(root: Node, source: &SourceUnit) -> Vec<ParseError> {
    if !root.has_error() {
        return Vec::new();
    }
    let mut found: Vec<(String, usize)> = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            found.push(("syntax error".to_string(), node.start_byte()));
        } else if node.is_missing() {
            found.push((format!("missing {}", node.kind()), node.start_byte()));
        }
        if node.has_error() {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }
    }
    found.sort_by_key(|(_, offset)| *offset);
    found
        .into_iter()
        .map(|(message, offset)| {
            let (file, offset) = match source.resolve(offset) {
                Some(hit) => (hit.file, hit.offset),
                None => (source.main_file.clone(), offset),
            };
            ParseError {
                message,
                file,
                offset,
            }
        })
        .collect()
}

/// Scope under construction. Candidates are occurrences of one name recorded
/// while the scope was open.
struct ScopeFrame {
    kind: &'static str,
    start: usize,
    end: usize,
    parent_chain: Vec<usize>,
    candidates: IndexMap<String, Vec<Location>>,
}

struct Walker<'s> {
    code: &'s [u8],
    main_file: &'s PathBuf,
    frames: Vec<ScopeFrame>,
    open: Vec<usize>,
    classified: HashSet<usize>,
}

impl<'s> Walker<'s> {
    fn new(source: &'s SourceUnit) -> Self {
        Walker {
            code: source.code.as_bytes(),
            main_file: &source.main_file,
            frames: Vec::new(),
            open: Vec::new(),
            classified: HashSet::new(),
        }
    }

    fn visit(&mut self, node: Node) {
        self.enter(node);
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
        self.leave(node);
    }

    fn enter(&mut self, node: Node) {
        let kind = node.kind();
        // A declaration's name binds in the scope the declaration sits in,
        // so it is classified before the declaration's own scope opens.
        if classify::hoists_name(kind) {
            if let Some(name) = node.child_by_field_name("name") {
                if classify::is_identifier(name.kind()) {
                    self.record(name);
                }
            }
        }
        if classify::is_scope_introducer(kind) {
            let index = self.frames.len();
            self.frames.push(ScopeFrame {
                kind,
                start: node.start_byte(),
                end: node.end_byte(),
                parent_chain: Vec::new(),
                candidates: IndexMap::new(),
            });
            self.open.push(index);
        }
        if classify::is_identifier(kind) && !self.classified.contains(&node.id()) {
            self.record(node);
        }
    }

    fn record(&mut self, node: Node) {
        self.classified.insert(node.id());
        let (rank, name) = classify::classify_identifier(node, self.code);
        let location = Location::new(
            self.main_file.clone(),
            node.start_byte(),
            node.end_byte(),
            rank,
        );
        let Some(&scope) = self.open.last() else {
            return;
        };
        self.frames[scope]
            .candidates
            .entry(name)
            .or_default()
            .push(location);
    }

    fn leave(&mut self, node: Node) {
        if classify::is_scope_introducer(node.kind()) {
            if let Some(index) = self.open.pop() {
                self.frames[index].parent_chain = self.open.clone();
            }
        }
    }

    fn finish(mut self) -> (Vec<Scope>, Vec<Symbol>, Vec<SymbolName>) {
        let mut symbols: Vec<Symbol> = Vec::new();
        let mut defs: Vec<IndexMap<String, usize>> = vec![IndexMap::new(); self.frames.len()];
        let mut by_name: IndexMap<String, Vec<Location>> = IndexMap::new();

        // Scopes resolve in creation order, so a parent's definitions are
        // committed before any of its descendants look them up.
        for scope in 0..self.frames.len() {
            let candidates = std::mem::take(&mut self.frames[scope].candidates);
            for (name, mut locations) in candidates {
                locations.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.start.cmp(&b.start)));
                for loc in &locations {
                    if loc.rank != Rank::Reference {
                        by_name.entry(name.clone()).or_default().push(loc.clone());
                    }
                }
                self.resolve(&name, scope, &locations, &mut symbols, &mut defs);
            }
        }

        // Definition locations are copied out before the final sort below
        // invalidates arena positions.
        let scopes = self
            .frames
            .iter()
            .enumerate()
            .map(|(index, frame)| Scope {
                kind: frame.kind.to_string(),
                start: frame.start,
                end: frame.end,
                index,
                parent_chain: frame.parent_chain.clone(),
                definitions: defs[index]
                    .iter()
                    .map(|(name, &sym)| (name.clone(), symbols[sym].location.clone()))
                    .collect(),
            })
            .collect();

        let mut symbol_names: Vec<SymbolName> = by_name
            .into_iter()
            .map(|(name, mut locations)| {
                locations.sort_by(Location::compare);
                SymbolName { name, locations }
            })
            .collect();
        symbol_names.sort_by(|a, b| a.name.cmp(&b.name));

        symbols.sort_by(|a, b| Location::compare(&a.location, &b.location));
        (scopes, symbols, symbol_names)
    }

    /// Resolve one name's sorted candidates within one scope: pick or inherit
    /// a definition, then emit the rest as references bound to it.
    fn resolve(
        &self,
        name: &str,
        scope: usize,
        locations: &[Location],
        symbols: &mut Vec<Symbol>,
        defs: &mut [IndexMap<String, usize>],
    ) {
        let Some(first) = locations.first() else {
            return;
        };
        let mut def: Option<usize> = None;
        let mut local = first.rank != Rank::Reference;
        if first.rank != Rank::Definition {
            for &ancestor in self.frames[scope].parent_chain.iter().rev() {
                if let Some(&existing) = defs[ancestor].get(name) {
                    if !local || symbols[existing].location.rank == Rank::Definition {
                        local = false;
                        def = Some(existing);
                        break;
                    }
                }
            }
        }
        let mut rest = 0;
        if local {
            let index = symbols.len();
            symbols.push(Symbol {
                location: first.clone(),
                name: name.to_string(),
                scope_index: scope,
                definition: true,
                target: None,
                references: Vec::new(),
            });
            defs[scope].insert(name.to_string(), index);
            def = Some(index);
            rest = 1;
        }
        for loc in &locations[rest..] {
            let target = def.map(|index| symbols[index].location.clone());
            if let Some(index) = def {
                symbols[index].references.push(loc.clone());
            }
            symbols.push(Symbol {
                location: loc.clone(),
                name: name.to_string(),
                scope_index: scope,
                definition: false,
                target,
                references: Vec::new(),
            });
        }
    }
}
