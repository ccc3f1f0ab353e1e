//! The per-file symbol database: sorted storage plus offset and name lookup.

use crate::model::{Location, ParseError, Rank, Scope, Symbol, SymbolName};
use crate::source::SourceUnit;
use serde::Serialize;
use std::cmp::Ordering;
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub source: SourceUnit,
    pub symbols: Vec<Symbol>,
    pub symbol_names: Vec<SymbolName>,
    pub scopes: Vec<Scope>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ParseError>,
}

impl Database {
    pub fn index_time(&self) -> SystemTime {
        self.source.indexed_at
    }

    /// Binary search for the symbol whose byte range contains `offset`.
    /// Symbol ranges are disjoint and sorted, so at most one can match.
    pub fn find_symbol(&self, offset: usize) -> Option<(usize, &Symbol)> {
        let pos = self
            .symbols
            .binary_search_by(|sym| {
                if offset < sym.location.start {
                    Ordering::Greater
                } else if offset < sym.location.end {
                    Ordering::Equal
                } else {
                    Ordering::Less
                }
            })
            .ok()?;
        Some((pos, &self.symbols[pos]))
    }

    /// Locations usable as find-symbol results for `name`: strict
    /// definitions, plus the leading occurrence when it is only ambiguous.
    /// `None` means the name is unknown here.
    pub fn find_symbols_by_name(&self, name: &str) -> Option<Vec<Location>> {
        let pos = self
            .symbol_names
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .ok()?;
        let locations = self.symbol_names[pos]
            .locations
            .iter()
            .enumerate()
            .filter(|(i, loc)| {
                loc.rank == Rank::Definition || (*i == 0 && loc.rank == Rank::MaybeReference)
            })
            .map(|(_, loc)| loc.clone())
            .collect();
        Some(locations)
    }

    /// All known names in sorted order, optionally narrowed to a prefix.
    pub fn list_symbol_names(&self, prefix: Option<&str>) -> Vec<String> {
        self.symbol_names
            .iter()
            .filter(|entry| prefix.is_none_or(|p| entry.name.starts_with(p)))
            .map(|entry| entry.name.clone())
            .collect()
    }
}
