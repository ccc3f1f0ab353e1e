use super::Location;
use indexmap::IndexMap;
use serde::Serialize;

/// A lexical region (program root or function body). During indexing each
/// scope accumulates candidate occurrences per name; after resolution only
/// the committed definitions are kept, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Tree node kind that introduced the scope ("program", "function_declaration", ...).
    pub kind: String,
    pub start: usize,
    pub end: usize,
    pub index: usize,
    /// Ancestor scope indices, outermost first.
    pub parent_chain: Vec<usize>,
    /// Name of each committed definition and where it was defined.
    pub definitions: IndexMap<String, Location>,
}
