use super::Location;
use serde::Serialize;
use std::path::PathBuf;

/// A resolved occurrence. Definition symbols carry the references bound to
/// them; reference symbols carry `target`, the definition's location.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub location: Location,
    pub name: String,
    pub scope_index: usize,
    pub definition: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Location>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Location>,
}

/// Name lookup entry: the occurrences of one name usable as
/// find-symbol results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolName {
    pub name: String,
    pub locations: Vec<Location>,
}

/// A syntax error the tolerant parser recovered from, mapped back to the
/// origin file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    pub message: String,
    pub file: PathBuf,
    pub offset: usize,
}
