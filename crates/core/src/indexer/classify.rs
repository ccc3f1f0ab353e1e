//! Identifier classification by syntactic parent, and dotted qualified-name
//! resolution for member/property chains.

use crate::model::Rank;
use tree_sitter::Node;

/// Node kinds that read as identifier occurrences.
pub(crate) fn is_identifier(kind: &str) -> bool {
    matches!(
        kind,
        "identifier"
            | "property_identifier"
            | "shorthand_property_identifier"
            | "shorthand_property_identifier_pattern"
            | "private_property_identifier"
            | "statement_identifier"
    )
}

/// Node kinds that introduce a lexical scope.
pub(crate) fn is_scope_introducer(kind: &str) -> bool {
    matches!(
        kind,
        "program"
            | "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "generator_function"
            | "arrow_function"
            | "method_definition"
    )
}

/// Scope introducers whose name binds in the enclosing scope, not their own.
pub(crate) fn hoists_name(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration" | "generator_function_declaration" | "method_definition"
    )
}

/// Rank an identifier occurrence by its parent context and resolve the name
/// to record it under (dotted for member-chain properties, bare otherwise).
pub(crate) fn classify_identifier(node: Node, code: &[u8]) -> (Rank, String) {
    let Some(parent) = node.parent() else {
        return (Rank::MaybeReference, text(node, code).to_string());
    };

    let mut rank = Rank::MaybeReference;
    let mut name: Option<String> = None;
    match parent.kind() {
        "variable_declarator" => {
            rank = if is_field(parent, "value", node) {
                Rank::Reference
            } else {
                Rank::Definition
            };
        }
        "function_declaration"
        | "generator_function_declaration"
        | "function_expression"
        | "generator_function"
        | "method_definition"
        | "arrow_function"
        | "formal_parameters"
        | "catch_clause"
        | "object_pattern"
        | "array_pattern"
        | "rest_pattern"
        | "object" => {
            rank = Rank::Definition;
        }
        "pair" => {
            rank = if is_field(parent, "key", node) {
                Rank::Definition
            } else {
                Rank::Reference
            };
        }
        "pair_pattern" => {
            rank = if is_field(parent, "value", node) {
                Rank::Definition
            } else {
                Rank::Reference
            };
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            rank = if is_field(parent, "left", node) {
                Rank::Definition
            } else {
                Rank::Reference
            };
        }
        "assignment_expression" | "augmented_assignment_expression" => {
            rank = Rank::MaybeReference;
        }
        "member_expression" => {
            if is_field(parent, "property", node) {
                name = qualified_name(parent, code);
            }
            rank = match parent.parent().map(|g| g.kind()) {
                Some("assignment_expression") | Some("augmented_assignment_expression") => {
                    Rank::MaybeReference
                }
                _ => Rank::Reference,
            };
        }
        kind if is_reference_context(kind) => {
            rank = Rank::Reference;
        }
        other => {
            tracing::debug!(
                "unhandled identifier parent kind {} at offset {}",
                other,
                node.start_byte()
            );
        }
    }

    let name = name
        .or_else(|| qualified_name(node, code))
        .unwrap_or_else(|| text(node, code).to_string());
    (rank, name)
}

/// Parent kinds where an identifier is plainly being read.
fn is_reference_context(kind: &str) -> bool {
    matches!(
        kind,
        "call_expression"
            | "arguments"
            | "new_expression"
            | "unary_expression"
            | "binary_expression"
            | "update_expression"
            | "return_statement"
            | "throw_statement"
            | "for_in_statement"
            | "if_statement"
            | "while_statement"
            | "do_statement"
            | "for_statement"
            | "ternary_expression"
            | "array"
            | "switch_statement"
            | "subscript_expression"
            | "parenthesized_expression"
            | "expression_statement"
            | "sequence_expression"
            | "spread_element"
    )
}

/// Walk upward from `start`, prepending each enclosing node's resolvable name
/// part until a boundary. The walk stops above a contributing node at
/// function bodies and call expressions, at assignment edges unless entered
/// from an object-literal right-hand side, at variable declarators entered
/// from a non-object initializer, and unconditionally at computed access.
pub(crate) fn qualified_name(start: Node, code: &[u8]) -> Option<String> {
    let mut seen: Vec<usize> = Vec::new();
    let mut name: Option<String> = None;
    let mut prev: Option<Node> = None;
    let mut current = Some(start);
    while let Some(node) = current {
        if walk_stops_at(node, prev) {
            break;
        }
        if let Some(part) = resolve_name(node, code, &mut seen) {
            name = Some(match name {
                Some(suffix) => format!("{part}.{suffix}"),
                None => part,
            });
        }
        prev = Some(node);
        current = node.parent();
    }
    name
}

fn walk_stops_at(node: Node, prev: Option<Node>) -> bool {
    match node.kind() {
        "function_expression"
        | "generator_function"
        | "arrow_function"
        | "function_declaration"
        | "generator_function_declaration"
        | "method_definition"
        | "call_expression" => prev.is_some(),
        "assignment_expression" | "augmented_assignment_expression" => prev.is_some_and(|p| {
            p.kind() != "object"
                || node.child_by_field_name("right").map(|r| r.id()) != Some(p.id())
        }),
        "variable_declarator" => prev.is_some_and(|p| {
            p.kind() != "object"
                && node.child_by_field_name("value").map(|v| v.id()) == Some(p.id())
        }),
        "subscript_expression" => true,
        _ => false,
    }
}

/// The name one node contributes to a qualified chain. The seen-set keeps a
/// node from contributing twice when member chains revisit their parts.
fn resolve_name(node: Node, code: &[u8], seen: &mut Vec<usize>) -> Option<String> {
    if seen.contains(&node.id()) {
        return None;
    }
    seen.push(node.id());
    match node.kind() {
        kind if is_identifier(kind) => Some(text(node, code).to_string()),
        "string" => Some(string_value(node, code).to_string()),
        "number" => Some(text(node, code).to_string()),
        "member_expression" => {
            let object = node.child_by_field_name("object")?;
            let property = node.child_by_field_name("property")?;
            if seen.contains(&object.id()) || seen.contains(&property.id()) {
                return None;
            }
            let object = resolve_name(object, code, seen)?;
            let property = resolve_name(property, code, seen)?;
            Some(format!("{object}.{property}"))
        }
        "pair" | "pair_pattern" => resolve_name(node.child_by_field_name("key")?, code, seen),
        "variable_declarator"
        | "function_declaration"
        | "generator_function_declaration"
        | "function_expression"
        | "generator_function"
        | "method_definition" => resolve_name(node.child_by_field_name("name")?, code, seen),
        "assignment_expression" | "augmented_assignment_expression" => {
            resolve_name(node.child_by_field_name("left")?, code, seen)
        }
        "call_expression" => resolve_name(node.child_by_field_name("function")?, code, seen),
        _ => None,
    }
}

pub(crate) fn is_field(parent: Node, field: &str, node: Node) -> bool {
    parent
        .child_by_field_name(field)
        .map(|child| child.id() == node.id())
        .unwrap_or(false)
}

pub(crate) fn text<'a>(node: Node, code: &'a [u8]) -> &'a str {
    node.utf8_text(code).unwrap_or_default()
}

/// A string literal's contents without the surrounding quotes.
fn string_value<'a>(node: Node, code: &'a [u8]) -> &'a str {
    let raw = text(node, code);
    if raw.len() >= 2 {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}
