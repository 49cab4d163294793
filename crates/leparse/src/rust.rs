// Rust language support

use crate::ast::{attr, Attributes, NodeKind};
use crate::grammar::LanguageId;
use crate::traits::{base_type_name, field_text, last_segment, node_text, LanguageSupport};
use tree_sitter::Node;

/// Rust grammar capabilities
#[derive(Debug, Clone, Copy, Default)]
pub struct RustSupport;

impl LanguageSupport for RustSupport {
    fn id(&self) -> LanguageId {
        LanguageId::Rust
    }

    fn node_kind(&self, raw: &str) -> NodeKind {
        match raw {
            "source_file" => NodeKind::Module,
            "function_item" | "function_signature_item" => NodeKind::Function,
            "struct_item" | "enum_item" | "union_item" => NodeKind::Class,
            "trait_item" => NodeKind::Interface,
            "use_declaration" | "extern_crate_declaration" => NodeKind::Import,
            "call_expression" => NodeKind::Call,
            "struct_expression" => NodeKind::Construct,
            "let_declaration" | "const_item" | "static_item" => NodeKind::Variable,
            "assignment_expression" | "compound_assignment_expr" => NodeKind::Assign,
            "parameters" | "closure_parameters" => NodeKind::Parameters,
            "parameter" | "self_parameter" => NodeKind::Parameter,
            "block" => NodeKind::Block,
            "if_expression" | "match_expression" | "match_arm" | "else_clause" => NodeKind::Branch,
            "for_expression" | "while_expression" | "loop_expression" => NodeKind::Loop,
            "return_expression" => NodeKind::Return,
            "field_expression" => NodeKind::FieldAccess,
            "self" => NodeKind::SelfRef,
            "identifier" => NodeKind::Identifier,
            "string_literal" | "raw_string_literal" | "integer_literal" | "float_literal"
            | "boolean_literal" | "char_literal" => NodeKind::Literal,
            "closure_expression" => NodeKind::Lambda,
            "binary_expression" | "unary_expression" => NodeKind::Operator,
            "line_comment" | "block_comment" => NodeKind::Comment,
            "field_declaration" => NodeKind::Field,
            _ => NodeKind::Other,
        }
    }

    fn classify(&self, node: &Node<'_>, source: &[u8]) -> NodeKind {
        match node.kind() {
            "identifier" if node.parent().map(|p| p.kind() == "closure_parameters").unwrap_or(false) => {
                NodeKind::Parameter
            }
            "call_expression" => match callee(node, source) {
                Some(("new", Some(_))) => NodeKind::Construct,
                _ => NodeKind::Call,
            },
            raw => self.node_kind(raw),
        }
    }

    fn annotate(&self, node: &Node<'_>, kind: NodeKind, source: &[u8], attrs: &mut Attributes) {
        match node.kind() {
            "function_item" | "function_signature_item" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                if takes_self(node) {
                    attrs.set(attr::SELF_NAME, "self");
                } else if is_associated(node) {
                    attrs.flag(attr::STATIC);
                }
            }
            "struct_item" | "enum_item" | "union_item" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
            }
            "trait_item" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                if let Some(bounds) = node.child_by_field_name("bounds") {
                    let mut cursor = bounds.walk();
                    for bound in bounds.named_children(&mut cursor) {
                        attrs.push(attr::EXTENDS, last_segment(base_type_name(node_text(&bound, source))));
                    }
                }
            }
            "impl_item" => {
                if let Some(ty) = field_text(node, "type", source) {
                    attrs.set(attr::SCOPE, last_segment(base_type_name(ty)));
                }
                if let Some(tr) = field_text(node, "trait", source) {
                    attrs.push(attr::EXTENDS, last_segment(base_type_name(tr)));
                }
            }
            "use_declaration" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    let mut targets = Vec::new();
                    expand_use(&argument, "", source, &mut targets);
                    for target in targets {
                        attrs.push(attr::IMPORT, target);
                    }
                }
            }
            "extern_crate_declaration" => {
                attrs.push(attr::IMPORT, field_text(node, "name", source).unwrap_or_default());
            }
            "call_expression" => {
                if let Some((name, receiver)) = callee(node, source) {
                    attrs.set(attr::CALLEE, name);
                    if let Some(receiver) = receiver {
                        attrs.set(attr::RECEIVER, receiver);
                        if kind == NodeKind::Construct {
                            attrs.set(attr::CONSTRUCT, last_segment(base_type_name(receiver)));
                        }
                    }
                }
            }
            "struct_expression" => {
                if let Some(name) = field_text(node, "name", source) {
                    let ty = last_segment(base_type_name(name));
                    attrs.set(attr::CALLEE, ty);
                    attrs.set(attr::CONSTRUCT, ty);
                }
            }
            "field_expression" => {
                attrs.set(attr::NAME, field_text(node, "field", source).unwrap_or_default());
                attrs.set(attr::RECEIVER, field_text(node, "value", source).unwrap_or_default());
            }
            "let_declaration" => {
                if let Some(pattern) = node.child_by_field_name("pattern").filter(|p| p.kind() == "identifier") {
                    attrs.set(attr::NAME, node_text(&pattern, source));
                }
            }
            "const_item" | "static_item" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                attrs.flag(attr::STATIC);
            }
            "field_declaration" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
            }
            "assignment_expression" | "compound_assignment_expr" => {
                if let Some(left) = node.child_by_field_name("left") {
                    match left.kind() {
                        "identifier" => attrs.set(attr::NAME, node_text(&left, source)),
                        "field_expression" => {
                            attrs.set(attr::NAME, field_text(&left, "field", source).unwrap_or_default());
                            attrs.set(attr::RECEIVER, field_text(&left, "value", source).unwrap_or_default());
                        }
                        _ => {}
                    }
                }
            }
            "parameter" => {
                attrs.set(attr::NAME, field_text(node, "pattern", source).unwrap_or_default());
            }
            "self_parameter" => attrs.set(attr::NAME, "self"),
            _ => {}
        }
    }

    fn self_names(&self) -> &'static [&'static str] {
        &["self"]
    }
}

fn callee<'s>(node: &Node<'_>, source: &'s [u8]) -> Option<(&'s str, Option<&'s str>)> {
    let mut function = node.child_by_field_name("function")?;
    if function.kind() == "generic_function" {
        function = function.child_by_field_name("function")?;
    }
    match function.kind() {
        "identifier" => Some((node_text(&function, source), None)),
        "field_expression" => Some((
            field_text(&function, "field", source)?,
            field_text(&function, "value", source),
        )),
        "scoped_identifier" => Some((
            field_text(&function, "name", source)?,
            field_text(&function, "path", source),
        )),
        _ => None,
    }
}

fn takes_self(node: &Node<'_>) -> bool {
    node.child_by_field_name("parameters")
        .map(|params| {
            let mut cursor = params.walk();
            let found = params
                .named_children(&mut cursor)
                .any(|p| p.kind() == "self_parameter");
            found
        })
        .unwrap_or(false)
}

/// Function declared inside an `impl` or `trait` body
fn is_associated(node: &Node<'_>) -> bool {
    node.parent()
        .filter(|p| p.kind() == "declaration_list")
        .and_then(|p| p.parent())
        .map(|owner| matches!(owner.kind(), "impl_item" | "trait_item"))
        .unwrap_or(false)
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}::{}", prefix, segment)
    }
}

/// Expand a use tree into one path per imported target
fn expand_use(node: &Node<'_>, prefix: &str, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "use_as_clause" => {
            if let Some(path) = node.child_by_field_name("path") {
                expand_use(&path, prefix, source, out);
            }
        }
        "scoped_use_list" => {
            let nested = match field_text(node, "path", source) {
                Some(path) => join_path(prefix, path),
                None => prefix.to_string(),
            };
            if let Some(list) = node.child_by_field_name("list") {
                expand_use(&list, &nested, source, out);
            }
        }
        "use_list" => {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            for child in children {
                expand_use(&child, prefix, source, out);
            }
        }
        _ => out.push(join_path(prefix, node_text(node, source))),
    }
}
