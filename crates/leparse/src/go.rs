// Go language support

use crate::ast::{attr, Attributes, NodeKind};
use crate::grammar::LanguageId;
use crate::traits::{base_type_name, field_text, last_segment, node_text, unquote, LanguageSupport};
use tree_sitter::Node;

/// Go grammar capabilities
#[derive(Debug, Clone, Copy, Default)]
pub struct GoSupport;

impl LanguageSupport for GoSupport {
    fn id(&self) -> LanguageId {
        LanguageId::Go
    }

    fn node_kind(&self, raw: &str) -> NodeKind {
        match raw {
            "source_file" => NodeKind::Module,
            "function_declaration" | "method_declaration" | "method_elem" => NodeKind::Function,
            "import_spec" => NodeKind::Import,
            "call_expression" => NodeKind::Call,
            "composite_literal" => NodeKind::Construct,
            "var_spec" | "const_spec" => NodeKind::Variable,
            "assignment_statement" | "short_var_declaration" => NodeKind::Assign,
            "parameter_list" => NodeKind::Parameters,
            "parameter_declaration" | "variadic_parameter_declaration" => NodeKind::Parameter,
            "block" => NodeKind::Block,
            "if_statement" | "expression_switch_statement" | "type_switch_statement"
            | "select_statement" | "expression_case" | "type_case" | "default_case"
            | "communication_case" => NodeKind::Branch,
            "for_statement" => NodeKind::Loop,
            "return_statement" => NodeKind::Return,
            "selector_expression" => NodeKind::FieldAccess,
            "identifier" => NodeKind::Identifier,
            "interpreted_string_literal" | "raw_string_literal" | "int_literal" | "float_literal"
            | "rune_literal" | "true" | "false" | "nil" => NodeKind::Literal,
            "func_literal" => NodeKind::Lambda,
            "binary_expression" | "unary_expression" => NodeKind::Operator,
            "comment" => NodeKind::Comment,
            "field_declaration" => NodeKind::Field,
            _ => NodeKind::Other,
        }
    }

    fn classify(&self, node: &Node<'_>, _source: &[u8]) -> NodeKind {
        match node.kind() {
            "type_spec" => match node.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => NodeKind::Class,
                Some("interface_type") => NodeKind::Interface,
                _ => NodeKind::Other,
            },
            // Receiver lists are parameter lists too, but not the callable's parameters
            "parameter_list" if is_receiver_list(node) => NodeKind::Other,
            raw => self.node_kind(raw),
        }
    }

    fn annotate(&self, node: &Node<'_>, kind: NodeKind, source: &[u8], attrs: &mut Attributes) {
        match node.kind() {
            "function_declaration" | "method_elem" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
            }
            "method_declaration" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                if let Some(receiver) = receiver(node) {
                    if let Some(ty) = field_text(&receiver, "type", source) {
                        attrs.set(attr::OWNER, last_segment(base_type_name(ty)));
                    }
                    if let Some(name) = field_text(&receiver, "name", source) {
                        attrs.set(attr::SELF_NAME, name);
                    }
                }
            }
            "type_spec" if kind != NodeKind::Other => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                if let Some(body) = node.child_by_field_name("type") {
                    push_embedded(&body, source, attrs);
                }
            }
            "import_spec" => {
                if let Some(path) = field_text(node, "path", source) {
                    attrs.push(attr::IMPORT, unquote(path));
                }
            }
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    match function.kind() {
                        "identifier" => attrs.set(attr::CALLEE, node_text(&function, source)),
                        "selector_expression" => {
                            attrs.set(attr::CALLEE, field_text(&function, "field", source).unwrap_or_default());
                            attrs.set(attr::RECEIVER, field_text(&function, "operand", source).unwrap_or_default());
                        }
                        _ => {}
                    }
                }
            }
            "composite_literal" => {
                if let Some(ty) = node.child_by_field_name("type") {
                    let name = match ty.kind() {
                        "qualified_type" => field_text(&ty, "name", source).unwrap_or_default(),
                        _ => last_segment(base_type_name(node_text(&ty, source))),
                    };
                    attrs.set(attr::CALLEE, name);
                    attrs.set(attr::CONSTRUCT, name);
                }
            }
            "selector_expression" => {
                attrs.set(attr::NAME, field_text(node, "field", source).unwrap_or_default());
                attrs.set(attr::RECEIVER, field_text(node, "operand", source).unwrap_or_default());
            }
            "var_spec" | "const_spec" | "field_declaration" | "parameter_declaration" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                if node.kind() != "parameter_declaration" && is_package_level(node) {
                    attrs.flag(attr::STATIC);
                }
            }
            "assignment_statement" | "short_var_declaration" => {
                if let Some(left) = node.child_by_field_name("left") {
                    let mut cursor = left.walk();
                    let first = left.named_children(&mut cursor).next();
                    match first {
                        Some(target) if target.kind() == "identifier" => {
                            attrs.set(attr::NAME, node_text(&target, source));
                        }
                        Some(target) if target.kind() == "selector_expression" => {
                            attrs.set(attr::NAME, field_text(&target, "field", source).unwrap_or_default());
                            attrs.set(attr::RECEIVER, field_text(&target, "operand", source).unwrap_or_default());
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn self_names(&self) -> &'static [&'static str] {
        &[]
    }
}

fn receiver<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    let list = node.child_by_field_name("receiver")?;
    let mut cursor = list.walk();
    let first = list
        .named_children(&mut cursor)
        .find(|c| c.kind() == "parameter_declaration");
    first
}

fn is_receiver_list(node: &Node<'_>) -> bool {
    node.parent()
        .filter(|p| p.kind() == "method_declaration")
        .and_then(|p| p.child_by_field_name("receiver"))
        .map(|r| r.id() == node.id())
        .unwrap_or(false)
}

fn is_package_level(node: &Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "source_file" => return true,
            "function_declaration" | "method_declaration" | "func_literal" | "struct_type" => return false,
            _ => current = parent.parent(),
        }
    }
    false
}

/// Embedded struct fields and embedded interfaces
fn push_embedded(body: &Node<'_>, source: &[u8], attrs: &mut Attributes) {
    let container = match body.kind() {
        "struct_type" => {
            let mut cursor = body.walk();
            let list = body
                .named_children(&mut cursor)
                .find(|c| c.kind() == "field_declaration_list");
            list
        }
        "interface_type" => Some(*body),
        _ => None,
    };
    let Some(container) = container else {
        return;
    };
    let mut cursor = container.walk();
    for member in container.named_children(&mut cursor) {
        match member.kind() {
            "field_declaration" if member.child_by_field_name("name").is_none() => {
                if let Some(ty) = field_text(&member, "type", source) {
                    attrs.push(attr::EXTENDS, last_segment(base_type_name(ty)));
                }
            }
            "type_elem" | "constraint_elem" => {
                attrs.push(attr::EXTENDS, last_segment(base_type_name(node_text(&member, source))));
            }
            _ => {}
        }
    }
}
