// JavaScript and TypeScript language support
//
// TypeScript's grammar is a superset of JavaScript's, so one implementation
// serves both and only differs in the language id it reports.

use crate::ast::{attr, Attributes, NodeKind};
use crate::grammar::LanguageId;
use crate::traits::{base_type_name, field_text, has_token, last_segment, node_text, unquote, LanguageSupport};
use tree_sitter::Node;

/// JavaScript / TypeScript grammar capabilities
#[derive(Debug, Clone, Copy)]
pub struct JavaScriptSupport {
    id: LanguageId,
}

impl JavaScriptSupport {
    /// Support for plain JavaScript
    pub fn javascript() -> Self {
        Self { id: LanguageId::JavaScript }
    }

    /// Support for TypeScript
    pub fn typescript() -> Self {
        Self { id: LanguageId::TypeScript }
    }
}

const FUNCTION_VALUES: &[&str] = &["arrow_function", "function_expression", "function", "generator_function"];

impl LanguageSupport for JavaScriptSupport {
    fn id(&self) -> LanguageId {
        self.id
    }

    fn node_kind(&self, raw: &str) -> NodeKind {
        match raw {
            "program" => NodeKind::Module,
            "function_declaration" | "generator_function_declaration" | "method_definition"
            | "function_signature" | "method_signature" | "abstract_method_signature" => NodeKind::Function,
            "class_declaration" | "abstract_class_declaration" | "class" => NodeKind::Class,
            "interface_declaration" => NodeKind::Interface,
            "import_statement" => NodeKind::Import,
            "call_expression" => NodeKind::Call,
            "new_expression" => NodeKind::Construct,
            "variable_declarator" => NodeKind::Variable,
            "assignment_expression" | "augmented_assignment_expression" => NodeKind::Assign,
            "formal_parameters" => NodeKind::Parameters,
            "required_parameter" | "optional_parameter" | "rest_pattern" | "assignment_pattern" => {
                NodeKind::Parameter
            }
            "statement_block" | "class_body" => NodeKind::Block,
            "if_statement" | "else_clause" | "switch_statement" | "switch_case" | "switch_default"
            | "ternary_expression" | "try_statement" | "catch_clause" => NodeKind::Branch,
            "for_statement" | "for_in_statement" | "while_statement" | "do_statement" => NodeKind::Loop,
            "return_statement" | "yield_expression" => NodeKind::Return,
            "member_expression" => NodeKind::FieldAccess,
            "this" => NodeKind::SelfRef,
            "identifier" => NodeKind::Identifier,
            "string" | "template_string" | "number" | "true" | "false" | "null" | "undefined"
            | "regex" => NodeKind::Literal,
            "arrow_function" | "function_expression" | "function" | "generator_function" => NodeKind::Lambda,
            "binary_expression" | "unary_expression" | "update_expression" => NodeKind::Operator,
            "comment" => NodeKind::Comment,
            "field_definition" | "public_field_definition" | "property_signature" => NodeKind::Field,
            _ => NodeKind::Other,
        }
    }

    fn classify(&self, node: &Node<'_>, _source: &[u8]) -> NodeKind {
        match node.kind() {
            "identifier" if node.parent().map(|p| p.kind() == "formal_parameters").unwrap_or(false) => {
                NodeKind::Parameter
            }
            "variable_declarator" => {
                let is_function = node
                    .child_by_field_name("value")
                    .map(|v| FUNCTION_VALUES.contains(&v.kind()))
                    .unwrap_or(false);
                if is_function {
                    NodeKind::Function
                } else {
                    NodeKind::Variable
                }
            }
            raw => self.node_kind(raw),
        }
    }

    fn annotate(&self, node: &Node<'_>, _kind: NodeKind, source: &[u8], attrs: &mut Attributes) {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
            }
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                if has_token(node, "static") {
                    attrs.flag(attr::STATIC);
                } else {
                    attrs.set(attr::SELF_NAME, "this");
                }
            }
            "variable_declarator" => {
                if let Some(name) = node.child_by_field_name("name").filter(|n| n.kind() == "identifier") {
                    attrs.set(attr::NAME, node_text(&name, source));
                }
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                let mut cursor = node.walk();
                let heritage = node.named_children(&mut cursor).find(|c| c.kind() == "class_heritage");
                if let Some(heritage) = heritage {
                    push_heritage(&heritage, source, attrs);
                }
            }
            "interface_declaration" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                let mut cursor = node.walk();
                let extends = node.named_children(&mut cursor).find(|c| c.kind() == "extends_type_clause");
                if let Some(extends) = extends {
                    push_heritage(&extends, source, attrs);
                }
            }
            "import_statement" => {
                let module = field_text(node, "source", source).map(unquote).unwrap_or_default();
                let mut targets = Vec::new();
                collect_import_targets(node, module, source, &mut targets);
                if targets.is_empty() {
                    targets.push(module.to_string());
                }
                for target in targets {
                    attrs.push(attr::IMPORT, target);
                }
            }
            "call_expression" => {
                if let Some((name, receiver)) = callee(node, source) {
                    attrs.set(attr::CALLEE, name);
                    if let Some(receiver) = receiver {
                        attrs.set(attr::RECEIVER, receiver);
                    }
                }
            }
            "new_expression" => {
                if let Some(ctor) = field_text(node, "constructor", source) {
                    let ty = last_segment(base_type_name(ctor));
                    attrs.set(attr::CALLEE, ty);
                    attrs.set(attr::CONSTRUCT, ty);
                }
            }
            "member_expression" => {
                attrs.set(attr::NAME, field_text(node, "property", source).unwrap_or_default());
                attrs.set(attr::RECEIVER, field_text(node, "object", source).unwrap_or_default());
            }
            "field_definition" | "public_field_definition" | "property_signature" => {
                let name = field_text(node, "property", source).or_else(|| field_text(node, "name", source));
                attrs.set(attr::NAME, name.unwrap_or_default());
                if has_token(node, "static") {
                    attrs.flag(attr::STATIC);
                }
            }
            "assignment_expression" | "augmented_assignment_expression" => {
                if let Some(left) = node.child_by_field_name("left") {
                    match left.kind() {
                        "identifier" => attrs.set(attr::NAME, node_text(&left, source)),
                        "member_expression" => {
                            attrs.set(attr::NAME, field_text(&left, "property", source).unwrap_or_default());
                            attrs.set(attr::RECEIVER, field_text(&left, "object", source).unwrap_or_default());
                        }
                        _ => {}
                    }
                }
            }
            "required_parameter" | "optional_parameter" => {
                attrs.set(attr::NAME, field_text(node, "pattern", source).unwrap_or_default());
            }
            _ => {}
        }
    }

    fn self_names(&self) -> &'static [&'static str] {
        &["this"]
    }
}

fn callee<'s>(node: &Node<'_>, source: &'s [u8]) -> Option<(&'s str, Option<&'s str>)> {
    let function = node.child_by_field_name("function")?;
    match function.kind() {
        "identifier" | "super" => Some((node_text(&function, source), None)),
        "member_expression" => Some((
            field_text(&function, "property", source)?,
            field_text(&function, "object", source),
        )),
        _ => None,
    }
}

/// Base names from `extends` / `implements` clauses (JS and TS shapes)
fn push_heritage(heritage: &Node<'_>, source: &[u8], attrs: &mut Attributes) {
    let mut stack = vec![*heritage];
    while let Some(node) = stack.pop() {
        let mut clauses = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "identifier" | "type_identifier" | "member_expression" | "nested_type_identifier" => {
                    attrs.push(attr::EXTENDS, last_segment(node_text(&child, source)));
                }
                "generic_type" => {
                    let name = field_text(&child, "name", source).unwrap_or_else(|| node_text(&child, source));
                    attrs.push(attr::EXTENDS, last_segment(base_type_name(name)));
                }
                "extends_clause" | "implements_clause" | "extends_type_clause" => clauses.push(child),
                _ => {}
            }
        }
        stack.extend(clauses.into_iter().rev());
    }
}

fn collect_import_targets(node: &Node<'_>, module: &str, source: &[u8], out: &mut Vec<String>) {
    let mut stack = vec![*node];
    while let Some(current) = stack.pop() {
        let mut nested = Vec::new();
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            match child.kind() {
                "import_clause" | "named_imports" => nested.push(child),
                "import_specifier" => {
                    let name = field_text(&child, "name", source).unwrap_or_else(|| node_text(&child, source));
                    out.push(format!("{}::{}", module, name));
                }
                "identifier" | "namespace_import" => out.push(module.to_string()),
                _ => {}
            }
        }
        stack.extend(nested.into_iter().rev());
    }
    out.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstArena, AstNode};

    fn arena(source: &str, support: JavaScriptSupport) -> AstArena {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&support.id().from_cache().expect("grammar"))
            .expect("language");
        let tree = parser.parse(source, None).expect("tree");
        AstArena::from_tree(&tree, source.as_bytes(), &support)
    }

    fn nodes_of(arena: &AstArena, kind: NodeKind) -> Vec<&AstNode> {
        arena.iter().map(|(_, n)| n).filter(|n| n.kind == kind).collect()
    }

    #[test]
    fn test_class_with_static_method_and_heritage() {
        let src = "class Cache extends Store {\n  static shared() { return new Cache(); }\n  get(k) { return this.items[k]; }\n}\n";
        let arena = arena(src, JavaScriptSupport::javascript());
        let class = &nodes_of(&arena, NodeKind::Class)[0];
        assert_eq!(class.name(), Some("Cache"));
        assert_eq!(class.attrs.get(attr::EXTENDS), Some("Store"));

        let methods = nodes_of(&arena, NodeKind::Function);
        assert_eq!(methods.len(), 2);
        assert!(methods[0].attrs.is_set(attr::STATIC));
        assert_eq!(methods[1].attrs.get(attr::SELF_NAME), Some("this"));
        assert_eq!(nodes_of(&arena, NodeKind::Construct)[0].attrs.get(attr::CONSTRUCT), Some("Cache"));
    }

    #[test]
    fn test_arrow_function_binding_is_function() {
        let arena = arena("const add = (a, b) => a + b;\nconst limit = 10;\n", JavaScriptSupport::javascript());
        let functions = nodes_of(&arena, NodeKind::Function);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name(), Some("add"));
        let variables = nodes_of(&arena, NodeKind::Variable);
        assert_eq!(variables[0].name(), Some("limit"));
    }

    #[test]
    fn test_import_targets() {
        let arena = arena(
            "import React, { useState, useEffect as fx } from 'react';\nimport './side.css';\n",
            JavaScriptSupport::javascript(),
        );
        let imports = nodes_of(&arena, NodeKind::Import);
        let first: Vec<&str> = imports[0].attrs.list(attr::IMPORT).collect();
        assert_eq!(first, vec!["react", "react::useState", "react::useEffect"]);
        let second: Vec<&str> = imports[1].attrs.list(attr::IMPORT).collect();
        assert_eq!(second, vec!["./side.css"]);
    }

    #[test]
    fn test_typescript_interface_and_implements() {
        let src = "interface Shape extends Named { area(): number; }\nclass Sq extends Base<T> implements Shape { }\n";
        let arena = arena(src, JavaScriptSupport::typescript());
        let iface = &nodes_of(&arena, NodeKind::Interface)[0];
        assert_eq!(iface.name(), Some("Shape"));
        assert_eq!(iface.attrs.get(attr::EXTENDS), Some("Named"));
        let class = &nodes_of(&arena, NodeKind::Class)[0];
        let bases: Vec<&str> = class.attrs.list(attr::EXTENDS).collect();
        assert_eq!(bases, vec!["Base", "Shape"]);
    }

    #[test]
    fn test_member_call_receiver() {
        let arena = arena("this.emitter.emit('x');\n", JavaScriptSupport::javascript());
        let call = &nodes_of(&arena, NodeKind::Call)[0];
        assert_eq!(call.attrs.get(attr::CALLEE), Some("emit"));
        assert_eq!(call.attrs.get(attr::RECEIVER), Some("this.emitter"));
    }
}
