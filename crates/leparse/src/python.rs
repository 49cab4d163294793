// Python language support

use crate::ast::{attr, Attributes, NodeKind};
use crate::grammar::LanguageId;
use crate::traits::{field_text, last_segment, node_text, LanguageSupport};
use tree_sitter::Node;

/// Python grammar capabilities
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonSupport;

const SELF_NAMES: &[&str] = &["self", "cls"];

impl LanguageSupport for PythonSupport {
    fn id(&self) -> LanguageId {
        LanguageId::Python
    }

    fn node_kind(&self, raw: &str) -> NodeKind {
        match raw {
            "module" => NodeKind::Module,
            "function_definition" => NodeKind::Function,
            "class_definition" => NodeKind::Class,
            "import_statement" | "import_from_statement" | "future_import_statement" => NodeKind::Import,
            "call" => NodeKind::Call,
            "assignment" | "augmented_assignment" => NodeKind::Assign,
            "parameters" | "lambda_parameters" => NodeKind::Parameters,
            "typed_parameter" | "default_parameter" | "typed_default_parameter"
            | "list_splat_pattern" | "dictionary_splat_pattern" => NodeKind::Parameter,
            "block" => NodeKind::Block,
            "if_statement" | "elif_clause" | "else_clause" | "conditional_expression"
            | "match_statement" | "case_clause" | "try_statement" | "except_clause" => NodeKind::Branch,
            "for_statement" | "while_statement" | "list_comprehension" | "set_comprehension"
            | "dictionary_comprehension" | "generator_expression" => NodeKind::Loop,
            "return_statement" | "yield" => NodeKind::Return,
            "attribute" => NodeKind::FieldAccess,
            "identifier" => NodeKind::Identifier,
            "string" | "concatenated_string" | "integer" | "float" | "true" | "false" | "none" => {
                NodeKind::Literal
            }
            "lambda" => NodeKind::Lambda,
            "binary_operator" | "boolean_operator" | "comparison_operator" | "unary_operator"
            | "not_operator" => NodeKind::Operator,
            "comment" => NodeKind::Comment,
            _ => NodeKind::Other,
        }
    }

    fn classify(&self, node: &Node<'_>, source: &[u8]) -> NodeKind {
        match node.kind() {
            "identifier" => {
                let in_params = node
                    .parent()
                    .map(|p| matches!(p.kind(), "parameters" | "lambda_parameters"))
                    .unwrap_or(false);
                if in_params {
                    NodeKind::Parameter
                } else if SELF_NAMES.contains(&node_text(node, source)) {
                    NodeKind::SelfRef
                } else {
                    NodeKind::Identifier
                }
            }
            "call" => match callee(node, source) {
                Some((name, _)) if starts_uppercase(name) => NodeKind::Construct,
                _ => NodeKind::Call,
            },
            raw => self.node_kind(raw),
        }
    }

    fn annotate(&self, node: &Node<'_>, kind: NodeKind, source: &[u8], attrs: &mut Attributes) {
        match node.kind() {
            "function_definition" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                if let Some(first) = first_parameter(node, source) {
                    if SELF_NAMES.contains(&first) {
                        attrs.set(attr::SELF_NAME, first);
                    }
                }
                if has_static_decorator(node, source) {
                    attrs.flag(attr::STATIC);
                }
            }
            "class_definition" => {
                attrs.set(attr::NAME, field_text(node, "name", source).unwrap_or_default());
                if let Some(bases) = node.child_by_field_name("superclasses") {
                    let mut cursor = bases.walk();
                    for base in bases.named_children(&mut cursor) {
                        if matches!(base.kind(), "identifier" | "attribute") {
                            attrs.push(attr::EXTENDS, last_segment(node_text(&base, source)));
                        }
                    }
                }
            }
            "call" => {
                if let Some((name, receiver)) = callee(node, source) {
                    attrs.set(attr::CALLEE, name);
                    if let Some(receiver) = receiver {
                        attrs.set(attr::RECEIVER, receiver);
                    }
                    if kind == NodeKind::Construct {
                        attrs.set(attr::CONSTRUCT, name);
                    }
                }
            }
            "attribute" => {
                attrs.set(attr::NAME, field_text(node, "attribute", source).unwrap_or_default());
                attrs.set(attr::RECEIVER, field_text(node, "object", source).unwrap_or_default());
            }
            "import_statement" => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    attrs.push(attr::IMPORT, imported_name(&name, source));
                }
            }
            "import_from_statement" => {
                let module = field_text(node, "module_name", source).unwrap_or_default();
                let mut cursor = node.walk();
                let names: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
                if names.is_empty() {
                    attrs.push(attr::IMPORT, format!("{}.*", module));
                }
                for name in names {
                    attrs.push(attr::IMPORT, format!("{}.{}", module, imported_name(&name, source)));
                }
            }
            "assignment" | "augmented_assignment" => {
                if let Some(left) = node.child_by_field_name("left") {
                    match left.kind() {
                        "identifier" => attrs.set(attr::NAME, node_text(&left, source)),
                        "attribute" => {
                            attrs.set(attr::NAME, field_text(&left, "attribute", source).unwrap_or_default());
                            attrs.set(attr::RECEIVER, field_text(&left, "object", source).unwrap_or_default());
                        }
                        _ => {}
                    }
                }
                if is_class_level(node) {
                    attrs.flag(attr::STATIC);
                }
            }
            _ => {}
        }
    }

    fn self_names(&self) -> &'static [&'static str] {
        SELF_NAMES
    }
}

/// Callee name and receiver text of a call
fn callee<'s>(node: &Node<'_>, source: &'s [u8]) -> Option<(&'s str, Option<&'s str>)> {
    let function = node.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some((node_text(&function, source), None)),
        "attribute" => {
            let name = field_text(&function, "attribute", source)?;
            Some((name, field_text(&function, "object", source)))
        }
        _ => None,
    }
}

fn imported_name<'s>(node: &Node<'_>, source: &'s [u8]) -> &'s str {
    if node.kind() == "aliased_import" {
        field_text(node, "name", source).unwrap_or_default()
    } else {
        node_text(node, source)
    }
}

fn first_parameter<'s>(node: &Node<'_>, source: &'s [u8]) -> Option<&'s str> {
    let params = node.child_by_field_name("parameters")?;
    let mut cursor = params.walk();
    let first = params.named_children(&mut cursor).next()?;
    match first.kind() {
        "identifier" => Some(node_text(&first, source)),
        "typed_parameter" => {
            let mut inner = first.walk();
            let name = first
                .named_children(&mut inner)
                .find(|c| c.kind() == "identifier")
                .map(|c| node_text(&c, source));
            name
        }
        _ => None,
    }
}

fn has_static_decorator(node: &Node<'_>, source: &[u8]) -> bool {
    let Some(parent) = node.parent().filter(|p| p.kind() == "decorated_definition") else {
        return false;
    };
    let mut cursor = parent.walk();
    let found = parent.named_children(&mut cursor).any(|child| {
        child.kind() == "decorator" && {
            let text = node_text(&child, source);
            text.contains("staticmethod") || text.contains("classmethod")
        }
    });
    found
}

/// `expression_statement` directly inside a class body
fn is_class_level(node: &Node<'_>) -> bool {
    let statement = node.parent().filter(|p| p.kind() == "expression_statement");
    let block = statement.and_then(|s| s.parent()).filter(|b| b.kind() == "block");
    block
        .and_then(|b| b.parent())
        .map(|c| c.kind() == "class_definition")
        .unwrap_or(false)
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().map(char::is_uppercase).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstArena;

    fn arena(source: &str) -> AstArena {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&LanguageId::Python.from_cache().expect("grammar"))
            .expect("language");
        let tree = parser.parse(source, None).expect("tree");
        AstArena::from_tree(&tree, source.as_bytes(), &PythonSupport)
    }

    fn first_of(arena: &AstArena, kind: NodeKind) -> &crate::ast::AstNode {
        arena
            .iter()
            .map(|(_, n)| n)
            .find(|n| n.kind == kind)
            .expect("node of kind")
    }

    #[test]
    fn test_class_bases_and_methods() {
        let arena = arena("class Dog(Animal, abc.Walker):\n    def bark(self):\n        pass\n");
        let class = first_of(&arena, NodeKind::Class);
        assert_eq!(class.name(), Some("Dog"));
        assert_eq!(class.attrs.get(attr::EXTENDS), Some("Animal,Walker"));
        let method = first_of(&arena, NodeKind::Function);
        assert_eq!(method.name(), Some("bark"));
        assert_eq!(method.attrs.get(attr::SELF_NAME), Some("self"));
    }

    #[test]
    fn test_calls_and_constructs() {
        let arena = arena("w = Widget()\nself.render(w)\n");
        let construct = first_of(&arena, NodeKind::Construct);
        assert_eq!(construct.attrs.get(attr::CONSTRUCT), Some("Widget"));
        let call = first_of(&arena, NodeKind::Call);
        assert_eq!(call.attrs.get(attr::CALLEE), Some("render"));
        assert_eq!(call.attrs.get(attr::RECEIVER), Some("self"));
    }

    #[test]
    fn test_imports_one_target_each() {
        let arena = arena("import os, sys as system\nfrom pkg.mod import a, b as c\nfrom x import *\n");
        let imports: Vec<Vec<&str>> = arena
            .iter()
            .filter(|(_, n)| n.kind == NodeKind::Import)
            .map(|(_, n)| n.attrs.list(attr::IMPORT).collect())
            .collect();
        assert_eq!(imports[0], vec!["os", "sys"]);
        assert_eq!(imports[1], vec!["pkg.mod.a", "pkg.mod.b"]);
        assert_eq!(imports[2], vec!["x.*"]);
    }

    #[test]
    fn test_class_level_assignment_is_static() {
        let arena = arena("class C:\n    _instance = None\n    def f(self):\n        self.x = 1\n");
        let assigns: Vec<&crate::ast::AstNode> = arena
            .iter()
            .map(|(_, n)| n)
            .filter(|n| n.kind == NodeKind::Assign)
            .collect();
        assert_eq!(assigns.len(), 2);
        assert!(assigns[0].attrs.is_set(attr::STATIC));
        assert_eq!(assigns[0].name(), Some("_instance"));
        assert!(!assigns[1].attrs.is_set(attr::STATIC));
        assert_eq!(assigns[1].attrs.get(attr::RECEIVER), Some("self"));
    }

    #[test]
    fn test_static_decorator() {
        let arena = arena("class C:\n    @staticmethod\n    def make():\n        return C()\n");
        let method = first_of(&arena, NodeKind::Function);
        assert!(method.attrs.is_set(attr::STATIC));
    }
}
