// Normalized shape trees
//
// A shape is an owned copy of a function or class subtree, reduced to the
// normalized node vocabulary. Grammar-specific wrapper nodes are spliced out,
// so the same construct written in two languages yields comparable shapes.
// Labels (names, callees) are kept for pattern predicates but are excluded
// from the structural hash and from similarity.

use crate::ast::{attr, AstArena, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Upper bound on nodes copied into one shape
pub const MAX_SHAPE_NODES: usize = 4096;

/// One node of a shape tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeNode {
    /// Normalized kind
    pub kind: NodeKind,
    /// Depth below the shape root (root is 0)
    pub depth: u32,
    /// Name, callee or constructed type
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
    /// Receiver expression of calls, field accesses and assignments
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub receiver: Option<String>,
    /// Receiver is the enclosing object itself (`self.x`, `this.f()`)
    #[serde(default)]
    pub on_self: bool,
    /// Receiver is a field of the enclosing object (`self.inner.f()`)
    #[serde(default)]
    pub via_field: bool,
    /// Static / class-level member
    #[serde(default)]
    pub is_static: bool,
    /// Child indices
    pub children: Vec<u32>,
}

/// Owned, normalized, preorder shape tree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeTree {
    nodes: Vec<ShapeNode>,
    #[serde(default)]
    truncated: bool,
}

impl ShapeTree {
    /// Copy the subtree rooted at `root` out of an arena.
    ///
    /// `self_names` are the language's receiver keywords; receiver bindings
    /// declared on methods inside the subtree are added to them.
    pub fn from_arena(arena: &AstArena, root: NodeId, self_names: &[&str]) -> Self {
        let mut receivers: HashSet<String> = self_names.iter().map(|s| s.to_string()).collect();
        for id in arena.subtree(root) {
            if let Some(name) = arena.node(id).attrs.get(attr::SELF_NAME) {
                receivers.insert(name.to_string());
            }
        }

        let mut tree = ShapeTree::default();
        // (arena node, parent shape index)
        let mut stack: Vec<(NodeId, Option<usize>)> = vec![(root, None)];
        while let Some((id, parent)) = stack.pop() {
            let node = arena.node(id);
            let push_children = |stack: &mut Vec<(NodeId, Option<usize>)>, parent: Option<usize>| {
                stack.extend(node.children.iter().rev().map(|child| (*child, parent)));
            };

            let kind = match node.kind {
                NodeKind::Comment => continue,
                NodeKind::Other | NodeKind::Module if parent.is_some() => {
                    push_children(&mut stack, parent);
                    continue;
                }
                NodeKind::Identifier => match node.name() {
                    Some(name) if receivers.contains(name) => NodeKind::SelfRef,
                    _ => continue,
                },
                kind => kind,
            };

            if tree.nodes.len() >= MAX_SHAPE_NODES {
                tree.truncated = true;
                break;
            }

            let receiver = node.attrs.get(attr::RECEIVER).map(str::to_string);
            let on_self = receiver.as_deref().map(|r| receivers.contains(r)).unwrap_or(false);
            let via_field = receiver
                .as_deref()
                .map(|r| {
                    receivers.iter().any(|s| {
                        r.strip_prefix(s.as_str())
                            .map(|rest| rest.starts_with('.') && rest.len() > 1)
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false);

            let label = match kind {
                NodeKind::Call => node.attrs.get(attr::CALLEE).map(str::to_string),
                NodeKind::Construct => node
                    .attrs
                    .get(attr::CONSTRUCT)
                    .or_else(|| node.attrs.get(attr::CALLEE))
                    .map(str::to_string),
                NodeKind::Return => node
                    .children
                    .first()
                    .map(|child| arena.node(*child))
                    .filter(|child| child.kind == NodeKind::Identifier)
                    .and_then(|child| child.name())
                    .map(str::to_string),
                NodeKind::SelfRef | NodeKind::Literal | NodeKind::Block | NodeKind::Operator => None,
                _ => node.name().map(str::to_string),
            };

            let index = tree.nodes.len();
            let depth = parent.map(|p| tree.nodes[p].depth + 1).unwrap_or(0);
            tree.nodes.push(ShapeNode {
                kind,
                depth,
                label,
                receiver,
                on_self,
                via_field,
                is_static: node.attrs.is_set(attr::STATIC),
                children: Vec::new(),
            });
            if let Some(parent) = parent {
                tree.nodes[parent].children.push(index as u32);
            }

            // Literal contents and self receivers are leaves
            if !matches!(kind, NodeKind::Literal | NodeKind::SelfRef) {
                push_children(&mut stack, Some(index));
            }
        }
        tree
    }

    /// All nodes in preorder
    pub fn nodes(&self) -> &[ShapeNode] {
        &self.nodes
    }

    /// Root node
    pub fn root(&self) -> Option<&ShapeNode> {
        self.nodes.first()
    }

    /// Node count
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the shape is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the node cap was hit while copying
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Node by index
    pub fn node(&self, index: u32) -> Option<&ShapeNode> {
        self.nodes.get(index as usize)
    }

    /// Children of a node
    pub fn children(&self, index: u32) -> impl Iterator<Item = &ShapeNode> {
        self.node(index)
            .into_iter()
            .flat_map(move |node| node.children.iter().filter_map(move |c| self.node(*c)))
    }

    /// Children of a node borrowed from this tree
    pub fn children_of<'s>(&'s self, node: &'s ShapeNode) -> impl Iterator<Item = &'s ShapeNode> + 's {
        node.children.iter().filter_map(move |c| self.node(*c))
    }

    /// Preorder indices of the subtree under `index` (including it)
    pub fn descendants(&self, index: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.node(current) {
                out.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Label-free `(kind, depth)` preorder sequence
    pub fn preorder_with_depth(&self) -> Vec<(NodeKind, u32)> {
        self.nodes.iter().map(|n| (n.kind, n.depth)).collect()
    }

    /// blake3 hex digest of the label-free structure
    pub fn structural_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for node in &self.nodes {
            hasher.update(node.kind.as_str().as_bytes());
            hasher.update(&node.depth.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Whether any node matches
    pub fn any(&self, predicate: impl Fn(&ShapeNode) -> bool) -> bool {
        self.nodes.iter().any(predicate)
    }

    /// Count of matching nodes
    pub fn count(&self, predicate: impl Fn(&ShapeNode) -> bool) -> usize {
        self.nodes.iter().filter(|n| predicate(n)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::PythonSupport;
    use crate::rust::RustSupport;
    use crate::traits::LanguageSupport;

    fn shape_of_first_function(source: &str, support: &dyn LanguageSupport) -> ShapeTree {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&support.grammar().expect("grammar"))
            .expect("language");
        let tree = parser.parse(source, None).expect("tree");
        let arena = AstArena::from_tree(&tree, source.as_bytes(), support);
        let (id, _) = arena
            .iter()
            .find(|(_, n)| n.kind == NodeKind::Function)
            .expect("function");
        ShapeTree::from_arena(&arena, id, support.self_names())
    }

    #[test]
    fn test_shape_drops_comments_and_identifiers() {
        let shape = shape_of_first_function(
            "def f(a):\n    # note\n    return a\n",
            &PythonSupport,
        );
        assert!(!shape.any(|n| n.kind == NodeKind::Comment));
        assert!(!shape.any(|n| n.kind == NodeKind::Identifier));
        let ret = shape.nodes().iter().find(|n| n.kind == NodeKind::Return).expect("return");
        assert_eq!(ret.label.as_deref(), Some("a"));
        assert_eq!(shape.root().map(|r| r.label.as_deref()), Some(Some("f")));
    }

    #[test]
    fn test_self_receivers_are_flagged() {
        let shape = shape_of_first_function(
            "def set_name(self, n):\n    self.name = n\n    self._inner.update(n)\n    return self\n",
            &PythonSupport,
        );
        let assign = shape.nodes().iter().find(|n| n.kind == NodeKind::Assign).expect("assign");
        assert!(assign.on_self);
        let call = shape.nodes().iter().find(|n| n.kind == NodeKind::Call).expect("call");
        assert!(call.via_field);
        assert!(!call.on_self);
        let ret = shape
            .nodes()
            .iter()
            .position(|n| n.kind == NodeKind::Return)
            .expect("return") as u32;
        assert!(shape.children(ret).any(|c| c.kind == NodeKind::SelfRef));
    }

    #[test]
    fn test_structural_hash_ignores_labels() {
        let a = shape_of_first_function("def alpha(x):\n    return helper(x)\n", &PythonSupport);
        let b = shape_of_first_function("def beta(y):\n    return other(y)\n", &PythonSupport);
        let c = shape_of_first_function("def gamma(y):\n    if y:\n        return other(y)\n", &PythonSupport);
        assert_eq!(a.structural_hash(), b.structural_hash());
        assert_ne!(a.structural_hash(), c.structural_hash());
    }

    #[test]
    fn test_depths_follow_preorder() {
        let shape = shape_of_first_function("fn f(a: i32) -> i32 { if a > 0 { a } else { 0 } }\n", &RustSupport);
        let seq = shape.preorder_with_depth();
        assert_eq!(seq[0], (NodeKind::Function, 0));
        for window in seq.windows(2) {
            assert!(window[1].1 <= window[0].1 + 1);
        }
    }
}
