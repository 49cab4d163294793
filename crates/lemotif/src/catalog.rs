// Pattern catalog
//
// Ten design-pattern templates, each a list of weighted predicates over a
// subject (a class with its members, or a lone function). Predicate weights
// of one template sum to 1.0, so the score is the structural fit directly.

use leparse::ast::NodeKind;
use leparse::shape::{ShapeNode, ShapeTree};
use leparse::symbol::{Symbol, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Catalog errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// Name does not denote a catalog pattern
    #[error("unknown pattern type '{0}'")]
    UnknownPattern(String),
}

/// Catalog pattern identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternId {
    /// One shared instance behind a static accessor
    Singleton,
    /// Creation of one of several concrete types
    Factory,
    /// Fluent step-wise construction
    Builder,
    /// Subscriber list notified on change
    Observer,
    /// Interchangeable algorithm held in a field
    Strategy,
    /// Wrapper adding behavior around a component
    Decorator,
    /// Interface translation to a wrapped adaptee
    Adapter,
    /// Cursor-driven traversal
    Iterator,
    /// Double dispatch over an element hierarchy
    Visitor,
    /// Encapsulated request with execute/undo
    Command,
}

impl PatternId {
    /// Every pattern, in catalog order
    pub const ALL: [PatternId; 10] = [
        PatternId::Singleton,
        PatternId::Factory,
        PatternId::Builder,
        PatternId::Observer,
        PatternId::Strategy,
        PatternId::Decorator,
        PatternId::Adapter,
        PatternId::Iterator,
        PatternId::Visitor,
        PatternId::Command,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternId::Singleton => "singleton",
            PatternId::Factory => "factory",
            PatternId::Builder => "builder",
            PatternId::Observer => "observer",
            PatternId::Strategy => "strategy",
            PatternId::Decorator => "decorator",
            PatternId::Adapter => "adapter",
            PatternId::Iterator => "iterator",
            PatternId::Visitor => "visitor",
            PatternId::Command => "command",
        }
    }

    /// Template for this pattern
    pub fn template(&self) -> &'static Template {
        &CATALOG[*self as usize]
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternId {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let normalized = normalized.strip_suffix("pattern").unwrap_or(&normalized);
        PatternId::ALL
            .iter()
            .find(|p| p.as_str() == normalized)
            .copied()
            .ok_or_else(|| PatternError::UnknownPattern(s.to_string()))
    }
}

/// One detected pattern instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Pattern
    pub pattern: PatternId,
    /// Subject symbol first, then its participating members
    pub symbols: Vec<SymbolId>,
    /// Structural fit in `[0, 1]`
    pub confidence: f32,
}

/// What a template is scored against: a class with its members, or a function
#[derive(Debug, Clone)]
pub struct PatternSubject<'a> {
    /// Class or function symbol
    pub symbol: &'a Symbol,
    /// Symbols whose parent is `symbol`
    pub members: Vec<&'a Symbol>,
    /// Base type names (resolved and unresolved)
    pub bases: Vec<String>,
}

impl<'a> PatternSubject<'a> {
    /// Build a subject
    pub fn new(symbol: &'a Symbol, members: Vec<&'a Symbol>, bases: Vec<String>) -> Self {
        Self { symbol, members, bases }
    }

    fn name(&self) -> String {
        self.symbol.name.to_lowercase()
    }

    fn methods(&self) -> impl Iterator<Item = &'a Symbol> + '_ {
        self.members.iter().copied().filter(|m| m.kind == SymbolKind::Function)
    }

    fn method_shapes(&self) -> impl Iterator<Item = (String, &'a ShapeTree)> + '_ {
        self.methods()
            .filter_map(|m| m.shape.as_ref().map(|s| (m.name.to_lowercase(), s)))
    }

    /// Own shape followed by member shapes
    fn shapes(&self) -> impl Iterator<Item = &'a ShapeTree> + '_ {
        self.symbol
            .shape
            .iter()
            .chain(self.methods().filter_map(|m| m.shape.as_ref()))
    }

    fn nodes(&self) -> impl Iterator<Item = &'a ShapeNode> + '_ {
        self.shapes().flat_map(|s| s.nodes().iter())
    }

    /// Lowercased field names: declared members plus `self.x` targets
    fn fields(&self) -> BTreeSet<String> {
        let mut fields: BTreeSet<String> = self
            .members
            .iter()
            .filter(|m| m.kind == SymbolKind::Variable)
            .map(|m| m.name.to_lowercase())
            .collect();
        for node in self.nodes() {
            let is_field = match node.kind {
                NodeKind::Assign | NodeKind::FieldAccess => node.on_self,
                NodeKind::Field => true,
                _ => false,
            };
            if let (true, Some(label)) = (is_field, node.label.as_deref()) {
                fields.insert(label.to_lowercase());
            }
        }
        fields
    }

    fn static_fields(&self) -> BTreeSet<String> {
        self.nodes()
            .filter(|n| n.is_static)
            .filter(|n| matches!(n.kind, NodeKind::Assign | NodeKind::Variable | NodeKind::Field))
            .filter_map(|n| n.label.as_deref())
            .map(str::to_lowercase)
            .collect()
    }

    fn has_field(&self, words: &[&str]) -> bool {
        self.fields().iter().any(|f| contains_any(f, words))
    }

    fn method_named(&self, words: &[&str]) -> Option<(String, &'a ShapeTree)> {
        self.method_shapes().find(|(name, _)| contains_any(&normalize(name), words))
    }
}

/// A weighted structural predicate; `check` returns a fit in `[0, 1]`
pub struct Predicate {
    /// Short description
    pub name: &'static str,
    /// Weight within its template
    pub weight: f32,
    check: fn(&PatternSubject<'_>) -> f32,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Pattern template: predicates for class subjects and for function subjects
#[derive(Debug)]
pub struct Template {
    /// Pattern
    pub id: PatternId,
    /// Predicates applied to classes
    pub class: &'static [Predicate],
    /// Predicates applied to functions (empty when not applicable)
    pub function: &'static [Predicate],
}

impl Template {
    /// Structural fit of a subject, or `None` when the template does not apply
    pub fn score(&self, subject: &PatternSubject<'_>) -> Option<f32> {
        let predicates = match subject.symbol.kind {
            SymbolKind::Class => self.class,
            SymbolKind::Function => self.function,
            _ => return None,
        };
        if predicates.is_empty() {
            return None;
        }
        let total: f32 = predicates
            .iter()
            .map(|p| p.weight * (p.check)(subject).clamp(0.0, 1.0))
            .sum();
        Some(total.clamp(0.0, 1.0))
    }
}

fn fit(condition: bool) -> f32 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Lowercase with separators removed (`get_instance` -> `getinstance`)
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// `return self` / `return this` / tail `self`
fn returns_self(shape: &ShapeTree) -> bool {
    let nodes = shape.nodes();
    let explicit = nodes.iter().any(|n| {
        n.kind == NodeKind::Return && shape.children_of(n).any(|c| c.kind == NodeKind::SelfRef)
    });
    let tail = shape
        .root()
        .and_then(|root| shape.children_of(root).filter(|c| c.kind == NodeKind::Block).last())
        .and_then(|block| shape.children_of(block).last())
        .map(|last| last.kind == NodeKind::SelfRef)
        .unwrap_or(false);
    explicit || tail
}

fn assigns_self(shape: &ShapeTree) -> bool {
    shape.any(|n| n.kind == NodeKind::Assign && n.on_self)
}

fn returns_construct(shape: &ShapeTree) -> bool {
    shape.nodes().iter().enumerate().any(|(i, n)| {
        n.kind == NodeKind::Return
            && shape
                .descendants(i as u32)
                .into_iter()
                .filter_map(|d| shape.node(d))
                .any(|d| d.kind == NodeKind::Construct)
    })
}

fn constructed(shape: &ShapeTree) -> impl Iterator<Item = &str> {
    shape
        .nodes()
        .iter()
        .filter(|n| n.kind == NodeKind::Construct)
        .filter_map(|n| n.label.as_deref())
}

fn field_calls(shape: &ShapeTree) -> impl Iterator<Item = &str> {
    shape
        .nodes()
        .iter()
        .filter(|n| n.kind == NodeKind::Call && n.via_field)
        .filter_map(|n| n.label.as_deref())
}

fn loop_with_call(shape: &ShapeTree) -> bool {
    shape.nodes().iter().enumerate().any(|(i, n)| {
        n.kind == NodeKind::Loop
            && shape
                .descendants(i as u32)
                .into_iter()
                .skip(1)
                .filter_map(|d| shape.node(d))
                .any(|d| d.kind == NodeKind::Call)
    })
}

const INSTANCE_WORDS: &[&str] = &["instance", "shared", "singleton"];
const ACCESSOR_WORDS: &[&str] = &["getinstance", "instance", "shared", "global", "default"];
const FACTORY_WORDS: &[&str] = &["create", "make", "factory"];
const BUILD_WORDS: &[&str] = &["build", "finish", "construct"];
const OBSERVER_FIELDS: &[&str] = &["observer", "listener", "subscriber", "handler", "callback", "watcher"];
const SUBSCRIBE_WORDS: &[&str] = &["subscribe", "attach", "addlistener", "addobserver", "register", "addhandler"];
const NOTIFY_WORDS: &[&str] = &["notify", "emit", "publish", "dispatch", "fire", "broadcast"];
const STRATEGY_FIELDS: &[&str] = &["strategy", "policy", "algorithm", "behavior", "behaviour"];
const COMPONENT_FIELDS: &[&str] = &["wrapped", "component", "inner", "delegate", "decorated"];
const ADAPTEE_FIELDS: &[&str] = &["adaptee", "adapted", "wrapped", "client", "service", "legacy", "backend", "inner"];
const NEXT_WORDS: &[&str] = &["next", "hasnext", "movenext"];
const ITER_WORDS: &[&str] = &["iter", "iterator"];
const CURSOR_FIELDS: &[&str] = &["index", "idx", "pos", "cursor", "current", "offset"];
const EXECUTE_WORDS: &[&str] = &["execute", "run", "call", "perform", "invoke", "apply"];
const UNDO_WORDS: &[&str] = &["undo", "revert", "rollback"];
const COMMAND_NAMES: &[&str] = &["command", "action", "task", "job"];

// Singleton

fn has_static_instance(s: &PatternSubject<'_>) -> f32 {
    fit(s.static_fields().iter().any(|f| contains_any(f, INSTANCE_WORDS)))
}

fn has_instance_accessor(s: &PatternSubject<'_>) -> f32 {
    fit(s.methods().any(|m| {
        let name = normalize(&m.name);
        ACCESSOR_WORDS.iter().any(|w| name == *w || name == format!("get{}", w))
    }))
}

fn constructs_itself(s: &PatternSubject<'_>) -> f32 {
    let own = s.symbol.name.as_str();
    fit(s.shapes().any(|shape| {
        constructed(shape).any(|t| t == own || t == "Self" || t == "cls")
            || shape.any(|n| n.kind == NodeKind::Call && n.label.as_deref() == Some("cls"))
    }))
}

static SINGLETON: &[Predicate] = &[
    Predicate { name: "static instance field", weight: 0.4, check: has_static_instance },
    Predicate { name: "instance accessor", weight: 0.35, check: has_instance_accessor },
    Predicate { name: "constructs own type", weight: 0.25, check: constructs_itself },
];

// Factory

fn factory_name(s: &PatternSubject<'_>) -> f32 {
    let own = contains_any(&s.name(), FACTORY_WORDS);
    let method = s.methods().any(|m| contains_any(&normalize(&m.name), FACTORY_WORDS));
    fit(own || method)
}

fn returns_new_object(s: &PatternSubject<'_>) -> f32 {
    fit(s.shapes().any(returns_construct))
}

fn several_products(s: &PatternSubject<'_>) -> f32 {
    let own = s.symbol.name.as_str();
    let products: BTreeSet<&str> = s
        .shapes()
        .flat_map(constructed)
        .filter(|t| *t != own && *t != "Self")
        .collect();
    fit(products.len() >= 2)
}

static FACTORY: &[Predicate] = &[
    Predicate { name: "factory naming", weight: 0.3, check: factory_name },
    Predicate { name: "returns a constructed object", weight: 0.4, check: returns_new_object },
    Predicate { name: "several product types", weight: 0.3, check: several_products },
];

// Builder

fn fluent_setters(s: &PatternSubject<'_>) -> f32 {
    let count = s
        .method_shapes()
        .filter(|(_, shape)| returns_self(shape) && assigns_self(shape))
        .count();
    match count {
        0 => 0.0,
        1 => 0.45,
        _ => 1.0,
    }
}

fn build_method(s: &PatternSubject<'_>) -> f32 {
    fit(s
        .method_named(BUILD_WORDS)
        .map(|(_, shape)| constructed(shape).next().is_some())
        .unwrap_or(false))
}

fn builder_name(s: &PatternSubject<'_>) -> f32 {
    fit(s.name().ends_with("builder"))
}

static BUILDER: &[Predicate] = &[
    Predicate { name: "fluent setters", weight: 0.45, check: fluent_setters },
    Predicate { name: "build method constructs", weight: 0.35, check: build_method },
    Predicate { name: "builder naming", weight: 0.2, check: builder_name },
];

// Observer

fn observer_field(s: &PatternSubject<'_>) -> f32 {
    fit(s.has_field(OBSERVER_FIELDS))
}

fn subscribe_method(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_named(SUBSCRIBE_WORDS).is_some())
}

fn notify_method(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_named(NOTIFY_WORDS).is_some())
}

fn notifies_in_loop(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_shapes().any(|(_, shape)| loop_with_call(shape)))
}

static OBSERVER: &[Predicate] = &[
    Predicate { name: "observer collection", weight: 0.3, check: observer_field },
    Predicate { name: "subscribe method", weight: 0.25, check: subscribe_method },
    Predicate { name: "notify method", weight: 0.2, check: notify_method },
    Predicate { name: "calls in a loop", weight: 0.25, check: notifies_in_loop },
];

// Strategy

fn strategy_field(s: &PatternSubject<'_>) -> f32 {
    fit(s.has_field(STRATEGY_FIELDS))
}

fn delegates_to_field(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_shapes().any(|(_, shape)| field_calls(shape).next().is_some()))
}

fn strategy_setter(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_shapes().any(|(name, shape)| {
        name.starts_with("set")
            && shape.any(|n| {
                n.kind == NodeKind::Assign
                    && n.on_self
                    && n.label.as_deref().map(|l| contains_any(&l.to_lowercase(), STRATEGY_FIELDS)).unwrap_or(false)
            })
    }))
}

static STRATEGY: &[Predicate] = &[
    Predicate { name: "strategy field", weight: 0.35, check: strategy_field },
    Predicate { name: "delegates through a field", weight: 0.35, check: delegates_to_field },
    Predicate { name: "strategy setter", weight: 0.3, check: strategy_setter },
];

// Decorator

fn component_field(s: &PatternSubject<'_>) -> f32 {
    fit(s.has_field(COMPONENT_FIELDS))
}

fn has_base(s: &PatternSubject<'_>) -> f32 {
    fit(!s.bases.is_empty())
}

fn forwards_same_operation(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_shapes().any(|(name, shape)| {
        field_calls(shape).any(|callee| normalize(callee) == normalize(&name))
    }))
}

fn decorator_name(s: &PatternSubject<'_>) -> f32 {
    fit(contains_any(&s.name(), &["decorator", "wrapper"]))
}

fn defines_inner_function(s: &PatternSubject<'_>) -> f32 {
    fit(s
        .symbol
        .shape
        .as_ref()
        .map(|shape| shape.nodes().iter().skip(1).any(|n| matches!(n.kind, NodeKind::Function | NodeKind::Lambda)))
        .unwrap_or(false))
}

fn returns_inner_function(s: &PatternSubject<'_>) -> f32 {
    let Some(shape) = s.symbol.shape.as_ref() else {
        return 0.0;
    };
    let inner: BTreeSet<&str> = shape
        .nodes()
        .iter()
        .skip(1)
        .filter(|n| n.kind == NodeKind::Function)
        .filter_map(|n| n.label.as_deref())
        .collect();
    fit(shape.nodes().iter().any(|n| {
        n.kind == NodeKind::Return
            && (n.label.as_deref().map(|l| inner.contains(l)).unwrap_or(false)
                || shape.children_of(n).any(|c| c.kind == NodeKind::Lambda))
    }))
}

fn calls_wrapped_parameter(s: &PatternSubject<'_>) -> f32 {
    let Some(shape) = s.symbol.shape.as_ref() else {
        return 0.0;
    };
    let params: BTreeSet<&str> = shape
        .nodes()
        .iter()
        .filter(|n| n.kind == NodeKind::Parameter && n.depth <= 2)
        .filter_map(|n| n.label.as_deref())
        .collect();
    fit(shape
        .nodes()
        .iter()
        .any(|n| n.kind == NodeKind::Call && n.label.as_deref().map(|l| params.contains(l)).unwrap_or(false)))
}

static DECORATOR_CLASS: &[Predicate] = &[
    Predicate { name: "wrapped component field", weight: 0.3, check: component_field },
    Predicate { name: "shares a base type", weight: 0.2, check: has_base },
    Predicate { name: "forwards the same operation", weight: 0.35, check: forwards_same_operation },
    Predicate { name: "decorator naming", weight: 0.15, check: decorator_name },
];

static DECORATOR_FUNCTION: &[Predicate] = &[
    Predicate { name: "defines an inner function", weight: 0.4, check: defines_inner_function },
    Predicate { name: "returns the inner function", weight: 0.4, check: returns_inner_function },
    Predicate { name: "calls the wrapped callable", weight: 0.2, check: calls_wrapped_parameter },
];

// Adapter

fn adaptee_field(s: &PatternSubject<'_>) -> f32 {
    fit(s.has_field(ADAPTEE_FIELDS))
}

fn translates_calls(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_shapes().any(|(name, shape)| {
        field_calls(shape).any(|callee| normalize(callee) != normalize(&name))
    }))
}

fn adapter_name(s: &PatternSubject<'_>) -> f32 {
    fit(contains_any(&s.name(), &["adapter", "wrapper"]))
}

static ADAPTER: &[Predicate] = &[
    Predicate { name: "adaptee field", weight: 0.3, check: adaptee_field },
    Predicate { name: "implements a target type", weight: 0.2, check: has_base },
    Predicate { name: "translates calls", weight: 0.3, check: translates_calls },
    Predicate { name: "adapter naming", weight: 0.2, check: adapter_name },
];

// Iterator

fn next_method(s: &PatternSubject<'_>) -> f32 {
    fit(s.methods().any(|m| NEXT_WORDS.contains(&normalize(&m.name).as_str())))
}

fn iterable(s: &PatternSubject<'_>) -> f32 {
    let method = s.methods().any(|m| ITER_WORDS.contains(&normalize(&m.name).as_str()));
    let base = s.bases.iter().any(|b| contains_any(&b.to_lowercase(), &["iterator", "iterable"]));
    fit(method || base)
}

fn cursor_field(s: &PatternSubject<'_>) -> f32 {
    fit(s.has_field(CURSOR_FIELDS))
}

fn next_branches(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_shapes().any(|(name, shape)| {
        NEXT_WORDS.contains(&normalize(&name).as_str()) && shape.any(|n| n.kind == NodeKind::Branch)
    }))
}

static ITERATOR: &[Predicate] = &[
    Predicate { name: "next method", weight: 0.35, check: next_method },
    Predicate { name: "iterable protocol", weight: 0.25, check: iterable },
    Predicate { name: "cursor field", weight: 0.2, check: cursor_field },
    Predicate { name: "end-of-sequence check", weight: 0.2, check: next_branches },
];

// Visitor

fn visit_methods(s: &PatternSubject<'_>) -> f32 {
    match s.methods().filter(|m| normalize(&m.name).starts_with("visit")).count() {
        0 => 0.0,
        1 => 0.5,
        _ => 1.0,
    }
}

fn visitor_name(s: &PatternSubject<'_>) -> f32 {
    fit(s.name().contains("visitor"))
}

fn visit_calls(shape: &ShapeTree) -> impl Iterator<Item = &ShapeNode> {
    shape.nodes().iter().filter(|n| {
        n.kind == NodeKind::Call && n.label.as_deref().map(|l| normalize(l).starts_with("visit")).unwrap_or(false)
    })
}

fn accept_dispatches(s: &PatternSubject<'_>) -> f32 {
    fit(s
        .method_shapes()
        .any(|(name, shape)| name.starts_with("accept") && visit_calls(shape).next().is_some()))
}

fn passes_itself(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_shapes().any(|(_, shape)| {
        visit_calls(shape).any(|call| shape.children_of(call).any(|c| c.kind == NodeKind::SelfRef))
    }))
}

static VISITOR: &[Predicate] = &[
    Predicate { name: "visit methods", weight: 0.35, check: visit_methods },
    Predicate { name: "visitor naming", weight: 0.15, check: visitor_name },
    Predicate { name: "accept dispatches to visit", weight: 0.35, check: accept_dispatches },
    Predicate { name: "passes itself to the visitor", weight: 0.15, check: passes_itself },
];

// Command

fn execute_method(s: &PatternSubject<'_>) -> f32 {
    fit(s.methods().any(|m| EXECUTE_WORDS.contains(&normalize(&m.name).as_str())))
}

fn undo_method(s: &PatternSubject<'_>) -> f32 {
    fit(s.methods().any(|m| UNDO_WORDS.contains(&normalize(&m.name).as_str())))
}

fn command_name(s: &PatternSubject<'_>) -> f32 {
    fit(contains_any(&s.name(), COMMAND_NAMES))
}

fn execute_uses_receiver(s: &PatternSubject<'_>) -> f32 {
    fit(s.method_shapes().any(|(name, shape)| {
        EXECUTE_WORDS.contains(&normalize(&name).as_str()) && field_calls(shape).next().is_some()
    }))
}

static COMMAND: &[Predicate] = &[
    Predicate { name: "execute method", weight: 0.35, check: execute_method },
    Predicate { name: "undo method", weight: 0.25, check: undo_method },
    Predicate { name: "command naming", weight: 0.2, check: command_name },
    Predicate { name: "execute calls its receiver", weight: 0.2, check: execute_uses_receiver },
];

/// The catalog, indexed by `PatternId as usize`
pub static CATALOG: [Template; 10] = [
    Template { id: PatternId::Singleton, class: SINGLETON, function: &[] },
    Template { id: PatternId::Factory, class: FACTORY, function: FACTORY },
    Template { id: PatternId::Builder, class: BUILDER, function: &[] },
    Template { id: PatternId::Observer, class: OBSERVER, function: &[] },
    Template { id: PatternId::Strategy, class: STRATEGY, function: &[] },
    Template { id: PatternId::Decorator, class: DECORATOR_CLASS, function: DECORATOR_FUNCTION },
    Template { id: PatternId::Adapter, class: ADAPTER, function: &[] },
    Template { id: PatternId::Iterator, class: ITERATOR, function: &[] },
    Template { id: PatternId::Visitor, class: VISITOR, function: &[] },
    Template { id: PatternId::Command, class: COMMAND, function: &[] },
];

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_catalog_order_matches_ids() {
        for id in PatternId::ALL {
            assert_eq!(id.template().id, id);
        }
    }

    #[test]
    fn test_template_weights_sum_to_one() {
        for template in &CATALOG {
            for predicates in [template.class, template.function] {
                if predicates.is_empty() {
                    continue;
                }
                let total: f32 = predicates.iter().map(|p| p.weight).sum();
                assert!((total - 1.0).abs() < 1e-5, "{} weights sum to {}", template.id, total);
            }
        }
    }

    #[rstest]
    #[case("singleton", PatternId::Singleton)]
    #[case("Observer", PatternId::Observer)]
    #[case("factory_pattern", PatternId::Factory)]
    #[case(" visitor ", PatternId::Visitor)]
    fn test_pattern_from_str(#[case] input: &str, #[case] expected: PatternId) {
        assert_eq!(input.parse::<PatternId>(), Ok(expected));
    }

    #[test]
    fn test_unknown_pattern_is_error() {
        assert_eq!(
            "monad".parse::<PatternId>(),
            Err(PatternError::UnknownPattern("monad".to_string()))
        );
    }

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize("get_Instance"), "getinstance");
        assert_eq!(normalize("__next__"), "next");
    }
}
