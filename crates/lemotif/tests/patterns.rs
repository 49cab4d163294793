// Pattern detection over extracted symbols

use lemotif::{subjects, PatternDetector, PatternId};
use leparse::prelude::*;
use std::sync::Arc;

fn symbols(path: &str, language: LanguageId, source: &str) -> Vec<Symbol> {
    let registry = Arc::new(LanguageRegistry::with_defaults());
    let adapter = ParserAdapter::new(Arc::clone(&registry), Arc::new(AstCache::lru(4)));
    let unit = SourceUnit::new(path, language, source);
    let tree = adapter.parse(&unit, source).expect("parse");
    SymbolExtractor::new(registry).extract(&tree, &unit).expect("extract")
}

fn patterns_of(symbols: &[Symbol], name: &str) -> Vec<(PatternId, f32)> {
    let detector = PatternDetector::default();
    let subjects = subjects(symbols);
    let subject = subjects
        .iter()
        .find(|s| s.symbol.name == name)
        .unwrap_or_else(|| panic!("no subject {}", name));
    detector
        .detect(subject)
        .into_iter()
        .map(|m| (m.pattern, m.confidence))
        .collect()
}

fn has(patterns: &[(PatternId, f32)], id: PatternId) -> bool {
    patterns.iter().any(|(p, _)| *p == id)
}

const SINGLETON: &str = "class Config:
    _instance = None

    @classmethod
    def get_instance(cls):
        if cls._instance is None:
            cls._instance = Config()
        return cls._instance
";

const BUILDER: &str = "class QueryBuilder:
    def __init__(self):
        self.table = None
        self.limit = None

    def from_table(self, table):
        self.table = table
        return self

    def with_limit(self, limit):
        self.limit = limit
        return self

    def build(self):
        return Query(self.table, self.limit)
";

const OBSERVER: &str = "class EventBus:
    def __init__(self):
        self.listeners = []

    def subscribe(self, listener):
        self.listeners.append(listener)

    def notify(self, event):
        for listener in self.listeners:
            listener(event)
";

const STRATEGY: &str = "class Checkout:
    def __init__(self, strategy):
        self.strategy = strategy

    def set_strategy(self, strategy):
        self.strategy = strategy

    def total(self, amount):
        return self.strategy.apply(amount)
";

const COMMAND: &str = "class PasteCommand:
    def __init__(self, editor):
        self.editor = editor

    def execute(self):
        self.editor.paste()

    def undo(self):
        self.editor.delete_last()
";

const FUNCTIONS: &str = "def create_shape(kind):
    if kind == 'circle':
        return Circle()
    return Square()

def logged(fn):
    def wrapper(*args):
        return fn(*args)
    return wrapper

def add(a, b):
    return a + b
";

#[test]
fn test_singleton() {
    let symbols = symbols("config.py", LanguageId::Python, SINGLETON);
    let found = patterns_of(&symbols, "Config");
    assert!(has(&found, PatternId::Singleton), "{:?}", found);
    assert_eq!(found[0].0, PatternId::Singleton);
}

#[test]
fn test_builder() {
    let symbols = symbols("query.py", LanguageId::Python, BUILDER);
    let found = patterns_of(&symbols, "QueryBuilder");
    assert!(has(&found, PatternId::Builder), "{:?}", found);
}

#[test]
fn test_observer() {
    let symbols = symbols("bus.py", LanguageId::Python, OBSERVER);
    let found = patterns_of(&symbols, "EventBus");
    assert!(has(&found, PatternId::Observer), "{:?}", found);
}

#[test]
fn test_strategy() {
    let symbols = symbols("checkout.py", LanguageId::Python, STRATEGY);
    let found = patterns_of(&symbols, "Checkout");
    assert!(has(&found, PatternId::Strategy), "{:?}", found);
}

#[test]
fn test_command() {
    let symbols = symbols("paste.py", LanguageId::Python, COMMAND);
    let found = patterns_of(&symbols, "PasteCommand");
    assert!(has(&found, PatternId::Command), "{:?}", found);
}

#[test]
fn test_function_templates() {
    let symbols = symbols("funcs.py", LanguageId::Python, FUNCTIONS);
    assert!(has(&patterns_of(&symbols, "create_shape"), PatternId::Factory));
    assert!(has(&patterns_of(&symbols, "logged"), PatternId::Decorator));
    assert!(patterns_of(&symbols, "add").is_empty());
}

#[test]
fn test_rust_iterator_across_impl_blocks() {
    let src = "struct Counter {
    pos: u32,
}

impl Iterator for Counter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.pos < 5 {
            self.pos += 1;
            Some(self.pos)
        } else {
            None
        }
    }
}
";
    let symbols = symbols("counter.rs", LanguageId::Rust, src);
    let found = patterns_of(&symbols, "Counter");
    assert!(has(&found, PatternId::Iterator), "{:?}", found);
}

#[test]
fn test_visitor_scores_partial_fit() {
    let src = "class PrintVisitor {
  visitNumber(node) { console.log(node.value); }
  visitAdd(node) { node.left.accept(this); node.right.accept(this); }
}
";
    let symbols = symbols("visit.js", LanguageId::JavaScript, src);
    let detector = PatternDetector::new(0.0);
    let subjects = subjects(&symbols);
    let subject = subjects
        .iter()
        .find(|s| s.symbol.name == "PrintVisitor")
        .expect("subject");
    let visitor = detector
        .score_all(subject)
        .into_iter()
        .find(|(p, _)| *p == PatternId::Visitor)
        .map(|(_, score)| score)
        .expect("visitor applies to classes");
    assert!(visitor > 0.45 && visitor < 0.9, "score {}", visitor);
}

#[test]
fn test_matches_list_subject_first() {
    let symbols = symbols("query.py", LanguageId::Python, BUILDER);
    let detector = PatternDetector::default();
    let all = detector.detect_all(&symbols);
    let class = symbols.iter().find(|s| s.name == "QueryBuilder").expect("class");
    let matches = all.get(&class.id).expect("class matches");
    for m in matches {
        assert_eq!(m.symbols[0], class.id);
        assert!(m.symbols.len() > 1);
        assert!(m.confidence >= detector.min_confidence());
    }
}

#[test]
fn test_threshold_filters_matches() {
    let symbols = symbols("bus.py", LanguageId::Python, OBSERVER);
    let subjects = subjects(&symbols);
    let subject = subjects.iter().find(|s| s.symbol.name == "EventBus").expect("subject");
    let strict = PatternDetector::new(1.0).detect(subject);
    let loose = PatternDetector::new(0.0).detect(subject);
    assert!(strict.len() <= loose.len());
    assert!(strict.iter().all(|m| m.confidence >= 1.0 - 1e-6));
}
