// Integration and unit tests for leparse

use crate::prelude::*;
use std::sync::Arc;

fn adapter(capacity: usize) -> ParserAdapter {
    ParserAdapter::new(
        Arc::new(LanguageRegistry::with_defaults()),
        Arc::new(AstCache::lru(capacity)),
    )
}

#[cfg(test)]
mod cache_tests {
    use super::*;

    #[test]
    fn test_second_parse_is_a_hit() {
        let adapter = adapter(8);
        let src = "def f():\n    return 1\n";
        let unit = SourceUnit::new("a.py", LanguageId::Python, src);

        let first = adapter.parse(&unit, src).expect("parse");
        let second = adapter.parse(&unit, src).expect("parse");
        assert!(Arc::ptr_eq(&first, &second));

        let stats = adapter.cache().stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_new_content_hash_is_a_new_entry() {
        let adapter = adapter(8);
        let v1 = "x = 1\n";
        let v2 = "x = 2\n";
        let a = adapter
            .parse(&SourceUnit::new("a.py", LanguageId::Python, v1), v1)
            .expect("parse");
        let b = adapter
            .parse(&SourceUnit::new("a.py", LanguageId::Python, v2), v2)
            .expect("parse");
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(adapter.cache().stats().misses, 2);
        assert_eq!(adapter.cache().stats().entries, 2);
    }

    #[test]
    fn test_evict_path_drops_every_version() {
        let adapter = adapter(8);
        for src in ["x = 1\n", "x = 2\n"] {
            adapter
                .parse(&SourceUnit::new("a.py", LanguageId::Python, src), src)
                .expect("parse");
        }
        let other = "y = 1\n";
        adapter
            .parse(&SourceUnit::new("b.py", LanguageId::Python, other), other)
            .expect("parse");

        assert_eq!(adapter.cache().evict_path("a.py"), 2);
        assert_eq!(adapter.cache().stats().entries, 1);
        let key = CacheKey::new("b.py", content_hash(other), LanguageId::Python);
        assert!(adapter.cache().get(&key).is_some());
    }

    #[test]
    fn test_language_change_is_a_new_entry() {
        let adapter = adapter(8);
        let src = "function total(a: number): number {\n  return a;\n}\n";
        let as_js = SourceUnit::new("calc.ts", LanguageId::JavaScript, src);
        assert!(matches!(adapter.parse(&as_js, src), Err(Error::SyntaxError { .. })));

        let as_ts = SourceUnit::new("calc.ts", LanguageId::TypeScript, src);
        let tree = adapter.parse(&as_ts, src).expect("parse as typescript");
        assert_eq!(tree.language, LanguageId::TypeScript);
        assert_eq!(adapter.cache().stats().misses, 2);
        assert_eq!(adapter.cache().evict_path("calc.ts"), 2);
    }

    #[test]
    fn test_capacity_bounds_entries() {
        let adapter = adapter(2);
        for (i, path) in ["a.py", "b.py", "c.py"].iter().enumerate() {
            let src = format!("v = {}\n", i);
            adapter
                .parse(&SourceUnit::new(*path, LanguageId::Python, &src), &src)
                .expect("parse");
        }
        assert_eq!(adapter.cache().stats().entries, 2);
    }
}

#[cfg(test)]
mod parser_tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_syntax_error_is_rejected_by_default() {
        let adapter = adapter(8);
        let src = "def broken(:\n    pass\n";
        let unit = SourceUnit::new("bad.py", LanguageId::Python, src);
        match adapter.parse(&unit, src) {
            Err(Error::SyntaxError { line, .. }) => assert!(line >= 1),
            other => panic!("expected syntax error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_syntax_error_tolerated_when_configured() {
        let adapter = adapter(8).with_reject_syntax_errors(false);
        let src = "def broken(:\n    pass\n";
        let unit = SourceUnit::new("bad.py", LanguageId::Python, src);
        let tree = adapter.parse(&unit, src).expect("tolerated");
        assert!(tree.has_error());
    }

    #[rstest]
    #[case(LanguageId::Python, "m.py", "def f():\n    pass\n")]
    #[case(LanguageId::JavaScript, "m.js", "function f() { return 1; }\n")]
    #[case(LanguageId::TypeScript, "m.ts", "function f(a: number): number { return a; }\n")]
    #[case(LanguageId::Go, "m.go", "package m\n\nfunc F() {}\n")]
    #[case(LanguageId::Rust, "m.rs", "fn f() {}\n")]
    fn test_every_language_yields_a_function(
        #[case] language: LanguageId,
        #[case] path: &str,
        #[case] src: &str,
    ) {
        let adapter = adapter(8);
        let unit = SourceUnit::new(path, language, src);
        let tree = adapter.parse(&unit, src).expect("parse");
        assert_eq!(tree.language, language);
        assert_eq!(tree.arena.node(tree.arena.root()).kind, NodeKind::Module);
        assert!(tree
            .arena
            .iter()
            .any(|(_, n)| n.kind == NodeKind::Function && matches!(n.name(), Some("f") | Some("F"))));
    }

    #[test]
    fn test_empty_file_parses_to_bare_module() {
        let adapter = adapter(8);
        let unit = SourceUnit::new("empty.py", LanguageId::Python, "");
        let tree = adapter.parse(&unit, "").expect("parse");
        assert_eq!(tree.arena.len(), 1);
    }
}

#[cfg(test)]
mod extraction_tests {
    use super::*;

    #[test]
    fn test_typescript_class_extends_and_methods() {
        let src = "import { Base } from './base';\n\nexport class Service extends Base {\n    run(): void {\n        this.helper();\n    }\n\n    helper(): void {}\n}\n";
        let registry = Arc::new(LanguageRegistry::with_defaults());
        let adapter = ParserAdapter::new(Arc::clone(&registry), Arc::new(AstCache::lru(4)));
        let unit = SourceUnit::new("svc.ts", LanguageId::TypeScript, src);
        let tree = adapter.parse(&unit, src).expect("parse");
        let symbols = SymbolExtractor::new(registry).extract(&tree, &unit).expect("extract");

        let class = symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Class && s.name == "Service")
            .expect("class");
        assert!(class.unresolved(RelationKind::Extends).any(|n| n == "Base"));

        let run = symbols
            .iter()
            .find(|s| s.qualified_name == "Service::run")
            .expect("run");
        let helper = symbols
            .iter()
            .find(|s| s.qualified_name == "Service::helper")
            .expect("helper");
        assert!(run.resolved(RelationKind::Calls).any(|id| id == &helper.id));
        assert!(symbols.iter().any(|s| s.kind == SymbolKind::Import));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn span(start: usize, len: usize) -> Span {
        Span {
            start_byte: start * 10,
            end_byte: (start + len) * 10,
            start_line: start + 1,
            end_line: start + len + 1,
        }
    }

    proptest! {
        #[test]
        fn line_overlap_is_symmetric(a in 0usize..50, la in 0usize..20, b in 0usize..50, lb in 0usize..20) {
            let x = span(a, la);
            let y = span(b, lb);
            prop_assert_eq!(x.line_overlap(&y), y.line_overlap(&x));
            prop_assert!(x.line_overlap(&y) <= la.min(lb) + 1);
        }

        #[test]
        fn content_hash_tracks_content(a in "[a-z ]{0,40}", b in "[a-z ]{0,40}") {
            prop_assert_eq!(content_hash(&a) == content_hash(&b), a == b);
        }

        #[test]
        fn extraction_ids_are_unique(names in proptest::collection::vec("[a-e]", 1..8)) {
            let src: String = names
                .iter()
                .map(|n| format!("def {}():\n    {}()\n", n, n))
                .collect();
            let registry = Arc::new(LanguageRegistry::with_defaults());
            let adapter = ParserAdapter::new(Arc::clone(&registry), Arc::new(AstCache::lru(2)));
            let unit = SourceUnit::new("p.py", LanguageId::Python, &src);
            let tree = adapter.parse(&unit, &src).expect("parse");
            let symbols = SymbolExtractor::new(registry).extract(&tree, &unit).expect("extract");
            let mut ids: Vec<&SymbolId> = symbols.iter().map(|s| &s.id).collect();
            let total = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), total);
        }
    }
}
