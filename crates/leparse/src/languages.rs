// Capability-indexed language registry

use crate::go::GoSupport;
use crate::grammar::LanguageId;
use crate::javascript::JavaScriptSupport;
use crate::python::PythonSupport;
use crate::rust::RustSupport;
use crate::traits::LanguageSupport;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each [`LanguageId`] to its [`LanguageSupport`] implementation
#[derive(Default, Clone)]
pub struct LanguageRegistry {
    supports: HashMap<LanguageId, Arc<dyn LanguageSupport>>,
}

impl LanguageRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in language
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PythonSupport));
        registry.register(Arc::new(JavaScriptSupport::javascript()));
        registry.register(Arc::new(JavaScriptSupport::typescript()));
        registry.register(Arc::new(GoSupport));
        registry.register(Arc::new(RustSupport));
        registry
    }

    /// Register (or replace) a language
    pub fn register(&mut self, support: Arc<dyn LanguageSupport>) {
        self.supports.insert(support.id(), support);
    }

    /// Support for a language
    pub fn get(&self, id: LanguageId) -> Option<Arc<dyn LanguageSupport>> {
        self.supports.get(&id).cloned()
    }

    /// Resolve the language for a path, preferring an explicit hint
    pub fn resolve(&self, path: &str, hint: Option<LanguageId>) -> Option<LanguageId> {
        hint.or_else(|| LanguageId::from_path(path))
            .filter(|id| self.supports.contains_key(id))
    }

    /// Registered languages, sorted
    pub fn languages(&self) -> Vec<LanguageId> {
        let mut ids: Vec<LanguageId> = self.supports.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}
