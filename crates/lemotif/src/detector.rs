// Pattern detector

use crate::catalog::{PatternId, PatternMatch, PatternSubject, CATALOG};
use leparse::symbol::{RelationKind, Symbol, SymbolId, SymbolKind};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::trace;

/// Default confidence threshold for reported matches
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Scores subjects against the catalog
#[derive(Debug, Clone, Copy)]
pub struct PatternDetector {
    min_confidence: f32,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}

impl PatternDetector {
    /// Create a detector reporting matches at or above `min_confidence`
    pub fn new(min_confidence: f32) -> Self {
        Self {
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    /// Reporting threshold
    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Raw score of every applicable template, in catalog order
    pub fn score_all(&self, subject: &PatternSubject<'_>) -> Vec<(PatternId, f32)> {
        CATALOG
            .iter()
            .filter_map(|t| t.score(subject).map(|score| (t.id, score)))
            .collect()
    }

    /// Matches at or above the threshold, best first
    pub fn detect(&self, subject: &PatternSubject<'_>) -> Vec<PatternMatch> {
        let mut participants = vec![subject.symbol.id.clone()];
        let mut methods: Vec<&SymbolId> = subject
            .members
            .iter()
            .filter(|m| m.kind == SymbolKind::Function)
            .map(|m| &m.id)
            .collect();
        methods.sort();
        participants.extend(methods.into_iter().cloned());

        let mut matches: Vec<PatternMatch> = self
            .score_all(subject)
            .into_iter()
            .filter(|(_, score)| *score >= self.min_confidence)
            .map(|(pattern, confidence)| PatternMatch {
                pattern,
                symbols: participants.clone(),
                confidence,
            })
            .collect();
        matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.pattern.cmp(&b.pattern))
        });
        trace!(symbol = %subject.symbol.id, matches = matches.len(), "Scored pattern templates");
        matches
    }

    /// Detect over a whole symbol set (typically one file), keyed by subject id
    pub fn detect_all(&self, symbols: &[Symbol]) -> HashMap<SymbolId, Vec<PatternMatch>> {
        subjects(symbols)
            .par_iter()
            .map(|subject| (subject.symbol.id.clone(), self.detect(subject)))
            .filter(|(_, matches)| !matches.is_empty())
            .collect()
    }
}

/// Build subjects for every class and function of a symbol set
pub fn subjects(symbols: &[Symbol]) -> Vec<PatternSubject<'_>> {
    let by_id: HashMap<&SymbolId, &Symbol> = symbols.iter().map(|s| (&s.id, s)).collect();
    let mut members: HashMap<&SymbolId, Vec<&Symbol>> = HashMap::new();
    for symbol in symbols {
        if let Some(parent) = &symbol.parent {
            members.entry(parent).or_default().push(symbol);
        }
    }

    symbols
        .iter()
        .filter(|s| matches!(s.kind, SymbolKind::Class | SymbolKind::Function))
        .map(|symbol| {
            let bases = base_names(symbol, |id| by_id.get(id).map(|s| s.name.clone()));
            let own = members.get(&symbol.id).cloned().unwrap_or_default();
            PatternSubject::new(symbol, own, bases)
        })
        .collect()
}

/// Extends-relation targets as names, looking resolved ids up through `name_of`
pub fn base_names(symbol: &Symbol, name_of: impl Fn(&SymbolId) -> Option<String>) -> Vec<String> {
    let mut bases: Vec<String> = symbol
        .unresolved(RelationKind::Extends)
        .map(str::to_string)
        .collect();
    bases.extend(symbol.resolved(RelationKind::Extends).filter_map(name_of));
    bases
}
