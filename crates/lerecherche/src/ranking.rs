// Multi-signal ranking

use crate::query::{QueryCategory, QueryIntent};
use chrono::{DateTime, Utc};
use lemotif::PatternMatch;
use leparse::symbol::{Symbol, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ranking weights and recency half-life
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Weight of normalized cosine similarity
    pub w_similarity: f32,
    /// Weight of structural relevance
    pub w_structural: f32,
    /// Weight of recency decay
    pub w_recency: f32,
    /// Weight of the feedback acceptance rate
    pub w_feedback: f32,
    /// Weight of the context-hint match
    pub w_context: f32,
    /// Age at which recency weight halves, in days
    pub half_life_days: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            w_similarity: 0.5,
            w_structural: 0.25,
            w_recency: 0.1,
            w_feedback: 0.1,
            w_context: 0.05,
            half_life_days: 30.0,
        }
    }
}

/// Invalid ranking configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RankingConfigError {
    /// A weight is negative or not finite
    #[error("ranking weight {name} must be finite and >= 0, got {value}")]
    InvalidWeight {
        /// Field name
        name: &'static str,
        /// Value given
        value: f32,
    },

    /// Every weight is zero
    #[error("at least one ranking weight must be positive")]
    AllZero,

    /// Half-life is not a positive number of days
    #[error("half_life_days must be > 0, got {0}")]
    InvalidHalfLife(f64),
}

impl RankingConfig {
    /// Validate weights and half-life
    pub fn validate(&self) -> Result<(), RankingConfigError> {
        let weights = [
            ("w_similarity", self.w_similarity),
            ("w_structural", self.w_structural),
            ("w_recency", self.w_recency),
            ("w_feedback", self.w_feedback),
            ("w_context", self.w_context),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(RankingConfigError::InvalidWeight { name, value });
            }
        }
        if weights.iter().all(|(_, w)| *w == 0.0) {
            return Err(RankingConfigError::AllZero);
        }
        if !(self.half_life_days.is_finite() && self.half_life_days > 0.0) {
            return Err(RankingConfigError::InvalidHalfLife(self.half_life_days));
        }
        Ok(())
    }
}

/// Per-signal values behind a composite score, each in [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ScoreBreakdown {
    /// Normalized cosine similarity
    pub similarity: f32,
    /// Name match adjusted by intent
    pub structural: f32,
    /// Exponential recency decay
    pub recency: f32,
    /// Smoothed acceptance rate
    pub feedback: f32,
    /// Context-hint match
    pub context: f32,
}

impl ScoreBreakdown {
    /// Weighted sum
    pub fn composite(&self, config: &RankingConfig) -> f32 {
        self.similarity * config.w_similarity
            + self.structural * config.w_structural
            + self.recency * config.w_recency
            + self.feedback * config.w_feedback
            + self.context * config.w_context
    }
}

/// One ranked query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// Symbol id
    pub symbol_id: SymbolId,
    /// Composite score
    pub score: f32,
    /// Per-signal values
    pub breakdown: ScoreBreakdown,
    /// 1-based rank
    pub rank: usize,
    /// Symbol name
    pub name: String,
    /// Qualified name
    pub qualified_name: String,
    /// Symbol kind
    pub kind: SymbolKind,
    /// Owning file
    pub path: String,
    /// First line (1-based)
    pub line: usize,
    /// Signature text
    pub signature: String,
    /// Pattern matches for the symbol, when requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<PatternMatch>,
}

/// User reaction to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSignal {
    /// Result was useful
    Accept,
    /// Result was wrong
    Reject,
    /// Result was opened; counts half an accept
    Click,
}

impl FromStr for FeedbackSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" | "accepted" | "up" => Ok(FeedbackSignal::Accept),
            "reject" | "rejected" | "down" => Ok(FeedbackSignal::Reject),
            "click" | "clicked" | "open" => Ok(FeedbackSignal::Click),
            other => Err(format!("unknown feedback signal '{}'", other)),
        }
    }
}

impl fmt::Display for FeedbackSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedbackSignal::Accept => "accept",
            FeedbackSignal::Reject => "reject",
            FeedbackSignal::Click => "click",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FeedbackCounts {
    accepts: u32,
    rejects: u32,
    clicks: u32,
}

/// Per-symbol feedback counts
#[derive(Debug, Clone, Default)]
pub struct FeedbackStore {
    counts: HashMap<SymbolId, FeedbackCounts>,
}

impl FeedbackStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one signal
    pub fn record(&mut self, id: &SymbolId, signal: FeedbackSignal) {
        let counts = self.counts.entry(id.clone()).or_default();
        match signal {
            FeedbackSignal::Accept => counts.accepts += 1,
            FeedbackSignal::Reject => counts.rejects += 1,
            FeedbackSignal::Click => counts.clicks += 1,
        }
    }

    /// Smoothed acceptance rate `(a + c/2 + 1) / (a + c/2 + r + 2)`; 0.5 without feedback
    pub fn weight(&self, id: &SymbolId) -> f32 {
        let counts = self.counts.get(id).copied().unwrap_or_default();
        let positive = counts.accepts as f32 + 0.5 * counts.clicks as f32;
        (positive + 1.0) / (positive + counts.rejects as f32 + 2.0)
    }

    /// Drop feedback for symbols failing `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&SymbolId) -> bool) -> usize {
        let before = self.counts.len();
        self.counts.retain(|id, _| keep(id));
        before - self.counts.len()
    }

    /// Symbols with feedback
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// No feedback recorded
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Symbol entering ranking with its vector similarity (0 for structural-only hits)
#[derive(Debug, Clone, Copy)]
pub struct RankCandidate<'a> {
    /// Symbol
    pub symbol: &'a Symbol,
    /// Cosine similarity to the query
    pub similarity: f32,
}

/// Exact name match 1.0, partial 0.5, otherwise 0; halved when the kind
/// does not suit the intent.
pub fn structural_relevance(symbol: &Symbol, terms: &[String], category: QueryCategory) -> f32 {
    let name = symbol.name.to_lowercase();
    let qualified = symbol.qualified_name.to_lowercase();
    let base = if terms.iter().any(|t| *t == name || *t == qualified) {
        1.0
    } else if terms
        .iter()
        .any(|t| t.len() >= 2 && (name.contains(t.as_str()) || qualified.contains(t.as_str()) || (name.len() >= 3 && t.contains(name.as_str()))))
    {
        0.5
    } else {
        0.0
    };

    let preferred = match category {
        QueryCategory::FindUsage => matches!(symbol.kind, SymbolKind::Call | SymbolKind::Import),
        QueryCategory::FindDefinition => symbol.kind.is_definition(),
        _ => true,
    };
    if preferred {
        base
    } else {
        base * 0.5
    }
}

/// `exp(-ln2 * age / half_life)`; future timestamps count as age zero
pub fn recency_weight(modified_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f32 {
    let age_days = (now - modified_at).num_milliseconds().max(0) as f64 / 86_400_000.0;
    (-std::f64::consts::LN_2 * age_days / half_life_days).exp() as f32
}

/// Composite-score ranker
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    config: RankingConfig,
}

impl Ranker {
    /// Create a ranker
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Score, order (score desc, ties by id), truncate to `top_k` and assign ranks
    pub fn rank(
        &self,
        candidates: &[RankCandidate<'_>],
        intent: &QueryIntent,
        feedback: &FeedbackStore,
        now: DateTime<Utc>,
        top_k: usize,
    ) -> Vec<RankedResult> {
        let mut scored: Vec<RankedResult> = candidates
            .iter()
            .map(|c| {
                let breakdown = self.breakdown(c, intent, feedback, now);
                let symbol = c.symbol;
                RankedResult {
                    symbol_id: symbol.id.clone(),
                    score: breakdown.composite(&self.config),
                    breakdown,
                    rank: 0,
                    name: symbol.name.clone(),
                    qualified_name: symbol.qualified_name.clone(),
                    kind: symbol.kind,
                    path: symbol.unit.path.clone(),
                    line: symbol.span.start_line,
                    signature: symbol.signature.clone(),
                    patterns: Vec::new(),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.symbol_id.cmp(&b.symbol_id)));
        scored.truncate(top_k);
        for (i, result) in scored.iter_mut().enumerate() {
            result.rank = i + 1;
        }
        scored
    }

    fn breakdown(
        &self,
        candidate: &RankCandidate<'_>,
        intent: &QueryIntent,
        feedback: &FeedbackStore,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let symbol = candidate.symbol;
        let hints = &intent.context_hints;
        let context = if hints.paths.iter().any(|p| *p == symbol.unit.path) || hints.symbols.iter().any(|s| *s == symbol.name)
        {
            1.0
        } else {
            0.0
        };
        ScoreBreakdown {
            similarity: candidate.similarity.clamp(0.0, 1.0),
            structural: structural_relevance(symbol, &intent.terms, intent.category),
            recency: recency_weight(symbol.modified_at, now, self.config.half_life_days),
            feedback: feedback.weight(&symbol.id),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ContextHints;
    use chrono::Duration;
    use leparse::ast::Span;
    use leparse::grammar::LanguageId;
    use leparse::symbol::UnitRef;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    fn symbol(id: &str, name: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: SymbolId::from(id),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind,
            language: LanguageId::Python,
            unit: UnitRef {
                path: format!("{}.py", id),
                version: 1,
            },
            span: Span::default(),
            signature: String::new(),
            body_hash: String::new(),
            snippet: String::new(),
            parent: None,
            relations: Vec::new(),
            shape: None,
            modified_at: now(),
            author: None,
        }
    }

    fn intent(category: QueryCategory, terms: &[&str]) -> QueryIntent {
        QueryIntent {
            original: terms.join(" "),
            category,
            filters: Vec::new(),
            rewritten: terms.join(" "),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            context_hints: ContextHints::default(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RankingConfig::default().validate().is_ok());
        let bad = RankingConfig {
            w_recency: -0.1,
            ..RankingConfig::default()
        };
        assert!(matches!(bad.validate(), Err(RankingConfigError::InvalidWeight { name: "w_recency", .. })));
        let zero_half_life = RankingConfig {
            half_life_days: 0.0,
            ..RankingConfig::default()
        };
        assert!(zero_half_life.validate().is_err());
    }

    #[rstest]
    #[case("foo", QueryCategory::General, SymbolKind::Function, 1.0)]
    #[case("fo", QueryCategory::General, SymbolKind::Function, 0.5)]
    #[case("zzz", QueryCategory::General, SymbolKind::Function, 0.0)]
    #[case("foo", QueryCategory::FindUsage, SymbolKind::Function, 0.5)]
    #[case("foo", QueryCategory::FindUsage, SymbolKind::Call, 1.0)]
    #[case("foo", QueryCategory::FindDefinition, SymbolKind::Call, 0.5)]
    fn test_structural_relevance(
        #[case] term: &str,
        #[case] category: QueryCategory,
        #[case] kind: SymbolKind,
        #[case] expected: f32,
    ) {
        let s = symbol("s", "foo", kind);
        assert_eq!(structural_relevance(&s, &[term.to_string()], category), expected);
    }

    #[test]
    fn test_recency_halves_at_half_life() {
        let w = recency_weight(now() - Duration::days(30), now(), 30.0);
        assert!((w - 0.5).abs() < 1e-4);
        assert_eq!(recency_weight(now() + Duration::days(1), now(), 30.0), 1.0);
    }

    #[test]
    fn test_feedback_smoothing() {
        let mut store = FeedbackStore::new();
        let id = SymbolId::from("x");
        assert_eq!(store.weight(&id), 0.5);
        store.record(&id, FeedbackSignal::Accept);
        store.record(&id, FeedbackSignal::Click);
        store.record(&id, FeedbackSignal::Click);
        // (1 + 1 + 1) / (1 + 1 + 0 + 2)
        assert!((store.weight(&id) - 0.75).abs() < 1e-6);
        store.record(&id, FeedbackSignal::Reject);
        assert!((store.weight(&id) - 0.6).abs() < 1e-6);
        assert_eq!(store.retain(|_| false), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_rank_orders_and_breaks_ties_by_id() {
        let a = symbol("b_id", "alpha", SymbolKind::Function);
        let b = symbol("a_id", "beta", SymbolKind::Function);
        let c = symbol("c_id", "gamma", SymbolKind::Function);
        let candidates = [
            RankCandidate { symbol: &a, similarity: 0.4 },
            RankCandidate { symbol: &b, similarity: 0.4 },
            RankCandidate { symbol: &c, similarity: 0.9 },
        ];
        let ranked = Ranker::default().rank(&candidates, &intent(QueryCategory::General, &["x"]), &FeedbackStore::new(), now(), 10);
        let ids: Vec<&str> = ranked.iter().map(|r| r.symbol_id.as_str()).collect();
        assert_eq!(ids, vec!["c_id", "a_id", "b_id"]);
        assert_eq!(ranked.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_usage_intent_prefers_call_sites() {
        let def = symbol("def", "foo", SymbolKind::Function);
        let call = symbol("call", "foo", SymbolKind::Call);
        let candidates = [
            RankCandidate { symbol: &def, similarity: 0.5 },
            RankCandidate { symbol: &call, similarity: 0.5 },
        ];
        let ranked = Ranker::default().rank(&candidates, &intent(QueryCategory::FindUsage, &["foo"]), &FeedbackStore::new(), now(), 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol_id.as_str(), "call");
    }

    #[test]
    fn test_context_and_feedback_lift_score() {
        let a = symbol("a", "handler", SymbolKind::Function);
        let b = symbol("b", "handler", SymbolKind::Function);
        let mut q = intent(QueryCategory::General, &["handler"]);
        q.context_hints.paths.push("b.py".to_string());
        let mut feedback = FeedbackStore::new();
        feedback.record(&SymbolId::from("b"), FeedbackSignal::Accept);
        let candidates = [
            RankCandidate { symbol: &a, similarity: 0.5 },
            RankCandidate { symbol: &b, similarity: 0.5 },
        ];
        let ranked = Ranker::default().rank(&candidates, &q, &feedback, now(), 2);
        assert_eq!(ranked[0].symbol_id.as_str(), "b");
        assert_eq!(ranked[0].breakdown.context, 1.0);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_similarity_is_clamped() {
        let a = symbol("a", "x", SymbolKind::Variable);
        let ranked = Ranker::default().rank(
            &[RankCandidate { symbol: &a, similarity: -0.7 }],
            &intent(QueryCategory::General, &["unrelated"]),
            &FeedbackStore::new(),
            now(),
            5,
        );
        assert_eq!(ranked[0].breakdown.similarity, 0.0);
    }
}
