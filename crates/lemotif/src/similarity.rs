// Structural similarity
//
// Compares label-free shapes. Equal structural hashes score 1.0; otherwise
// the score is `1 - d / max_len` where `d` is the edit distance between the
// depth-annotated preorder sequences. Since `d >= |len_a - len_b|`, the size
// ratio `min_len / max_len` bounds the score from above, which lets
// candidates be pruned before any distance is computed.

use leparse::ast::NodeKind;
use leparse::shape::ShapeTree;
use leparse::symbol::{Symbol, SymbolId, SymbolKind};
use rayon::prelude::*;
use tracing::debug;

/// Levenshtein distance over arbitrary sequences (two-row table)
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let cost = usize::from(x != y);
            current[j + 1] = (previous[j + 1] + 1).min(current[j] + 1).min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Upper bound on the similarity of two shapes of these sizes
pub fn size_bound(len_a: usize, len_b: usize) -> f32 {
    let (min, max) = (len_a.min(len_b), len_a.max(len_b));
    if max == 0 {
        1.0
    } else {
        min as f32 / max as f32
    }
}

/// Similarity of two shapes in `[0, 1]`, independent of identifiers
pub fn shape_similarity(a: &ShapeTree, b: &ShapeTree) -> f32 {
    if a.structural_hash() == b.structural_hash() {
        return 1.0;
    }
    sequence_similarity(&a.preorder_with_depth(), &b.preorder_with_depth())
}

fn sequence_similarity(a: &[(NodeKind, u32)], b: &[(NodeKind, u32)]) -> f32 {
    let max = a.len().max(b.len());
    if max == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f32 / max as f32
}

/// Similarity when it can reach `threshold`, else `None` without computing it
pub fn similarity_at_least(a: &ShapeTree, b: &ShapeTree, threshold: f32) -> Option<f32> {
    if size_bound(a.len(), b.len()) < threshold {
        return None;
    }
    let score = shape_similarity(a, b);
    (score >= threshold).then_some(score)
}

/// Whether two kinds are worth comparing
fn comparable(a: SymbolKind, b: SymbolKind) -> bool {
    a == b && matches!(a, SymbolKind::Function | SymbolKind::Class)
}

/// Symbols structurally similar to `target`, best first (ties by id)
pub fn find_similar<'a, I>(target: &Symbol, candidates: I, threshold: f32) -> Vec<(SymbolId, f32)>
where
    I: IntoIterator<Item = &'a Symbol>,
{
    let Some(shape) = target.shape.as_ref() else {
        return Vec::new();
    };
    let threshold = threshold.clamp(0.0, 1.0);
    let pool: Vec<&Symbol> = candidates
        .into_iter()
        .filter(|c| c.id != target.id && comparable(c.kind, target.kind))
        .collect();

    let mut results: Vec<(SymbolId, f32)> = pool
        .par_iter()
        .filter_map(|candidate| {
            let other = candidate.shape.as_ref()?;
            similarity_at_least(shape, other, threshold).map(|score| (candidate.id.clone(), score))
        })
        .collect();
    results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    debug!(
        symbol = %target.id,
        candidates = pool.len(),
        matches = results.len(),
        "Structural similarity search"
    );
    results
}
