use std::collections::HashMap;

use crate::domain::{FusionWeights, Provenance};

/// One retrieval leg's candidates: `(chunk id, raw score)`.
pub type LegScores = Vec<(String, f32)>;

/// Fused candidate with combined score and per-leg provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk_id: String,
    pub score: f32,
    pub provenance: Provenance,
}

/// Min-max normalize a leg's scores into [0, 1] within its own result
/// set. A constant leg maps to all ones.
fn min_max_normalize(scores: &mut [(String, f32)]) {
    let Some((min, max)) = scores.iter().fold(None, |acc, (_, s)| match acc {
        None => Some((*s, *s)),
        Some((lo, hi)) => Some((s.min(lo), s.max(hi))),
    }) else {
        return;
    };
    let range = max - min;
    for (_, score) in scores.iter_mut() {
        *score = if range > f32::EPSILON {
            (*score - min) / range
        } else {
            1.0
        };
    }
}

/// Combine up to three ranked legs into one list.
///
/// Each leg is min-max normalized within itself, weighted, and summed per
/// chunk id; weights are re-normalized over whichever legs are non-empty.
/// Duplicate ids inside one leg keep their higher normalized score.
pub fn fuse(
    mut vector: LegScores,
    mut text: LegScores,
    mut symbol: LegScores,
    weights: FusionWeights,
) -> Vec<FusedHit> {
    min_max_normalize(&mut vector);
    min_max_normalize(&mut text);
    min_max_normalize(&mut symbol);

    let mut active_weight = 0.0;
    if !vector.is_empty() {
        active_weight += weights.vector;
    }
    if !text.is_empty() {
        active_weight += weights.text;
    }
    if !symbol.is_empty() {
        active_weight += weights.symbol;
    }
    if active_weight <= f32::EPSILON {
        return Vec::new();
    }

    let mut fused: HashMap<String, FusedHit> = HashMap::new();

    let mut absorb = |leg: LegScores, weight: f32, mark: fn(&mut Provenance)| {
        let weight = weight / active_weight;
        // Dedup within the leg, keeping the higher normalized score.
        let mut best: HashMap<String, f32> = HashMap::new();
        for (id, score) in leg {
            let entry = best.entry(id).or_insert(f32::MIN);
            if score > *entry {
                *entry = score;
            }
        }
        for (id, score) in best {
            let hit = fused.entry(id.clone()).or_insert_with(|| FusedHit {
                chunk_id: id,
                score: 0.0,
                provenance: Provenance::default(),
            });
            hit.score += weight * score;
            mark(&mut hit.provenance);
        }
    };

    absorb(vector, weights.vector, |p| p.vector = true);
    absorb(text, weights.text, |p| p.text = true);
    absorb(symbol, weights.symbol, |p| p.symbol = true);

    let mut hits: Vec<FusedHit> = fused.into_values().collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits
}
