//! Deterministic score fusion and ranking (spec.md §4.8 steps 4-5): pure
//! functions over plain data so the monotonic-score and tie-break
//! invariants (§8) can be checked with `proptest` independent of any
//! store or embedding backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Min-max normalizes `values` to `[0, 1]`. A list with no spread (all
/// equal, or a single element) normalizes to all `1.0` so it still
/// contributes its full weight in fusion rather than collapsing to zero.
pub fn normalize_minmax(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

/// Fuses a dense result list and a lexical result list into one score per
/// id appearing in either, per spec.md §4.8 step 4: each list is min-max
/// normalized independently, then combined as `alpha * dense + (1-alpha) *
/// lex`, with a missing side contributing `0.0` after normalization.
pub fn fuse_scores(dense: &[(String, f32)], lex: &[(String, f32)], alpha: f32) -> HashMap<String, f32> {
    let dense_values: Vec<f32> = dense.iter().map(|(_, s)| *s).collect();
    let lex_values: Vec<f32> = lex.iter().map(|(_, s)| *s).collect();
    let dense_norm = normalize_minmax(&dense_values);
    let lex_norm = normalize_minmax(&lex_values);

    let mut fused: HashMap<String, f32> = HashMap::new();
    for ((id, _), score) in dense.iter().zip(dense_norm.iter()) {
        *fused.entry(id.clone()).or_insert(0.0) += alpha * score;
    }
    for ((id, _), score) in lex.iter().zip(lex_norm.iter()) {
        *fused.entry(id.clone()).or_insert(0.0) += (1.0 - alpha) * score;
    }
    fused
}

/// A candidate carrying everything the tie-break rule (§4.8 step 4) needs:
/// descending score, then descending importance, then descending
/// `last_accessed`, then ascending id.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: String,
    pub score: f32,
    pub importance: f32,
    pub last_accessed: DateTime<Utc>,
}

fn cmp_candidates(a: &FusedCandidate, b: &FusedCandidate) -> std::cmp::Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| b.last_accessed.cmp(&a.last_accessed))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts by the tie-break rule and truncates to `limit`.
pub fn rank_and_trim(mut candidates: Vec<FusedCandidate>, limit: usize) -> Vec<FusedCandidate> {
    candidates.sort_by(cmp_candidates);
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn candidate(id: &str, score: f32, importance: f32, last_accessed_secs: i64) -> FusedCandidate {
        FusedCandidate {
            id: id.to_string(),
            score,
            importance,
            last_accessed: DateTime::from_timestamp(last_accessed_secs, 0).unwrap(),
        }
    }

    #[test]
    fn normalize_minmax_maps_extremes_to_zero_and_one() {
        let normalized = normalize_minmax(&[1.0, 3.0, 5.0]);
        assert_eq!(normalized[0], 0.0);
        assert_eq!(normalized[2], 1.0);
    }

    #[test]
    fn normalize_minmax_of_uniform_values_is_all_ones() {
        assert_eq!(normalize_minmax(&[2.0, 2.0, 2.0]), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn fuse_scores_combines_lists_by_alpha_weight() {
        let dense = vec![("a".to_string(), 1.0), ("b".to_string(), 0.0)];
        let lex = vec![("a".to_string(), 0.0), ("b".to_string(), 1.0)];
        let fused = fuse_scores(&dense, &lex, 0.5);
        assert!((fused["a"] - 0.5).abs() < 1e-6);
        assert!((fused["b"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn identical_dense_score_breaks_tie_by_importance() {
        let candidates = vec![
            candidate("m2", 0.8, 0.5, 1000),
            candidate("m1", 0.8, 0.9, 1000),
        ];
        let ranked = rank_and_trim(candidates, 10);
        assert_eq!(ranked[0].id, "m1");
    }

    #[test]
    fn identical_score_and_importance_breaks_tie_by_last_accessed_then_id() {
        let candidates = vec![
            candidate("z", 0.8, 0.5, 100),
            candidate("a", 0.8, 0.5, 200),
        ];
        let ranked = rank_and_trim(candidates, 10);
        assert_eq!(ranked[0].id, "a");
    }

    proptest! {
        #[test]
        fn rank_and_trim_is_always_score_monotonic_non_increasing(
            raw in proptest::collection::vec((0..1000u32, -100.0f32..100.0f32, 0.0f32..1.0f32), 0..30)
        ) {
            let candidates: Vec<FusedCandidate> = raw
                .into_iter()
                .enumerate()
                .map(|(i, (ts, score, importance))| candidate(&format!("id-{i}"), score, importance, ts as i64))
                .collect();
            let ranked = rank_and_trim(candidates, 1000);
            for window in ranked.windows(2) {
                prop_assert!(window[0].score >= window[1].score);
            }
        }
    }
}
