//! Similarity computation and top-k ranking for embeddings.
//!
//! Everything in this module is a pure function over slices so it can be
//! tested without a store.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Compute the cosine similarity between two embeddings.
///
/// Only the first `min(a.len(), b.len())` components take part, so vectors
/// of different lengths are compared over their common prefix. Returns a
/// value between -1.0 and 1.0, or exactly 0.0 when either vector has zero
/// norm over that prefix (which includes empty input) or the result is not
/// finite because of NaN or infinite components.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);

    let dot = dot_product(a, b);
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (magnitude_a * magnitude_b);
    if similarity.is_finite() { similarity } else { 0.0 }
}

/// Compute the dot product over the common prefix of two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalize an embedding to unit length. Zero vectors are left untouched.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// A candidate that made it into a top-k ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// Position of the candidate in the input slice.
    pub index: usize,

    /// ID of the matched candidate.
    pub id: String,

    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// Rank `candidates` by cosine similarity to `query` and keep the best `k`.
///
/// The sort is stable and descending, so candidates with equal similarity
/// keep their input order.
pub fn rank_top_k<S>(query: &[f32], candidates: &[(S, Vec<f32>)], k: usize) -> Vec<RankedCandidate>
where
    S: AsRef<str>,
{
    let order = rank_indices(query, candidates.iter().map(|(_, v)| v.as_slice()), k);

    order
        .into_iter()
        .map(|(index, similarity)| RankedCandidate {
            index,
            id: candidates[index].0.as_ref().to_string(),
            similarity,
        })
        .collect()
}

/// Score every vector against `query` and return `(position, similarity)`
/// pairs for the best `k`, highest first, ties in iteration order.
pub(crate) fn rank_indices<'a, I>(query: &[f32], vectors: I, k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(usize, f32)> = vectors
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(query, v)))
        .collect();

    // Stable sort: equal scores keep input order.
    scored.sort_by(|a, b| descending(a.1, b.1));
    scored.truncate(k);
    scored
}

fn descending(a: f32, b: f32) -> Ordering {
    OrderedFloat(b).cmp(&OrderedFloat(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a: Vec<f32> = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_zero_not_nan() {
        let sim = cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]);
        assert_eq!(sim, 0.0);

        let sim = cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]);
        assert_eq!(sim, 0.0);

        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_non_finite_components_score_zero() {
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_nan_query_does_not_outrank_real_matches() {
        let candidates = vec![("a", vec![1.0, 0.0]), ("b", vec![-1.0, 0.0])];

        let results = rank_top_k(&[f32::NAN, 1.0], &candidates, 2);
        assert!(results.iter().all(|r| r.similarity == 0.0));

        let with_nan = vec![("nan", vec![f32::NAN, 0.0]), ("a", vec![1.0, 0.0])];
        let results = rank_top_k(&[1.0, 0.0], &with_nan, 2);
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "nan"]);
    }

    #[test]
    fn test_length_mismatch_uses_common_prefix() {
        // [1, 0] vs [1, 0] once the trailing component is dropped.
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 5.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize() {
        let mut v: Vec<f32> = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero: Vec<f32> = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rank_top_k() {
        let query: Vec<f32> = vec![1.0, 0.0];
        let candidates = vec![
            ("a".to_string(), vec![1.0, 0.0]),
            ("b".to_string(), vec![0.0, 1.0]),
            ("c".to_string(), vec![0.9, 0.1]),
        ];

        let results = rank_top_k(&query, &candidates, 2);
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!((results[1].similarity - 0.9939).abs() < 1e-3);
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        let candidates = vec![
            ("first", vec![2.0, 0.0]),
            ("second", vec![1.0, 0.0]),
            ("third", vec![3.0, 0.0]),
        ];

        let results = rank_top_k(&[1.0, 0.0], &candidates, 3);
        let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_rank_zero_k() {
        let candidates = vec![("a", vec![1.0])];
        assert!(rank_top_k(&[1.0], &candidates, 0).is_empty());
    }

    fn vectors() -> impl Strategy<Value = Vec<Vec<f32>>> {
        prop::collection::vec(prop::collection::vec(-1.0..1.0f32, 4), 0..40)
    }

    proptest! {
        #[test]
        fn ranking_is_sorted_and_truncated(
            query in prop::collection::vec(-1.0..1.0f32, 4),
            candidates in vectors(),
            k in 0usize..50,
        ) {
            let named: Vec<(String, Vec<f32>)> = candidates
                .into_iter()
                .enumerate()
                .map(|(i, v)| (format!("c{i}"), v))
                .collect();

            let ranked = rank_top_k(&query, &named, k);

            prop_assert_eq!(ranked.len(), k.min(named.len()));
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].similarity >= pair[1].similarity);
                if pair[0].similarity == pair[1].similarity {
                    prop_assert!(pair[0].index < pair[1].index);
                }
            }
        }

        #[test]
        fn similarity_stays_in_range(
            a in prop::collection::vec(-10.0..10.0f32, 0..16),
            b in prop::collection::vec(-10.0..10.0f32, 0..16),
        ) {
            let sim = cosine_similarity(&a, &b);
            prop_assert!(!sim.is_nan());
            prop_assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&sim));
        }
    }
}
