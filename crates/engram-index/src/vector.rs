// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector helpers and rank fusion.
//!
//! Embeddings live in a BLOB column; cosine ranking is fused with BM25
//! keyword ranking via Reciprocal Rank Fusion (k=60).

use std::collections::HashMap;

/// RRF constant per the rank-fusion literature.
const RRF_K: f32 = 60.0;

/// f32 vector to little-endian bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// BLOB bytes back to an f32 vector. Trailing partial chunks are dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity. For L2-normalized embeddings this is the dot product.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Merge two ranked id lists into one ranking.
///
/// RRF score for document d = sum over lists of 1 / (k + rank + 1). Both
/// inputs must already be sorted most-relevant-first; positions are the
/// ranks, the attached scores are ignored.
pub fn reciprocal_rank_fusion(
    vector_results: &[(String, f32)],
    bm25_results: &[(String, f64)],
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    for (rank, (id, _)) in vector_results.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
    }
    for (rank, (id, _)) in bm25_results.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
    }

    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let original = vec![0.25_f32, -1.5, 0.0, 42.0];
        let recovered = blob_to_vec(&vec_to_blob(&original));
        assert_eq!(original, recovered);
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![0.3_f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_is_zero_not_nan() {
        let a = vec![0.0_f32, 0.0];
        let b = vec![1.0_f32, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn fusion_favors_documents_in_both_lists() {
        let vector = vec![("d1".to_string(), 0.9_f32), ("d2".to_string(), 0.8)];
        let bm25 = vec![("d1".to_string(), -5.0_f64), ("d3".to_string(), -3.0)];

        let fused = reciprocal_rank_fusion(&vector, &bm25);
        assert_eq!(fused[0].0, "d1");
        let expected = 2.0 / 61.0;
        assert!((fused[0].1 - expected).abs() < 1e-4);
    }

    #[test]
    fn fusion_of_empty_lists_is_empty() {
        assert!(reciprocal_rank_fusion(&[], &[]).is_empty());
    }

    #[test]
    fn fusion_with_one_empty_list_preserves_order() {
        let vector = vec![("a".to_string(), 0.9_f32), ("b".to_string(), 0.1)];
        let fused = reciprocal_rank_fusion(&vector, &[]);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0, "a");
    }
}
