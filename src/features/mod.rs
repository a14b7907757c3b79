// src/features/mod.rs
//! Feature extraction: one vector per article, equal dimension across a run.
//!
//! Two interchangeable strategies sit behind [`FeatureExtractor`]:
//! - [`tfidf::LexicalExtractor`]: corpus-local TF-IDF over cleaned titles (sparse).
//! - [`semantic::SemanticExtractor`]: sentence embeddings of a short excerpt,
//!   compressed by [`umap::reduce`] (dense).

pub mod semantic;
pub mod stopwords;
pub mod tfidf;
pub mod umap;

use anyhow::Result;

use crate::ingest::types::Article;

/// Sparse vector with strictly ascending `indices`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub dim: usize,
    pub indices: Vec<usize>,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureVector {
    Sparse(SparseVector),
    Dense(Vec<f32>),
}

impl FeatureVector {
    pub fn dim(&self) -> usize {
        match self {
            FeatureVector::Sparse(s) => s.dim,
            FeatureVector::Dense(d) => d.len(),
        }
    }

    pub fn norm(&self) -> f32 {
        let sq: f32 = match self {
            FeatureVector::Sparse(s) => s.values.iter().map(|v| v * v).sum(),
            FeatureVector::Dense(d) => d.iter().map(|v| v * v).sum(),
        };
        sq.sqrt()
    }

    pub fn dot(&self, other: &FeatureVector) -> f32 {
        match (self, other) {
            (FeatureVector::Dense(a), FeatureVector::Dense(b)) => {
                a.iter().zip(b).map(|(x, y)| x * y).sum()
            }
            (FeatureVector::Sparse(a), FeatureVector::Sparse(b)) => sparse_dot(a, b),
            (FeatureVector::Sparse(s), FeatureVector::Dense(d))
            | (FeatureVector::Dense(d), FeatureVector::Sparse(s)) => s
                .indices
                .iter()
                .zip(&s.values)
                .filter_map(|(&i, v)| d.get(i).map(|x| x * v))
                .sum(),
        }
    }
}

fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let (mut i, mut j, mut acc) = (0usize, 0usize, 0.0f32);
    while i < a.indices.len() && j < b.indices.len() {
        match a.indices[i].cmp(&b.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                acc += a.values[i] * b.values[j];
                i += 1;
                j += 1;
            }
        }
    }
    acc
}

/// Cosine distance in `[0, 2]`. A zero vector is at distance 1.0 from
/// everything, itself included, so empty documents never attract neighbours.
pub fn cosine_distance(a: &FeatureVector, b: &FeatureVector) -> f32 {
    let (na, nb) = (a.norm(), b.norm());
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    (1.0 - a.dot(b) / (na * nb)).clamp(0.0, 2.0)
}

/// Vectorizes the articles of one run. Implementations must return exactly
/// one vector per input article, all of the same dimension, and must return
/// an empty result for empty input without touching any numeric routine.
#[async_trait::async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, articles: &[Article]) -> Result<Vec<FeatureVector>>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse(dim: usize, pairs: &[(usize, f32)]) -> FeatureVector {
        FeatureVector::Sparse(SparseVector {
            dim,
            indices: pairs.iter().map(|p| p.0).collect(),
            values: pairs.iter().map(|p| p.1).collect(),
        })
    }

    #[test]
    fn cosine_of_identical_and_orthogonal() {
        let a = FeatureVector::Dense(vec![1.0, 0.0, 0.0]);
        let b = FeatureVector::Dense(vec![0.0, 2.0, 0.0]);
        assert!(cosine_distance(&a, &a).abs() < 1e-6);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sparse_and_dense_agree() {
        let s = sparse(4, &[(0, 1.0), (3, 2.0)]);
        let t = sparse(4, &[(1, 5.0), (3, 1.0)]);
        let d = FeatureVector::Dense(vec![0.0, 5.0, 0.0, 1.0]);
        assert!((s.dot(&t) - 2.0).abs() < 1e-6);
        assert!((s.dot(&d) - 2.0).abs() < 1e-6);
        assert!((cosine_distance(&s, &t) - cosine_distance(&s, &d)).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_far_from_everything() {
        let z = sparse(3, &[]);
        let a = sparse(3, &[(1, 1.0)]);
        assert_eq!(cosine_distance(&z, &a), 1.0);
        assert_eq!(cosine_distance(&z, &z), 1.0);
    }
}
