// src/cluster/mod.rs
//! Density clustering over feature vectors with cosine distance.
//! Label values carry no meaning beyond equality; `Noise` marks outliers.

pub mod dbscan;
pub mod hdbscan;

use serde::{Deserialize, Serialize};

use crate::features::{cosine_distance, FeatureVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterLabel {
    Cluster(usize),
    Noise,
}

impl ClusterLabel {
    pub fn is_noise(&self) -> bool {
        matches!(self, ClusterLabel::Noise)
    }
}

/// Full symmetric cosine distance matrix.
pub fn distance_matrix(vectors: &[FeatureVector]) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut m = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(&vectors[i], &vectors[j]);
            m[i][j] = d;
            m[j][i] = d;
        }
        // Zero vectors are not even close to themselves.
        if vectors[i].norm() == 0.0 {
            m[i][i] = 1.0;
        }
    }
    m
}

/// Clustering algorithm and its density thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ClusteringParams {
    Dbscan(dbscan::DbscanParams),
    Hdbscan(hdbscan::HdbscanParams),
}

impl Default for ClusteringParams {
    fn default() -> Self {
        ClusteringParams::Dbscan(dbscan::DbscanParams::default())
    }
}

impl ClusteringParams {
    pub fn name(&self) -> &'static str {
        match self {
            ClusteringParams::Dbscan(_) => "dbscan",
            ClusteringParams::Hdbscan(_) => "hdbscan",
        }
    }
}

/// Label every vector. Output has the same length and order as the input.
pub fn cluster(vectors: &[FeatureVector], params: &ClusteringParams) -> Vec<ClusterLabel> {
    if vectors.is_empty() {
        return Vec::new();
    }
    let dist = distance_matrix(vectors);
    let labels = match params {
        ClusteringParams::Dbscan(p) => dbscan::dbscan(&dist, p),
        ClusteringParams::Hdbscan(p) => hdbscan::hdbscan(&dist, p),
    };
    let noise = labels.iter().filter(|l| l.is_noise()).count();
    tracing::debug!(
        algorithm = params.name(),
        points = labels.len(),
        noise,
        "clustering done"
    );
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_vectors_never_self_match() {
        let v = vec![FeatureVector::Dense(vec![0.0, 0.0]), FeatureVector::Dense(vec![1.0, 0.0])];
        let m = distance_matrix(&v);
        assert_eq!(m[0][0], 1.0);
        assert_eq!(m[1][1], 0.0);
        assert_eq!(m[0][1], 1.0);
    }

    #[test]
    fn empty_input_gives_no_labels() {
        assert!(cluster(&[], &ClusteringParams::default()).is_empty());
    }
}
