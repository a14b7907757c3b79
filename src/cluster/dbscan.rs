// src/cluster/dbscan.rs
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::ClusterLabel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbscanParams {
    /// Maximum cosine distance for two points to be neighbours.
    pub eps: f32,
    /// Neighbourhood size (the point itself included) that makes a core point.
    pub min_samples: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            eps: 0.8,
            min_samples: 2,
        }
    }
}

fn region(dist: &[Vec<f32>], i: usize, eps: f32) -> Vec<usize> {
    dist[i]
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d <= eps)
        .map(|(j, _)| j)
        .collect()
}

/// Classic DBSCAN over a precomputed distance matrix. Clusters are seeded in
/// input order; a border point joins the first cluster that reaches it.
pub fn dbscan(dist: &[Vec<f32>], params: &DbscanParams) -> Vec<ClusterLabel> {
    let n = dist.len();
    let min_samples = params.min_samples.max(1);
    let neighbours: Vec<Vec<usize>> = (0..n).map(|i| region(dist, i, params.eps)).collect();
    let is_core: Vec<bool> = neighbours.iter().map(|nb| nb.len() >= min_samples).collect();

    let mut labels = vec![ClusterLabel::Noise; n];
    let mut visited = vec![false; n];
    let mut next_id = 0usize;

    for start in 0..n {
        if visited[start] || !is_core[start] {
            continue;
        }
        let id = next_id;
        next_id += 1;

        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        labels[start] = ClusterLabel::Cluster(id);

        while let Some(p) = queue.pop_front() {
            if !is_core[p] {
                continue;
            }
            for &q in &neighbours[p] {
                if labels[q].is_noise() {
                    labels[q] = ClusterLabel::Cluster(id);
                }
                if !visited[q] {
                    visited[q] = true;
                    queue.push_back(q);
                }
            }
        }
    }
    labels
}
