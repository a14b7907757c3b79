// src/features/umap.rs
//! Neighbourhood-preserving nonlinear reduction (UMAP-style) for dense
//! embeddings.
//!
//! Steps: cosine kNN graph → fuzzy simplicial set (per-point `rho`/`sigma`)
//! → probabilistic-union symmetrization → seeded random layout → SGD with
//! negative sampling against the `1 / (1 + a·d^(2b))` low-dimensional kernel.
//! The RNG is seeded and every collection is iterated in a fixed order, so
//! identical input and parameters give identical output.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UmapParams {
    pub n_components: usize,
    pub n_neighbors: usize,
    pub min_dist: f32,
    pub spread: f32,
    pub n_epochs: usize,
    pub negative_sample_rate: usize,
    pub learning_rate: f32,
    pub seed: u64,
}

impl Default for UmapParams {
    fn default() -> Self {
        Self {
            n_components: 20,
            n_neighbors: 15,
            min_dist: 0.0,
            spread: 1.0,
            n_epochs: 200,
            negative_sample_rate: 5,
            learning_rate: 1.0,
            seed: 42,
        }
    }
}

impl UmapParams {
    /// Clamp nonsensical values from config files.
    pub fn sanitized(mut self) -> Self {
        self.n_components = self.n_components.max(1);
        self.n_neighbors = self.n_neighbors.max(2);
        if !(self.spread > 0.0) {
            self.spread = 1.0;
        }
        if !(0.0..self.spread).contains(&self.min_dist) {
            self.min_dist = 0.0;
        }
        self.n_epochs = self.n_epochs.max(1);
        if !(self.learning_rate > 0.0) {
            self.learning_rate = 1.0;
        }
        self
    }
}

const SMOOTH_K_TOLERANCE: f32 = 1e-5;
const MIN_K_DIST_SCALE: f32 = 1e-3;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 2.0)
}

/// Fit `(a, b)` so that `1 / (1 + a·x^(2b))` approximates the target
/// membership curve given by `min_dist` and `spread`. Coarse grid then a
/// finer grid around the best cell.
pub fn find_ab_params(spread: f32, min_dist: f32) -> (f32, f32) {
    let xs: Vec<f32> = (0..150).map(|i| 3.0 * spread * i as f32 / 149.0).collect();
    let ys: Vec<f32> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();
    let sse = |a: f32, b: f32| -> f32 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let f = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (f - y) * (f - y)
            })
            .sum()
    };

    let mut best = (1.0f32, 1.0f32, f32::INFINITY);
    for ai in 1..=100 {
        for bi in 30..=200 {
            let (a, b) = (ai as f32 * 0.05, bi as f32 * 0.01);
            let e = sse(a, b);
            if e < best.2 {
                best = (a, b, e);
            }
        }
    }
    let (a0, b0) = (best.0, best.1);
    for da in -10..=10 {
        for db in -10..=10 {
            let (a, b) = (a0 + da as f32 * 0.005, b0 + db as f32 * 0.001);
            if a <= 0.0 || b <= 0.0 {
                continue;
            }
            let e = sse(a, b);
            if e < best.2 {
                best = (a, b, e);
            }
        }
    }
    (best.0, best.1)
}

/// k nearest neighbours (self excluded) with distances, ascending; ties
/// broken by index.
fn knn(data: &[Vec<f32>], k: usize) -> Vec<Vec<(usize, f32)>> {
    let n = data.len();
    (0..n)
        .map(|i| {
            let mut row: Vec<(usize, f32)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (j, cosine(&data[i], &data[j])))
                .collect();
            row.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
            row.truncate(k);
            row
        })
        .collect()
}

/// Per-point `(rho, sigma)`: rho is the nearest non-zero distance, sigma is
/// found by binary search so the row's memberships sum to `log2(k)`.
fn smooth_knn(neigh: &[Vec<(usize, f32)>], k: usize) -> Vec<(f32, f32)> {
    let target = (k as f32).log2();
    let mean_all: f32 = {
        let (s, c) = neigh
            .iter()
            .flatten()
            .fold((0.0f32, 0usize), |(s, c), (_, d)| (s + d, c + 1));
        if c == 0 {
            0.0
        } else {
            s / c as f32
        }
    };

    neigh
        .iter()
        .map(|row| {
            let rho = row
                .iter()
                .map(|&(_, d)| d)
                .find(|&d| d > 0.0)
                .unwrap_or(0.0);

            let (mut lo, mut hi, mut mid) = (0.0f32, f32::INFINITY, 1.0f32);
            for _ in 0..64 {
                let psum: f32 = row
                    .iter()
                    .map(|&(_, d)| {
                        let dd = d - rho;
                        if dd > 0.0 {
                            (-dd / mid).exp()
                        } else {
                            1.0
                        }
                    })
                    .sum();
                if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                    break;
                }
                if psum > target {
                    hi = mid;
                    mid = (lo + hi) / 2.0;
                } else {
                    lo = mid;
                    if hi == f32::INFINITY {
                        mid *= 2.0;
                    } else {
                        mid = (lo + hi) / 2.0;
                    }
                }
            }

            let mean_row = if row.is_empty() {
                0.0
            } else {
                row.iter().map(|&(_, d)| d).sum::<f32>() / row.len() as f32
            };
            let floor = if rho > 0.0 { mean_row } else { mean_all } * MIN_K_DIST_SCALE;
            (rho, mid.max(floor))
        })
        .collect()
}

/// Symmetric fuzzy graph as `(i, j, weight)` with `i < j`, sorted.
fn fuzzy_graph(neigh: &[Vec<(usize, f32)>], calib: &[(f32, f32)]) -> Vec<(usize, usize, f32)> {
    let mut directed: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (i, row) in neigh.iter().enumerate() {
        let (rho, sigma) = calib[i];
        for &(j, d) in row {
            let w = if d - rho <= 0.0 || sigma == 0.0 {
                1.0
            } else {
                (-(d - rho) / sigma).exp()
            };
            directed.insert((i, j), w);
        }
    }

    let mut union: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let key = (i.min(j), i.max(j));
        if union.contains_key(&key) {
            continue;
        }
        let a = w;
        let b = directed.get(&(j, i)).copied().unwrap_or(0.0);
        union.insert(key, a + b - a * b);
    }
    union.into_iter().map(|((i, j), w)| (i, j, w)).collect()
}

fn clip(v: f32) -> f32 {
    v.clamp(-4.0, 4.0)
}

/// Reduce `data` (N rows of equal length) to `n_components` columns.
///
/// Empty input gives empty output. Corpora too small for a meaningful
/// embedding (N ≤ n_components + 1) are returned unchanged, which keeps the
/// equal-dimension contract since all rows share the input dimension.
pub fn reduce(data: &[Vec<f32>], params: &UmapParams) -> Vec<Vec<f32>> {
    let p = params.clone().sanitized();
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    if n <= p.n_components + 1 {
        tracing::debug!(n, n_components = p.n_components, "corpus too small, skipping reduction");
        return data.to_vec();
    }

    let k = p.n_neighbors.min(n - 1);
    let neigh = knn(data, k);
    let calib = smooth_knn(&neigh, k);
    let mut edges = fuzzy_graph(&neigh, &calib);

    let max_w = edges.iter().map(|e| e.2).fold(0.0f32, f32::max);
    if max_w <= 0.0 {
        return data.to_vec();
    }
    edges.retain(|e| e.2 >= max_w / p.n_epochs as f32);

    let (a, b) = find_ab_params(p.spread, p.min_dist);
    let dim = p.n_components;
    let mut rng = StdRng::seed_from_u64(p.seed);
    let mut emb: Vec<f32> = (0..n * dim).map(|_| rng.random_range(-10.0f32..10.0)).collect();

    let eps: Vec<f32> = edges.iter().map(|e| max_w / e.2).collect();
    let eps_neg: Vec<f32> = eps
        .iter()
        .map(|e| e / p.negative_sample_rate.max(1) as f32)
        .collect();
    let mut next_sample = eps.clone();
    let mut next_neg = eps_neg.clone();

    for epoch in 0..p.n_epochs {
        let alpha = p.learning_rate * (1.0 - epoch as f32 / p.n_epochs as f32);
        let ep = epoch as f32;

        for (e, &(j, k_idx, _)) in edges.iter().enumerate() {
            if next_sample[e] > ep {
                continue;
            }

            let d2: f32 = (0..dim)
                .map(|d| {
                    let diff = emb[j * dim + d] - emb[k_idx * dim + d];
                    diff * diff
                })
                .sum();
            let coeff = if d2 > 0.0 {
                (-2.0 * a * b * d2.powf(b - 1.0)) / (a * d2.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..dim {
                let g = clip(coeff * (emb[j * dim + d] - emb[k_idx * dim + d]));
                emb[j * dim + d] += g * alpha;
                emb[k_idx * dim + d] -= g * alpha;
            }
            next_sample[e] += eps[e];

            let n_neg = ((ep - next_neg[e]) / eps_neg[e]).max(0.0) as usize;
            for _ in 0..n_neg {
                let other = rng.random_range(0..n);
                if other == j {
                    continue;
                }
                let d2: f32 = (0..dim)
                    .map(|d| {
                        let diff = emb[j * dim + d] - emb[other * dim + d];
                        diff * diff
                    })
                    .sum();
                let coeff = if d2 > 0.0 {
                    2.0 * b / ((0.001 + d2) * (a * d2.powf(b) + 1.0))
                } else {
                    0.0
                };
                for d in 0..dim {
                    let g = if coeff > 0.0 {
                        clip(coeff * (emb[j * dim + d] - emb[other * dim + d]))
                    } else {
                        4.0
                    };
                    emb[j * dim + d] += g * alpha;
                }
            }
            next_neg[e] += n_neg as f32 * eps_neg[e];
        }
    }

    emb.chunks(dim).map(|c| c.to_vec()).collect()
}
