// src/cluster/hdbscan.rs
//! Hierarchical density clustering over a precomputed distance matrix:
//! mutual reachability, minimum spanning tree, condensed tree and
//! excess-of-mass cluster selection. The root is never selected, so a corpus
//! with a single dense blob and nothing else comes back as noise.
//!
//! Spanning-tree edges longer than `max_merge_distance` are cut before the
//! hierarchy is built. Each remaining component is condensed on its own, and a
//! component smaller than the corpus may be selected whole.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::ClusterLabel;

const MIN_DISTANCE: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HdbscanParams {
    /// Smallest group that counts as a cluster.
    pub min_cluster_size: usize,
    /// Neighbour rank used for core distances. Defaults to `min_cluster_size`.
    pub min_samples: Option<usize>,
    /// Mutual-reachability distance above which points never share a cluster.
    pub max_merge_distance: f32,
}

impl Default for HdbscanParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            min_samples: None,
            max_merge_distance: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    dist: f64,
    size: usize,
}

#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

fn core_distances(dist: &[Vec<f32>], k: usize) -> Vec<f64> {
    let n = dist.len();
    (0..n)
        .map(|i| {
            let mut row: Vec<f64> = (0..n)
                .map(|j| if i == j { 0.0 } else { dist[i][j] as f64 })
                .collect();
            row.sort_by(f64::total_cmp);
            row[k.clamp(1, n) - 1]
        })
        .collect()
}

/// Prim over the dense mutual reachability graph. Returns n-1 edges.
fn mst(dist: &[Vec<f32>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = dist.len();
    let mr = |i: usize, j: usize| (dist[i][j] as f64).max(core[i]).max(core[j]);

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0usize;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = usize::MAX;
        let mut next_w = f64::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let w = mr(current, j);
            if w < best[j] {
                best[j] = w;
                from[j] = current;
            }
            if best[j] < next_w || next == usize::MAX {
                next_w = best[j];
                next = j;
            }
        }
        in_tree[next] = true;
        edges.push((from[next], next, next_w));
        current = next;
    }
    edges
}

fn find(parent: &mut [usize], x: usize) -> usize {
    let mut root = x;
    while parent[root] != root {
        root = parent[root];
    }
    let mut cur = x;
    while parent[cur] != root {
        let next = parent[cur];
        parent[cur] = root;
        cur = next;
    }
    root
}

/// Single-linkage dendrogram; node ids >= n are merges in `hierarchy`.
fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    let mut parent: Vec<usize> = (0..(2 * n - 1)).collect();
    let mut hierarchy: Vec<Merge> = Vec::with_capacity(n - 1);

    for (a, b, w) in edges {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let size = node_size(&hierarchy, n, ra) + node_size(&hierarchy, n, rb);
        let id = n + hierarchy.len();
        hierarchy.push(Merge {
            left: ra,
            right: rb,
            dist: w,
            size,
        });
        parent[ra] = id;
        parent[rb] = id;
    }
    hierarchy
}

fn node_size(hierarchy: &[Merge], n: usize, node: usize) -> usize {
    if node < n {
        1
    } else {
        hierarchy[node - n].size
    }
}

fn leaves_under(hierarchy: &[Merge], n: usize, node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(x) = stack.pop() {
        if x < n {
            out.push(x);
        } else {
            let m = hierarchy[x - n];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    out
}

/// Walk the dendrogram from the root, keeping only splits where both sides
/// reach `min_size`. Cluster ids start at `n`; the root is `n`.
fn condense(hierarchy: &[Merge], n: usize, min_size: usize) -> Vec<CondensedEdge> {
    let root = 2 * n - 2;
    let mut relabel = vec![0usize; 2 * n - 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut ignore = vec![false; 2 * n - 1];
    let mut out = Vec::new();

    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        if node < n {
            continue;
        }
        let m = hierarchy[node - n];
        queue.push_back(m.left);
        queue.push_back(m.right);
        if ignore[node] {
            continue;
        }

        let lambda = 1.0 / m.dist.max(MIN_DISTANCE);
        let parent = relabel[node];
        let left_size = node_size(hierarchy, n, m.left);
        let right_size = node_size(hierarchy, n, m.right);

        let fall_out = |side: usize, out: &mut Vec<CondensedEdge>, ignore: &mut Vec<bool>| {
            for leaf in leaves_under(hierarchy, n, side) {
                out.push(CondensedEdge {
                    parent,
                    child: leaf,
                    lambda,
                    size: 1,
                });
            }
            mark_subtree(hierarchy, n, side, ignore);
        };

        match (left_size >= min_size, right_size >= min_size) {
            (true, true) => {
                for (side, size) in [(m.left, left_size), (m.right, right_size)] {
                    relabel[side] = next_label;
                    out.push(CondensedEdge {
                        parent,
                        child: next_label,
                        lambda,
                        size,
                    });
                    next_label += 1;
                }
            }
            (false, false) => {
                fall_out(m.left, &mut out, &mut ignore);
                fall_out(m.right, &mut out, &mut ignore);
            }
            (true, false) => {
                relabel[m.left] = parent;
                fall_out(m.right, &mut out, &mut ignore);
            }
            (false, true) => {
                relabel[m.right] = parent;
                fall_out(m.left, &mut out, &mut ignore);
            }
        }
    }
    out
}

fn mark_subtree(hierarchy: &[Merge], n: usize, node: usize, ignore: &mut [bool]) {
    let mut stack = vec![node];
    while let Some(x) = stack.pop() {
        ignore[x] = true;
        if x >= n {
            let m = hierarchy[x - n];
            stack.push(m.left);
            stack.push(m.right);
        }
    }
}

/// Excess-of-mass selection. Returns the selected cluster ids. `root` only
/// competes when `allow_root` is set.
fn select_clusters(tree: &[CondensedEdge], root: usize, allow_root: bool) -> Vec<usize> {
    let mut birth: BTreeMap<usize, f64> = BTreeMap::from([(root, 0.0)]);
    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for e in tree.iter().filter(|e| e.size > 1) {
        birth.insert(e.child, e.lambda);
        children.entry(e.parent).or_default().push(e.child);
    }

    let mut stability: BTreeMap<usize, f64> = birth.keys().map(|&c| (c, 0.0)).collect();
    for e in tree {
        let b = birth.get(&e.parent).copied().unwrap_or(0.0);
        *stability.entry(e.parent).or_insert(0.0) += (e.lambda - b) * e.size as f64;
    }

    let mut selected: BTreeMap<usize, bool> = BTreeMap::new();
    // Children always carry larger ids than their parents.
    for &c in birth.keys().rev().filter(|&&c| allow_root || c != root) {
        let own = stability.get(&c).copied().unwrap_or(0.0);
        let subtree: f64 = children
            .get(&c)
            .map(|cs| cs.iter().map(|x| stability.get(x).copied().unwrap_or(0.0)).sum())
            .unwrap_or(0.0);

        if own > 0.0 && own >= subtree {
            selected.insert(c, true);
            let mut stack = children.get(&c).cloned().unwrap_or_default();
            while let Some(d) = stack.pop() {
                selected.insert(d, false);
                if let Some(more) = children.get(&d) {
                    stack.extend(more.iter().copied());
                }
            }
        } else {
            selected.insert(c, false);
            stability.insert(c, own.max(subtree));
        }
    }

    selected
        .into_iter()
        .filter_map(|(c, keep)| keep.then_some(c))
        .collect()
}

fn points_of(tree: &[CondensedEdge], cluster: usize, n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![cluster];
    while let Some(c) = stack.pop() {
        for e in tree.iter().filter(|e| e.parent == c) {
            if e.child < n {
                out.push(e.child);
            } else {
                stack.push(e.child);
            }
        }
    }
    out
}

/// Connected components of the spanning forest left after cutting edges
/// above `ceiling`, ordered by their smallest member.
fn components(n: usize, edges: &[(usize, usize, f64)], ceiling: f64) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..n).collect();
    for &(a, b, _) in edges.iter().filter(|e| e.2 <= ceiling) {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        let r = find(&mut parent, i);
        groups.entry(r).or_default().push(i);
    }
    groups.into_values().collect()
}

pub fn hdbscan(dist: &[Vec<f32>], params: &HdbscanParams) -> Vec<ClusterLabel> {
    let n = dist.len();
    let min_size = params.min_cluster_size.max(2);
    let k = params.min_samples.unwrap_or(min_size).max(1);
    let mut labels = vec![ClusterLabel::Noise; n];
    if n < min_size || n < 2 {
        return labels;
    }

    let core = core_distances(dist, k);
    let edges = mst(dist, &core);
    let ceiling = params.max_merge_distance as f64;

    let mut next_id = 0usize;
    for members in components(n, &edges, ceiling) {
        let m = members.len();
        if m < min_size {
            continue;
        }
        let mut local = vec![usize::MAX; n];
        for (li, &p) in members.iter().enumerate() {
            local[p] = li;
        }
        let local_edges: Vec<(usize, usize, f64)> = edges
            .iter()
            .filter(|e| e.2 <= ceiling && local[e.0] != usize::MAX)
            .map(|&(a, b, w)| (local[a], local[b], w))
            .collect();

        let hierarchy = single_linkage(m, local_edges);
        let tree = condense(&hierarchy, m, min_size);
        let selected = select_clusters(&tree, m, m < n);

        for c in selected {
            let points = if c == m {
                (0..m).collect()
            } else {
                points_of(&tree, c, m)
            };
            for p in points {
                labels[members[p]] = ClusterLabel::Cluster(next_id);
            }
            next_id += 1;
        }
    }

    // Dense ids in order of first appearance.
    let mut ids: BTreeMap<usize, usize> = BTreeMap::new();
    for label in labels.iter_mut() {
        if let ClusterLabel::Cluster(c) = *label {
            let next = ids.len();
            *label = ClusterLabel::Cluster(*ids.entry(c).or_insert(next));
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[f32]) -> Vec<Vec<f32>> {
        points
            .iter()
            .map(|a| points.iter().map(|b| (a - b).abs()).collect())
            .collect()
    }

    #[test]
    fn finds_two_groups_and_an_outlier() {
        let dist = line(&[0.0, 0.1, 0.25, 5.0, 5.1, 5.25, 20.0]);
        let labels = hdbscan(&dist, &HdbscanParams::default());
        assert_eq!(labels[0], ClusterLabel::Cluster(0));
        assert_eq!(labels[1], labels[0]);
        assert_eq!(labels[2], labels[0]);
        assert_eq!(labels[3], ClusterLabel::Cluster(1));
        assert_eq!(labels[4], labels[3]);
        assert_eq!(labels[5], labels[3]);
        assert!(labels[6].is_noise());
    }

    #[test]
    fn too_few_points_are_noise() {
        let dist = line(&[0.0, 0.1]);
        let labels = hdbscan(
            &dist,
            &HdbscanParams {
                min_cluster_size: 3,
                ..HdbscanParams::default()
            },
        );
        assert!(labels.iter().all(|l| l.is_noise()));
    }

    #[test]
    fn equidistant_points_are_noise() {
        let n = 5;
        let dist: Vec<Vec<f32>> = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 0.0 } else { 1.0 }).collect())
            .collect();
        let labels = hdbscan(&dist, &HdbscanParams::default());
        assert!(labels.iter().all(|l| l.is_noise()));
    }

    #[test]
    fn single_linkage_sizes_add_up() {
        let dist = line(&[0.0, 1.0, 3.0]);
        let core = core_distances(&dist, 1);
        assert_eq!(core, vec![0.0, 0.0, 0.0]);
        let h = single_linkage(3, mst(&dist, &core));
        assert_eq!(h.len(), 2);
        assert_eq!(h[1].size, 3);
        assert!((h[0].dist - 1.0).abs() < 1e-9);
    }

    fn cosine_matrix(vectors: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
        vectors
            .iter()
            .map(|a| {
                vectors
                    .iter()
                    .map(|b| {
                        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                        (1.0 - dot / (norm(a) * norm(b))).max(0.0)
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn near_duplicates_cluster_and_orthogonal_articles_stay_noise() {
        let dist = cosine_matrix(&[
            vec![1.0, 0.0, 0.0, 0.0, 0.10],
            vec![0.0, 1.0, 0.0, 0.0, 0.10],
            vec![1.0, 0.0, 0.0, 0.0, 0.12],
            vec![0.0, 0.0, 1.0, 0.0, 0.10],
            vec![0.0, 0.0, 0.0, 1.0, 0.10],
        ]);
        let labels = hdbscan(&dist, &HdbscanParams::default());
        assert_eq!(
            labels,
            vec![
                ClusterLabel::Cluster(0),
                ClusterLabel::Noise,
                ClusterLabel::Cluster(0),
                ClusterLabel::Noise,
                ClusterLabel::Noise,
            ]
        );
    }

    #[test]
    fn merge_ceiling_splits_far_groups() {
        let dist = line(&[0.0, 0.1, 0.9, 1.0]);
        let tight = hdbscan(
            &dist,
            &HdbscanParams {
                max_merge_distance: 0.5,
                ..HdbscanParams::default()
            },
        );
        assert_eq!(tight[0], ClusterLabel::Cluster(0));
        assert_eq!(tight[1], tight[0]);
        assert_eq!(tight[2], ClusterLabel::Cluster(1));
        assert_eq!(tight[3], tight[2]);
    }
}
