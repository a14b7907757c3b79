// src/assemble.rs
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;

use crate::cluster::ClusterLabel;
use crate::ingest::types::Article;

/// A candidate story: two or more articles sharing one non-noise label.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub story_id: String,
    pub articles: Vec<Article>,
}

impl Cluster {
    pub fn new(articles: Vec<Article>) -> Self {
        let story_id = story_id(&articles);
        Self { story_id, articles }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

// Short hex prefix of a SHA-256 digest; used for ids and log fingerprints.
pub(crate) fn short_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Fingerprint of the sorted member links, independent of member order.
pub fn story_id(articles: &[Article]) -> String {
    let mut links: Vec<&str> = articles.iter().map(|a| a.link.as_str()).collect();
    links.sort_unstable();
    short_hash(&links.join("\n"))
}

/// Group articles by label, dropping noise and singletons.
///
/// Clusters come out in order of each label's first appearance; members keep
/// input order.
pub fn assemble(articles: Vec<Article>, labels: &[ClusterLabel]) -> Result<Vec<Cluster>> {
    if articles.len() != labels.len() {
        bail!(
            "label count {} does not match article count {}",
            labels.len(),
            articles.len()
        );
    }

    let mut slot: HashMap<ClusterLabel, usize> = HashMap::new();
    let mut groups: Vec<Vec<Article>> = Vec::new();
    for (art, label) in articles.into_iter().zip(labels.iter().copied()) {
        if label.is_noise() {
            continue;
        }
        let idx = *slot.entry(label).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[idx].push(art);
    }

    let clusters: Vec<Cluster> = groups
        .into_iter()
        .filter(|g| g.len() >= 2)
        .map(Cluster::new)
        .collect();
    tracing::debug!(clusters = clusters.len(), "clusters assembled");
    Ok(clusters)
}
