// src/features/tfidf.rs
//! Corpus-local TF-IDF. The vocabulary is rebuilt on every call and never
//! shared between runs.

use anyhow::Result;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stopwords::is_stop_word;
use super::{FeatureExtractor, FeatureVector, SparseVector};
use crate::ingest::types::Article;
use crate::normalize::clean_text;

/// Which article text feeds the lexical vectorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LexicalInput {
    #[default]
    Title,
    TitleAndBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LexicalParams {
    #[serde(default)]
    pub input: LexicalInput,
}

fn token_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    // Two or more word characters, as in the usual default token pattern.
    RE.get_or_init(|| Regex::new(r"(?u)\b\w\w+\b").expect("token regex"))
}

/// Tokens of an already cleaned document, stop words removed.
pub fn tokenize(doc: &str) -> Vec<&str> {
    token_re()
        .find_iter(doc)
        .map(|m| m.as_str())
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Fit a vocabulary on `docs` and return one L2-normalized TF-IDF row per doc.
///
/// idf is smoothed: `ln((1 + n) / (1 + df)) + 1`. Documents without surviving
/// tokens become zero vectors; an empty vocabulary yields zero vectors of
/// dimension 0.
pub fn fit_transform(docs: &[String]) -> Vec<FeatureVector> {
    let n = docs.len();
    if n == 0 {
        return Vec::new();
    }

    let counts: Vec<BTreeMap<&str, u32>> = docs
        .iter()
        .map(|d| {
            let mut tf = BTreeMap::new();
            for t in tokenize(d) {
                *tf.entry(t).or_insert(0u32) += 1;
            }
            tf
        })
        .collect();

    let mut df: BTreeMap<&str, u32> = BTreeMap::new();
    for tf in &counts {
        for term in tf.keys() {
            *df.entry(*term).or_insert(0) += 1;
        }
    }

    // BTreeMap order gives a lexicographically sorted vocabulary.
    let vocab: BTreeMap<&str, (usize, f32)> = df
        .iter()
        .enumerate()
        .map(|(idx, (term, &dfreq))| {
            let idf = ((1.0 + n as f32) / (1.0 + dfreq as f32)).ln() + 1.0;
            (*term, (idx, idf))
        })
        .collect();
    let dim = vocab.len();

    counts
        .into_iter()
        .map(|tf| {
            let mut indices = Vec::with_capacity(tf.len());
            let mut values = Vec::with_capacity(tf.len());
            for (term, c) in tf {
                if let Some(&(idx, idf)) = vocab.get(term) {
                    indices.push(idx);
                    values.push(c as f32 * idf);
                }
            }
            let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                values.iter_mut().for_each(|v| *v /= norm);
            }
            FeatureVector::Sparse(SparseVector {
                dim,
                indices,
                values,
            })
        })
        .collect()
}

pub struct LexicalExtractor {
    params: LexicalParams,
}

impl LexicalExtractor {
    pub fn new(params: LexicalParams) -> Self {
        Self { params }
    }

    fn document(&self, a: &Article) -> String {
        match self.params.input {
            LexicalInput::Title => clean_text(&a.title),
            LexicalInput::TitleAndBody => clean_text(&format!("{} {}", a.title, a.body)),
        }
    }
}

#[async_trait::async_trait]
impl FeatureExtractor for LexicalExtractor {
    async fn extract(&self, articles: &[Article]) -> Result<Vec<FeatureVector>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }
        let docs: Vec<String> = articles.iter().map(|a| self.document(a)).collect();
        let vectors = fit_transform(&docs);
        tracing::debug!(
            docs = docs.len(),
            dim = vectors.first().map(FeatureVector::dim).unwrap_or(0),
            "tf-idf fitted"
        );
        Ok(vectors)
    }

    fn name(&self) -> &'static str {
        "lexical"
    }
}
