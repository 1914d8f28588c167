//! Categorical segmentation: one-hot encoding and a seeded topic model
//!
//! Rows are treated as short documents whose "terms" are the observed
//! `column=value` indicators. An EM loop alternates between topic
//! responsibilities and the doc-topic / topic-term distributions, and each
//! row takes its highest-probability topic as a segment label.

use std::collections::BTreeSet;

use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data;
use crate::error::{Result, SegmentaError};

const EM_ITERATIONS: usize = 100;
const SMOOTHING: f64 = 1e-9;

/// One-hot expansion of a categorical selection.
#[derive(Debug)]
pub struct OneHot {
    /// Indicator names, `column=value`, in deterministic order.
    pub terms: Vec<String>,
    /// Binary matrix, one row per table row.
    pub matrix: Array2<f64>,
}

/// Expand the selected categorical columns into binary indicators.
pub fn one_hot_encode(table: &DataFrame, columns: &[String]) -> Result<OneHot> {
    if columns.is_empty() {
        return Err(SegmentaError::Fit(
            "no categorical columns selected for segmentation".into(),
        ));
    }

    let n = table.height();
    let mut terms = Vec::new();
    let mut indicators: Vec<Vec<f64>> = Vec::new();
    for name in columns {
        let values = data::string_values(table, name)?;
        let mut levels = BTreeSet::new();
        for value in values.iter().flatten() {
            levels.insert(value.clone());
        }
        for level in levels {
            let mut indicator = vec![0.0; n];
            for (i, value) in values.iter().enumerate() {
                if value.as_deref() == Some(level.as_str()) {
                    indicator[i] = 1.0;
                }
            }
            terms.push(format!("{name}={level}"));
            indicators.push(indicator);
        }
    }

    if terms.is_empty() {
        return Err(SegmentaError::Fit(
            "categorical selection produced no observed levels".into(),
        ));
    }

    let mut matrix = Array2::zeros((n, terms.len()));
    for (j, indicator) in indicators.iter().enumerate() {
        for (i, &value) in indicator.iter().enumerate() {
            matrix[(i, j)] = value;
        }
    }

    Ok(OneHot { terms, matrix })
}

/// Fitted topic model over a one-hot matrix.
#[derive(Debug)]
pub struct TopicModel {
    pub n_topics: usize,
    pub terms: Vec<String>,
    /// Topic x term probabilities; rows sum to 1.
    pub topic_term: Array2<f64>,
    /// Row x topic probabilities; rows sum to 1.
    pub doc_topic: Array2<f64>,
    /// Highest-probability topic per row, in `[0, n_topics)`.
    pub labels: Array1<usize>,
    /// Total log-likelihood of the observed indicators under the fit.
    pub log_likelihood: f64,
}

/// Fit a topic model with a fixed topic count over the one-hot expansion of
/// the selected categorical columns. Deterministic for a fixed seed.
pub fn fit_topics(
    table: &DataFrame,
    columns: &[String],
    n_topics: usize,
    seed: u64,
) -> Result<TopicModel> {
    let encoded = one_hot_encode(table, columns)?;
    let n_docs = encoded.matrix.nrows();
    let n_terms = encoded.matrix.ncols();

    if n_topics == 0 {
        return Err(SegmentaError::Fit("segment count must be at least 1".into()));
    }
    if n_docs < n_topics {
        return Err(SegmentaError::Fit(format!(
            "{n_docs} rows cannot support {n_topics} segments"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut topic_term = Array2::from_shape_fn((n_topics, n_terms), |_| rng.gen_range(0.5..1.5));
    normalize_rows(&mut topic_term);
    let mut doc_topic = Array2::from_shape_fn((n_docs, n_topics), |_| rng.gen_range(0.5..1.5));
    normalize_rows(&mut doc_topic);

    let mut posterior = vec![0.0; n_topics];
    for _ in 0..EM_ITERATIONS {
        let mut next_topic_term = Array2::from_elem((n_topics, n_terms), SMOOTHING);
        let mut next_doc_topic = Array2::from_elem((n_docs, n_topics), SMOOTHING);
        for d in 0..n_docs {
            for w in 0..n_terms {
                let count = encoded.matrix[(d, w)];
                if count == 0.0 {
                    continue;
                }
                let mut total = 0.0;
                for z in 0..n_topics {
                    let p = doc_topic[(d, z)] * topic_term[(z, w)];
                    posterior[z] = p;
                    total += p;
                }
                if total <= 0.0 {
                    continue;
                }
                for z in 0..n_topics {
                    let responsibility = count * posterior[z] / total;
                    next_topic_term[(z, w)] += responsibility;
                    next_doc_topic[(d, z)] += responsibility;
                }
            }
        }
        normalize_rows(&mut next_topic_term);
        normalize_rows(&mut next_doc_topic);
        topic_term = next_topic_term;
        doc_topic = next_doc_topic;
    }

    let mut log_likelihood = 0.0;
    for d in 0..n_docs {
        for w in 0..n_terms {
            let count = encoded.matrix[(d, w)];
            if count == 0.0 {
                continue;
            }
            let p: f64 = (0..n_topics)
                .map(|z| doc_topic[(d, z)] * topic_term[(z, w)])
                .sum();
            log_likelihood += count * (p + SMOOTHING).ln();
        }
    }

    let labels = argmax_rows(&doc_topic);
    Ok(TopicModel {
        n_topics,
        terms: encoded.terms,
        topic_term,
        doc_topic,
        labels,
        log_likelihood,
    })
}

fn normalize_rows(matrix: &mut Array2<f64>) {
    for mut row in matrix.rows_mut() {
        let total: f64 = row.sum();
        if total > 0.0 {
            row.mapv_inplace(|v| v / total);
        }
    }
}

fn argmax_rows(matrix: &Array2<f64>) -> Array1<usize> {
    let mut labels = Array1::zeros(matrix.nrows());
    for (i, row) in matrix.rows().into_iter().enumerate() {
        let mut best = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (j, &value) in row.iter().enumerate() {
            if value > best_value {
                best = j;
                best_value = value;
            }
        }
        labels[i] = best;
    }
    labels
}
