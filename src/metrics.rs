//! Model-selection scores: information criteria, inertia and silhouette

use std::collections::HashSet;

use linfa_linalg::cholesky::Cholesky;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::prelude::*;

use crate::error::{Result, SegmentaError};
use crate::model::{FittedModel, Method, MixtureFit, ModelFamily};

/// Scores for one member of a model family.
#[derive(Debug, Clone)]
pub struct MetricsRow {
    pub k: usize,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub inertia: Option<f64>,
    /// NaN when the labeling collapsed to a single cluster.
    pub silhouette: f64,
}

/// One row per fitted k, for elbow / minimum inspection.
#[derive(Debug, Clone)]
pub struct MetricsTable {
    pub method: Method,
    pub rows: Vec<MetricsRow>,
}

impl MetricsTable {
    /// Render the table for display.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let ks: Vec<i64> = self.rows.iter().map(|r| r.k as i64).collect();
        let aic: Vec<Option<f64>> = self.rows.iter().map(|r| r.aic).collect();
        let bic: Vec<Option<f64>> = self.rows.iter().map(|r| r.bic).collect();
        let inertia: Vec<Option<f64>> = self.rows.iter().map(|r| r.inertia).collect();
        let silhouette: Vec<f64> = self.rows.iter().map(|r| r.silhouette).collect();
        let df = DataFrame::new(vec![
            Series::new("k", ks),
            Series::new("AIC", aic),
            Series::new("BIC", bic),
            Series::new("inercia", inertia),
            Series::new("silueta", silhouette),
        ])?;
        Ok(df)
    }
}

/// Score every member of a family on the matrix it was fitted on.
pub fn score(family: &ModelFamily, features: &Array2<f64>) -> Result<MetricsTable> {
    let mut rows = Vec::with_capacity(family.models.len());
    for (&k, model) in &family.models {
        let labels = model.predict(features);
        let silhouette = silhouette(features, &labels);
        let (aic, bic, inertia) = match model {
            FittedModel::Mixture(m) => {
                let (aic, bic) = information_criteria(m, features)?;
                (Some(aic), Some(bic), None)
            }
            FittedModel::Centroid(c) => (None, None, Some(c.inertia)),
            FittedModel::Topic(_) => (None, None, None),
        };
        rows.push(MetricsRow { k, aic, bic, inertia, silhouette });
    }
    Ok(MetricsTable { method: family.method, rows })
}

/// AIC/BIC for a mixture fit, from its likelihood and the full-covariance
/// parameter count `k*d + k*d*(d+1)/2 + (k-1)`.
pub fn information_criteria(fit: &MixtureFit, features: &Array2<f64>) -> Result<(f64, f64)> {
    let n = features.nrows();
    let d = features.ncols();
    let log_likelihood = mixture_log_likelihood(fit, features)?;
    let params = (fit.k * d + fit.k * d * (d + 1) / 2 + fit.k - 1) as f64;
    let aic = 2.0 * params - 2.0 * log_likelihood;
    let bic = params * (n as f64).ln() - 2.0 * log_likelihood;
    Ok((aic, bic))
}

fn mixture_log_likelihood(fit: &MixtureFit, features: &Array2<f64>) -> Result<f64> {
    let d = features.ncols();
    let ln_norm = -0.5 * d as f64 * (2.0 * std::f64::consts::PI).ln();

    // one Cholesky factor per component
    let mut factors = Vec::with_capacity(fit.k);
    for z in 0..fit.k {
        let covariance = fit.covariances.index_axis(Axis(0), z).to_owned();
        let factor = covariance.cholesky().map_err(|e| {
            SegmentaError::Fit(format!(
                "component {z} covariance is not positive definite: {e}"
            ))
        })?;
        let log_det: f64 = (0..d).map(|i| factor[(i, i)].ln()).sum::<f64>() * 2.0;
        factors.push((factor, log_det));
    }

    let mut total = 0.0;
    let mut component_lls = vec![0.0; fit.k];
    for row in features.outer_iter() {
        for z in 0..fit.k {
            let (factor, log_det) = &factors[z];
            let mahalanobis = mahalanobis_squared(row, fit.means.row(z), factor);
            component_lls[z] =
                fit.weights[z].ln() + ln_norm - 0.5 * (log_det + mahalanobis);
        }
        total += log_sum_exp(&component_lls);
    }
    Ok(total)
}

/// Squared Mahalanobis distance via forward substitution against the lower
/// Cholesky factor.
fn mahalanobis_squared(x: ArrayView1<f64>, mean: ArrayView1<f64>, factor: &Array2<f64>) -> f64 {
    let d = x.len();
    let mut y = vec![0.0; d];
    for i in 0..d {
        let mut value = x[i] - mean[i];
        for j in 0..i {
            value -= factor[(i, j)] * y[j];
        }
        y[i] = value / factor[(i, i)];
    }
    y.iter().map(|v| v * v).sum()
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Mean silhouette coefficient over all rows.
///
/// NaN when the labeling has fewer than two distinct labels; rows in
/// singleton clusters contribute 0.
pub fn silhouette(features: &Array2<f64>, labels: &Array1<usize>) -> f64 {
    let n = features.nrows();
    let distinct: HashSet<usize> = labels.iter().copied().collect();
    if n < 2 || distinct.len() < 2 {
        return f64::NAN;
    }

    let n_clusters = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut sizes = vec![0usize; n_clusters];
    for &label in labels.iter() {
        sizes[label] += 1;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] == 1 {
            continue;
        }
        let mut sums = vec![0.0; n_clusters];
        for j in 0..n {
            if i == j {
                continue;
            }
            sums[labels[j]] += euclidean(features.row(i), features.row(j));
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
