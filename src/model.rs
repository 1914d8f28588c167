//! Clustering model families: mixture, centroid and topic fits behind one
//! tagged interface

use std::collections::BTreeMap;

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::{GaussianMixtureModel, KMeans};
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, Array3, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Result, SegmentaError};
use crate::topics::TopicModel;

/// Smallest cluster count a family may contain.
pub const K_FLOOR: usize = 2;
/// Largest cluster count the interactive surface offers.
pub const K_CEILING: usize = 10;

/// Clustering method selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Gmm,
    KMeans,
    Topics,
}

impl Method {
    /// Continuous methods fit across a k-range; topic segmentation fixes
    /// its segment count before fitting.
    pub fn is_continuous(self) -> bool {
        !matches!(self, Method::Topics)
    }
}

/// Gaussian mixture fit for one k. Weights, means and covariances are
/// retained for likelihood-based selection scores.
#[derive(Debug)]
pub struct MixtureFit {
    pub k: usize,
    pub weights: Array1<f64>,
    pub means: Array2<f64>,
    pub covariances: Array3<f64>,
    model: GaussianMixtureModel<f64>,
}

/// Centroid (K-Means) fit for one k.
#[derive(Debug)]
pub struct CentroidFit {
    pub k: usize,
    pub centroids: Array2<f64>,
    pub inertia: f64,
    model: KMeans<f64, L2Dist>,
}

/// Topic-model fit; the row labels were fixed by the argmax at fit time.
#[derive(Debug)]
pub struct TopicFit {
    pub k: usize,
    pub model: TopicModel,
}

/// Per-family model selection score.
#[derive(Debug, Clone, Copy)]
pub enum SelectionScore {
    /// Akaike and Bayesian information criteria; lower is better.
    InformationCriteria { aic: f64, bic: f64 },
    /// Within-cluster sum of squared distances; lower is better.
    Inertia(f64),
    /// Total log-likelihood of the fitted topic mixture.
    TopicLikelihood(f64),
}

/// A fitted model, tagged by family.
#[derive(Debug)]
pub enum FittedModel {
    Mixture(MixtureFit),
    Centroid(CentroidFit),
    Topic(TopicFit),
}

impl FittedModel {
    pub fn k(&self) -> usize {
        match self {
            FittedModel::Mixture(m) => m.k,
            FittedModel::Centroid(c) => c.k,
            FittedModel::Topic(t) => t.k,
        }
    }

    /// Hard label per row, in `[0, k)`.
    ///
    /// Topic fits carry their labels from fit time; the feature matrix is
    /// ignored for them.
    pub fn predict(&self, features: &Array2<f64>) -> Array1<usize> {
        match self {
            FittedModel::Mixture(m) => {
                let dataset = DatasetBase::from(features.clone());
                m.model.predict(&dataset)
            }
            FittedModel::Centroid(c) => {
                let dataset = DatasetBase::from(features.clone());
                c.model.predict(&dataset)
            }
            FittedModel::Topic(t) => t.model.labels.clone(),
        }
    }

    /// Per-cluster profile rows: component means, centroids, or topic-term
    /// probabilities.
    pub fn profile_centers(&self) -> Array2<f64> {
        match self {
            FittedModel::Mixture(m) => m.means.clone(),
            FittedModel::Centroid(c) => c.centroids.clone(),
            FittedModel::Topic(t) => t.model.topic_term.clone(),
        }
    }

    /// The score used to compare members of a family.
    pub fn selection_score(&self, features: &Array2<f64>) -> Result<SelectionScore> {
        match self {
            FittedModel::Mixture(m) => {
                let (aic, bic) = crate::metrics::information_criteria(m, features)?;
                Ok(SelectionScore::InformationCriteria { aic, bic })
            }
            FittedModel::Centroid(c) => Ok(SelectionScore::Inertia(c.inertia)),
            FittedModel::Topic(t) => Ok(SelectionScore::TopicLikelihood(t.model.log_likelihood)),
        }
    }
}

/// Models fitted across a k-range on one cleaned feature matrix.
#[derive(Debug)]
pub struct ModelFamily {
    pub method: Method,
    pub models: BTreeMap<usize, FittedModel>,
    pub n_rows: usize,
    pub n_features: usize,
}

impl ModelFamily {
    /// Available cluster counts in ascending order.
    pub fn ks(&self) -> Vec<usize> {
        self.models.keys().copied().collect()
    }

    pub fn smallest_k(&self) -> Option<usize> {
        self.models.keys().next().copied()
    }

    pub fn get(&self, k: usize) -> Option<&FittedModel> {
        self.models.get(&k)
    }
}

/// Fit one model per k in `[k_min, k_max]` for a continuous method.
/// Every member is fit on the same feature matrix with the same seed.
pub fn fit_family(
    features: &Array2<f64>,
    k_min: usize,
    k_max: usize,
    method: Method,
    seed: u64,
) -> Result<ModelFamily> {
    if !method.is_continuous() {
        return Err(SegmentaError::Fit(
            "topic segmentation uses a fixed segment count, not a k-range".into(),
        ));
    }
    if features.nrows() == 0 || features.ncols() == 0 {
        return Err(SegmentaError::Fit("feature matrix is empty".into()));
    }
    if k_min < K_FLOOR || k_max > K_CEILING || k_min > k_max {
        return Err(SegmentaError::Fit(format!(
            "cluster range [{k_min}, {k_max}] must lie within [{K_FLOOR}, {K_CEILING}]"
        )));
    }
    if features.nrows() < k_max {
        return Err(SegmentaError::Fit(format!(
            "{} rows cannot support {} clusters",
            features.nrows(),
            k_max
        )));
    }

    let mut models = BTreeMap::new();
    for k in k_min..=k_max {
        let fitted = if method == Method::Gmm {
            FittedModel::Mixture(fit_mixture(features, k, seed)?)
        } else {
            FittedModel::Centroid(fit_centroid(features, k, seed)?)
        };
        models.insert(k, fitted);
    }

    Ok(ModelFamily {
        method,
        models,
        n_rows: features.nrows(),
        n_features: features.ncols(),
    })
}

fn fit_mixture(features: &Array2<f64>, k: usize, seed: u64) -> Result<MixtureFit> {
    let rng = StdRng::seed_from_u64(seed);
    let dataset = DatasetBase::from(features.clone());
    let model = GaussianMixtureModel::params(k)
        .with_rng(rng)
        .max_n_iterations(200)
        .tolerance(1e-4)
        .reg_covariance(1e-6)
        .fit(&dataset)
        .map_err(|e| {
            SegmentaError::Fit(format!("gaussian mixture with {k} components failed: {e}"))
        })?;

    Ok(MixtureFit {
        k,
        weights: model.weights().clone(),
        means: model.means().clone(),
        covariances: model.covariances().clone(),
        model,
    })
}

fn fit_centroid(features: &Array2<f64>, k: usize, seed: u64) -> Result<CentroidFit> {
    let rng = StdRng::seed_from_u64(seed);
    let dataset = DatasetBase::from(features.clone());
    let model = KMeans::params_with(k, rng, L2Dist)
        .max_n_iterations(300)
        .tolerance(1e-4)
        .fit(&dataset)
        .map_err(|e| SegmentaError::Fit(format!("k-means with {k} clusters failed: {e}")))?;

    let labels = model.predict(&dataset);
    let centroids = model.centroids().clone();
    let inertia = inertia(features, &labels, &centroids);

    Ok(CentroidFit { k, centroids, inertia, model })
}

/// Within-cluster sum of squared distances to the assigned centroid.
pub fn inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut total = 0.0;
    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            total += squared_distance(features.row(i), centroids.row(cluster));
        }
    }
    total
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three well-separated blobs of four points each.
    pub(crate) fn blob_features() -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..12 {
            let center = (i % 3) as f64 * 10.0;
            let jitter = (i / 3) as f64 * 0.1;
            rows.extend_from_slice(&[center + jitter, center - jitter]);
        }
        Array2::from_shape_vec((12, 2), rows).unwrap()
    }

    #[test]
    fn test_fit_family_covers_range() {
        let features = blob_features();
        let family = fit_family(&features, 2, 5, Method::KMeans, 7).unwrap();
        assert_eq!(family.ks(), vec![2, 3, 4, 5]);
        for (&k, model) in &family.models {
            let labels = model.predict(&features);
            assert_eq!(labels.len(), 12);
            assert!(labels.iter().all(|&l| l < k));
        }
    }

    #[test]
    fn test_fit_family_gmm() {
        let features = blob_features();
        let family = fit_family(&features, 2, 3, Method::Gmm, 7).unwrap();
        assert_eq!(family.models.len(), 2);
        let model = family.get(3).unwrap();
        assert_eq!(model.profile_centers().shape(), &[3, 2]);
    }

    #[test]
    fn test_fit_family_is_deterministic() {
        let features = blob_features();
        let first = fit_family(&features, 2, 4, Method::KMeans, 42).unwrap();
        let second = fit_family(&features, 2, 4, Method::KMeans, 42).unwrap();
        for k in [2, 3, 4] {
            let a = first.get(k).unwrap().predict(&features);
            let b = second.get(k).unwrap().predict(&features);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_fit_family_rejects_bad_range() {
        let features = blob_features();
        assert!(fit_family(&features, 1, 4, Method::KMeans, 0).is_err());
        assert!(fit_family(&features, 2, 11, Method::KMeans, 0).is_err());
        assert!(fit_family(&features, 5, 3, Method::KMeans, 0).is_err());
    }

    #[test]
    fn test_fit_family_rejects_too_few_rows() {
        let features = Array2::from_shape_vec((3, 2), vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]).unwrap();
        let result = fit_family(&features, 2, 5, Method::KMeans, 0);
        assert!(matches!(result, Err(SegmentaError::Fit(_))));
    }

    #[test]
    fn test_fit_family_rejects_empty_matrix() {
        let features = Array2::zeros((0, 2));
        assert!(fit_family(&features, 2, 3, Method::KMeans, 0).is_err());
    }

    #[test]
    fn test_selection_scores_by_family() {
        let features = blob_features();
        let kmeans = fit_family(&features, 2, 2, Method::KMeans, 7).unwrap();
        match kmeans.get(2).unwrap().selection_score(&features).unwrap() {
            SelectionScore::Inertia(v) => assert!(v >= 0.0),
            other => panic!("unexpected score: {other:?}"),
        }
        let gmm = fit_family(&features, 2, 2, Method::Gmm, 7).unwrap();
        match gmm.get(2).unwrap().selection_score(&features).unwrap() {
            SelectionScore::InformationCriteria { aic, bic } => {
                assert!(aic.is_finite());
                assert!(bic.is_finite());
            }
            other => panic!("unexpected score: {other:?}"),
        }
    }

    #[test]
    fn test_inertia_shrinks_with_more_clusters() {
        let features = blob_features();
        let family = fit_family(&features, 2, 3, Method::KMeans, 7).unwrap();
        let inertia_of = |k: usize| match family.get(k).unwrap() {
            FittedModel::Centroid(c) => c.inertia,
            _ => unreachable!(),
        };
        assert!(inertia_of(3) <= inertia_of(2));
        assert!(inertia_of(2) >= 0.0);
    }
}
