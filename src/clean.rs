//! Missing-value imputation and feature standardization

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;

use crate::data;
use crate::error::{Result, SegmentaError};

/// Column-wise standardizer fitted on a numeric selection.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    pub means: Array1<f64>,
    pub scales: Array1<f64>,
}

impl StandardScaler {
    /// Fit means and scales on a matrix without missing values.
    /// Constant columns get a unit scale so they standardize to zero.
    pub fn fit(features: &Array2<f64>) -> Self {
        let n = features.nrows().max(1) as f64;
        let means = features.sum_axis(Axis(0)) / n;
        let mut scales = Array1::zeros(features.ncols());
        for j in 0..features.ncols() {
            let var = features
                .column(j)
                .iter()
                .map(|v| (v - means[j]).powi(2))
                .sum::<f64>()
                / n;
            let std = var.sqrt();
            scales[j] = if std > 0.0 { std } else { 1.0 };
        }
        Self { means, scales }
    }

    /// Standardize a matrix with the fitted parameters.
    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        let mut out = features.clone();
        for j in 0..out.ncols() {
            let mean = self.means[j];
            let scale = self.scales[j];
            out.column_mut(j).mapv_inplace(|v| (v - mean) / scale);
        }
        out
    }
}

/// Result of cleaning a numeric selection: the table with the standardized
/// columns written back, the feature matrix and the fitted scaler.
#[derive(Debug)]
pub struct Cleaned {
    pub table: DataFrame,
    pub features: Array2<f64>,
    pub scaler: StandardScaler,
}

/// Impute missing values with each selected column's mean, then standardize
/// to zero mean and unit variance. Parameters are fit on the selection only.
///
/// A column with no observed values at all cannot be imputed and is reported
/// as an input error rather than filled with zeros.
pub fn clean(table: &DataFrame, columns: &[String]) -> Result<Cleaned> {
    if columns.is_empty() {
        return Err(SegmentaError::Input("no columns selected for cleaning".into()));
    }

    let n = table.height();
    let mut matrix = Array2::zeros((n, columns.len()));
    for (j, name) in columns.iter().enumerate() {
        let values = data::float_values(table, name)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return Err(SegmentaError::Input(format!(
                "column '{name}' has no observed values to impute from"
            )));
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        for (i, value) in values.iter().enumerate() {
            matrix[(i, j)] = value.unwrap_or(mean);
        }
    }

    let scaler = StandardScaler::fit(&matrix);
    let features = scaler.transform(&matrix);

    let mut cleaned = table.clone();
    for (j, name) in columns.iter().enumerate() {
        let column: Vec<f64> = features.column(j).to_vec();
        cleaned.with_column(Series::new(name, column))?;
    }

    Ok(Cleaned { table: cleaned, features, scaler })
}
