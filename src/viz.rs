//! Chart-building adapters: data specifications for the dashboard charts
//! plus a rendered projection scatter using Plotters

use std::collections::BTreeMap;

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_reduction::Pca;
use ndarray::{Array1, Array2};
use plotters::prelude::*;
use polars::prelude::*;

use crate::data::{self, Crosstab};
use crate::error::{Result, SegmentaError};
use crate::merge::resolve_column;
use crate::model::FittedModel;
use crate::topics;

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 10] = [
    RED,
    BLUE,
    GREEN,
    MAGENTA,
    CYAN,
    RGBColor(255, 140, 0),
    RGBColor(128, 0, 128),
    RGBColor(0, 128, 128),
    RGBColor(139, 69, 19),
    RGBColor(105, 105, 105),
];

/// Normalized cluster-profile heatmap: one row per cluster, min-max scaled
/// across the profiled variables.
#[derive(Debug, Clone)]
pub struct ProfileHeatmap {
    pub variables: Vec<String>,
    pub clusters: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

pub fn profile_heatmap(model: &FittedModel, variables: &[String]) -> Result<ProfileHeatmap> {
    let centers = model.profile_centers();
    if centers.ncols() != variables.len() {
        return Err(SegmentaError::Input(format!(
            "profile has {} columns but {} variable names were given",
            centers.ncols(),
            variables.len()
        )));
    }

    let mut values = Vec::with_capacity(centers.nrows());
    for row in centers.outer_iter() {
        let min = row.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let span = if (max - min).abs() > 0.0 { max - min } else { 1.0 };
        values.push(row.iter().map(|v| (v - min) / span).collect());
    }
    let clusters = (0..centers.nrows()).map(|i| format!("Cluster {i}")).collect();

    Ok(ProfileHeatmap {
        variables: variables.to_vec(),
        clusters,
        values,
    })
}

/// Low-dimensional projection of the feature matrix with per-row labels.
#[derive(Debug, Clone)]
pub struct ProjectionScatter {
    /// Row-major coordinates, `n_components` per row.
    pub coords: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

/// Project the cleaned features to 2 or 3 dimensions for scatter display.
pub fn project(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    n_components: usize,
) -> Result<ProjectionScatter> {
    if !(2..=3).contains(&n_components) {
        return Err(SegmentaError::Input(
            "projection supports 2 or 3 components".into(),
        ));
    }
    if features.ncols() < n_components {
        return Err(SegmentaError::Input(format!(
            "projection to {n_components} components needs at least as many variables"
        )));
    }

    let dataset = DatasetBase::from(features.clone());
    let pca = Pca::params(n_components)
        .fit(&dataset)
        .map_err(|e| SegmentaError::Fit(format!("projection failed: {e}")))?;
    let embedded = pca.predict(&dataset);

    let coords = embedded
        .outer_iter()
        .map(|row| row.iter().copied().collect())
        .collect();
    Ok(ProjectionScatter {
        coords,
        labels: labels.iter().copied().collect(),
    })
}

/// Cluster share counts for the distribution pie.
#[derive(Debug, Clone)]
pub struct ClusterShare {
    pub clusters: Vec<String>,
    pub counts: Vec<u32>,
}

pub fn cluster_share(table: &DataFrame, cluster_col: &str) -> Result<ClusterShare> {
    let values = data::string_values(table, cluster_col)?;
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for value in values.into_iter().flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }
    let (clusters, counts) = counts.into_iter().unzip();
    Ok(ClusterShare { clusters, counts })
}

/// Grouped bar data: counts of a categorical variable against clusters.
/// `None` when the variable cannot be resolved after a join.
pub fn category_bars(
    table: &DataFrame,
    var: &str,
    cluster_col: &str,
) -> Result<Option<Crosstab>> {
    let resolved = match resolve_column(table, var) {
        Some(resolved) => resolved,
        None => return Ok(None),
    };
    Ok(Some(data::crosstab(table, &resolved, cluster_col)?))
}

/// Cluster-by-category heatmap: row-normalized crosstab percentages.
#[derive(Debug, Clone)]
pub struct CategoryHeatmap {
    pub clusters: Vec<String>,
    pub categories: Vec<String>,
    pub percentages: Vec<Vec<f64>>,
}

pub fn category_heatmap(
    table: &DataFrame,
    var: &str,
    cluster_col: &str,
) -> Result<Option<CategoryHeatmap>> {
    let resolved = match resolve_column(table, var) {
        Some(resolved) => resolved,
        None => return Ok(None),
    };
    let crosstab = data::crosstab(table, cluster_col, &resolved)?;
    let percentages = crosstab
        .counts
        .iter()
        .map(|row| {
            let total: u32 = row.iter().sum();
            row.iter()
                .map(|&c| {
                    if total > 0 {
                        f64::from(c) / f64::from(total) * 100.0
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();
    Ok(Some(CategoryHeatmap {
        clusters: crosstab.row_values,
        categories: crosstab.col_values,
        percentages,
    }))
}

/// Five-number summary of a numeric variable within one cluster.
#[derive(Debug, Clone)]
pub struct BoxStats {
    pub cluster: String,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Per-cluster box summaries for a numeric variable. `None` when the
/// variable cannot be resolved or is not numeric.
pub fn cluster_boxes(
    table: &DataFrame,
    var: &str,
    cluster_col: &str,
) -> Result<Option<Vec<BoxStats>>> {
    let resolved = match resolve_column(table, var) {
        Some(resolved) => resolved,
        None => return Ok(None),
    };
    if !table.column(&resolved)?.dtype().is_numeric() {
        return Ok(None);
    }

    let clusters = data::string_values(table, cluster_col)?;
    let values = data::float_values(table, &resolved)?;
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (cluster, value) in clusters.iter().zip(values.iter()) {
        if let (Some(cluster), Some(value)) = (cluster, value) {
            groups.entry(cluster.clone()).or_default().push(*value);
        }
    }

    let mut stats = Vec::with_capacity(groups.len());
    for (cluster, mut group) in groups {
        group.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        stats.push(BoxStats {
            cluster,
            min: group[0],
            q1: quantile(&group, 0.25),
            median: quantile(&group, 0.5),
            q3: quantile(&group, 0.75),
            max: group[group.len() - 1],
        });
    }
    Ok(Some(stats))
}

/// Linear-interpolated quantile of a sorted, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let low = position.floor() as usize;
    let high = position.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let fraction = position - low as f64;
        sorted[low] * (1.0 - fraction) + sorted[high] * fraction
    }
}

/// Radar data: per-cluster proportions over the one-hot expansion of the
/// chosen categorical variables. Unresolvable variables are skipped.
#[derive(Debug, Clone)]
pub struct RadarProfile {
    pub axes: Vec<String>,
    pub clusters: Vec<String>,
    pub proportions: Vec<Vec<f64>>,
}

pub fn radar_profile(
    table: &DataFrame,
    vars: &[String],
    cluster_col: &str,
) -> Result<RadarProfile> {
    let resolved: Vec<String> = vars
        .iter()
        .filter_map(|v| resolve_column(table, v))
        .collect();
    if resolved.is_empty() {
        return Err(SegmentaError::Input(
            "none of the requested variables are present".into(),
        ));
    }

    let encoded = topics::one_hot_encode(table, &resolved)?;
    let clusters = data::string_values(table, cluster_col)?;

    let mut sums: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (i, cluster) in clusters.iter().enumerate() {
        if let Some(cluster) = cluster {
            let entry = sums
                .entry(cluster.clone())
                .or_insert_with(|| vec![0.0; encoded.terms.len()]);
            for (j, value) in encoded.matrix.row(i).iter().enumerate() {
                entry[j] += value;
            }
        }
    }

    let mut cluster_names = Vec::with_capacity(sums.len());
    let mut proportions = Vec::with_capacity(sums.len());
    for (cluster, row) in sums {
        let total: f64 = row.iter().sum();
        let scale = if total > 0.0 { total } else { 1.0 };
        proportions.push(row.iter().map(|v| v / scale).collect());
        cluster_names.push(cluster);
    }

    Ok(RadarProfile {
        axes: encoded.terms,
        clusters: cluster_names,
        proportions,
    })
}

/// Render the 2D projection scatter to a PNG, points colored by cluster.
pub fn render_projection_png(
    scatter: &ProjectionScatter,
    output_path: &str,
    title: Option<&str>,
) -> Result<()> {
    if scatter.coords.is_empty() || scatter.coords[0].len() < 2 {
        return Err(SegmentaError::Plot(
            "projection has no 2D coordinates to draw".into(),
        ));
    }
    draw_scatter(scatter, output_path, title.unwrap_or("Proyección de clusters"))
        .map_err(|e| SegmentaError::Plot(e.to_string()))
}

fn draw_scatter(
    scatter: &ProjectionScatter,
    output_path: &str,
    title: &str,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let xs: Vec<f64> = scatter.coords.iter().map(|c| c[0]).collect();
    let ys: Vec<f64> = scatter.coords.iter().map(|c| c[1]).collect();

    let x_min = xs.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.5;
    let x_max = xs.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.5;
    let y_min = ys.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.5;
    let y_max = ys.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.5;

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Dim 1")
        .y_desc("Dim 2")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, (&x, &y)) in xs.iter().zip(ys.iter()).enumerate() {
        let cluster = scatter.labels[i];
        let color = if cluster < CLUSTER_COLORS.len() {
            &CLUSTER_COLORS[cluster]
        } else {
            &BLACK
        };
        chart.draw_series(std::iter::once(Circle::new((x, y), 4, color.filled())))?;
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::read_table;
    use crate::model::{fit_family, Method};
    use tempfile::tempdir;

    fn labeled_table() -> DataFrame {
        read_table(
            b"id,cluster,ciudad,gasto\n1,0,lima,10.0\n2,0,lima,12.0\n3,1,cusco,30.0\n4,1,puno,28.0\n5,0,lima,11.0\n",
        )
        .unwrap()
    }

    fn blob_features() -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..12 {
            let center = (i % 3) as f64 * 10.0;
            let jitter = (i / 3) as f64 * 0.1;
            rows.extend_from_slice(&[center + jitter, center - jitter, center * 0.5]);
        }
        Array2::from_shape_vec((12, 3), rows).unwrap()
    }

    #[test]
    fn test_profile_heatmap_is_normalized() {
        let features = blob_features();
        let family = fit_family(&features, 2, 3, Method::KMeans, 7).unwrap();
        let variables = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let heatmap = profile_heatmap(family.get(3).unwrap(), &variables).unwrap();

        assert_eq!(heatmap.clusters.len(), 3);
        for row in &heatmap.values {
            for &v in row {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn test_profile_heatmap_checks_variable_count() {
        let features = blob_features();
        let family = fit_family(&features, 2, 2, Method::KMeans, 7).unwrap();
        let result = profile_heatmap(family.get(2).unwrap(), &["solo_una".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_projection_shapes() {
        let features = blob_features();
        let labels = Array1::from_iter((0..12).map(|i| i % 3));
        let scatter = project(&features, &labels, 2).unwrap();
        assert_eq!(scatter.coords.len(), 12);
        assert_eq!(scatter.coords[0].len(), 2);

        let scatter3 = project(&features, &labels, 3).unwrap();
        assert_eq!(scatter3.coords[0].len(), 3);

        assert!(project(&features, &labels, 4).is_err());
    }

    #[test]
    fn test_cluster_share_counts() {
        let share = cluster_share(&labeled_table(), "cluster").unwrap();
        assert_eq!(share.clusters, vec!["0", "1"]);
        assert_eq!(share.counts, vec![3, 2]);
    }

    #[test]
    fn test_category_bars_skip_missing_variable() {
        let table = labeled_table();
        assert!(category_bars(&table, "fantasma", "cluster").unwrap().is_none());
        let bars = category_bars(&table, "ciudad", "cluster").unwrap().unwrap();
        assert_eq!(bars.row_values, vec!["cusco", "lima", "puno"]);
    }

    #[test]
    fn test_category_heatmap_rows_sum_to_hundred() {
        let heatmap = category_heatmap(&labeled_table(), "ciudad", "cluster")
            .unwrap()
            .unwrap();
        for row in &heatmap.percentages {
            let total: f64 = row.iter().sum();
            assert!((total - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cluster_boxes_summary() {
        let boxes = cluster_boxes(&labeled_table(), "gasto", "cluster")
            .unwrap()
            .unwrap();
        assert_eq!(boxes.len(), 2);
        let first = &boxes[0];
        assert_eq!(first.cluster, "0");
        assert_eq!(first.min, 10.0);
        assert_eq!(first.max, 12.0);
        assert_eq!(first.median, 11.0);
        // text columns are reported as unplottable, not an error
        assert!(cluster_boxes(&labeled_table(), "ciudad", "cluster").unwrap().is_none());
    }

    #[test]
    fn test_radar_profile_proportions() {
        let radar = radar_profile(&labeled_table(), &["ciudad".to_string()], "cluster").unwrap();
        assert_eq!(radar.clusters, vec!["0", "1"]);
        for row in &radar.proportions {
            let total: f64 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_render_projection_png() {
        let features = blob_features();
        let labels = Array1::from_iter((0..12).map(|i| i % 3));
        let scatter = project(&features, &labels, 2).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("proyeccion.png");
        let path = path.to_str().unwrap();
        render_projection_png(&scatter, path, None).unwrap();
        assert!(std::path::Path::new(path).exists());
    }
}
