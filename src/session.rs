//! Pipeline session: the state container tying cleaning, fitting, selection,
//! assignment and enrichment together
//!
//! Every mutation goes through a stage transition whose precondition is
//! checked before anything is touched; a failed transition reports and
//! leaves the session exactly as it was.

use std::collections::BTreeMap;

use ndarray::Array2;
use polars::prelude::*;

use crate::clean;
use crate::data;
use crate::error::{Result, SegmentaError};
use crate::export::{self, ExportOutcome};
use crate::merge;
use crate::metrics::{self, MetricsTable};
use crate::model::{self, FittedModel, Method, ModelFamily, TopicFit, K_CEILING, K_FLOOR};
use crate::topics;

/// Column written by continuous cluster assignment.
pub const CLUSTER_COLUMN: &str = "cluster";
/// Column written by topic segmentation.
pub const SEGMENT_COLUMN: &str = "segmento";

/// Pipeline stage reached by the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    #[default]
    Empty,
    DataLoaded,
    VariablesConfirmed,
    ModelsFitted,
    ClusterAssigned,
    EnrichmentJoined,
}

#[derive(Debug, Default)]
pub struct SegmentationSession {
    stage: Stage,
    table: Option<DataFrame>,
    id_col: Option<String>,
    numeric_vars: Vec<String>,
    categorical_vars: Vec<String>,
    features: Option<Array2<f64>>,
    family: Option<ModelFamily>,
    metrics: Option<MetricsTable>,
    selected_k: Option<usize>,
    cluster_col: Option<String>,
    merged: Option<DataFrame>,
    demo_key: Option<String>,
    demo_vars: Vec<String>,
}

impl SegmentationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn table(&self) -> Option<&DataFrame> {
        self.table.as_ref()
    }

    pub fn id_col(&self) -> Option<&str> {
        self.id_col.as_deref()
    }

    pub fn numeric_vars(&self) -> &[String] {
        &self.numeric_vars
    }

    pub fn categorical_vars(&self) -> &[String] {
        &self.categorical_vars
    }

    pub fn features(&self) -> Option<&Array2<f64>> {
        self.features.as_ref()
    }

    pub fn family(&self) -> Option<&ModelFamily> {
        self.family.as_ref()
    }

    pub fn metrics(&self) -> Option<&MetricsTable> {
        self.metrics.as_ref()
    }

    pub fn selected_k(&self) -> Option<usize> {
        self.selected_k
    }

    /// Name of the assignment column, recorded when labels are written.
    pub fn cluster_column(&self) -> Option<&str> {
        self.cluster_col.as_deref()
    }

    pub fn merged(&self) -> Option<&DataFrame> {
        self.merged.as_ref()
    }

    pub fn demo_vars(&self) -> &[String] {
        &self.demo_vars
    }

    /// Accept a freshly parsed upload, discarding every downstream artifact.
    /// Selections, models, metrics, assignments and merges are all keyed to
    /// the previous table's schema and never survive a new upload.
    pub fn load_table(&mut self, table: DataFrame) {
        *self = Self {
            stage: Stage::DataLoaded,
            table: Some(table),
            ..Self::default()
        };
    }

    /// Bind the identifier column and the variable selection. The numeric
    /// selection is cleaned exactly once in this step. May be re-run while a
    /// table is loaded; doing so invalidates everything downstream.
    pub fn confirm_variables(
        &mut self,
        id_col: &str,
        numeric_vars: &[String],
        categorical_vars: &[String],
    ) -> Result<()> {
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| SegmentaError::Input("load a table first".into()))?;
        if numeric_vars.is_empty() && categorical_vars.is_empty() {
            return Err(SegmentaError::Input(
                "select at least one variable to segment on".into(),
            ));
        }
        let columns = table.get_column_names();
        if !columns.iter().any(|c| *c == id_col) {
            return Err(SegmentaError::Input(format!(
                "identifier column '{id_col}' not found"
            )));
        }
        if !data::is_unique_id(table, id_col)? {
            return Err(SegmentaError::Input(format!(
                "column '{id_col}' is not unique; choose another identifier"
            )));
        }
        for var in numeric_vars.iter().chain(categorical_vars.iter()) {
            if !columns.iter().any(|c| *c == var.as_str()) {
                return Err(SegmentaError::Input(format!(
                    "selected column '{var}' not found"
                )));
            }
        }

        let (cleaned_table, features) = if numeric_vars.is_empty() {
            (table.clone(), None)
        } else {
            let cleaned = clean::clean(table, numeric_vars)?;
            (cleaned.table, Some(cleaned.features))
        };

        self.table = Some(cleaned_table);
        self.id_col = Some(id_col.to_string());
        self.numeric_vars = numeric_vars.to_vec();
        self.categorical_vars = categorical_vars.to_vec();
        self.features = features;
        self.family = None;
        self.metrics = None;
        self.selected_k = None;
        self.cluster_col = None;
        self.merged = None;
        self.demo_vars.clear();
        self.stage = Stage::VariablesConfirmed;
        Ok(())
    }

    /// Fit one model per k over `[k_min, k_max]` and score the family.
    /// Re-running replaces the previous family and metrics wholesale; a
    /// failure leaves them untouched.
    pub fn fit_models(&mut self, method: Method, k_min: usize, k_max: usize, seed: u64) -> Result<()> {
        if self.stage < Stage::VariablesConfirmed {
            return Err(SegmentaError::Input(
                "confirm variables before fitting models".into(),
            ));
        }
        if method == Method::Topics {
            return Err(SegmentaError::Input(
                "topic segmentation runs through fit_topic_segments".into(),
            ));
        }
        let features = self.features.as_ref().ok_or_else(|| {
            SegmentaError::Fit("no numeric variables were selected for continuous clustering".into())
        })?;

        let family = model::fit_family(features, k_min, k_max, method, seed)?;
        let metrics = metrics::score(&family, features)?;

        if let Some(table) = self.table.as_mut() {
            drop_assignment_columns(table);
        }
        self.family = Some(family);
        self.metrics = Some(metrics);
        self.selected_k = None;
        self.cluster_col = None;
        self.merged = None;
        self.stage = Stage::ModelsFitted;
        Ok(())
    }

    /// Run categorical segmentation with a fixed segment count. The argmax
    /// assignment is written in the same step, so the session lands directly
    /// on `ClusterAssigned`.
    pub fn fit_topic_segments(&mut self, n_segments: usize, seed: u64) -> Result<()> {
        if self.stage < Stage::VariablesConfirmed {
            return Err(SegmentaError::Input(
                "confirm variables before fitting models".into(),
            ));
        }
        if !(K_FLOOR..=K_CEILING).contains(&n_segments) {
            return Err(SegmentaError::Fit(format!(
                "segment count {n_segments} must lie within [{K_FLOOR}, {K_CEILING}]"
            )));
        }
        if self.categorical_vars.is_empty() {
            return Err(SegmentaError::Fit(
                "no categorical variables were selected for segmentation".into(),
            ));
        }
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| SegmentaError::Input("load a table first".into()))?;

        let topic_model = topics::fit_topics(table, &self.categorical_vars, n_segments, seed)?;
        let labels: Vec<i64> = topic_model.labels.iter().map(|&l| l as i64).collect();
        let n_features = topic_model.terms.len();

        let mut labeled = table.clone();
        drop_assignment_columns(&mut labeled);
        labeled.with_column(Series::new(SEGMENT_COLUMN, labels))?;

        let mut models = BTreeMap::new();
        let n_rows = labeled.height();
        models.insert(
            n_segments,
            FittedModel::Topic(TopicFit { k: n_segments, model: topic_model }),
        );

        self.table = Some(labeled);
        self.family = Some(ModelFamily {
            method: Method::Topics,
            models,
            n_rows,
            n_features,
        });
        self.metrics = None;
        self.selected_k = Some(n_segments);
        self.cluster_col = Some(SEGMENT_COLUMN.to_string());
        self.merged = None;
        self.demo_vars.clear();
        self.stage = Stage::ClusterAssigned;
        Ok(())
    }

    /// Apply one member of the fitted family, writing the label column onto
    /// the working table. Defaults to the smallest fitted k. Re-enterable
    /// with a different k; doing so drops any previous merge.
    pub fn assign_clusters(&mut self, k: Option<usize>) -> Result<()> {
        if self.stage < Stage::ModelsFitted {
            return Err(SegmentaError::Input(
                "fit models before assigning clusters".into(),
            ));
        }
        let family = self
            .family
            .as_ref()
            .ok_or_else(|| SegmentaError::Input("fit models before assigning clusters".into()))?;
        if family.method == Method::Topics {
            // the topic assignment was written at fit time
            return Ok(());
        }
        let k = match k {
            Some(k) => k,
            None => family
                .smallest_k()
                .ok_or_else(|| SegmentaError::Input("the fitted family is empty".into()))?,
        };
        let model = family
            .get(k)
            .ok_or_else(|| SegmentaError::Input(format!("no fitted model for k = {k}")))?;
        let features = self
            .features
            .as_ref()
            .ok_or_else(|| SegmentaError::Fit("no cleaned feature matrix in session".into()))?;
        if features.nrows() != family.n_rows || features.ncols() != family.n_features {
            return Err(SegmentaError::Fit(
                "feature matrix does not match the fitted family".into(),
            ));
        }

        let labels = model.predict(features);
        let labels: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
        let mut labeled = self
            .table
            .clone()
            .ok_or_else(|| SegmentaError::Input("load a table first".into()))?;
        drop_assignment_columns(&mut labeled);
        labeled.with_column(Series::new(CLUSTER_COLUMN, labels))?;

        self.table = Some(labeled);
        self.selected_k = Some(k);
        self.cluster_col = Some(CLUSTER_COLUMN.to_string());
        self.merged = None;
        self.stage = Stage::ClusterAssigned;
        Ok(())
    }

    /// Join demographic attributes onto the assigned table. Re-enterable
    /// with a different key or variables; a failure keeps the previous
    /// merge untouched.
    pub fn merge_demographics(
        &mut self,
        secondary: &DataFrame,
        secondary_key: Option<&str>,
        demo_vars: &[String],
    ) -> Result<()> {
        if self.stage < Stage::ClusterAssigned {
            return Err(SegmentaError::Input(
                "assign clusters before the demographic merge".into(),
            ));
        }
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| SegmentaError::Input("load a table first".into()))?;
        let id_col = self
            .id_col
            .as_deref()
            .ok_or_else(|| SegmentaError::Input("no identifier column bound".into()))?;
        let cluster_col = self
            .cluster_col
            .as_deref()
            .ok_or_else(|| SegmentaError::Input("no cluster assignment recorded".into()))?;

        let key = merge::resolve_secondary_key(secondary, self.demo_key.as_deref(), secondary_key)?;

        let mut keep_vars = vec![cluster_col.to_string()];
        keep_vars.extend(self.numeric_vars.iter().cloned());
        keep_vars.extend(self.categorical_vars.iter().cloned());

        let merged = merge::merge(table, secondary, id_col, &key, &keep_vars, demo_vars)?;

        self.merged = Some(merged);
        self.demo_key = Some(key);
        self.demo_vars = demo_vars.to_vec();
        self.stage = Stage::EnrichmentJoined;
        Ok(())
    }

    /// Render the export workbook from the enriched table.
    pub fn export_workbook(&self) -> Result<ExportOutcome> {
        let merged = self.merged.as_ref().ok_or_else(|| {
            SegmentaError::Export("run the demographic merge before exporting".into())
        })?;
        let id_col = self
            .id_col
            .as_deref()
            .ok_or_else(|| SegmentaError::Export("no identifier column bound".into()))?;
        let cluster_col = self
            .cluster_col
            .as_deref()
            .ok_or_else(|| SegmentaError::Export("no cluster assignment recorded".into()))?;
        export::workbook(merged, &self.demo_vars, id_col, cluster_col)
    }
}

fn drop_assignment_columns(table: &mut DataFrame) {
    for name in [CLUSTER_COLUMN, SEGMENT_COLUMN] {
        if table.get_column_names().iter().any(|c| *c == name) {
            let _ = table.drop_in_place(name);
        }
    }
}
