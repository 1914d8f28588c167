//! Command-line interface definitions and argument parsing

use clap::{Parser, ValueEnum};

use crate::model::Method;

/// Customer segmentation pipeline: clean, cluster, enrich and export
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the primary CSV file
    #[arg(short, long)]
    pub input: String,

    /// Identifier column; its values must be unique
    #[arg(long)]
    pub id_col: String,

    /// Comma-separated numeric variables for GMM/K-Means
    #[arg(long, default_value = "")]
    pub vars: String,

    /// Comma-separated categorical variables for topic segmentation
    #[arg(long, default_value = "")]
    pub cat_vars: String,

    /// Clustering method
    #[arg(short, long, value_enum, default_value_t = MethodArg::Gmm)]
    pub method: MethodArg,

    /// Lower end of the cluster range
    #[arg(long, default_value = "2")]
    pub k_min: usize,

    /// Upper end of the cluster range
    #[arg(long, default_value = "5")]
    pub k_max: usize,

    /// Segment count for topic segmentation
    #[arg(long, default_value = "4")]
    pub segments: usize,

    /// k to assign; defaults to the smallest fitted k
    #[arg(long)]
    pub select_k: Option<usize>,

    /// Optional demographic CSV to join after assignment
    #[arg(long)]
    pub demo: Option<String>,

    /// Identifier column in the demographic file; defaults to its first column
    #[arg(long)]
    pub demo_key: Option<String>,

    /// Comma-separated demographic variables to keep in the join
    #[arg(long, default_value = "")]
    pub demo_vars: String,

    /// Output path for the export workbook
    #[arg(short, long, default_value = "segmentacion.xlsx")]
    pub output: String,

    /// Optional output path for the projection scatter PNG
    #[arg(long)]
    pub plot: Option<String>,

    /// Random seed for deterministic fits
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Clustering method flag.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArg {
    Gmm,
    Kmeans,
    Topics,
}

impl MethodArg {
    pub fn to_method(self) -> Method {
        match self {
            MethodArg::Gmm => Method::Gmm,
            MethodArg::Kmeans => Method::KMeans,
            MethodArg::Topics => Method::Topics,
        }
    }
}

impl Args {
    pub fn numeric_vars(&self) -> Vec<String> {
        parse_list(&self.vars)
    }

    pub fn categorical_vars(&self) -> Vec<String> {
        parse_list(&self.cat_vars)
    }

    pub fn demographic_vars(&self) -> Vec<String> {
        parse_list(&self.demo_vars)
    }
}

/// Split a comma-separated list argument into trimmed, non-empty names.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
