//! Segmenta: customer/record segmentation over tabular data
//!
//! The pipeline parses a delimited table, cleans a numeric selection, fits a
//! family of clustering models across a k-range (Gaussian mixture or K-Means)
//! or a topic-based segmentation over categorical data, scores the candidates,
//! assigns cluster labels, optionally enriches the result with a demographic
//! join and exports crosstabulated results to a workbook.

pub mod clean;
pub mod cli;
pub mod data;
pub mod error;
pub mod export;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod session;
pub mod topics;
pub mod viz;

// Re-export public items for easier access
pub use clean::{clean, Cleaned, StandardScaler};
pub use cli::Args;
pub use data::{read_table, read_table_from_path};
pub use error::{Result, SegmentaError};
pub use export::ExportOutcome;
pub use merge::{resolve_column, resolve_secondary_key};
pub use metrics::{score, silhouette, MetricsTable};
pub use model::{fit_family, FittedModel, Method, ModelFamily, SelectionScore};
pub use session::{SegmentationSession, Stage, CLUSTER_COLUMN, SEGMENT_COLUMN};
pub use topics::{fit_topics, one_hot_encode, TopicModel};
