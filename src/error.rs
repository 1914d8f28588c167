use thiserror::Error;

/// Pipeline errors. Every variant is recoverable: a failed stage reports,
/// leaves prior state untouched and stays retryable.
#[derive(Error, Debug)]
pub enum SegmentaError {
    /// Bad upload, non-unique identifier, empty or invalid selection.
    #[error("input error: {0}")]
    Input(String),

    /// Degenerate feature matrix, unsupported k, failed model fit.
    #[error("fit error: {0}")]
    Fit(String),

    /// Key coercion or join failure during demographic enrichment.
    #[error("join error: {0}")]
    Join(String),

    /// Missing identifier or cluster column at export time.
    #[error("export error: {0}")]
    Export(String),

    /// Chart rendering failure.
    #[error("plot error: {0}")]
    Plot(String),

    #[error("table error: {0}")]
    Table(#[from] polars::error::PolarsError),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SegmentaError>;
