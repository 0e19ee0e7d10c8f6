//! Error types shared by the gateway, cache, controller and export code.
//!
//! None of these are fatal: each one degrades a single widget, insight or
//! export action while the rest of the view keeps working.

/// Why a remote dataset could not be obtained.
///
/// The type is `Clone` so that a single in-flight fetch can hand the same
/// outcome to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response (connection refused, timeout, ...).
    #[error("request to {resource} failed: {message}")]
    Transport { resource: String, message: String },

    /// The server answered with a non-success status code.
    #[error("{resource} returned HTTP {status}")]
    Status { resource: String, status: u16 },

    /// The body was not JSON, or not the JSON shape the resource promises.
    #[error("{resource} returned a malformed payload: {message}")]
    Malformed { resource: String, message: String },

    /// The request was rejected before being sent, e.g. a zero page limit.
    #[error("invalid query for {resource}: {message}")]
    InvalidQuery { resource: String, message: String },
}

/// A fetched dataset did not have the rows a consumer expected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset {dataset} has an unexpected shape: {message}")]
    Shape { dataset: String, message: String },
}

/// Failures of the export action.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// There are no trip records on screen.
    ///
    /// This is shown to the user as "No data to export".
    #[error("No data to export")]
    NothingToExport,

    #[error("could not write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not write export file: {0}")]
    Io(#[from] std::io::Error),
}
