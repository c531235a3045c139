use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OasisError {
    #[error("incorrect number of subjects ({0})")]
    #[diagnostic(help("request at least one subject"))]
    InvalidSubjectCount(i64),

    #[error("invalid subject identifier: {0}")]
    InvalidSubjectId(String),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("download request failed: {0}")]
    Http(String),

    #[error("{url} returned status {status}: {message}")]
    HttpStatus {
        status: u16,
        url: String,
        message: String,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to uncompress archive: {0}")]
    Archive(String),

    #[error("resource missing after fetch: {0}")]
    MissingAfterFetch(PathBuf),

    #[error("fetcher returned {actual} paths for {expected} manifest entries")]
    FetchLength { expected: usize, actual: usize },

    #[error("failed to parse covariates table: {0}")]
    CovariatesParse(String),

    #[error("covariates table has no subject id column (headers: {0})")]
    MissingIdColumn(String),

    #[error("unable to resolve data directory: {0}")]
    DataDir(String),
}
