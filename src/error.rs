use datafusion::{arrow::error::ArrowError, error::DataFusionError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("DataFusion: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Arrow: {0}")]
    Arrow(#[from] ArrowError),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("The date supplied '{date}' is invalid")]
    InvalidDate { date: String },

    #[error("The start date: '{start_date}' is greater than the end date: '{end_date}'")]
    StartDateAfterEndDate {
        start_date: String,
        end_date: String,
    },

    #[error("API request failed: {0}")]
    ApiFailure(#[from] reqwest::Error),

    #[error("Failed to parse URL: {0}")]
    UrlParsingFailed(#[from] url::ParseError),

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Metric value '{value}' is not an integer")]
    InvalidMetricValue { value: String },

    #[error("Missing OAuth credential '{field}'")]
    MissingCredential { field: &'static str },

    #[error("Failed to read credentials file {path:?}: {message}")]
    CredentialsFile { path: PathBuf, message: String },
}
