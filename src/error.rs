// Error type shared by the loaders, config and exporters.
//
// Record-level problems (a bad coordinate, an unparseable date) never show up
// here: loaders count them in their `LoadReport` and keep going. Only problems
// that stop a whole operation become a `ReportError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    /// I/O errors (file access, output directory, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading/writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed configuration file
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A tunable or operator-supplied value outside its allowed range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, ReportError>;
