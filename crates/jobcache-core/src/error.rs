//! Error types for jobcache-core

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for the job cache loader
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid options, detected before any I/O
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A load mode could not enumerate its files
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Invalid local or remote path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No connector is registered for the destination's scheme
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Opening the connection to a target failed
    #[error("Connection error for {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A single file could not be copied to a single target
    ///
    /// [`crate::load`] collects these into [`Error::Load`]. The variant
    /// lets callers driving [`crate::FileSystemPath::copy_into`] themselves
    /// propagate with `?`.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// A target could not be promoted
    ///
    /// Like [`Error::Transfer`], only raised outside [`crate::load`].
    #[error(transparent)]
    Promotion(#[from] PromotionError),

    /// Some units of a load batch failed
    #[error(transparent)]
    Load(#[from] CompositeLoadError),

    /// Generic error for other cases
    #[error("Other error: {0}")]
    Other(String),
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Resolution(err.to_string())
    }
}

impl From<glob::PatternError> for Error {
    fn from(err: glob::PatternError) -> Self {
        Error::Resolution(format!("invalid pattern: {}", err))
    }
}

/// Failure of one (target, file) copy unit
#[derive(Error, Debug)]
#[error("failed to copy {} to {target}: {source}", file.display())]
pub struct TransferError {
    /// Qualified root of the target
    pub target: String,
    /// Local file that was being copied
    pub file: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failure to promote a staging directory on one target
#[derive(Error, Debug)]
#[error("failed to promote {staging} to {final_path} on {target}: {source}")]
pub struct PromotionError {
    /// Qualified root of the target
    pub target: String,
    /// Staging directory being promoted
    pub staging: String,
    /// Alias that should have referred to the staging directory
    pub final_path: String,
    #[source]
    pub source: std::io::Error,
}

/// Every failure of one load batch
#[derive(Error, Debug, Default)]
pub struct CompositeLoadError {
    /// Failed copy units
    pub transfers: Vec<TransferError>,
    /// Failed promotions
    pub promotions: Vec<PromotionError>,
    /// Targets that were promoted despite failures elsewhere
    pub promoted: Vec<String>,
}

impl CompositeLoadError {
    /// Whether nothing failed
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty() && self.promotions.is_empty()
    }

    /// Every failing (target, file) pair
    pub fn failed_pairs(&self) -> Vec<(&str, &std::path::Path)> {
        self.transfers
            .iter()
            .map(|t| (t.target.as_str(), t.file.as_path()))
            .collect()
    }

    /// Number of failed operations
    pub fn count(&self) -> usize {
        self.transfers.len() + self.promotions.len()
    }
}

impl fmt::Display for CompositeLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job cache load failed: {} copies and {} promotions failed",
            self.transfers.len(),
            self.promotions.len()
        )?;
        for transfer in &self.transfers {
            write!(f, "\n  {}", transfer)?;
        }
        for promotion in &self.promotions {
            write!(f, "\n  {}", promotion)?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
