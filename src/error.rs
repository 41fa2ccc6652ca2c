//! Error types for sheet generation.
//!
//! Only `ImageDecode` is recoverable: the caller skips that card and keeps
//! going. Everything else aborts the run before or instead of writing output.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read config file {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },

    /// The input folder holds no card fronts.
    #[error("no images found in {}", .0.display())]
    NoInput(PathBuf),

    #[error("cannot list input folder {}: {reason}", path.display())]
    InputDir { path: PathBuf, reason: String },

    /// A single source image could not be read or decoded.
    #[error("cannot decode image {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The destination document could not be created or finalised.
    #[error("cannot write {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF post-processing failed: {0}")]
    Pdf(#[from] lopdf::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the run can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::ImageDecode { .. })
    }
}
