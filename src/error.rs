// Error kinds surfaced by the eigenface pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while assembling a corpus, fitting the decomposition, or
/// writing artifacts. Every stage fails fast: the first error aborts the run.
#[derive(Error, Debug)]
pub enum EigenfaceError {
    /// A source image could not be opened or decoded.
    #[error("Failed to load image {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// An image shape that cannot be reconciled with the target dimensions
    /// by the zero-padding rules.
    #[error("Image {} has shape {actual:?}, which cannot be normalized to {expected:?}", path.display())]
    Shape {
        path: PathBuf,
        actual: Vec<usize>,
        expected: (usize, usize),
    },

    /// The requested component count is zero or exceeds min(n_samples, n_features).
    #[error(
        "Cannot compute {requested} components from {n_samples} samples with {n_features} features; \
         the component count must be between 1 and min(n_samples, n_features)."
    )]
    InvalidComponentCount {
        requested: usize,
        n_samples: usize,
        n_features: usize,
    },

    /// A destination file or directory could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A linear-algebra backend failed during fitting.
    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    /// A model is incomplete or internally inconsistent.
    #[error("Invalid decomposition model: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, EigenfaceError>;
