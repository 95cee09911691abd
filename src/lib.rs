// Eigenface extraction

#![doc = include_str!("../README.md")]

pub mod artifacts;
pub mod corpus;
pub mod error;
pub mod linalg_backends;
pub mod normalize;
pub mod pca;
pub mod pipeline;
pub mod render;

pub use artifacts::{eigenface_file_name, ArtifactWriter, WrittenArtifacts};
pub use corpus::{assemble_observation_matrix, FileImageLoader, ImageLoader};
pub use error::{EigenfaceError, Result};
pub use normalize::{normalize_image, ImageDims, RawImage};
pub use pca::PCA;
pub use pipeline::{compute_eigenfaces, plot_eigenfaces, EigenfaceConfig, Eigenfaces, FitMethod};
pub use render::{render_basis, RankedEigenface, RenderedBasis};

#[cfg(test)]
mod pca_tests;
