// Basis rendering: model vectors -> viewable images

use crate::error::{EigenfaceError, Result};
use crate::normalize::{unflatten, ImageDims};
use crate::pca::PCA;
use ndarray::Array2;

/// One principal axis rendered as an image delta against the mean face.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedEigenface {
    /// 1-based rank; rank 1 explains the most variance.
    pub rank: usize,
    pub explained_variance_ratio: f64,
    /// The axis reshaped to (height, width) minus the mean face. For display only.
    pub image: Array2<f64>,
}

/// The mean face and the ranked eigenfaces of a fitted model.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedBasis {
    pub mean_face: Array2<f64>,
    /// Ordered by rank, i.e. by descending explained variance.
    pub eigenfaces: Vec<RankedEigenface>,
}

/// Reshapes the model's mean and axes into (height, width) images and
/// subtracts the mean face from every axis.
///
/// # Errors
/// `Model` if the model is unfitted, has no variance ratios, or its feature
/// count differs from `dims.height * dims.width`.
pub fn render_basis(model: &PCA, dims: ImageDims) -> Result<RenderedBasis> {
    let mean = model
        .mean()
        .ok_or_else(|| EigenfaceError::Model("cannot render an unfitted model".into()))?;
    let rotation = model
        .rotation()
        .ok_or_else(|| EigenfaceError::Model("cannot render an unfitted model".into()))?;
    let ratios = model.explained_variance_ratio().ok_or_else(|| {
        EigenfaceError::Model("model carries no explained-variance ratios to rank by".into())
    })?;

    let mean_face = unflatten(mean, dims)?;
    let eigenfaces = rotation
        .columns()
        .into_iter()
        .zip(ratios.iter())
        .enumerate()
        .map(|(idx, (axis, &ratio))| {
            let image = unflatten(&axis.to_owned(), dims)? - &mean_face;
            Ok(RankedEigenface {
                rank: idx + 1,
                explained_variance_ratio: ratio,
                image,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RenderedBasis { mean_face, eigenfaces })
}
