// Image-to-vector normalization

use crate::error::{EigenfaceError, Result};
use ndarray::{s, Array1, Array2, Array3, ArrayView2};
use std::path::Path;

/// Target image dimensions, (height, width).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDims {
    pub height: usize,
    pub width: usize,
}

impl ImageDims {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Length of an observation vector for these dimensions.
    pub fn n_pixels(&self) -> usize {
        self.height * self.width
    }

    pub fn as_tuple(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// A decoded image before normalization.
///
/// `Single` is a plain (height, width) grid. `MultiChannel` carries a trailing
/// channel axis, shape (height, width, channels).
#[derive(Clone, Debug, PartialEq)]
pub enum RawImage {
    Single(Array2<f64>),
    MultiChannel(Array3<f64>),
}

impl RawImage {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            RawImage::Single(a) => a.shape().to_vec(),
            RawImage::MultiChannel(a) => a.shape().to_vec(),
        }
    }
}

impl From<Array2<f64>> for RawImage {
    fn from(grid: Array2<f64>) -> Self {
        RawImage::Single(grid)
    }
}

impl From<Array3<f64>> for RawImage {
    fn from(grid: Array3<f64>) -> Self {
        RawImage::MultiChannel(grid)
    }
}

/// Converts `image` into a row-major observation vector of length
/// `dims.height * dims.width`.
///
/// Handled cases, checked in this order:
/// - a multi-channel image keeps channel 0 only; its height and width must match.
/// - an exact (height, width) match is flattened as is.
/// - an image shorter than the target (same width) gets zero rows at the bottom.
/// - an image narrower than the target (same height) gets zero columns on the right.
///
/// Every other mismatch, including any oversized dimension, is a `Shape` error
/// naming `path`. Nothing is ever cropped.
pub fn normalize_image(image: &RawImage, dims: ImageDims, path: &Path) -> Result<Array1<f64>> {
    let shape_error = || EigenfaceError::Shape {
        path: path.to_path_buf(),
        actual: image.shape(),
        expected: dims.as_tuple(),
    };

    let grid: Array2<f64> = match image {
        RawImage::MultiChannel(channels) => {
            let (h, w, c) = channels.dim();
            if c == 0 || h != dims.height || w != dims.width {
                return Err(shape_error());
            }
            channels.slice(s![.., .., 0]).to_owned()
        }
        RawImage::Single(grid) => {
            let (h, w) = grid.dim();
            if h == dims.height && w == dims.width {
                grid.clone()
            } else if h < dims.height && w == dims.width {
                pad_bottom(grid.view(), dims.height)
            } else if h == dims.height && w < dims.width {
                pad_right(grid.view(), dims.width)
            } else {
                return Err(shape_error());
            }
        }
    };

    Ok(flatten_row_major(grid))
}

fn pad_bottom(grid: ArrayView2<f64>, height: usize) -> Array2<f64> {
    let mut padded = Array2::zeros((height, grid.ncols()));
    padded.slice_mut(s![..grid.nrows(), ..]).assign(&grid);
    padded
}

fn pad_right(grid: ArrayView2<f64>, width: usize) -> Array2<f64> {
    let mut padded = Array2::zeros((grid.nrows(), width));
    padded.slice_mut(s![.., ..grid.ncols()]).assign(&grid);
    padded
}

/// Height-major flattening. `iter()` walks logical order regardless of memory layout.
fn flatten_row_major(grid: Array2<f64>) -> Array1<f64> {
    grid.iter().copied().collect()
}

/// Inverse of the flattening above: reshapes a vector back into a (height, width) grid.
pub fn unflatten(vector: &Array1<f64>, dims: ImageDims) -> Result<Array2<f64>> {
    if vector.len() != dims.n_pixels() {
        return Err(EigenfaceError::Model(format!(
            "vector of length {} cannot be reshaped to {}x{}",
            vector.len(),
            dims.height,
            dims.width
        )));
    }
    Array2::from_shape_vec(dims.as_tuple(), vector.iter().copied().collect())
        .map_err(|e| EigenfaceError::Model(format!("reshape failed: {}", e)))
}
