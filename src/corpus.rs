// Corpus assembly: image paths -> observation matrix

use crate::error::{EigenfaceError, Result};
use crate::normalize::{normalize_image, ImageDims, RawImage};
use image::error::{ImageError, ParameterError, ParameterErrorKind};
use image::DynamicImage;
use log::{debug, info};
use ndarray::{Array2, Array3};
use std::path::Path;

/// Defines how the corpus assembler obtains decoded images.
///
/// The file-backed implementation is [`FileImageLoader`]; tests substitute
/// in-memory loaders so the assembler can run without touching the filesystem.
pub trait ImageLoader {
    /// Loads the image at `path`. A failure aborts corpus assembly.
    fn load(&self, path: &Path) -> Result<RawImage>;
}

/// Loads raster images from disk through the `image` crate.
///
/// Samples are scaled to [0, 1]. Single-channel images decode to
/// [`RawImage::Single`]; gray+alpha, RGB and RGBA images decode to
/// [`RawImage::MultiChannel`] with their stored channel order.
#[derive(Debug, Default, Copy, Clone)]
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path) -> Result<RawImage> {
        let decoded = image::open(path)
            .and_then(raw_image_from_dynamic)
            .map_err(|source| EigenfaceError::ImageLoad {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(decoded)
    }
}

/// Converts a decoded `DynamicImage` into a floating-point grid.
pub fn raw_image_from_dynamic(img: DynamicImage) -> std::result::Result<RawImage, ImageError> {
    let height = img.height() as usize;
    let width = img.width() as usize;

    let (samples, channels) = match img.color().channel_count() {
        1 => (img.to_luma32f().into_raw(), 1),
        2 => (img.to_luma_alpha32f().into_raw(), 2),
        3 => (img.to_rgb32f().into_raw(), 3),
        _ => (img.to_rgba32f().into_raw(), 4),
    };
    let samples: Vec<f64> = samples.into_iter().map(f64::from).collect();

    let raw = if channels == 1 {
        Array2::from_shape_vec((height, width), samples).map(RawImage::Single)
    } else {
        Array3::from_shape_vec((height, width, channels), samples).map(RawImage::MultiChannel)
    };
    raw.map_err(|_| {
        ImageError::Parameter(ParameterError::from_kind(ParameterErrorKind::DimensionMismatch))
    })
}

/// Loads and normalizes every image in `paths`, stacking the observation
/// vectors as rows in input order.
///
/// The first unreadable or non-normalizable image aborts assembly; no partial
/// matrix is returned.
pub fn assemble_observation_matrix<P, L>(
    paths: &[P],
    loader: &L,
    dims: ImageDims,
) -> Result<Array2<f64>>
where
    P: AsRef<Path>,
    L: ImageLoader + ?Sized,
{
    let mut observations = Array2::<f64>::zeros((paths.len(), dims.n_pixels()));

    for (row_idx, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        let raw = loader.load(path)?;
        debug!("Loaded {} with shape {:?}", path.display(), raw.shape());
        let vector = normalize_image(&raw, dims, path)?;
        observations.row_mut(row_idx).assign(&vector);
    }

    info!(
        "Assembled observation matrix of {} images x {} pixels",
        observations.nrows(),
        observations.ncols()
    );
    Ok(observations)
}
