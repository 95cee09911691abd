// Artifact writing: rendered images and the serialized model

use crate::error::{EigenfaceError, Result};
use crate::pca::PCA;
use crate::render::RenderedBasis;
use image::{GrayImage, ImageError};
use log::info;
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};

pub const MEAN_FACE_FILE_NAME: &str = "mean-face.png";
pub const MODEL_FILE_NAME: &str = "pca-model.bin.zst";

/// Paths written by one [`ArtifactWriter::write_all`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrittenArtifacts {
    pub mean_face: PathBuf,
    /// Eigenface images in rank order.
    pub eigenfaces: Vec<PathBuf>,
    pub model: PathBuf,
}

/// Writes artifacts under a destination directory, creating it as needed.
///
/// Existing files with the same names are overwritten. A failure part way
/// through leaves already written files in place.
#[derive(Clone, Debug)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes the mean face, every ranked eigenface, then the model.
    pub fn write_all(&self, basis: &RenderedBasis, model: &PCA) -> Result<WrittenArtifacts> {
        self.ensure_output_dir()?;

        let mean_face = self.output_dir.join(MEAN_FACE_FILE_NAME);
        info!("Saving mean face to {}", mean_face.display());
        write_gray_png(&basis.mean_face, &mean_face)?;

        let n_eigenfaces = basis.eigenfaces.len();
        let mut eigenfaces = Vec::with_capacity(n_eigenfaces);
        for face in &basis.eigenfaces {
            let path = self.output_dir.join(eigenface_file_name(
                face.rank,
                face.explained_variance_ratio,
                n_eigenfaces,
            ));
            info!("Saving eigenface {} to {}", face.rank, path.display());
            write_gray_png(&face.image, &path)?;
            eigenfaces.push(path);
        }

        let model_path = self.output_dir.join(MODEL_FILE_NAME);
        info!("Saving PCA model to {}", model_path.display());
        model.save_model(&model_path)?;

        Ok(WrittenArtifacts {
            mean_face,
            eigenfaces,
            model: model_path,
        })
    }

    fn ensure_output_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|source| EigenfaceError::Write {
            path: self.output_dir.clone(),
            source,
        })
    }
}

/// File name of the eigenface at `rank` (1-based) out of `n_total`.
///
/// The zero-padded rank prefix keeps lexicographic order equal to rank order;
/// the suffix is the explained-variance percentage, e.g. `001-45.1234%.png`.
/// Percentages are truncated to four decimals so the encoded shares never sum
/// to more than the true total.
pub fn eigenface_file_name(rank: usize, explained_variance_ratio: f64, n_total: usize) -> String {
    let width = n_total.to_string().len().max(3);
    let units = (explained_variance_ratio * 1_000_000.0 + 1e-7).floor();
    format!("{:0width$}-{:.4}%.png", rank, units / 10_000.0, width = width)
}

/// Parses the percentage back out of a name built by [`eigenface_file_name`].
pub fn parse_eigenface_percentage(file_name: &str) -> Option<f64> {
    let (_, rest) = file_name.split_once('-')?;
    rest.strip_suffix("%.png")?.parse().ok()
}

/// Min-max scales `grid` to 8-bit grayscale. A constant grid maps to black.
pub fn to_gray_image(grid: &Array2<f64>) -> Result<GrayImage> {
    let (height, width) = grid.dim();
    let (lo, hi) = grid
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;

    let pixels: Vec<u8> = grid
        .iter()
        .map(|&v| {
            if span > 0.0 && span.is_finite() {
                (((v - lo) / span) * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect();

    GrayImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
        EigenfaceError::Model(format!("cannot build a {}x{} grayscale image", height, width))
    })
}

fn write_gray_png(grid: &Array2<f64>, path: &Path) -> Result<()> {
    let img = to_gray_image(grid)?;
    img.save(path).map_err(|e| EigenfaceError::Write {
        path: path.to_path_buf(),
        source: match e {
            ImageError::IoError(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        },
    })
}
