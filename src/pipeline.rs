// End-to-end eigenface extraction

use crate::artifacts::{ArtifactWriter, WrittenArtifacts};
use crate::corpus::{assemble_observation_matrix, ImageLoader};
use crate::error::{EigenfaceError, Result};
use crate::normalize::ImageDims;
use crate::pca::PCA;
use crate::render::{render_basis, RenderedBasis};
use log::info;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "data/eigenfaces";
pub const DEFAULT_NUM_EIGENFACES: usize = 50;
pub const DEFAULT_IMAGE_HEIGHT: usize = 100;
pub const DEFAULT_IMAGE_WIDTH: usize = 100;
pub const DEFAULT_SEED: u64 = 42;

/// How the decomposition is computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitMethod {
    /// Eigen-decomposition of the covariance or Gram matrix.
    Exact,
    /// Randomized SVD; see [`PCA::rfit`].
    Randomized {
        /// 0 selects the adaptive default.
        n_oversamples: usize,
        n_power_iterations: usize,
        seed: Option<u64>,
    },
}

impl Default for FitMethod {
    fn default() -> Self {
        FitMethod::Randomized {
            n_oversamples: 0,
            n_power_iterations: 2,
            seed: Some(DEFAULT_SEED),
        }
    }
}

/// Parameters of one extraction run.
#[derive(Clone, Debug, PartialEq)]
pub struct EigenfaceConfig {
    /// Directory receiving the mean face, eigenfaces, and model.
    pub output_dir: PathBuf,
    /// Number of eigenfaces (K).
    pub n_components: usize,
    pub height: usize,
    pub width: usize,
    pub method: FitMethod,
}

impl Default for EigenfaceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            n_components: DEFAULT_NUM_EIGENFACES,
            height: DEFAULT_IMAGE_HEIGHT,
            width: DEFAULT_IMAGE_WIDTH,
            method: FitMethod::default(),
        }
    }
}

impl EigenfaceConfig {
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, output_dir: P) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    pub fn with_dims(mut self, height: usize, width: usize) -> Self {
        self.height = height;
        self.width = width;
        self
    }

    pub fn with_method(mut self, method: FitMethod) -> Self {
        self.method = method;
        self
    }

    pub fn dims(&self) -> ImageDims {
        ImageDims::new(self.height, self.width)
    }

    /// Checks the parameters that can be rejected before any image is read.
    /// The corpus size is unknown at this point and reported as 0.
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 || self.dims().n_pixels() == 0 {
            return Err(EigenfaceError::InvalidComponentCount {
                requested: self.n_components,
                n_samples: 0,
                n_features: self.dims().n_pixels(),
            });
        }
        Ok(())
    }
}

/// Everything computed by [`compute_eigenfaces`].
#[derive(Clone, Debug)]
pub struct Eigenfaces {
    pub basis: RenderedBasis,
    pub model: PCA,
}

/// Loads the images, fits the decomposition, and renders the basis.
/// Nothing is written.
pub fn compute_eigenfaces<P, L>(image_paths: &[P], loader: &L, config: &EigenfaceConfig) -> Result<Eigenfaces>
where
    P: AsRef<Path>,
    L: ImageLoader + ?Sized,
{
    config.validate()?;
    let dims = config.dims();
    let image_matrix = assemble_observation_matrix(image_paths, loader, dims)?;

    info!(
        "Computing {} principal components using {} images",
        config.n_components,
        image_matrix.nrows()
    );
    let mut model = PCA::new();
    match config.method {
        FitMethod::Exact => model.fit(image_matrix, config.n_components)?,
        FitMethod::Randomized {
            n_oversamples,
            n_power_iterations,
            seed,
        } => {
            model.rfit(
                image_matrix,
                config.n_components,
                n_oversamples,
                n_power_iterations,
                seed,
            )?;
        }
    }

    info!("Computing eigenfaces");
    let basis = render_basis(&model, dims)?;
    Ok(Eigenfaces { basis, model })
}

/// Runs the whole pipeline and writes the mean face, the ranked eigenfaces,
/// and the model under `config.output_dir`.
///
/// Images are loaded and the model fitted before anything is written, so a
/// bad input image leaves the output directory untouched.
pub fn plot_eigenfaces<P, L>(image_paths: &[P], loader: &L, config: &EigenfaceConfig) -> Result<WrittenArtifacts>
where
    P: AsRef<Path>,
    L: ImageLoader + ?Sized,
{
    let Eigenfaces { basis, model } = compute_eigenfaces(image_paths, loader, config)?;
    ArtifactWriter::new(&config.output_dir).write_all(&basis, &model)
}
