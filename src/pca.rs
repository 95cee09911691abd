// Principal component analysis (PCA)

use crate::error::{EigenfaceError, Result};
use crate::linalg_backends::{BackendEigh, BackendError, BackendQR, BackendSVD, LinAlgBackendProvider};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Threshold for a column norm to be considered non-zero. Only applied to
/// columns that are either unit length or exactly zero.
const NORMALIZATION_THRESHOLD: f64 = 1e-9;
/// Component variances at or below this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-12;
/// Total variance at or below this fraction of the mean's energy is rounding noise.
const ZERO_VARIANCE_RELATIVE_TOLERANCE: f64 = 1e-24;
/// zstd level used for saved models.
const MODEL_COMPRESSION_LEVEL: i32 = 9;

/// Principal component analysis (PCA) structure.
///
/// Holds the mean observation, the principal axes (rotation matrix), and the
/// variance each axis explains. Observations are centered but not scaled, so
/// every pixel keeps its original weight. Once fitted, the model projects
/// observations onto the axes and reconstructs observations from coefficients.
/// Models can be saved to and loaded from zstd-compressed bincode files.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PCA {
    /// The rotation matrix (principal components), one orthonormal axis per column.
    /// Shape: (n_features, k_components)
    rotation: Option<Array2<f64>>,
    /// Mean vector of the training data.
    /// Shape: (n_features)
    mean: Option<Array1<f64>>,
    /// Variance captured by each component, in descending order.
    /// Shape: (k_components)
    explained_variance: Option<Array1<f64>>,
    /// Fraction of the total variance captured by each component.
    /// Shape: (k_components)
    explained_variance_ratio: Option<Array1<f64>>,
}

impl Default for PCA {
    fn default() -> Self {
        Self::new()
    }
}

impl PCA {
    /// Creates a new, empty PCA struct.
    ///
    /// The model is not fitted and needs to be computed using `fit` or `rfit`,
    /// or loaded using `load_model` or `with_model`.
    ///
    /// # Examples
    ///
    /// ```
    /// use eigenfaces::PCA;
    /// let pca = PCA::new();
    /// assert!(pca.rotation().is_none());
    /// ```
    pub fn new() -> Self {
        Self {
            rotation: None,
            mean: None,
            explained_variance: None,
            explained_variance_ratio: None,
        }
    }

    /// Creates a PCA instance from externally computed components.
    ///
    /// * `rotation` - principal axes as columns, shape (n_features, k_components).
    /// * `mean` - mean observation, shape (n_features).
    ///
    /// Variances are unknown for such a model, so `explained_variance` and
    /// `explained_variance_ratio` return `None`.
    ///
    /// # Errors
    /// Returns `Model` if the feature dimensions disagree.
    pub fn with_model(rotation: Array2<f64>, mean: Array1<f64>) -> Result<Self> {
        if rotation.nrows() != mean.len() {
            return Err(EigenfaceError::Model(format!(
                "Feature dimensions of rotation ({}) and mean ({}) must match.",
                rotation.nrows(),
                mean.len()
            )));
        }
        Ok(Self {
            rotation: Some(rotation),
            mean: Some(mean),
            explained_variance: None,
            explained_variance_ratio: None,
        })
    }

    /// Mean vector of the training data, if fitted.
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    /// Rotation matrix (n_features, k_components), if fitted.
    pub fn rotation(&self) -> Option<&Array2<f64>> {
        self.rotation.as_ref()
    }

    /// Variance captured by each component, largest first.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    /// Share of the total variance captured by each component. Values lie in
    /// [0, 1], are non-increasing, and sum to at most 1.
    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    pub fn n_components(&self) -> usize {
        self.rotation.as_ref().map_or(0, |r| r.ncols())
    }

    pub fn n_features(&self) -> usize {
        self.mean.as_ref().map_or(0, |m| m.len())
    }

    /// Fits the model exactly, via an eigen-decomposition of the covariance
    /// matrix (if n_features <= n_samples) or of the Gram matrix (if
    /// n_features > n_samples, the "Gram trick").
    ///
    /// Exactly `n_components` orthonormal axes are kept, sorted by descending
    /// variance. Axes beyond the rank of the centered data carry zero variance
    /// and are completed deterministically.
    ///
    /// * `data_matrix` - observations as rows, shape (n_samples, n_features).
    /// * `n_components` - number of axes to keep, 1 ..= min(n_samples, n_features).
    ///
    /// # Errors
    /// `InvalidComponentCount` for an out-of-range `n_components`,
    /// `Decomposition` if the backend fails.
    pub fn fit(&mut self, mut data_matrix: Array2<f64>, n_components: usize) -> Result<()> {
        let started = Instant::now();
        let (n_samples, n_features) = data_matrix.dim();
        check_component_count(n_components, n_samples, n_features)?;

        let mean_vector = column_mean(&data_matrix)?;
        data_matrix -= &mean_vector;
        let centered = data_matrix;
        let dof = degrees_of_freedom(n_samples);
        let total_variance = centered.iter().map(|v| v * v).sum::<f64>() / dof;
        let backend = LinAlgBackendProvider::new();

        let mut rotation = Array2::<f64>::zeros((n_features, n_components));
        let mut variances = Array1::<f64>::zeros(n_components);

        if n_features <= n_samples {
            let mut cov_matrix = centered.t().dot(&centered);
            cov_matrix /= dof;

            let eig = backend
                .eigh_upper(&cov_matrix)
                .map_err(backend_error("Eigen decomposition of covariance matrix"))?;
            let order = descending_order(&eig.eigenvalues);
            let largest = order.first().map_or(0.0, |&i| eig.eigenvalues[i]);

            for (k, &idx) in order.iter().take(n_components).enumerate() {
                let eigval = eig.eigenvalues[idx];
                if !carries_variance(eigval, largest) {
                    // Null space; completed below.
                    continue;
                }
                variances[k] = eigval;
                rotation.column_mut(k).assign(&eig.eigenvectors.column(idx));
            }
        } else {
            // Gram trick path
            let mut gram_matrix = centered.dot(&centered.t());
            gram_matrix /= dof;

            let eig = backend
                .eigh_upper(&gram_matrix)
                .map_err(backend_error("Eigen decomposition of Gram matrix"))?;
            let order = descending_order(&eig.eigenvalues);
            let largest = order.first().map_or(0.0, |&i| eig.eigenvalues[i]);

            for (k, &idx) in order.iter().take(n_components).enumerate() {
                let eigval = eig.eigenvalues[idx];
                if !carries_variance(eigval, largest) {
                    // Left as a zero column; completed below.
                    continue;
                }
                // V_k = X^T u_k, renormalized to unit length.
                let mut axis = centered.t().dot(&eig.eigenvectors.column(idx));
                let norm = axis.dot(&axis).sqrt();
                if norm > 0.0 && norm.is_finite() {
                    axis.mapv_inplace(|x| x / norm);
                    rotation.column_mut(k).assign(&axis);
                    variances[k] = eigval;
                }
            }
        }

        self.store_components(rotation, variances, mean_vector, total_variance);
        info!(
            "Exact PCA: {} components from {} samples x {} features in {:?}",
            n_components,
            n_samples,
            n_features,
            started.elapsed()
        );
        Ok(())
    }

    /// Fits the model with a randomized SVD (Halko, Martinsson, Tropp, 2011)
    /// and returns the principal component scores of the input data.
    ///
    /// The sketching strategy depends on the shape of the centered matrix `A`
    /// (n_samples x n_features):
    ///
    /// - `n_features <= n_samples`: sketch `Y = A @ Omega'`, orthonormalize into
    ///   `Q'`, project `B' = Q'^T @ A`, and take the axes from the right singular
    ///   vectors of `B'`.
    /// - `n_features > n_samples` (the usual case for face images): sketch the
    ///   transpose, `Y = A^T @ Omega`, orthonormalize into `Q`, project
    ///   `B = (A @ Q)^T`, and take the axes as `Q @ U_B`.
    ///
    /// `n_power_iterations` rounds of subspace iteration refine the basis. With
    /// a fixed `seed` the result is deterministic. The leading axes match the
    /// exact decomposition up to the error bound of the sketch, which shrinks
    /// geometrically with the power iterations and the spectral gap.
    ///
    /// * `n_oversamples` - extra sketch dimensions `p`, sketch size `l = k + p`.
    ///   `0` selects an adaptive default (10% of k, clamped to 5..=20).
    /// * `seed` - RNG seed; `None` draws one from the thread RNG.
    ///
    /// # Errors
    /// `InvalidComponentCount` for an out-of-range `n_components`,
    /// `Decomposition` if the backend or the RNG fails.
    pub fn rfit(
        &mut self,
        mut x_input_data: Array2<f64>,
        n_components: usize,
        n_oversamples: usize,
        n_power_iterations: usize,
        seed: Option<u64>,
    ) -> Result<Array2<f64>> {
        let started = Instant::now();
        let (n_samples, n_features) = x_input_data.dim();
        check_component_count(n_components, n_samples, n_features)?;

        let mean_vector = column_mean(&x_input_data)?;
        x_input_data -= &mean_vector;
        let centered_a = x_input_data;
        let dof = degrees_of_freedom(n_samples);
        let total_variance = centered_a.iter().map(|v| v * v).sum::<f64>() / dof;

        // --- Sketch size (l = k + p) ---
        const RFIT_ADAPTIVE_P_LOWER_BOUND: usize = 5;
        const RFIT_ADAPTIVE_P_UPPER_BOUND: usize = 20;
        const RFIT_MINIMUM_ROBUST_P_FLOOR: usize = 4;

        let p_to_use = if n_oversamples == 0 {
            let p_adaptive_raw = (n_components as f64 * 0.1).ceil() as usize;
            p_adaptive_raw.clamp(RFIT_ADAPTIVE_P_LOWER_BOUND, RFIT_ADAPTIVE_P_UPPER_BOUND)
        } else {
            n_oversamples.max(RFIT_MINIMUM_ROBUST_P_FLOOR)
        };
        let max_possible_rank = n_samples.min(n_features);
        let l_sketch = (n_components + p_to_use).min(max_possible_rank).max(n_components);
        debug!(
            "Randomized PCA sketch: k={}, p={}, l={}, power iterations={}",
            n_components, p_to_use, l_sketch, n_power_iterations
        );

        let mut rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_rng(rand::thread_rng())
                .map_err(|e| EigenfaceError::Decomposition(format!("Failed to initialize RNG: {}", e)))?,
        };
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| EigenfaceError::Decomposition(format!("Failed to create Normal distribution: {}", e)))?;
        let backend = LinAlgBackendProvider::new();

        let rotation_sketch: Array2<f64>;
        let singular_values: Array1<f64>;

        if n_features <= n_samples {
            // --- Strategy 1: D <= N ---
            let omega_prime = Array2::from_shape_fn((n_features, l_sketch), |_| rng.sample(normal));
            let mut q_prime = backend
                .qr_q_factor(&centered_a.dot(&omega_prime))
                .map_err(backend_error("QR decomposition of the initial sketch of A"))?;

            for i in 0..n_power_iterations {
                let w_prime = backend
                    .qr_q_factor(&centered_a.t().dot(&q_prime))
                    .map_err(backend_error(&format!("QR decomposition of W' (power iteration {})", i)))?;
                q_prime = backend
                    .qr_q_factor(&centered_a.dot(&w_prime))
                    .map_err(backend_error(&format!("QR decomposition of Z' (power iteration {})", i)))?;
            }

            // B' = Q'^T A, (L x D)
            let b_prime = q_prime.t().dot(&centered_a);
            let svd = backend
                .svd_into(b_prime, false, true)
                .map_err(backend_error("SVD of the projected sketch B'"))?;
            let vt = svd.vt.ok_or_else(|| {
                EigenfaceError::Decomposition("SVD did not return V^T for the projected sketch B'".into())
            })?;
            singular_values = svd.s;
            rotation_sketch = vt.t().to_owned();
        } else {
            // --- Strategy 2: D > N ---
            let omega = Array2::from_shape_fn((n_samples, l_sketch), |_| rng.sample(normal));
            let mut q_basis = backend
                .qr_q_factor(&centered_a.t().dot(&omega))
                .map_err(backend_error("QR decomposition of the initial sketch of A^T"))?;

            for i in 0..n_power_iterations {
                let w_basis = backend
                    .qr_q_factor(&centered_a.dot(&q_basis))
                    .map_err(backend_error(&format!("QR decomposition of W (power iteration {})", i)))?;
                q_basis = backend
                    .qr_q_factor(&centered_a.t().dot(&w_basis))
                    .map_err(backend_error(&format!("QR decomposition of Z (power iteration {})", i)))?;
            }

            // B = (A Q)^T, (L x N)
            let b_projected = centered_a.dot(&q_basis).t().to_owned();
            let svd = backend
                .svd_into(b_projected, true, false)
                .map_err(backend_error("SVD of the projected sketch B"))?;
            let u_b = svd.u.ok_or_else(|| {
                EigenfaceError::Decomposition("SVD did not return U for the projected sketch B".into())
            })?;
            singular_values = svd.s;
            rotation_sketch = q_basis.dot(&u_b);
        }

        if rotation_sketch.ncols() < n_components || singular_values.len() < n_components {
            return Err(EigenfaceError::Decomposition(format!(
                "Sketch produced {} axes and {} singular values; {} were requested.",
                rotation_sketch.ncols(),
                singular_values.len(),
                n_components
            )));
        }

        let mut rotation = rotation_sketch.slice(s![.., ..n_components]).to_owned();
        let mut variances = Array1::<f64>::zeros(n_components);
        let largest = singular_values[0] * singular_values[0] / dof;
        for (k, mut column) in rotation.columns_mut().into_iter().enumerate() {
            let variance = singular_values[k] * singular_values[k] / dof;
            let norm = column.dot(&column).sqrt();
            if carries_variance(variance, largest) && norm > 0.0 && norm.is_finite() {
                column.mapv_inplace(|v| v / norm);
                variances[k] = variance;
            } else {
                column.fill(0.0);
            }
        }

        self.store_components(rotation, variances, mean_vector, total_variance);
        info!(
            "Randomized PCA: {} components from {} samples x {} features in {:?}",
            n_components,
            n_samples,
            n_features,
            started.elapsed()
        );

        let rotation = self
            .rotation
            .as_ref()
            .ok_or_else(|| EigenfaceError::Model("Rotation matrix not set after rfit.".into()))?;
        Ok(centered_a.dot(rotation))
    }

    /// Finalizes fitted components: zero-variance data collapses to the
    /// canonical axes, missing axes are completed, signs are fixed, and the
    /// variance ratios are derived.
    fn store_components(
        &mut self,
        mut rotation: Array2<f64>,
        mut variances: Array1<f64>,
        mean_vector: Array1<f64>,
        total_variance: f64,
    ) {
        let mean_energy = mean_vector.dot(&mean_vector);
        let no_variance = total_variance <= ZERO_VARIANCE_RELATIVE_TOLERANCE * mean_energy.max(1.0);

        let ratios = if no_variance {
            warn!("Input observations carry no variance; all explained-variance ratios are zero.");
            rotation.fill(0.0);
            variances.fill(0.0);
            Array1::zeros(variances.len())
        } else {
            variances.mapv(|v| (v / total_variance).clamp(0.0, 1.0))
        };

        complete_orthonormal_columns(&mut rotation);
        flip_signs(&mut rotation);

        for (k, ratio) in ratios.iter().enumerate() {
            debug!("Component {}: explained variance ratio {:.6}", k + 1, ratio);
        }

        self.rotation = Some(rotation);
        self.mean = Some(mean_vector);
        self.explained_variance = Some(variances);
        self.explained_variance_ratio = Some(ratios);
    }

    /// Projects one observation onto the principal axes: `(x - mean) . rotation`.
    ///
    /// # Errors
    /// `Model` if the model is not fitted or `x` has the wrong length.
    pub fn project(&self, x: ArrayView1<f64>) -> Result<Array1<f64>> {
        let (rotation, mean) = self.components()?;
        if x.len() != mean.len() {
            return Err(EigenfaceError::Model(format!(
                "Observation length ({}) does not match model's feature dimension ({}).",
                x.len(),
                mean.len()
            )));
        }
        let centered = &x - mean;
        Ok(centered.dot(rotation))
    }

    /// Reconstructs an approximate observation from coefficients:
    /// `mean + rotation . coefficients`.
    ///
    /// # Errors
    /// `Model` if the model is not fitted or the coefficient count differs from
    /// the number of components.
    pub fn reconstruct(&self, coefficients: ArrayView1<f64>) -> Result<Array1<f64>> {
        let (rotation, mean) = self.components()?;
        if coefficients.len() != rotation.ncols() {
            return Err(EigenfaceError::Model(format!(
                "Coefficient count ({}) does not match the number of components ({}).",
                coefficients.len(),
                rotation.ncols()
            )));
        }
        Ok(mean + &rotation.dot(&coefficients))
    }

    /// Projects every row of `x`, shape (m_samples, n_features), returning
    /// scores of shape (m_samples, k_components). `x` is centered in place.
    pub fn transform(&self, mut x: Array2<f64>) -> Result<Array2<f64>> {
        let (rotation, mean) = self.components()?;
        if x.ncols() != mean.len() {
            return Err(EigenfaceError::Model(format!(
                "Input data feature dimension ({}) does not match model's feature dimension ({}).",
                x.ncols(),
                mean.len()
            )));
        }
        if x.nrows() == 0 {
            return Ok(Array2::zeros((0, rotation.ncols())));
        }
        x -= mean;
        Ok(x.dot(rotation))
    }

    /// Reconstructs every row of `scores`, shape (m_samples, k_components).
    pub fn inverse_transform(&self, scores: &Array2<f64>) -> Result<Array2<f64>> {
        let (rotation, mean) = self.components()?;
        if scores.ncols() != rotation.ncols() {
            return Err(EigenfaceError::Model(format!(
                "Score columns ({}) do not match the number of components ({}).",
                scores.ncols(),
                rotation.ncols()
            )));
        }
        let mut reconstructed = scores.dot(&rotation.t());
        reconstructed += mean;
        Ok(reconstructed)
    }

    /// Returns the model restricted to its first `k` components.
    pub fn truncated(&self, k: usize) -> Result<Self> {
        let (rotation, mean) = self.components()?;
        if k == 0 || k > rotation.ncols() {
            return Err(EigenfaceError::InvalidComponentCount {
                requested: k,
                n_samples: rotation.ncols(),
                n_features: rotation.nrows(),
            });
        }
        Ok(Self {
            rotation: Some(rotation.slice(s![.., ..k]).to_owned()),
            mean: Some(mean.clone()),
            explained_variance: self.explained_variance.as_ref().map(|v| v.slice(s![..k]).to_owned()),
            explained_variance_ratio: self
                .explained_variance_ratio
                .as_ref()
                .map(|v| v.slice(s![..k]).to_owned()),
        })
    }

    fn components(&self) -> Result<(&Array2<f64>, &Array1<f64>)> {
        let rotation = self
            .rotation
            .as_ref()
            .ok_or_else(|| EigenfaceError::Model("Rotation matrix not set. Fit or load a model first.".into()))?;
        let mean = self
            .mean
            .as_ref()
            .ok_or_else(|| EigenfaceError::Model("Mean vector not set. Fit or load a model first.".into()))?;
        Ok((rotation, mean))
    }

    /// Saves the model as zstd-compressed bincode.
    ///
    /// # Errors
    /// `Model` if the model is not fitted, `Write` on any I/O or encoding failure.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.components()?;
        let write_error = |source: std::io::Error| EigenfaceError::Write {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(write_error)?;
        let mut encoder = zstd::Encoder::new(BufWriter::new(file), MODEL_COMPRESSION_LEVEL)
            .map_err(write_error)?;
        bincode::serde::encode_into_std_write(self, &mut encoder, bincode::config::standard())
            .map_err(|e| write_error(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let mut writer = encoder.finish().map_err(write_error)?;
        writer.flush().map_err(write_error)?;
        Ok(())
    }

    /// Loads a model previously written by `save_model` and validates it.
    ///
    /// # Errors
    /// `Model` if the file cannot be read or decoded, or the decoded model is
    /// incomplete or inconsistent.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| EigenfaceError::Model(format!("Failed to open {}: {}", path.display(), e)))?;
        let mut decoder = zstd::Decoder::new(BufReader::new(file))
            .map_err(|e| EigenfaceError::Model(format!("Failed to decompress {}: {}", path.display(), e)))?;
        let model: PCA = bincode::serde::decode_from_std_read(&mut decoder, bincode::config::standard())
            .map_err(|e| EigenfaceError::Model(format!("Failed to deserialize {}: {}", path.display(), e)))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let (rotation, mean) = self.components()?;
        if rotation.nrows() != mean.len() {
            return Err(EigenfaceError::Model(format!(
                "inconsistent feature dimensions: rotation_features={}, mean_features={}",
                rotation.nrows(),
                mean.len()
            )));
        }
        if let Some(ev) = self.explained_variance.as_ref() {
            if ev.len() != rotation.ncols() {
                return Err(EigenfaceError::Model(format!(
                    "explained_variance length ({}) does not match the number of components ({})",
                    ev.len(),
                    rotation.ncols()
                )));
            }
            if ev.iter().any(|&v| !v.is_finite() || v < 0.0) {
                return Err(EigenfaceError::Model(
                    "explained_variance contains non-finite or negative values".into(),
                ));
            }
        }
        if let Some(ratios) = self.explained_variance_ratio.as_ref() {
            if ratios.len() != rotation.ncols() {
                return Err(EigenfaceError::Model(format!(
                    "explained_variance_ratio length ({}) does not match the number of components ({})",
                    ratios.len(),
                    rotation.ncols()
                )));
            }
            if ratios.iter().any(|&r| !r.is_finite() || !(0.0..=1.0).contains(&r)) {
                return Err(EigenfaceError::Model(
                    "explained_variance_ratio contains values outside [0, 1]".into(),
                ));
            }
        }
        Ok(())
    }
}

fn check_component_count(n_components: usize, n_samples: usize, n_features: usize) -> Result<()> {
    if n_components == 0 || n_components > n_samples.min(n_features) {
        return Err(EigenfaceError::InvalidComponentCount {
            requested: n_components,
            n_samples,
            n_features,
        });
    }
    Ok(())
}

fn column_mean(data: &Array2<f64>) -> Result<Array1<f64>> {
    data.mean_axis(Axis(0))
        .ok_or_else(|| EigenfaceError::Decomposition("Failed to compute mean of the data.".into()))
}

/// Denominator of the sample variance; a single sample divides by 1.
fn degrees_of_freedom(n_samples: usize) -> f64 {
    (n_samples.max(2) - 1) as f64
}

/// Shared null-space rule of every fitting path: a component counts only if
/// its variance exceeds `RANK_TOLERANCE` times the largest one.
fn carries_variance(variance: f64, largest_variance: f64) -> bool {
    variance > 0.0 && variance > largest_variance * RANK_TOLERANCE
}

fn backend_error(context: &str) -> impl FnOnce(BackendError) -> EigenfaceError {
    let context = context.to_owned();
    move |e| EigenfaceError::Decomposition(format!("{} failed: {}", context, e))
}

/// Indices of `values` sorted by descending value. Ties keep index order.
fn descending_order(values: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Replaces zero columns with unit vectors orthogonal to every other column,
/// built by Gram-Schmidt from the canonical basis in index order.
pub(crate) fn complete_orthonormal_columns(rotation: &mut Array2<f64>) {
    let n_features = rotation.nrows();
    let mut filled: Vec<usize> = Vec::with_capacity(rotation.ncols());
    let mut missing: Vec<usize> = Vec::new();
    for (k, column) in rotation.columns().into_iter().enumerate() {
        if column.dot(&column).sqrt() > NORMALIZATION_THRESHOLD {
            filled.push(k);
        } else {
            missing.push(k);
        }
    }
    if missing.is_empty() {
        return;
    }

    let mut candidate = 0usize;
    for k in missing {
        while candidate < n_features {
            let mut v = Array1::<f64>::zeros(n_features);
            v[candidate] = 1.0;
            candidate += 1;
            // Two passes of modified Gram-Schmidt.
            for _ in 0..2 {
                for &j in &filled {
                    let q = rotation.column(j);
                    let proj = q.dot(&v);
                    v.scaled_add(-proj, &q);
                }
            }
            let norm = v.dot(&v).sqrt();
            if norm > 1e-6 {
                v.mapv_inplace(|x| x / norm);
                rotation.column_mut(k).assign(&v);
                filled.push(k);
                break;
            }
        }
    }
}

/// Flips each column so that its largest-magnitude entry is positive.
pub(crate) fn flip_signs(rotation: &mut Array2<f64>) {
    for mut column in rotation.columns_mut() {
        let pivot = column
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            column.mapv_inplace(|v| -v);
        }
    }
}
