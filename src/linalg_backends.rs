// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use std::error::Error;

/// Error type crossing the backend seam.
pub type BackendError = Box<dyn Error + Send + Sync>;

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput {
    /// Eigenvalues, in ascending order.
    pub eigenvalues: Array1<f64>,
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<f64>,
}

/// Output of a Singular Value Decomposition.
#[derive(Debug)]
pub struct SVDOutput {
    pub u: Option<Array2<f64>>,
    pub s: Array1<f64>,
    pub vt: Option<Array2<f64>>,
}

/// Symmetric eigendecomposition reading the upper triangle.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, BackendError>;
}

/// QR decomposition, returning only the thin Q factor.
pub trait BackendQR {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, BackendError>;
}

/// Singular Value Decomposition. Singular values come back in descending order.
pub trait BackendSVD {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, BackendError>;
}

// --- ndarray-linalg (LAPACK) backend ---
use ndarray_linalg::{Eigh as NdLinalgEigh, QR as NdLinalgQR, SVDInto as NdLinalgSVDInto, UPLO};

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> BackendError {
    Box::new(e)
}

impl BackendEigh for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, BackendError> {
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendQR for NdarrayLinAlgBackend {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, BackendError> {
        let (q_factor, _r) = matrix.qr().map_err(to_dyn_error)?;
        Ok(q_factor)
    }
}

impl BackendSVD for NdarrayLinAlgBackend {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, BackendError> {
        let (u, s, vt) = matrix.svd_into(compute_u, compute_v).map_err(to_dyn_error)?;
        Ok(SVDOutput { u, s, vt })
    }
}

// --- faer backend ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{BackendEigh, BackendError, BackendQR, BackendSVD, EighOutput, SVDOutput};
    use faer::linalg::solvers::Svd as FaerSolverSvd;
    use faer::MatRef;
    use ndarray::{Array1, Array2, ArrayView2, ShapeBuilder};

    fn to_dyn_error_faer(msg: String) -> BackendError {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    /// Views a contiguous ndarray matrix (C or F order) as a faer matrix.
    fn faer_view<'a>(matrix: &'a ArrayView2<'a, f64>) -> Result<MatRef<'a, f64>, BackendError> {
        let (nrows, ncols) = matrix.dim();
        let slice = matrix.as_slice_memory_order().ok_or_else(|| {
            to_dyn_error_faer(format!(
                "ndarray matrix ({}x{}) is non-contiguous and cannot be viewed by faer",
                nrows, ncols
            ))
        })?;
        if matrix.is_standard_layout() {
            Ok(MatRef::from_row_major_slice(slice, nrows, ncols))
        } else if matrix.t().is_standard_layout() {
            Ok(MatRef::from_column_major_slice(slice, nrows, ncols))
        } else {
            Err(to_dyn_error_faer(format!(
                "ndarray matrix ({}x{}) has an unsupported memory layout",
                nrows, ncols
            )))
        }
    }

    fn faer_mat_to_ndarray(faer_mat: MatRef<'_, f64>) -> Array2<f64> {
        let (nrows, ncols) = (faer_mat.nrows(), faer_mat.ncols());
        Array2::from_shape_fn((nrows, ncols).f(), |(i, j)| faer_mat[(i, j)])
    }

    fn faer_col_to_ndarray_vec(faer_col: faer::ColRef<'_, f64>) -> Array1<f64> {
        Array1::from_shape_fn(faer_col.nrows(), |i| faer_col[i])
    }

    impl BackendEigh for FaerLinAlgBackend {
        fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, BackendError> {
            if matrix.nrows() != matrix.ncols() {
                return Err(to_dyn_error_faer(
                    "Matrix must be square for eigendecomposition.".to_string(),
                ));
            }
            if matrix.is_empty() {
                return Ok(EighOutput {
                    eigenvalues: Array1::zeros(0),
                    eigenvectors: Array2::zeros((0, 0)),
                });
            }
            let view = matrix.view();
            let eig = faer_view(&view)?
                .self_adjoint_eigen(faer::Side::Upper)
                .map_err(|e| to_dyn_error_faer(format!("faer eigendecomposition failed: {:?}", e)))?;
            Ok(EighOutput {
                eigenvalues: faer_col_to_ndarray_vec(eig.S().column_vector()),
                eigenvectors: faer_mat_to_ndarray(eig.U()),
            })
        }
    }

    impl BackendQR for FaerLinAlgBackend {
        fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, BackendError> {
            let (nrows, ncols) = matrix.dim();
            if nrows == 0 {
                return Ok(Array2::zeros((0, nrows.min(ncols))));
            }
            let view = matrix.view();
            let q_thin = faer_view(&view)?.qr().compute_thin_Q();
            Ok(faer_mat_to_ndarray(q_thin.as_ref()))
        }
    }

    impl BackendSVD for FaerLinAlgBackend {
        fn svd_into(
            &self,
            matrix: Array2<f64>,
            compute_u: bool,
            compute_v: bool,
        ) -> Result<SVDOutput, BackendError> {
            let (nrows, ncols) = matrix.dim();
            if matrix.is_empty() {
                let k_dim = nrows.min(ncols);
                return Ok(SVDOutput {
                    u: compute_u.then(|| Array2::zeros((nrows, k_dim))),
                    s: Array1::zeros(k_dim),
                    vt: compute_v.then(|| Array2::zeros((k_dim, ncols))),
                });
            }
            let view = matrix.view();
            let svd = FaerSolverSvd::new_thin(faer_view(&view)?)
                .map_err(|e| to_dyn_error_faer(format!("faer SVD computation failed: {:?}", e)))?;

            Ok(SVDOutput {
                u: compute_u.then(|| faer_mat_to_ndarray(svd.U())),
                s: faer_col_to_ndarray_vec(svd.S().column_vector()),
                vt: compute_v.then(|| faer_mat_to_ndarray(svd.V()).t().into_owned()),
            })
        }
    }
}

/// Dispatches to the linear algebra backend selected by feature flags.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider;

impl LinAlgBackendProvider {
    pub fn new() -> Self {
        Self
    }
}

impl BackendEigh for LinAlgBackendProvider {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, BackendError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.eigh_upper(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.eigh_upper(matrix)
        }
    }
}

impl BackendQR for LinAlgBackendProvider {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, BackendError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.qr_q_factor(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.qr_q_factor(matrix)
        }
    }
}

impl BackendSVD for LinAlgBackendProvider {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, BackendError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.svd_into(matrix, compute_u, compute_v)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.svd_into(matrix, compute_u, compute_v)
        }
    }
}
