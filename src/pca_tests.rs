use crate::error::EigenfaceError;
use crate::PCA;
use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(0.0..1.0))
}

/// Two strong latent directions plus a little noise.
fn generate_low_rank_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let u: Array1<f64> = Array1::from_shape_fn(n_features, |_| rng.gen_range(-1.0..1.0));
    let v: Array1<f64> = Array1::from_shape_fn(n_features, |_| rng.gen_range(-1.0..1.0));
    let mut data = Array2::zeros((n_samples, n_features));
    for mut row in data.rows_mut() {
        let a: f64 = rng.gen_range(-1.0..1.0);
        let b: f64 = rng.gen_range(-1.0..1.0);
        for (j, x) in row.iter_mut().enumerate() {
            *x = 10.0 * a * u[j] + 3.0 * b * v[j] + 0.01 * rng.gen_range(-1.0..1.0);
        }
    }
    data
}

fn assert_orthonormal_columns(rotation: &Array2<f64>, tolerance: f64, context: &str) {
    let gram = rotation.t().dot(rotation);
    for ((i, j), v) in gram.indexed_iter() {
        let expected = if i == j { 1.0 } else { 0.0 };
        assert!(
            (v - expected).abs() < tolerance,
            "{}: <axis {}, axis {}> = {} (expected {})",
            context,
            i,
            j,
            v,
            expected
        );
    }
}

fn assert_valid_ratios(ratios: &Array1<f64>, context: &str) {
    for (k, &r) in ratios.iter().enumerate() {
        assert!((0.0..=1.0).contains(&r), "{}: ratio {} = {} outside [0, 1]", context, k, r);
    }
    for (k, pair) in ratios.windows(2).into_iter().enumerate() {
        assert!(
            pair[0] + 1e-12 >= pair[1],
            "{}: ratios increase at {}: {} < {}",
            context,
            k,
            pair[0],
            pair[1]
        );
    }
    assert!(ratios.sum() <= 1.0 + 1e-9, "{}: ratios sum to {}", context, ratios.sum());
}

fn fit_exact(data: &Array2<f64>, k: usize) -> PCA {
    let mut pca = PCA::new();
    pca.fit(data.clone(), k).unwrap();
    pca
}

fn fit_randomized(data: &Array2<f64>, k: usize, seed: u64) -> PCA {
    let mut pca = PCA::new();
    pca.rfit(data.clone(), k, 0, 2, Some(seed)).unwrap();
    pca
}

#[cfg(test)]
mod fit_tests {
    use super::*;

    #[test]
    fn mean_is_column_mean() {
        let data = array![[1.0, 2.0, 3.0], [3.0, 4.0, 5.0], [5.0, 0.0, 1.0]];
        let pca = fit_exact(&data, 2);
        let expected = data.mean_axis(Axis(0)).unwrap();
        for (a, b) in pca.mean().unwrap().iter().zip(expected.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn ratios_are_ranked_and_bounded_for_both_paths() {
        // 30 x 8 uses the covariance path, 8 x 30 the Gram path.
        for &(n_samples, n_features) in &[(30, 8), (8, 30)] {
            let data = generate_random_data(n_samples, n_features, 7);
            let k = n_samples.min(n_features);
            let exact = fit_exact(&data, k);
            let ctx = format!("exact {}x{}", n_samples, n_features);
            assert_valid_ratios(exact.explained_variance_ratio().unwrap(), &ctx);
            assert_orthonormal_columns(exact.rotation().unwrap(), 1e-9, &ctx);

            let randomized = fit_randomized(&data, k, 11);
            let ctx = format!("randomized {}x{}", n_samples, n_features);
            assert_valid_ratios(randomized.explained_variance_ratio().unwrap(), &ctx);
            assert_orthonormal_columns(randomized.rotation().unwrap(), 1e-9, &ctx);
        }
    }

    #[test]
    fn ratios_sum_to_one_at_full_rank() {
        let data = generate_random_data(6, 20, 3);
        // Centered rank is n_samples - 1.
        let pca = fit_exact(&data, 5);
        assert_abs_diff_eq!(pca.explained_variance_ratio().unwrap().sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn ratios_stay_below_one_when_truncated() {
        let data = generate_random_data(10, 15, 5);
        let pca = fit_exact(&data, 3);
        assert!(pca.explained_variance_ratio().unwrap().sum() < 1.0);
    }

    #[test]
    fn identical_images_explain_no_variance() {
        let row = Array1::from_shape_fn(12, |j| 0.1 * j as f64 + 0.05);
        let data = ndarray::stack(Axis(0), &[row.view(), row.view(), row.view(), row.view()]).unwrap();

        let exact = fit_exact(&data, 3);
        let randomized = fit_randomized(&data, 3, 1);
        for (name, pca) in [("exact", &exact), ("randomized", &randomized)] {
            let ratios = pca.explained_variance_ratio().unwrap();
            assert_eq!(ratios.len(), 3);
            for &r in ratios.iter().skip(1) {
                assert_eq!(r, 0.0, "{}: ratios beyond the first must be zero", name);
            }
            assert_orthonormal_columns(pca.rotation().unwrap(), 1e-12, name);
        }
    }

    #[test]
    fn exactly_k_axes_are_returned_beyond_rank() {
        // Three samples: the centered data has rank 2, but 3 axes are requested.
        let data = generate_random_data(3, 10, 9);
        let pca = fit_exact(&data, 3);
        let rotation = pca.rotation().unwrap();
        assert_eq!(rotation.dim(), (10, 3));
        assert_orthonormal_columns(rotation, 1e-9, "completed basis");
        assert_abs_diff_eq!(pca.explained_variance_ratio().unwrap()[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn single_sample_is_accepted_with_zero_variance() {
        let pca = fit_exact(&array![[0.2, 0.4, 0.6]], 1);
        assert_eq!(pca.explained_variance_ratio().unwrap(), &array![0.0]);
        assert_eq!(pca.mean().unwrap(), &array![0.2, 0.4, 0.6]);
    }

    #[test]
    fn signs_are_deterministic() {
        let data = generate_random_data(12, 9, 21);
        let pca = fit_exact(&data, 4);
        for column in pca.rotation().unwrap().columns() {
            let pivot = column.iter().copied().fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            assert!(pivot > 0.0);
        }
    }

    #[test]
    fn randomized_fit_is_reproducible_with_seed() {
        let data = generate_random_data(15, 40, 2);
        let a = fit_randomized(&data, 4, 99);
        let b = fit_randomized(&data, 4, 99);
        let (ra, rb) = (a.rotation().unwrap(), b.rotation().unwrap());
        for (x, y) in ra.iter().zip(rb.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
        assert_eq!(a.mean(), b.mean());
    }

    #[test]
    fn randomized_matches_exact_on_separated_spectrum() {
        for &(n_samples, n_features) in &[(40, 60), (60, 20)] {
            let data = generate_low_rank_data(n_samples, n_features, 13);
            let exact = fit_exact(&data, 2);
            let randomized = fit_randomized(&data, 2, 17);

            let re = exact.explained_variance_ratio().unwrap();
            let rr = randomized.explained_variance_ratio().unwrap();
            for k in 0..2 {
                assert_abs_diff_eq!(re[k], rr[k], epsilon = 1e-6);
                let cos = exact
                    .rotation()
                    .unwrap()
                    .column(k)
                    .dot(&randomized.rotation().unwrap().column(k));
                assert_abs_diff_eq!(cos, 1.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn small_magnitude_data_keeps_its_variance_on_every_path() {
        // 5 x 40 uses the Gram path, 40 x 5 the covariance path.
        for &(n_samples, n_features) in &[(5, 40), (40, 5)] {
            let data = generate_random_data(n_samples, n_features, 23);
            let tiny = &data * 1e-11;
            let ctx = format!("{}x{} scaled by 1e-11", n_samples, n_features);

            let reference = fit_exact(&data, 2);
            let exact = fit_exact(&tiny, 2);
            let randomized = fit_randomized(&tiny, 2, 5);

            let expected = reference.explained_variance_ratio().unwrap();
            let re = exact.explained_variance_ratio().unwrap();
            let rr = randomized.explained_variance_ratio().unwrap();
            assert!(re[0] > 0.0, "{}: exact ratios {:?}", ctx, re);
            for k in 0..2 {
                assert_abs_diff_eq!(re[k], expected[k], epsilon = 1e-8);
                assert_abs_diff_eq!(re[k], rr[k], epsilon = 1e-6);
                let cos = exact
                    .rotation()
                    .unwrap()
                    .column(k)
                    .dot(&reference.rotation().unwrap().column(k));
                assert_abs_diff_eq!(cos, 1.0, epsilon = 1e-6);
            }
            assert_orthonormal_columns(exact.rotation().unwrap(), 1e-9, &ctx);
        }
    }

    #[test]
    fn rfit_returns_scores_of_training_data() {
        let data = generate_random_data(10, 25, 4);
        let mut pca = PCA::new();
        let scores = pca.rfit(data.clone(), 3, 5, 2, Some(8)).unwrap();
        let expected = pca.transform(data).unwrap();
        assert_eq!(scores.dim(), (10, 3));
        for (a, b) in scores.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn invalid_component_counts_are_rejected() {
        let data = generate_random_data(4, 6, 1);
        for k in [0, 5] {
            let mut pca = PCA::new();
            let err = pca.fit(data.clone(), k).unwrap_err();
            assert!(matches!(
                err,
                EigenfaceError::InvalidComponentCount { requested, n_samples: 4, n_features: 6 } if requested == k
            ));
            let err = pca.rfit(data.clone(), k, 0, 2, Some(0)).unwrap_err();
            assert!(matches!(err, EigenfaceError::InvalidComponentCount { .. }));
        }
        let mut pca = PCA::new();
        assert!(pca.fit(Array2::zeros((0, 6)), 1).is_err());
    }
}

#[cfg(test)]
mod projection_tests {
    use super::*;

    #[test]
    fn reconstruction_error_shrinks_as_components_grow() {
        let data = generate_random_data(9, 16, 31);
        let full = fit_exact(&data, 8);
        let observation = generate_random_data(1, 16, 77).row(0).to_owned();

        let mut previous = f64::INFINITY;
        for k in 1..=8 {
            let model = full.truncated(k).unwrap();
            let coefficients = model.project(observation.view()).unwrap();
            assert_eq!(coefficients.len(), k);
            let rebuilt = model.reconstruct(coefficients.view()).unwrap();
            let error = (&rebuilt - &observation).mapv(|v| v * v).sum().sqrt();
            assert!(error <= previous + 1e-12, "k={}: {} > {}", k, error, previous);
            previous = error;
        }
    }

    #[test]
    fn separately_fitted_exact_models_also_improve_with_k() {
        let data = generate_random_data(7, 11, 41);
        let observation = data.row(2).to_owned();
        let mut previous = f64::INFINITY;
        for k in 1..=6 {
            let model = fit_exact(&data, k);
            let rebuilt = model
                .reconstruct(model.project(observation.view()).unwrap().view())
                .unwrap();
            let error = (&rebuilt - &observation).mapv(|v| v * v).sum().sqrt();
            assert!(error <= previous + 1e-9, "k={}: {} > {}", k, error, previous);
            previous = error;
        }
        // Six axes span the centered training data.
        assert!(previous < 1e-9);
    }

    #[test]
    fn single_and_batch_forms_agree() {
        let data = generate_random_data(8, 5, 12);
        let pca = fit_exact(&data, 3);
        let scores = pca.transform(data.clone()).unwrap();
        let rebuilt = pca.inverse_transform(&scores).unwrap();

        for (i, row) in data.rows().into_iter().enumerate() {
            let coefficients = pca.project(row).unwrap();
            for (a, b) in coefficients.iter().zip(scores.row(i).iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-12);
            }
            let single = pca.reconstruct(coefficients.view()).unwrap();
            for (a, b) in single.iter().zip(rebuilt.row(i).iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn projection_rejects_wrong_lengths() {
        let pca = fit_exact(&generate_random_data(5, 4, 3), 2);
        assert!(matches!(pca.project(Array1::zeros(3).view()), Err(EigenfaceError::Model(_))));
        assert!(matches!(pca.reconstruct(Array1::zeros(3).view()), Err(EigenfaceError::Model(_))));
        assert!(pca.transform(Array2::zeros((2, 5))).is_err());
        assert_eq!(pca.transform(Array2::zeros((0, 4))).unwrap().dim(), (0, 2));
        assert!(pca.truncated(0).is_err());
        assert!(pca.truncated(3).is_err());
    }

    #[test]
    fn unfitted_model_cannot_project() {
        let pca = PCA::new();
        assert!(pca.project(Array1::zeros(2).view()).is_err());
        assert_eq!(pca.n_components(), 0);
        assert_eq!(pca.n_features(), 0);
    }

    #[test]
    fn with_model_projects_with_given_axes() {
        let rotation = array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let pca = PCA::with_model(rotation, array![1.0, 1.0, 1.0]).unwrap();
        assert_eq!(pca.project(array![3.0, 0.0, 5.0].view()).unwrap(), array![2.0, -1.0]);
        assert!(pca.explained_variance_ratio().is_none());
        assert!(PCA::with_model(Array2::zeros((2, 1)), Array1::zeros(3)).is_err());
    }
}

#[cfg(test)]
mod model_persistence_tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn save_load_round_trip_after_exact_fit() {
        let data = generate_random_data(6, 10, 8);
        let pca = fit_exact(&data, 4);
        let file = NamedTempFile::new().unwrap();
        pca.save_model(file.path()).unwrap();

        let loaded = PCA::load_model(file.path()).unwrap();
        assert_eq!(loaded, pca);

        let observation = data.row(0);
        assert_eq!(pca.project(observation).unwrap(), loaded.project(observation).unwrap());
        assert_eq!(loaded.n_components(), 4);
        assert_eq!(loaded.n_features(), 10);
    }

    #[test]
    fn saved_model_is_zstd_compressed() {
        let pca = fit_randomized(&generate_random_data(5, 30, 1), 3, 5);
        let file = NamedTempFile::new().unwrap();
        pca.save_model(file.path()).unwrap();
        let bytes = fs::read(file.path()).unwrap();
        assert_eq!(&bytes[..4], &[0x28, 0xB5, 0x2F, 0xFD]);
    }

    #[test]
    fn unfitted_model_cannot_be_saved() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(PCA::new().save_model(file.path()), Err(EigenfaceError::Model(_))));
    }

    #[test]
    fn garbage_file_fails_to_load() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), b"definitely not a model").unwrap();
        assert!(matches!(PCA::load_model(file.path()), Err(EigenfaceError::Model(_))));
    }

    #[test]
    fn missing_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PCA::load_model(dir.path().join("absent.bin.zst")).is_err());
    }
}
