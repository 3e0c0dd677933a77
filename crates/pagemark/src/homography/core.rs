//! Plane-to-image homography estimation via DLT with Hartley normalization.
//!
//! Provides:
//! - Direct Linear Transform (DLT) from >=4 point correspondences.
//! - RANSAC wrapper for outlier-robust fitting.
//! - Reprojection error computation.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::prelude::*;

/// Minimum number of correspondences for a projective fit.
pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HomographyError {
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers { needed: usize, found: usize },
}

// ── Projection ───────────────────────────────────────────────────────────

/// Project a 2D point through a 3x3 homography: H * [x, y, 1]^T -> [u, v].
///
/// Returns NaN coordinates for points mapped to the line at infinity.
pub fn homography_project(h: &Matrix3<f64>, x: f64, y: f64) -> [f64; 2] {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [p[0] / p[2], p[1] / p[2]]
}

/// Reprojection error: ||project(H, src) - dst||.
pub fn homography_reprojection_error(h: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let p = homography_project(h, src[0], src[1]);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

// ── Hartley normalization ────────────────────────────────────────────────

/// Compute a normalizing transform: translate centroid to origin, scale so
/// mean distance from origin is sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx: f64 = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy: f64 = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist: f64 = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();

    (t, normalized)
}

// ── DLT ──────────────────────────────────────────────────────────────────

/// Estimate homography from >=4 point correspondences using DLT.
///
/// `src`: source points (document pixels).
/// `dst`: destination points (photograph pixels).
///
/// Returns the 3x3 homography H such that dst ~ project(H, src), scaled so
/// that H[2,2] = 1 when possible.
pub fn estimate_homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<Matrix3<f64>, HomographyError> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n.min(dst.len()),
        });
    }
    if src.len() != dst.len() {
        return Err(HomographyError::NumericalFailure(
            "src and dst must have the same length".into(),
        ));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    // 2n x 9 design matrix
    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i][0], src_n[i][1]);
        let (dx, dy) = (dst_n[i][0], dst_n[i][1]);

        // Row 2i:   [  0  0  0 | -sx -sy -1 | dy*sx  dy*sy  dy ]
        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        // Row 2i+1: [ sx  sy  1 |  0  0  0 | -dx*sx -dx*sy -dx ]
        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // h is the eigenvector of the smallest eigenvalue of A^T A (9x9).
    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);

    let mut min_idx = 0;
    let mut min_val = eig.eigenvalues[0].abs();
    for i in 1..9 {
        let v = eig.eigenvalues[i].abs();
        if v < min_val {
            min_val = v;
            min_idx = i;
        }
    }
    let h_norm = Matrix3::from_fn(|r, c| eig.eigenvectors[(3 * r + c, min_idx)]);

    // Denormalize: H = T_dst^-1 * H_norm * T_src
    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| HomographyError::NumericalFailure("T_dst not invertible".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    if h.iter().any(|v| !v.is_finite()) {
        return Err(HomographyError::NumericalFailure(
            "non-finite homography".into(),
        ));
    }

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Ok(h)
    } else {
        Ok(h / scale)
    }
}

// ── RANSAC ───────────────────────────────────────────────────────────────

/// RANSAC configuration for homography fitting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RansacHomographyConfig {
    /// Maximum number of RANSAC iterations.
    pub max_iters: usize,
    /// Inlier threshold (reprojection error in pixels).
    pub inlier_threshold: f64,
    /// Minimum number of inliers for a valid model.
    pub min_inliers: usize,
    /// Random seed.
    pub seed: u64,
}

impl Default for RansacHomographyConfig {
    fn default() -> Self {
        Self {
            max_iters: 500,
            inlier_threshold: 3.0,
            min_inliers: MIN_CORRESPONDENCES,
            seed: 0,
        }
    }
}

/// Result of RANSAC homography fitting.
#[derive(Debug, Clone)]
pub struct RansacHomographyResult {
    /// The fitted homography.
    pub h: Matrix3<f64>,
    /// Boolean mask: true for inliers.
    pub inlier_mask: Vec<bool>,
    /// Number of inliers.
    pub n_inliers: usize,
    /// Reprojection error of every correspondence under `h`.
    pub errors: Vec<f64>,
}

/// Fit homography with RANSAC, then refit on all inliers.
pub fn fit_homography_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    config: &RansacHomographyConfig,
) -> Result<RansacHomographyResult, HomographyError> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() != n {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n.min(dst.len()),
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best_inliers = 0usize;
    let mut best_mask: Vec<bool> = vec![false; n];
    let mut best_h = Matrix3::identity();

    for _ in 0..config.max_iters {
        let indices = rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let s4: Vec<[f64; 2]> = indices.iter().map(|i| src[i]).collect();
        let d4: Vec<[f64; 2]> = indices.iter().map(|i| dst[i]).collect();

        let h = match estimate_homography_dlt(&s4, &d4) {
            Ok(h) => h,
            Err(_) => continue,
        };

        let mask: Vec<bool> = src
            .iter()
            .zip(dst)
            .map(|(s, d)| homography_reprojection_error(&h, s, d) < config.inlier_threshold)
            .collect();
        let count = mask.iter().filter(|&&m| m).count();

        if count > best_inliers {
            best_inliers = count;
            best_mask = mask;
            best_h = h;

            if count == n {
                break;
            }
        }
    }

    if best_inliers < config.min_inliers.max(MIN_CORRESPONDENCES) {
        return Err(HomographyError::InsufficientInliers {
            needed: config.min_inliers.max(MIN_CORRESPONDENCES),
            found: best_inliers,
        });
    }

    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let h_refit = estimate_homography_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let errors: Vec<f64> = src
        .iter()
        .zip(dst)
        .map(|(s, d)| homography_reprojection_error(&h_refit, s, d))
        .collect();
    let inlier_mask: Vec<bool> = errors
        .iter()
        .map(|&e| e < config.inlier_threshold)
        .collect();
    let n_inliers = inlier_mask.iter().filter(|&&m| m).count();

    Ok(RansacHomographyResult {
        h: h_refit,
        inlier_mask,
        n_inliers,
        errors,
    })
}
