//! Homography estimation, projection, and related utilities.

mod core;
mod correspondence;

pub use self::core::{
    estimate_homography_dlt, fit_homography_ransac, homography_reprojection_error,
    HomographyError, RansacHomographyConfig, MIN_CORRESPONDENCES,
};
pub use self::correspondence::{Correspondence, CorrespondenceMode, CorrespondenceSet};

pub(crate) use self::correspondence::{collect_masked_inlier_errors, mean_and_p95};

use nalgebra::{Matrix3, Vector3};

/// Projective transform between two pixel planes.
///
/// Serialized as a row-major `[[f64; 3]; 3]` array.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self(matrix)
    }

    /// Pure translation by `(dx, dy)`.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self(Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Map a point. `None` when it lands on the line at infinity.
    pub fn project(&self, point: [f64; 2]) -> Option<[f64; 2]> {
        let p = self.0 * Vector3::new(point[0], point[1], 1.0);
        if p[2].abs() < 1e-12 {
            return None;
        }
        let out = [p[0] / p[2], p[1] / p[2]];
        (out[0].is_finite() && out[1].is_finite()).then_some(out)
    }

    pub fn inverse(&self) -> Option<Self> {
        if self.0.determinant().abs() < 1e-15 {
            return None;
        }
        self.0.try_inverse().map(Self)
    }

    /// `self` applied after `first`.
    pub fn compose(&self, first: &Homography) -> Self {
        Self(self.0 * first.0)
    }
}

impl From<[[f64; 3]; 3]> for Homography {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Self(Matrix3::from_fn(|r, c| rows[r][c]))
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_array()
    }
}
