//! Document-to-image point correspondences and reprojection statistics.

use std::cmp::Ordering;

use crate::codec::Corner;

/// Which points of each detected marker feed the fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrespondenceMode {
    /// One point per corner marker: its center.
    #[default]
    Centers,
    /// Marker centers plus the four outline corners of every marker.
    CentersAndOutlines,
}

/// One document-space point paired with where it was seen in the photograph.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Correspondence {
    pub corner: Corner,
    pub marker_id: usize,
    /// Document raster pixels.
    pub document: [f64; 2],
    /// Photograph pixels.
    pub image: [f64; 2],
}

/// Correspondences for one page, at most one marker per corner.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CorrespondenceSet {
    pub points: Vec<Correspondence>,
    /// Corners that contributed at least one point, in [`Corner::ALL`] order.
    pub corners: Vec<Corner>,
}

impl CorrespondenceSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn document_points(&self) -> Vec<[f64; 2]> {
        self.points.iter().map(|c| c.document).collect()
    }

    pub fn image_points(&self) -> Vec<[f64; 2]> {
        self.points.iter().map(|c| c.image).collect()
    }

    pub(crate) fn push(&mut self, corner: Corner, marker_id: usize, document: [f64; 2], image: [f64; 2]) {
        if self.corners.last() != Some(&corner) {
            self.corners.push(corner);
        }
        self.points.push(Correspondence {
            corner,
            marker_id,
            document,
            image,
        });
    }
}

/// Mean and 95th percentile of `errors` (sorted in place). `(0, 0)` when empty.
pub(crate) fn mean_and_p95(errors: &mut [f64]) -> (f64, f64) {
    if errors.is_empty() {
        return (0.0, 0.0);
    }
    errors.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mean = errors.iter().sum::<f64>() / errors.len() as f64;
    let idx = ((errors.len() as f64 * 0.95) as usize).min(errors.len() - 1);
    (mean, errors[idx])
}

/// Collect masked inlier errors (`inlier_mask[i] == true`).
pub(crate) fn collect_masked_inlier_errors(errors: &[f64], inlier_mask: &[bool]) -> Vec<f64> {
    inlier_mask
        .iter()
        .zip(errors.iter())
        .filter_map(|(&is_inlier, &err)| if is_inlier { Some(err) } else { None })
        .collect()
}
