//! Perspective recovery of a photographed page.
//!
//! Every page shares the same corner-marker layout in document space, so the
//! detected marker centers (and optionally their outlines) give a
//! document -> photograph homography. [`dewarp`] resamples the photograph back
//! into the canonical document raster through the inverse of that transform.

use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::codec::{AddressCodec, Corner};
use crate::config::{ConfigError, MarkerConfig};
use crate::homography::{
    collect_masked_inlier_errors, estimate_homography_dlt, fit_homography_ransac,
    homography_reprojection_error, mean_and_p95, CorrespondenceMode, CorrespondenceSet,
    Homography, HomographyError, RansacHomographyConfig, MIN_CORRESPONDENCES,
};
use crate::sampling::bilinear_sample_rgb;
use crate::scanner::{centroid, ObservedMarker, PageScan};

/// Fill colour for output pixels that map outside the photograph.
pub const FILL: Rgb<u8> = Rgb([0, 0, 0]);

/// Errors raised while fitting or applying a page transform.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("insufficient correspondences: need {needed} corners, got {got}")]
    InsufficientCorrespondences { needed: usize, got: usize },
    #[error("degenerate correspondences: {0}")]
    Degenerate(String),
    #[error("transform is singular")]
    Singular,
    #[error("output raster {width}x{height} is empty")]
    EmptyOutput { width: u32, height: u32 },
}

impl From<HomographyError> for GeometryError {
    fn from(e: HomographyError) -> Self {
        match e {
            HomographyError::TooFewPoints { needed, got } => {
                GeometryError::InsufficientCorrespondences { needed, got }
            }
            other => GeometryError::Degenerate(other.to_string()),
        }
    }
}

/// Fitted document -> photograph transform with reprojection statistics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HomographyFit {
    pub homography: Homography,
    pub points_used: usize,
    pub inliers: usize,
    pub mean_error_px: f64,
    pub p95_error_px: f64,
}

/// Diagnostic photograph-pixels-per-document-pixel ratios.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScaleFactors {
    pub scale_x: f64,
    pub scale_y: f64,
    pub average_scale: f64,
}

/// Axis-aligned rectangle in document pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DocumentRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Fits and applies the page transform for one marker layout.
#[derive(Debug, Clone)]
pub struct GeometryResolver {
    codec: AddressCodec,
    document_width_px: u32,
    document_height_px: u32,
    marker_size_px: u32,
    margin_px: u32,
    mode: CorrespondenceMode,
    ransac: RansacHomographyConfig,
}

impl GeometryResolver {
    pub fn new(config: &MarkerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            codec: AddressCodec::new(config)?,
            document_width_px: config.document_width_px,
            document_height_px: config.document_height_px,
            marker_size_px: config.marker_size_px,
            margin_px: config.margin_px,
            mode: CorrespondenceMode::default(),
            ransac: RansacHomographyConfig::default(),
        })
    }

    pub fn with_mode(mut self, mode: CorrespondenceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ransac(mut self, ransac: RansacHomographyConfig) -> Self {
        self.ransac = ransac;
        self
    }

    pub fn mode(&self) -> CorrespondenceMode {
        self.mode
    }

    /// Canonical document raster size `(width, height)`.
    pub fn document_size(&self) -> (u32, u32) {
        (self.document_width_px, self.document_height_px)
    }

    /// Document-space outline of the marker in `corner`, clockwise from its top-left.
    pub fn marker_outline(&self, corner: Corner) -> [[f64; 2]; 4] {
        let s = self.marker_size_px as f64;
        let near = self.margin_px as f64;
        let far_x = self.document_width_px as f64 - self.margin_px as f64 - s;
        let far_y = self.document_height_px as f64 - self.margin_px as f64 - s;
        let (x0, y0) = match corner {
            Corner::TopLeft => (near, near),
            Corner::TopRight => (far_x, near),
            Corner::BottomLeft => (near, far_y),
            Corner::BottomRight => (far_x, far_y),
        };
        [[x0, y0], [x0 + s, y0], [x0 + s, y0 + s], [x0, y0 + s]]
    }

    /// Document-space marker centers in [`Corner::ALL`] order.
    pub fn fixed_layout_corners(&self) -> [[f64; 2]; 4] {
        Corner::ALL.map(|corner| centroid(&self.marker_outline(corner)))
    }

    /// Pair layout points with the detected markers of `scan`.
    ///
    /// Only markers printed at that corner count: the corner's fixed id, or
    /// the page's own designated id. At most one marker per corner is used
    /// (the first one observed). Corners without a detection contribute nothing.
    pub fn build_correspondences(&self, scan: &PageScan) -> CorrespondenceSet {
        let mut set = CorrespondenceSet::default();
        for corner in Corner::ALL {
            let Some(marker) = scan
                .markers
                .iter()
                .find(|m| self.is_printed_at(scan, m, corner))
            else {
                continue;
            };
            set.push(
                corner,
                marker.marker_id,
                centroid(&self.marker_outline(corner)),
                marker.center,
            );
            if self.mode == CorrespondenceMode::CentersAndOutlines {
                for (document, image) in self.marker_outline(corner).iter().zip(&marker.corners) {
                    set.push(corner, marker.marker_id, *document, *image);
                }
            }
        }
        tracing::trace!(
            "built {} correspondences from {} corners",
            set.len(),
            set.corners.len()
        );
        set
    }

    fn is_printed_at(&self, scan: &PageScan, marker: &ObservedMarker, corner: Corner) -> bool {
        if marker.corner != corner {
            return false;
        }
        match self.codec.fixed_corner(marker.marker_id) {
            Some(fixed) => fixed == corner,
            None => {
                corner == Corner::DESIGNATED
                    && self
                        .codec
                        .encode_designated(scan.document_id, scan.page_number)
                        .is_ok_and(|id| id == marker.marker_id)
            }
        }
    }

    /// Fit the document -> photograph homography.
    ///
    /// All four corners are required. Exactly four points are solved
    /// directly; more points go through RANSAC and an inlier refit.
    pub fn estimate_homography(
        &self,
        correspondences: &CorrespondenceSet,
    ) -> Result<HomographyFit, GeometryError> {
        let corners = correspondences.corners.len();
        if corners < Corner::ALL.len() || correspondences.len() < MIN_CORRESPONDENCES {
            return Err(GeometryError::InsufficientCorrespondences {
                needed: Corner::ALL.len(),
                got: corners,
            });
        }

        let src = correspondences.document_points();
        let dst = correspondences.image_points();
        let (h, errors, inlier_mask) = if src.len() == MIN_CORRESPONDENCES {
            if has_collinear_triple(&src) || has_collinear_triple(&dst) {
                return Err(GeometryError::Degenerate(
                    "three of the four corner points are collinear".into(),
                ));
            }
            let h = estimate_homography_dlt(&src, &dst)?;
            let errors: Vec<f64> = src
                .iter()
                .zip(&dst)
                .map(|(s, d)| homography_reprojection_error(&h, s, d))
                .collect();
            let mask = vec![true; errors.len()];
            (h, errors, mask)
        } else {
            let result = fit_homography_ransac(&src, &dst, &self.ransac)?;
            (result.h, result.errors, result.inlier_mask)
        };

        let homography = Homography::from_matrix(h);
        if homography.inverse().is_none() {
            return Err(GeometryError::Singular);
        }

        let mut inlier_errors = collect_masked_inlier_errors(&errors, &inlier_mask);
        let inliers = inlier_errors.len();
        let (mean_error_px, p95_error_px) = mean_and_p95(&mut inlier_errors);
        tracing::debug!(
            "homography fit: points={} inliers={} mean={:.3}px p95={:.3}px",
            src.len(),
            inliers,
            mean_error_px,
            p95_error_px
        );

        Ok(HomographyFit {
            homography,
            points_used: src.len(),
            inliers,
            mean_error_px,
            p95_error_px,
        })
    }

    /// [`build_correspondences`](Self::build_correspondences) followed by
    /// [`estimate_homography`](Self::estimate_homography).
    pub fn resolve(&self, scan: &PageScan) -> Result<HomographyFit, GeometryError> {
        self.estimate_homography(&self.build_correspondences(scan))
    }

    /// Dewarp into the canonical document raster.
    pub fn dewarp_page(
        &self,
        photo: &RgbImage,
        homography: &Homography,
    ) -> Result<RgbImage, GeometryError> {
        dewarp(
            photo,
            homography,
            self.document_width_px,
            self.document_height_px,
        )
    }

    /// Photograph-to-document scale, from the two opposite document corners.
    ///
    /// For logging and sanity checks only. `None` if either corner maps to infinity.
    pub fn scale_factors(&self, homography: &Homography) -> Option<ScaleFactors> {
        let w = self.document_width_px as f64;
        let h = self.document_height_px as f64;
        let origin = homography.project([0.0, 0.0])?;
        let far = homography.project([w, h])?;
        let scale_x = (far[0] - origin[0]).abs() / w;
        let scale_y = (far[1] - origin[1]).abs() / h;
        Some(ScaleFactors {
            scale_x,
            scale_y,
            average_scale: (scale_x + scale_y) / 2.0,
        })
    }
}

/// Map a document point into the photograph.
pub fn map_point(homography: &Homography, point: [f64; 2]) -> Option<[f64; 2]> {
    homography.project(point)
}

/// Batch form of [`map_point`]; `None` if any point maps to infinity.
pub fn map_points(homography: &Homography, points: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
    points.iter().map(|&p| homography.project(p)).collect()
}

/// Warp `src` by `transform` (source -> output pixels) into a `width` x `height` raster.
///
/// Every output pixel is pulled from the source through the inverse
/// transform with bilinear sampling; pixels falling outside the source get `fill`.
pub fn warp_perspective(
    src: &RgbImage,
    transform: &Homography,
    width: u32,
    height: u32,
    fill: Rgb<u8>,
) -> Result<RgbImage, GeometryError> {
    if width == 0 || height == 0 {
        return Err(GeometryError::EmptyOutput { width, height });
    }
    let output_to_src = transform.inverse().ok_or(GeometryError::Singular)?;
    Ok(resample(src, &output_to_src, width, height, fill))
}

/// Resample a photograph into document space.
///
/// `homography` maps document -> photograph, so the photograph is warped by
/// its inverse: each document pixel is pulled from the photograph through
/// `homography` itself. Warping by the forward transform would add the tilt
/// instead of removing it.
pub fn dewarp(
    photo: &RgbImage,
    homography: &Homography,
    output_width: u32,
    output_height: u32,
) -> Result<RgbImage, GeometryError> {
    if output_width == 0 || output_height == 0 {
        return Err(GeometryError::EmptyOutput {
            width: output_width,
            height: output_height,
        });
    }
    if homography.inverse().is_none() {
        return Err(GeometryError::Singular);
    }
    Ok(resample(photo, homography, output_width, output_height, FILL))
}

/// Dewarp only `region` of the document.
pub fn extract_region(
    photo: &RgbImage,
    homography: &Homography,
    region: DocumentRegion,
) -> Result<RgbImage, GeometryError> {
    if region.width == 0 || region.height == 0 {
        return Err(GeometryError::EmptyOutput {
            width: region.width,
            height: region.height,
        });
    }
    if homography.inverse().is_none() {
        return Err(GeometryError::Singular);
    }
    let offset = Homography::translation(region.x as f64, region.y as f64);
    let output_to_photo = homography.compose(&offset);
    Ok(resample(
        photo,
        &output_to_photo,
        region.width,
        region.height,
        FILL,
    ))
}

fn resample(
    src: &RgbImage,
    output_to_src: &Homography,
    width: u32,
    height: u32,
    fill: Rgb<u8>,
) -> RgbImage {
    let mut out = RgbImage::new(width, height);
    let row_len = width as usize * 3;
    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let value = output_to_src
                    .project([x as f64, y as f64])
                    .and_then(|[sx, sy]| bilinear_sample_rgb(src, sx, sy))
                    .unwrap_or(fill);
                px.copy_from_slice(&value.0);
            }
        });
    out
}

fn has_collinear_triple(points: &[[f64; 2]]) -> bool {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p[0]);
        min_y = min_y.min(p[1]);
        max_x = max_x.max(p[0]);
        max_y = max_y.max(p[1]);
    }
    let extent_sq = (max_x - min_x).powi(2) + (max_y - min_y).powi(2);
    if extent_sq.is_nan() || extent_sq <= 1e-12 {
        return true;
    }

    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let (a, b, c) = (points[i], points[j], points[k]);
                let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
                if cross.abs() < 1e-6 * extent_sq {
                    return true;
                }
            }
        }
    }
    false
}
