//! Batch recovery: detect, scan, organize and dewarp a set of photographs.

use std::sync::Arc;

use image::RgbImage;
use rayon::prelude::*;

use crate::config::{ConfigError, MarkerConfig};
use crate::geometry::{GeometryError, GeometryResolver, HomographyFit};
use crate::homography::CorrespondenceMode;
use crate::organizer::{OrganizedBatch, OrganizedPage, SubmissionOrganizer};
use crate::scanner::{Detection, PageScanner, ScanResult};
use crate::throttle::Throttle;

/// External marker detector: finds marker ids and their pixel corners.
///
/// Called concurrently from worker threads.
pub trait FiducialDetector: Sync {
    fn detect(&self, image: &RgbImage) -> Vec<Detection>;
}

impl<F> FiducialDetector for F
where
    F: Fn(&RgbImage) -> Vec<Detection> + Sync,
{
    fn detect(&self, image: &RgbImage) -> Vec<Detection> {
        self(image)
    }
}

/// One organized page after perspective recovery.
#[derive(Debug, Clone)]
pub struct RecoveredPage {
    pub page_number: usize,
    pub image_index: usize,
    pub fit: Option<HomographyFit>,
    /// Page in the canonical document raster.
    pub image: Result<RgbImage, GeometryError>,
}

#[derive(Debug, Clone)]
pub struct RecoveredDocument {
    pub document_id: usize,
    /// Pages in page-number order.
    pub pages: Vec<RecoveredPage>,
}

/// Everything produced by [`PageRecovery::recover`].
#[derive(Debug, Clone)]
pub struct BatchRecovery {
    pub batch: OrganizedBatch,
    pub documents: Vec<RecoveredDocument>,
}

/// Runs the whole recovery flow for one marker configuration.
pub struct PageRecovery<D> {
    scanner: PageScanner,
    resolver: GeometryResolver,
    organizer: SubmissionOrganizer,
    detector: D,
    throttle: Option<Arc<Throttle>>,
}

impl<D: FiducialDetector> PageRecovery<D> {
    pub fn new(config: &MarkerConfig, detector: D) -> Result<Self, ConfigError> {
        Ok(Self {
            scanner: PageScanner::new(config)?,
            resolver: GeometryResolver::new(config)?,
            organizer: SubmissionOrganizer::new(),
            detector,
            throttle: None,
        })
    }

    /// Pace detector calls through a shared throttle.
    pub fn with_throttle(mut self, throttle: Arc<Throttle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn with_mode(mut self, mode: CorrespondenceMode) -> Self {
        self.resolver = self.resolver.with_mode(mode);
        self
    }

    pub fn resolver(&self) -> &GeometryResolver {
        &self.resolver
    }

    /// Detect and scan a single photograph.
    pub fn scan_image(&self, photo: &RgbImage) -> ScanResult {
        if let Some(throttle) = &self.throttle {
            throttle.acquire();
        }
        let detections = self.detector.detect(photo);
        self.scanner.scan(&detections)
    }

    /// Scan every photograph in parallel. Results keep input order.
    pub fn scan_images(&self, photos: &[RgbImage]) -> Vec<ScanResult> {
        photos.par_iter().map(|photo| self.scan_image(photo)).collect()
    }

    /// Fit and dewarp one organized page.
    pub fn recover_page(&self, photo: &RgbImage, page: &OrganizedPage) -> RecoveredPage {
        let fit = self.resolver.resolve(&page.scan);
        let image = fit
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|fit| self.resolver.dewarp_page(photo, &fit.homography));

        match (&fit, &image) {
            (Ok(fit), Ok(_)) => {
                if let Some(scale) = self.resolver.scale_factors(&fit.homography) {
                    tracing::debug!(
                        "image {} scale x={:.3} y={:.3} avg={:.3}",
                        page.image_index,
                        scale.scale_x,
                        scale.scale_y,
                        scale.average_scale
                    );
                }
            }
            (_, Err(e)) => tracing::warn!(
                "document {} page {} (image {}) not dewarped: {}",
                page.scan.document_id,
                page.scan.page_number,
                page.image_index,
                e
            ),
            _ => {}
        }

        RecoveredPage {
            page_number: page.scan.page_number,
            image_index: page.image_index,
            fit: fit.ok(),
            image,
        }
    }

    /// Scan, organize and dewarp a batch of photographs.
    ///
    /// Per-image failures are recorded in the returned batch and per-page
    /// results; they never abort the rest of the batch.
    pub fn recover(&self, photos: &[RgbImage]) -> BatchRecovery {
        let batch = self.organizer.organize(self.scan_images(photos));

        let documents = batch
            .document_ids()
            .map(|document_id| {
                let pages: Vec<&OrganizedPage> = batch.pages(document_id).collect();
                let pages = pages
                    .par_iter()
                    .filter_map(|page| {
                        let photo = photos.get(page.image_index)?;
                        Some(self.recover_page(photo, page))
                    })
                    .collect();
                RecoveredDocument { document_id, pages }
            })
            .collect();

        let summary = batch.summary();
        tracing::info!(
            "recovered {} pages across {} documents from {} photographs",
            summary.total_organized,
            summary.documents.len(),
            summary.total_scanned
        );
        BatchRecovery { batch, documents }
    }
}
