//! Page identity from marker detections.
//!
//! A page is identified by unanimous agreement of every non-fixed marker on
//! it. Any disagreement is reported as a failure rather than resolved by
//! vote: one misread marker must not move a page to the wrong document.

use std::collections::BTreeSet;

use crate::codec::{AddressCodec, Corner, DocumentAddress};
use crate::config::{ConfigError, MarkerConfig};

/// One marker reported by an external fiducial detector.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    pub marker_id: usize,
    /// Pixel corners of the glyph, clockwise from its top-left.
    pub corners: [[f64; 2]; 4],
}

impl Detection {
    pub fn new(marker_id: usize, corners: [[f64; 2]; 4]) -> Self {
        Self { marker_id, corners }
    }

    /// Centroid of the four pixel corners.
    pub fn center(&self) -> [f64; 2] {
        centroid(&self.corners)
    }
}

/// A detection placed on the page.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ObservedMarker {
    pub marker_id: usize,
    pub corner: Corner,
    /// Decoded slot address; `None` for shared fixed ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<DocumentAddress>,
    /// Marker center in image pixels.
    pub center: [f64; 2],
    /// Pixel corners, clockwise from the glyph's top-left.
    pub corners: [[f64; 2]; 4],
}

/// Identity of a successfully scanned page.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageScan {
    pub document_id: usize,
    pub page_number: usize,
    /// Number of usable detections: fixed ids and designated page ids.
    pub markers_found: usize,
    /// `markers_found == 4`. Counts detections, not distinct corners: two
    /// reads of one corner plus two others also set it.
    pub all_corners_detected: bool,
    pub markers: Vec<ObservedMarker>,
}

/// Why a page could not be identified.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind", content = "ids")]
pub enum ScanFailureReason {
    #[error("no markers detected")]
    NoMarkersDetected,
    #[error("conflicting document ids detected: {0:?}")]
    ConflictingDocumentIds(Vec<usize>),
    #[error("conflicting page numbers detected: {0:?}")]
    ConflictingPageNumbers(Vec<usize>),
    #[error("could not decode a document id and page number from detected markers")]
    Undecodable,
}

/// Failed scan with whatever could be recovered.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanFailure {
    pub reason: ScanFailureReason,
    /// Set when the document is unambiguous even though the page is not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<usize>,
    pub markers_found: usize,
    pub partial_markers: Vec<ObservedMarker>,
}

/// Outcome of scanning one image.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanResult {
    Success(PageScan),
    Failure(ScanFailure),
}

impl ScanResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ScanResult::Success(_))
    }

    pub fn page(&self) -> Option<&PageScan> {
        match self {
            ScanResult::Success(page) => Some(page),
            ScanResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ScanFailure> {
        match self {
            ScanResult::Success(_) => None,
            ScanResult::Failure(failure) => Some(failure),
        }
    }

    pub fn markers_found(&self) -> usize {
        match self {
            ScanResult::Success(page) => page.markers_found,
            ScanResult::Failure(failure) => failure.markers_found,
        }
    }
}

/// Resolves one image's detections to a `(document_id, page_number)`.
#[derive(Debug, Clone, Copy)]
pub struct PageScanner {
    codec: AddressCodec,
    corners_per_page: usize,
}

impl PageScanner {
    pub fn new(config: &MarkerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            codec: AddressCodec::new(config)?,
            corners_per_page: config.corners_per_page,
        })
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    /// Identify the page seen by `detections`.
    ///
    /// Fixed ids only locate their corner. Every other id is decoded and must
    /// agree on both document id and page number. Ids that are never printed
    /// (outside the dictionary, or in a non-designated page slot) are dropped
    /// as misreads. Fewer than four markers is
    /// still a success; geometry recovery decides separately whether that is
    /// enough.
    pub fn scan(&self, detections: &[Detection]) -> ScanResult {
        tracing::trace!("scanning page with {} detections", detections.len());
        if detections.is_empty() {
            tracing::warn!("no markers detected");
            return failure(ScanFailureReason::NoMarkersDetected, None, Vec::new());
        }

        let markers = self.observe(detections);
        if markers.is_empty() {
            tracing::warn!("no detection carries a dictionary id");
            return failure(ScanFailureReason::NoMarkersDetected, None, markers);
        }

        let document_ids: BTreeSet<usize> = markers
            .iter()
            .filter_map(|m| m.address.map(|a| a.document_id))
            .collect();
        let page_numbers: BTreeSet<usize> = markers
            .iter()
            .filter_map(|m| m.address.map(|a| a.page_number))
            .collect();

        if document_ids.len() > 1 {
            tracing::warn!("multiple document ids detected: {:?}", document_ids);
            return failure(
                ScanFailureReason::ConflictingDocumentIds(document_ids.into_iter().collect()),
                None,
                markers,
            );
        }

        let document_id = document_ids.first().copied();
        if page_numbers.len() > 1 {
            tracing::warn!("multiple page numbers detected: {:?}", page_numbers);
            return failure(
                ScanFailureReason::ConflictingPageNumbers(page_numbers.into_iter().collect()),
                document_id,
                markers,
            );
        }

        let (Some(document_id), Some(&page_number)) = (document_id, page_numbers.first()) else {
            tracing::warn!("no valid document id or page number decoded from markers");
            return failure(ScanFailureReason::Undecodable, None, markers);
        };

        let markers_found = markers.len();
        tracing::info!(
            "scan success document={} page={} markers={}",
            document_id,
            page_number,
            markers_found
        );
        ScanResult::Success(PageScan {
            document_id,
            page_number,
            markers_found,
            all_corners_detected: markers_found == self.corners_per_page,
            markers,
        })
    }

    fn observe(&self, detections: &[Detection]) -> Vec<ObservedMarker> {
        detections
            .iter()
            .filter_map(|d| {
                let (corner, address) = match self.codec.fixed_corner(d.marker_id) {
                    Some(corner) => (corner, None),
                    None => match self.codec.decode(d.marker_id) {
                        Ok(address) if address.corner == Corner::DESIGNATED => {
                            (address.corner, Some(address))
                        }
                        Ok(address) => {
                            tracing::warn!(
                                "discarding detection: marker id {} is an unprinted {} slot",
                                d.marker_id,
                                address.corner
                            );
                            return None;
                        }
                        Err(e) => {
                            tracing::warn!("discarding detection: {}", e);
                            return None;
                        }
                    },
                };
                Some(ObservedMarker {
                    marker_id: d.marker_id,
                    corner,
                    address,
                    center: d.center(),
                    corners: d.corners,
                })
            })
            .collect()
    }
}

fn failure(
    reason: ScanFailureReason,
    document_id: Option<usize>,
    partial_markers: Vec<ObservedMarker>,
) -> ScanResult {
    ScanResult::Failure(ScanFailure {
        reason,
        document_id,
        markers_found: partial_markers.len(),
        partial_markers,
    })
}

pub(crate) fn centroid(points: &[[f64; 2]; 4]) -> [f64; 2] {
    let sx: f64 = points.iter().map(|p| p[0]).sum();
    let sy: f64 = points.iter().map(|p| p[1]).sum();
    [sx / 4.0, sy / 4.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64) -> [[f64; 2]; 4] {
        [[x, y], [x + 10.0, y], [x + 10.0, y + 10.0], [x, y + 10.0]]
    }

    fn scanner() -> PageScanner {
        PageScanner::new(&MarkerConfig::default()).unwrap()
    }

    #[test]
    fn full_page_resolves_identity() {
        let scanner = scanner();
        let detections = vec![
            Detection::new(0, square(0.0, 0.0)),
            Detection::new(1, square(100.0, 0.0)),
            Detection::new(2, square(0.0, 100.0)),
            Detection::new(39, square(100.0, 100.0)),
        ];
        let page = match scanner.scan(&detections) {
            ScanResult::Success(page) => page,
            other => panic!("expected success, got {other:?}"),
        };
        assert_eq!((page.document_id, page.page_number), (1, 0));
        assert_eq!(page.markers_found, 4);
        assert!(page.all_corners_detected);
        let corners: Vec<Corner> = page.markers.iter().map(|m| m.corner).collect();
        assert_eq!(corners, Corner::ALL.to_vec());
        assert_eq!(page.markers[3].center, [105.0, 105.0]);
        assert!(page.markers[0].address.is_none());
    }

    #[test]
    fn empty_detections_fail() {
        let result = scanner().scan(&[]);
        let failure = result.failure().expect("failure");
        assert_eq!(failure.reason, ScanFailureReason::NoMarkersDetected);
        assert_eq!(failure.markers_found, 0);
    }

    #[test]
    fn mixed_pages_conflict_instead_of_voting() {
        // Document 5: page 2 -> 5*36+2*4+3 = 191, page 3 -> 195.
        let detections = vec![
            Detection::new(191, square(0.0, 0.0)),
            Detection::new(191, square(5.0, 5.0)),
            Detection::new(195, square(50.0, 50.0)),
        ];
        let result = scanner().scan(&detections);
        let failure = result.failure().expect("failure");
        assert_eq!(
            failure.reason,
            ScanFailureReason::ConflictingPageNumbers(vec![2, 3])
        );
        assert_eq!(failure.document_id, Some(5));
        assert_eq!(failure.partial_markers.len(), 3);
    }

    #[test]
    fn mixed_documents_conflict() {
        let detections = vec![
            Detection::new(39, square(0.0, 0.0)),
            Detection::new(75, square(50.0, 50.0)),
        ];
        let result = scanner().scan(&detections);
        let failure = result.failure().expect("failure");
        assert_eq!(
            failure.reason,
            ScanFailureReason::ConflictingDocumentIds(vec![1, 2])
        );
        assert_eq!(failure.document_id, None);
    }

    #[test]
    fn two_consistent_markers_are_a_degraded_success() {
        let detections = vec![
            Detection::new(0, square(0.0, 0.0)),
            Detection::new(39, square(100.0, 100.0)),
        ];
        let page = scanner().scan(&detections).page().cloned().expect("success");
        assert_eq!(page.markers_found, 2);
        assert!(!page.all_corners_detected);
    }

    #[test]
    fn fixed_markers_alone_are_undecodable() {
        let detections = vec![
            Detection::new(0, square(0.0, 0.0)),
            Detection::new(1, square(100.0, 0.0)),
            Detection::new(2, square(0.0, 100.0)),
        ];
        let result = scanner().scan(&detections);
        assert_eq!(
            result.failure().map(|f| &f.reason),
            Some(&ScanFailureReason::Undecodable)
        );
        assert_eq!(result.markers_found(), 3);
    }

    #[test]
    fn ids_outside_dictionary_are_discarded() {
        let detections = vec![
            Detection::new(5000, square(0.0, 0.0)),
            Detection::new(39, square(100.0, 100.0)),
        ];
        let page = scanner().scan(&detections).page().cloned().expect("success");
        assert_eq!(page.markers_found, 1);

        let only_noise = vec![Detection::new(5000, square(0.0, 0.0))];
        let result = scanner().scan(&only_noise);
        assert_eq!(
            result.failure().map(|f| &f.reason),
            Some(&ScanFailureReason::NoMarkersDetected)
        );
    }

    #[test]
    fn unprinted_slot_ids_are_discarded() {
        // 36 is slot 0 of document 1, page 0; only 39 is ever printed there.
        let detections = vec![
            Detection::new(36, square(100.0, 100.0)),
            Detection::new(0, square(0.0, 0.0)),
            Detection::new(1, square(100.0, 0.0)),
            Detection::new(2, square(0.0, 100.0)),
            Detection::new(39, square(100.0, 100.0)),
        ];
        let page = scanner().scan(&detections).page().cloned().expect("success");
        assert_eq!((page.document_id, page.page_number), (1, 0));
        assert_eq!(page.markers_found, 4);
        assert!(page.markers.iter().all(|m| m.marker_id != 36));
        assert_eq!(page.markers[0].corner, Corner::TopLeft);

        // A lone misread of another document cannot create a conflict.
        let misread = vec![
            Detection::new(39, square(100.0, 100.0)),
            Detection::new(73, square(0.0, 0.0)),
        ];
        let page = scanner().scan(&misread).page().cloned().expect("success");
        assert_eq!(page.document_id, 1);
        assert_eq!(page.markers_found, 1);
    }

    #[test]
    fn duplicate_corner_reads_still_count_as_four() {
        let detections = vec![
            Detection::new(0, square(0.0, 0.0)),
            Detection::new(0, square(1.0, 1.0)),
            Detection::new(1, square(100.0, 0.0)),
            Detection::new(39, square(100.0, 100.0)),
        ];
        let page = scanner().scan(&detections).page().cloned().expect("success");
        assert!(page.all_corners_detected);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MarkerConfig {
            pages_per_document: 0,
            ..MarkerConfig::default()
        };
        assert!(matches!(
            PageScanner::new(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn scan_result_serializes_with_tagged_reason() {
        let result = scanner().scan(&[]);
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(json.contains("\"no_markers_detected\""));
    }
}
