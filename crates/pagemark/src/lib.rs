//! pagemark: fiducial page addressing and perspective recovery for stamped
//! paper documents.
//!
//! Every page of every copy of a multi-page document is stamped with four
//! corner markers before printing. Three corners carry shared fixed ids; the
//! fourth carries an id that encodes `(document_id, page_number)`. From a
//! photograph of the filled-in page the crate recovers which page it is and
//! the transform back to the undistorted page raster.
//!
//! The stages are:
//!
//! 1. **Codec** – marker id <-> `(document, page, corner)` address.
//! 2. **Placer** – stamps glyphs into the four page corners.
//! 3. **Scanner** – unanimous identity from one image's detections.
//! 4. **Geometry** – document -> photograph homography, dewarping, regions.
//! 5. **Organizer** – groups a batch of scans by document and page.
//!
//! [`PageRecovery`] runs scanner, organizer and geometry over a batch of
//! photographs, given an external [`FiducialDetector`].

mod codec;
mod config;
mod geometry;
mod glyph;
mod homography;
mod organizer;
mod pipeline;
mod placer;
mod sampling;
mod scanner;
mod throttle;

#[cfg(test)]
mod test_utils;

pub use codec::{AddressCodec, Corner, DocumentAddress, OutOfRange};
pub use config::{ConfigError, MarkerConfig};
pub use geometry::{
    dewarp, extract_region, map_point, map_points, warp_perspective, DocumentRegion,
    GeometryError, GeometryResolver, HomographyFit, ScaleFactors, FILL,
};
pub use glyph::{BitGridRenderer, GlyphError, GlyphRenderer};
pub use homography::{
    Correspondence, CorrespondenceMode, CorrespondenceSet, Homography, RansacHomographyConfig,
};
pub use organizer::{
    BatchSummary, DocumentSummary, DuplicatePage, OrganizedBatch, OrganizedPage,
    SubmissionOrganizer,
};
pub use pipeline::{BatchRecovery, FiducialDetector, PageRecovery, RecoveredDocument, RecoveredPage};
pub use placer::{MarkerPlacer, PlacementError};
pub use sampling::bilinear_sample_rgb;
pub use scanner::{
    Detection, ObservedMarker, PageScan, PageScanner, ScanFailure, ScanFailureReason, ScanResult,
};
pub use throttle::{Clock, SystemClock, Throttle};
