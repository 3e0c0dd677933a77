//! Stamping marker glyphs into page corners.

use image::{DynamicImage, GrayImage, RgbImage};

use crate::codec::{AddressCodec, Corner, OutOfRange};
use crate::config::{ConfigError, MarkerConfig};
use crate::glyph::{GlyphError, GlyphRenderer};

/// Errors raised while annotating a page or document.
///
/// Any error aborts the whole document: no partially marked output is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error(transparent)]
    Address(#[from] OutOfRange),
    #[error(transparent)]
    Glyph(#[from] GlyphError),
    #[error("page {width}x{height} px is too small for markers (needs {required} px per side)")]
    PageTooSmall {
        width: u32,
        height: u32,
        required: u32,
    },
    #[error("renderer returned a {width}x{height} glyph for marker {marker_id}, expected {expected} px")]
    GlyphSizeMismatch {
        marker_id: usize,
        width: u32,
        height: u32,
        expected: u32,
    },
}

/// Composites the four corner markers of a page.
#[derive(Debug, Clone)]
pub struct MarkerPlacer<R> {
    codec: AddressCodec,
    marker_size_px: u32,
    margin_px: u32,
    renderer: R,
}

impl<R: GlyphRenderer> MarkerPlacer<R> {
    pub fn new(config: &MarkerConfig, renderer: R) -> Result<Self, ConfigError> {
        Ok(Self {
            codec: AddressCodec::new(config)?,
            marker_size_px: config.marker_size_px,
            margin_px: config.margin_px,
            renderer,
        })
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Marker ids for a page, ordered `[fixed, fixed, fixed, designated]`.
    ///
    /// The index of each id is the [`Corner::index`] of the corner it is printed in.
    pub fn markers_for_page(
        &self,
        document_id: usize,
        page_number: usize,
    ) -> Result<[usize; 4], PlacementError> {
        let ids = self.codec.page_marker_ids(document_id, page_number)?;
        tracing::debug!(
            "marker ids for document {} page {}: {:?}",
            document_id,
            page_number,
            ids
        );
        Ok(ids)
    }

    /// Top-left pixel of each corner glyph on a `width` x `height` page, in [`Corner::ALL`] order.
    pub fn marker_origins(&self, width: u32, height: u32) -> [(u32, u32); 4] {
        let near = self.margin_px;
        let far_x = width.saturating_sub(self.marker_size_px + self.margin_px);
        let far_y = height.saturating_sub(self.marker_size_px + self.margin_px);
        Corner::ALL.map(|corner| match corner {
            Corner::TopLeft => (near, near),
            Corner::TopRight => (far_x, near),
            Corner::BottomLeft => (near, far_y),
            Corner::BottomRight => (far_x, far_y),
        })
    }

    /// Return a copy of `page` with the four markers of `(document_id, page_number)`.
    ///
    /// Only the four glyph squares are overwritten; the page is converted to
    /// 3-channel RGB first if needed.
    pub fn place_on_page(
        &self,
        page: &DynamicImage,
        document_id: usize,
        page_number: usize,
    ) -> Result<RgbImage, PlacementError> {
        let ids = self.markers_for_page(document_id, page_number)?;

        let (width, height) = (page.width(), page.height());
        let required = 2 * (self.margin_px + self.marker_size_px);
        if width < required || height < required {
            return Err(PlacementError::PageTooSmall {
                width,
                height,
                required,
            });
        }

        let glyphs = ids
            .iter()
            .map(|&id| self.render_glyph(id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = page.to_rgb8();
        for (glyph, (x, y)) in glyphs.iter().zip(self.marker_origins(width, height)) {
            let glyph_rgb = DynamicImage::ImageLuma8(glyph.clone()).to_rgb8();
            image::imageops::replace(&mut out, &glyph_rgb, i64::from(x), i64::from(y));
        }

        tracing::info!(
            "markers added to document {}, page {}",
            document_id,
            page_number
        );
        Ok(out)
    }

    /// Mark every page of a document; the page index is the page number.
    ///
    /// Fails on the first invalid page and discards everything produced so far.
    pub fn place_on_document(
        &self,
        document_id: usize,
        pages: &[DynamicImage],
    ) -> Result<Vec<RgbImage>, PlacementError> {
        tracing::info!(
            "generating markers for document {} ({} pages)",
            document_id,
            pages.len()
        );
        pages
            .iter()
            .enumerate()
            .map(|(page_number, page)| self.place_on_page(page, document_id, page_number))
            .collect()
    }

    fn render_glyph(&self, marker_id: usize) -> Result<GrayImage, PlacementError> {
        let glyph = self.renderer.render(marker_id, self.marker_size_px)?;
        if glyph.width() != self.marker_size_px || glyph.height() != self.marker_size_px {
            return Err(PlacementError::GlyphSizeMismatch {
                marker_id,
                width: glyph.width(),
                height: glyph.height(),
                expected: self.marker_size_px,
            });
        }
        Ok(glyph)
    }
}

#[cfg(test)]
mod tests {
    use image::{Luma, Rgb, RgbaImage};

    use super::*;
    use crate::glyph::BitGridRenderer;
    use crate::test_utils::blank_page;

    fn placer() -> MarkerPlacer<BitGridRenderer> {
        let config = MarkerConfig::default();
        MarkerPlacer::new(&config, BitGridRenderer::for_config(&config)).unwrap()
    }

    struct WrongSize;

    impl GlyphRenderer for WrongSize {
        fn render(&self, _marker_id: usize, size_px: u32) -> Result<GrayImage, GlyphError> {
            Ok(GrayImage::from_pixel(size_px + 1, size_px, Luma([0])))
        }
    }

    #[test]
    fn fixed_ids_do_not_depend_on_address() {
        let placer = placer();
        let first = placer.markers_for_page(0, 0).unwrap();
        for (document_id, page_number) in [(1, 0), (5, 2), (26, 8)] {
            let ids = placer.markers_for_page(document_id, page_number).unwrap();
            assert_eq!(ids[..3], first[..3]);
        }
        assert_eq!(placer.markers_for_page(1, 0).unwrap()[3], 39);
    }

    #[test]
    fn markers_for_page_propagates_out_of_range() {
        let placer = placer();
        assert!(placer.markers_for_page(26, 0).is_ok());
        assert!(matches!(
            placer.markers_for_page(27, 0),
            Err(PlacementError::Address(OutOfRange::Document { .. }))
        ));
    }

    #[test]
    fn place_on_page_only_touches_corner_squares() {
        let placer = placer();
        let page = blank_page(400, 500);
        let marked = placer
            .place_on_page(&DynamicImage::ImageRgb8(page.clone()), 2, 3)
            .unwrap();
        assert_eq!(marked.dimensions(), (400, 500));

        let origins = placer.marker_origins(400, 500);
        assert_eq!(origins, [(20, 20), (290, 20), (20, 390), (290, 390)]);
        let inside_marker = |x: u32, y: u32| {
            origins
                .iter()
                .any(|&(ox, oy)| x >= ox && x < ox + 90 && y >= oy && y < oy + 90)
        };
        for (x, y, px) in marked.enumerate_pixels() {
            if !inside_marker(x, y) {
                assert_eq!(px, page.get_pixel(x, y), "pixel ({x},{y}) changed");
            }
        }
        // Glyph border is black.
        assert_eq!(*marked.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*marked.get_pixel(379, 479), Rgb([0, 0, 0]));
    }

    #[test]
    fn place_on_page_normalizes_rgba_input() {
        let placer = placer();
        let rgba = RgbaImage::from_pixel(300, 300, image::Rgba([255, 255, 255, 128]));
        let marked = placer
            .place_on_page(&DynamicImage::ImageRgba8(rgba), 0, 0)
            .unwrap();
        assert_eq!(*marked.get_pixel(150, 150), Rgb([255, 255, 255]));
    }

    #[test]
    fn place_on_page_rejects_small_pages_and_bad_glyphs() {
        let placer = placer();
        let small = DynamicImage::ImageRgb8(blank_page(200, 600));
        assert!(matches!(
            placer.place_on_page(&small, 0, 0),
            Err(PlacementError::PageTooSmall { required: 220, .. })
        ));

        let config = MarkerConfig::default();
        let wrong = MarkerPlacer::new(&config, WrongSize).unwrap();
        let page = DynamicImage::ImageRgb8(blank_page(400, 400));
        assert!(matches!(
            wrong.place_on_page(&page, 0, 0),
            Err(PlacementError::GlyphSizeMismatch { width: 91, .. })
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MarkerConfig {
            marker_size_px: 0,
            ..MarkerConfig::default()
        };
        assert!(MarkerPlacer::new(&config, BitGridRenderer::for_config(&config)).is_err());
    }

    #[test]
    fn place_on_document_fails_fast_on_invalid_page() {
        let placer = placer();
        let pages: Vec<DynamicImage> = (0..10)
            .map(|_| DynamicImage::ImageRgb8(blank_page(300, 300)))
            .collect();
        assert!(matches!(
            placer.place_on_document(4, &pages),
            Err(PlacementError::Address(OutOfRange::Page { page_number: 9, .. }))
        ));

        let marked = placer.place_on_document(4, &pages[..3]).unwrap();
        assert_eq!(marked.len(), 3);
        assert_ne!(marked[0], marked[1]);
    }
}
