//! Shared fixtures for unit tests: synthetic pages, photographs and detections.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use nalgebra::Matrix3;

use crate::codec::{AddressCodec, Corner};
use crate::config::MarkerConfig;
use crate::geometry::GeometryResolver;
use crate::homography::Homography;
use crate::scanner::Detection;

/// Plain white page.
pub(crate) fn blank_page(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
}

/// Smooth colour ramp; bilinear resampling reproduces it almost exactly.
pub(crate) fn gradient_page(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (x * 255 / w.max(1)) as u8,
            (y * 255 / h.max(1)) as u8,
            ((x + y) * 255 / (w + h).max(1)) as u8,
        ])
    })
}

/// White page with a few dark answer boxes away from the marker corners.
pub(crate) fn form_page(w: u32, h: u32) -> RgbImage {
    let mut page = blank_page(w, h);
    let box_w = (w / 3).max(1);
    let box_h = (h / 12).max(1);
    for row in 0..3 {
        let y = (h / 4 + row * h / 6) as i32;
        draw_filled_rect_mut(
            &mut page,
            Rect::at((w / 3) as i32, y).of_size(box_w, box_h),
            Rgb([40, 40, 40]),
        );
    }
    page
}

/// Document -> photograph transform for a default-sized page shot at roughly
/// half scale, slightly rotated and tilted.
pub(crate) fn tilted_homography() -> Homography {
    let (s, c) = 4.0f64.to_radians().sin_cos();
    Homography::from_matrix(Matrix3::new(
        0.5 * c,
        -0.5 * s,
        160.0,
        0.5 * s,
        0.5 * c,
        40.0,
        1.0e-5,
        2.0e-6,
        1.0,
    ))
}

/// Detections a perfect detector would report for a marked page seen through `h`.
pub(crate) fn synthetic_detections(
    config: &MarkerConfig,
    document_id: usize,
    page_number: usize,
    h: &Homography,
) -> Vec<Detection> {
    let ids = AddressCodec::new(config)
        .expect("valid config")
        .page_marker_ids(document_id, page_number)
        .expect("address in range");
    let resolver = GeometryResolver::new(config).expect("valid config");
    Corner::ALL
        .iter()
        .map(|&corner| {
            let outline = resolver
                .marker_outline(corner)
                .map(|p| h.project(p).expect("finite projection"));
            Detection::new(ids[corner.index()], outline)
        })
        .collect()
}
