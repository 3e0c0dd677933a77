//! Sub-pixel RGB sampling.

use image::{Rgb, RgbImage};

/// Sample an RGB image at a sub-pixel position using bilinear interpolation.
///
/// Pixel centers sit on integer coordinates. Positions within half a pixel
/// outside the raster replicate the edge; anything further returns `None`.
#[inline]
pub fn bilinear_sample_rgb(img: &RgbImage, x: f64, y: f64) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || !x.is_finite() || !y.is_finite() {
        return None;
    }
    if x < -0.5 || y < -0.5 || x > w as f64 - 0.5 || y > h as f64 - 0.5 {
        return None;
    }

    let xc = x.clamp(0.0, (w - 1) as f64);
    let yc = y.clamp(0.0, (h - 1) as f64);
    let x0 = xc.floor() as u32;
    let y0 = yc.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = xc - x0 as f64;
    let fy = yc - y0 as f64;

    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = (1.0 - fx) * (1.0 - fy) * p00[c] as f64
            + fx * (1.0 - fy) * p10[c] as f64
            + (1.0 - fx) * fy * p01[c] as f64
            + fx * fy * p11[c] as f64;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}
