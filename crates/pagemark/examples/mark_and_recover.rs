//! Marks a three-page document, simulates tilted photographs of it, then
//! recovers page identity and geometry. Prints the batch summary as JSON.

use std::error::Error;

use image::{DynamicImage, Rgb, RgbImage};
use nalgebra::Matrix3;

use pagemark::{
    warp_perspective, AddressCodec, BitGridRenderer, Corner, Detection, GeometryResolver,
    Homography, MarkerConfig, MarkerPlacer, PageRecovery,
};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let config = MarkerConfig::default();
    let placer = MarkerPlacer::new(&config, BitGridRenderer::for_config(&config))?;
    let codec = AddressCodec::new(&config)?;
    let resolver = GeometryResolver::new(&config)?;
    let document_id = 4;

    let blank = DynamicImage::ImageRgb8(RgbImage::from_pixel(
        config.document_width_px,
        config.document_height_px,
        Rgb([255, 255, 255]),
    ));
    let pages = placer.place_on_document(document_id, &[blank.clone(), blank.clone(), blank])?;

    // Photographs are shot out of order; each gets its own size so the
    // stand-in detector below can tell them apart.
    let mut photos = Vec::new();
    let mut known = Vec::new();
    for (i, page_number) in [2usize, 0, 1].into_iter().enumerate() {
        let (s, c) = (2.0 + i as f64).to_radians().sin_cos();
        let h = Homography::from_matrix(Matrix3::new(
            0.5 * c, -0.5 * s, 120.0, 0.5 * s, 0.5 * c, 40.0, 1e-5, 0.0, 1.0,
        ));
        let width = 1000 + i as u32;
        photos.push(warp_perspective(&pages[page_number], &h, width, 1300, Rgb([80, 80, 80]))?);

        let ids = codec.page_marker_ids(document_id, page_number)?;
        let mut detections = Vec::new();
        for corner in Corner::ALL {
            let mut outline = resolver.marker_outline(corner);
            for p in outline.iter_mut() {
                *p = h.project(*p).ok_or("marker projects to infinity")?;
            }
            detections.push(Detection::new(ids[corner.index()], outline));
        }
        known.push((width, detections));
    }

    let detector = move |image: &RgbImage| -> Vec<Detection> {
        known
            .iter()
            .find(|(w, _)| *w == image.width())
            .map(|(_, d)| d.clone())
            .unwrap_or_default()
    };
    let result = PageRecovery::new(&config, detector)?.recover(&photos);

    for document in &result.documents {
        for page in &document.pages {
            match &page.image {
                Ok(image) => println!(
                    "document {} page {} <- photo {} ({}x{})",
                    document.document_id,
                    page.page_number,
                    page.image_index,
                    image.width(),
                    image.height()
                ),
                Err(e) => println!(
                    "document {} page {} <- photo {}: {e}",
                    document.document_id, page.page_number, page.image_index
                ),
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&result.batch.summary())?);
    Ok(())
}
