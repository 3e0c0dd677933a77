use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pagemark::{
    dewarp, warp_perspective, AddressCodec, BitGridRenderer, Corner, CorrespondenceMode,
    Detection, GeometryResolver, Homography, MarkerConfig, MarkerPlacer, PageScanner, FILL,
};

fn photo_transform(scale: f64) -> Homography {
    let (s, c) = 3.0f64.to_radians().sin_cos();
    Homography::from_matrix(Matrix3::new(
        scale * c,
        -scale * s,
        150.0,
        scale * s,
        scale * c,
        60.0,
        1.0e-5,
        3.0e-6,
        1.0,
    ))
}

fn noisy_detections(config: &MarkerConfig, h: &Homography, seed: u64) -> Vec<Detection> {
    let mut rng = StdRng::seed_from_u64(seed);
    let ids = AddressCodec::new(config)
        .expect("valid config")
        .page_marker_ids(4, 6)
        .expect("address in range");
    let resolver = GeometryResolver::new(config).expect("valid config");
    Corner::ALL
        .iter()
        .map(|&corner| {
            let corners = resolver.marker_outline(corner).map(|p| {
                let q = h.project(p).expect("finite projection");
                [
                    q[0] + rng.gen_range(-0.3..0.3),
                    q[1] + rng.gen_range(-0.3..0.3),
                ]
            });
            Detection::new(ids[corner.index()], corners)
        })
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let codec = AddressCodec::new(&MarkerConfig::default()).expect("valid config");
    c.bench_function("codec_encode_decode_all_pages", |b| {
        b.iter(|| {
            let mut acc = 0usize;
            for document_id in 0..codec.max_documents() {
                for page_number in 0..9 {
                    let id = codec
                        .encode_designated(black_box(document_id), black_box(page_number))
                        .expect("in range");
                    acc += codec.decode(id).expect("in range").page_number;
                }
            }
            black_box(acc)
        })
    });
}

fn bench_scan_and_fit(c: &mut Criterion) {
    let config = MarkerConfig::default();
    let h = photo_transform(0.5);
    let detections = noisy_detections(&config, &h, 7);
    let scanner = PageScanner::new(&config).expect("valid config");
    let centers = GeometryResolver::new(&config).expect("valid config");
    let outlines = centers
        .clone()
        .with_mode(CorrespondenceMode::CentersAndOutlines);

    c.bench_function("scan_4_markers", |b| {
        b.iter(|| black_box(scanner.scan(black_box(&detections))))
    });

    let page = scanner.scan(&detections).page().cloned().expect("scan succeeds");
    c.bench_function("fit_centers", |b| {
        b.iter(|| black_box(centers.resolve(black_box(&page))))
    });
    c.bench_function("fit_centers_and_outlines", |b| {
        b.iter(|| black_box(outlines.resolve(black_box(&page))))
    });
}

fn bench_dewarp(c: &mut Criterion) {
    let config = MarkerConfig::default();
    let placer = MarkerPlacer::new(&config, BitGridRenderer::for_config(&config)).expect("valid config");
    let blank = RgbImage::from_pixel(
        config.document_width_px,
        config.document_height_px,
        Rgb([255, 255, 255]),
    );
    let marked = placer
        .place_on_page(&DynamicImage::ImageRgb8(blank), 4, 6)
        .expect("page marked");
    let h = photo_transform(0.5);
    let photo = warp_perspective(&marked, &h, 1000, 1300, FILL).expect("photo rendered");

    c.bench_function("dewarp_a4_200dpi", |b| {
        b.iter(|| {
            black_box(
                dewarp(
                    black_box(&photo),
                    &h,
                    config.document_width_px,
                    config.document_height_px,
                )
                .expect("dewarp"),
            )
        })
    });
}

criterion_group!(
    name = hotpaths;
    config = Criterion::default().sample_size(20);
    targets = bench_codec, bench_scan_and_fit, bench_dewarp
);
criterion_main!(hotpaths);
