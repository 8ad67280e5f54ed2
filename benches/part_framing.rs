use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mjpeg_httpd::capture::{Frame, PixelFormat};
use mjpeg_httpd::encode::JpegEncoder;
use mjpeg_httpd::stream::{render_part_header, STREAM_BOUNDARY};

fn create_test_jpeg(size: usize) -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8]; // SOI
    jpeg.extend((0..size).map(|i| (i % 256) as u8));
    jpeg.extend(&[0xFF, 0xD9]); // EOI
    jpeg
}

fn benchmark_part_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("part_assembly");

    // Typical webcam frame sizes
    for size in [5_000, 20_000, 50_000, 100_000].iter() {
        let jpeg = create_test_jpeg(*size);

        group.bench_with_input(BenchmarkId::new("jpeg_size", size), &jpeg, |b, jpeg| {
            let mut header_buf = [0u8; 64];
            b.iter(|| {
                let n = render_part_header(&mut header_buf, black_box(jpeg.len())).unwrap();
                let mut part = Vec::with_capacity(STREAM_BOUNDARY.len() + n + jpeg.len());
                part.extend_from_slice(STREAM_BOUNDARY.as_bytes());
                part.extend_from_slice(&header_buf[..n]);
                part.extend_from_slice(black_box(jpeg));
                part
            });
        });
    }

    group.finish();
}

struct BenchFrame {
    payload: Vec<u8>,
    format: PixelFormat,
    at: Instant,
}

impl Frame for BenchFrame {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn timestamp(&self) -> Instant {
        self.at
    }
}

fn benchmark_raw_transform(c: &mut Criterion) {
    let encoder = JpegEncoder::new(320, 240, 40);
    let frame = BenchFrame {
        payload: vec![0x80; 320 * 240 * 2],
        format: PixelFormat::Yuyv,
        at: Instant::now(),
    };

    c.bench_function("yuyv_320x240_to_jpeg", |b| {
        b.iter(|| encoder.encode(black_box(&frame)).unwrap());
    });
}

criterion_group!(benches, benchmark_part_assembly, benchmark_raw_transform);
criterion_main!(benches);
