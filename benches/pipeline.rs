use criterion::{criterion_group, criterion_main, Criterion};

use motion_regions::config::{BlurType, CoreConfig};
use motion_regions::core::Frame;
use motion_regions::motion::MotionProcessor;

fn bench_process_frame(c: &mut Criterion) {
    let mut config = CoreConfig::default();
    config.processor.blur_type = BlurType::Gaussian;
    config.processor.gaussian_blur_size = 5;

    let mut frames = Vec::new();
    for step in 0..8 {
        let mut frame = Frame::new(240, 320, 1).unwrap();
        let x = 40 + step * 10;
        for row in 100..140 {
            for col in x..x + 40 {
                frame.at_mut(row, col).unwrap()[0] = 255;
            }
        }
        frames.push(frame);
    }

    c.bench_function("process_frame_320x240_moving_blob", |b| {
        b.iter(|| {
            let mut processor = MotionProcessor::new(config.processor.clone()).unwrap();
            for frame in &frames {
                std::hint::black_box(processor.process_frame(frame));
            }
        });
    });
}

criterion_group!(benches, bench_process_frame);
criterion_main!(benches);
