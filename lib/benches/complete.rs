use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use priority_bp as pbp;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

fn noise_texture(size: u32, seed: u64) -> pbp::ImageFloat {
    let mut rng = rand_pcg::Pcg32::seed_from_u64(seed);
    let cells: Vec<pbp::Pixel> = (0..64)
        .map(|_| pbp::Pixel::new(rng.gen(), rng.gen(), rng.gen()))
        .collect();

    pbp::ImageFloat::from_fn(size, size, |x, y| {
        let a = cells[((x / 4) % 8 + (y / 4) % 8 * 8) as usize];
        let b = cells[((x / 3 + 5) % 8 + (y / 5) % 8 * 8) as usize];
        (a + b) * 0.5
    })
    .unwrap()
}

/// Square hole covering the central quarter of the image
fn centered_hole(size: u32) -> pbp::Mask {
    let (from, to) = (size * 3 / 8, size * 5 / 8);
    pbp::Mask::from_fn(size, size, |x, y| {
        if (from..to).contains(&x) && (from..to).contains(&y) {
            pbp::MaskValue::Unknown
        } else {
            pbp::MaskValue::Known
        }
    })
    .unwrap()
}

fn image_size(c: &mut Criterion) {
    static DIM: u32 = 32;

    let mut group = c.benchmark_group("image_size");
    group.sample_size(10);

    for dim in [DIM, 2 * DIM, 4 * DIM].iter() {
        // Build the inputs once, only the completion itself is timed
        let input = noise_texture(*dim, 42);
        let mask = centered_hole(*dim);

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |b, _| {
            b.iter_custom(|iters| {
                let mut total_elapsed = Duration::new(0, 0);
                for _i in 0..iters {
                    let settings = pbp::Settings::default();

                    let start = Instant::now();
                    black_box(pbp::complete(&input, &mask, &settings).unwrap());
                    total_elapsed += start.elapsed();
                }

                total_elapsed
            });
        });
    }
    group.finish();
}

fn max_labels(c: &mut Criterion) {
    let input = noise_texture(64, 7);
    let mask = centered_hole(64);

    let mut group = c.benchmark_group("max_labels");
    group.sample_size(10);

    for labels in [5, 20, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(labels), labels, |b, &labels| {
            b.iter_custom(|iters| {
                let mut total_elapsed = Duration::new(0, 0);
                for _i in 0..iters {
                    let settings = pbp::Settings {
                        max_labels_per_node: labels,
                        ..pbp::Settings::default()
                    };

                    let start = Instant::now();
                    black_box(pbp::complete(&input, &mask, &settings).unwrap());
                    total_elapsed += start.elapsed();
                }

                total_elapsed
            });
        });
    }
    group.finish();
}

fn threads(c: &mut Criterion) {
    let input = noise_texture(96, 13);
    let mask = centered_hole(96);

    let mut group = c.benchmark_group("threads");
    group.sample_size(10);

    for count in [1, 2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_custom(|iters| {
                let mut total_elapsed = Duration::new(0, 0);
                for _i in 0..iters {
                    let settings = pbp::Settings {
                        max_thread_count: count,
                        ..pbp::Settings::default()
                    };

                    let start = Instant::now();
                    black_box(pbp::complete(&input, &mask, &settings).unwrap());
                    total_elapsed += start.elapsed();
                }

                total_elapsed
            });
        });
    }
    group.finish();
}

criterion_group!(benches, image_size, max_labels, threads);
criterion_main!(benches);
