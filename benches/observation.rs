use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dodger_gym::core::{
    build_shaper, Arena, EncoderConfig, FrameStack, ObservationEncoder, RewardConfig,
    ShapingContext,
};
use dodger_gym::types::{Block, RawGameState};

fn crowded_state() -> RawGameState {
    let blocks = (0..60)
        .map(|i| Block::new((i * 41 % 770) as f64, (i * 29 % 600) as f64))
        .collect();
    RawGameState::new(385.0, blocks, false)
}

fn bench_encode(c: &mut Criterion) {
    let mut encoder = ObservationEncoder::new(EncoderConfig::default()).unwrap();
    let mut out = vec![0.0f32; encoder.observation_len()];
    let state = crowded_state();

    c.bench_function("encode_60_blocks", |b| {
        b.iter(|| {
            encoder.encode_into(black_box(&state), &mut out);
        })
    });
}

fn bench_frame_stack(c: &mut Criterion) {
    let frame = vec![0.5f32; 31];
    let mut frames = FrameStack::new(4, frame.len()).unwrap();
    frames.reset(&frame);

    c.bench_function("frame_stack_push", |b| {
        b.iter(|| {
            black_box(frames.push(black_box(&frame)));
        })
    });
}

fn bench_shapers(c: &mut Criterion) {
    let config = EncoderConfig::default();
    let arena = Arena::new(config.viewport, config.geometry);
    let previous = crowded_state();
    let mut current = crowded_state();
    current.player_x += 5.0;

    for name in ["threat_transition", "directional_evasion", "terminal_only"] {
        let shaper = build_shaper(&RewardConfig::from_name(name).unwrap());
        c.bench_function(&format!("shape_{name}"), |b| {
            b.iter(|| {
                black_box(shaper.shape(
                    &arena,
                    Some(&previous),
                    black_box(&current),
                    false,
                    &ShapingContext::default(),
                ))
            })
        });
    }
}

criterion_group!(benches, bench_encode, bench_frame_stack, bench_shapers);
criterion_main!(benches);
