use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dodger_gym::core::{
    build_shaper, Arena, DirectionalEvasionParams, EncoderConfig, FrameStack, ObservationEncoder,
    RewardConfig, ShapingContext,
};
use dodger_gym::types::{Block, RawGameState};

struct CountingAlloc;

static COUNT_ENABLED: AtomicBool = AtomicBool::new(false);
static ALLOC_COUNT: AtomicUsize = AtomicUsize::new(0);

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if COUNT_ENABLED.load(Ordering::Relaxed) {
            ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if COUNT_ENABLED.load(Ordering::Relaxed) {
            ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        System.realloc(ptr, layout, new_size)
    }
}

fn with_alloc_counting<F: FnOnce()>(f: F) -> usize {
    ALLOC_COUNT.store(0, Ordering::Relaxed);
    COUNT_ENABLED.store(true, Ordering::Relaxed);
    f();
    COUNT_ENABLED.store(false, Ordering::Relaxed);
    ALLOC_COUNT.load(Ordering::Relaxed)
}

fn busy_state(player_x: f64, game_over: bool) -> RawGameState {
    let blocks = (0..40)
        .map(|i| Block::new((i * 37 % 800) as f64, (i * 53 % 600) as f64))
        .collect();
    RawGameState::new(player_x, blocks, game_over)
}

#[test]
fn encode_stack_and_shape_are_allocation_free() {
    let config = EncoderConfig {
        max_blocks: 10,
        ..EncoderConfig::default()
    };
    let arena = Arena::new(config.viewport, config.geometry);
    let mut encoder = ObservationEncoder::new(config).unwrap();
    let mut frames = FrameStack::new(4, encoder.observation_len()).unwrap();
    let mut frame = vec![0.0f32; encoder.observation_len()];
    let shaper = build_shaper(&RewardConfig::DirectionalEvasion(
        DirectionalEvasionParams::default(),
    ));

    let states: Vec<RawGameState> = (0..8).map(|i| busy_state(300.0 + i as f64, false)).collect();

    // Warm-up.
    encoder.encode_into(&states[0], &mut frame);
    frames.reset(&frame);

    let mut context = ShapingContext::default();
    let mut checksum = 0.0f32;
    let allocs = with_alloc_counting(|| {
        for _ in 0..50 {
            for pair in states.windows(2) {
                encoder.encode_into(&pair[1], &mut frame);
                checksum += frames.push(&frame)[0];
                let shaped = shaper.shape(&arena, Some(&pair[0]), &pair[1], false, &context);
                context = shaped.context;
                checksum += shaped.reward;
            }
        }
    });

    assert!(checksum.is_finite());
    assert_eq!(allocs, 0);
}
