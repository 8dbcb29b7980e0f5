//! Observation encoder: raw engine state to a fixed-length feature vector.
//!
//! # Layout
//!
//! ```text
//! [ player_x | (height, width)? | block_0 | block_1 | ... | block_{max_blocks-1} ]
//! block_i = [ dx, dy, (x)? ]
//! ```
//!
//! Blocks are ranked by vertical distance to the player row, closest first, with
//! ties kept in engine order. Unused block slots are zero. The vector length and
//! value range depend only on the [`EncoderConfig`], never on the state.

use crate::config::{EncoderConfig, NormalizationMode, Viewport};
use crate::error::ConfigError;
use crate::types::{
    player_baseline, Block, RawGameState, MAX_HEIGHT, MAX_WIDTH, MIN_HEIGHT, MIN_WIDTH,
};

#[derive(Debug, Clone, Copy)]
struct Ranked {
    distance: f64,
    index: usize,
}

/// Encodes [`RawGameState`] values for one configuration.
///
/// The output is a pure function of `(state, config)`. The encoder keeps a
/// pre-sized ranking buffer so [`encode_into`](Self::encode_into) never allocates.
#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    config: EncoderConfig,
    player_y: f64,
    ranked: Vec<Ranked>,
}

impl ObservationEncoder {
    pub fn new(config: EncoderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let player_y = baseline_for(&config);
        let ranked = Vec::with_capacity(config.max_blocks);
        Ok(Self {
            config,
            player_y,
            ranked,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn observation_len(&self) -> usize {
        self.config.observation_len()
    }

    /// Inclusive `(low, high)` range of every feature.
    pub fn bounds(&self) -> (f32, f32) {
        self.config.normalization.bounds()
    }

    /// Top edge of the player paddle for the current viewport.
    pub fn player_y(&self) -> f64 {
        self.player_y
    }

    pub fn viewport(&self) -> Viewport {
        self.config.viewport
    }

    /// Switch to a new viewport and recompute the derived player row.
    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), ConfigError> {
        viewport.validate()?;
        self.config.viewport = viewport;
        self.player_y = baseline_for(&self.config);
        Ok(())
    }

    /// Encode into a freshly allocated vector.
    pub fn encode(&mut self, state: &RawGameState) -> Vec<f32> {
        let mut out = vec![0.0; self.observation_len()];
        self.encode_into(state, &mut out);
        out
    }

    /// Encode into `out`, overwriting every slot.
    ///
    /// # Panics
    ///
    /// Panics if `out.len() != self.observation_len()`.
    pub fn encode_into(&mut self, state: &RawGameState, out: &mut [f32]) {
        assert_eq!(
            out.len(),
            self.observation_len(),
            "observation buffer length mismatch"
        );
        out.fill(0.0);

        let (lo, hi) = self.bounds();
        let width = f64::from(self.config.viewport.width);
        let height = f64::from(self.config.viewport.height);
        let mode = self.config.normalization;

        out[0] = position(state.player_x, width, mode, lo, hi);
        if self.config.include_viewport {
            out[1] = span(height, MIN_HEIGHT, MAX_HEIGHT, mode, lo, hi);
            out[2] = span(width, MIN_WIDTH, MAX_WIDTH, mode, lo, hi);
        }

        self.rank_blocks(state);

        let (range_x, range_y) = match self.config.exploration {
            Some(window) => (window.max_dx, window.max_dy),
            None => (width, height),
        };
        let stride = self.config.per_block_features();
        let base = self.config.constant_features();

        for (slot, ranked) in self.ranked.iter().enumerate() {
            let block = state.blocks[ranked.index];
            let at = base + slot * stride;
            let dx = block.x - state.player_x;
            match mode {
                NormalizationMode::Unit => {
                    out[at] = bound(dx / (2.0 * range_x) + 0.5, lo, hi);
                    out[at + 1] = bound((self.player_y - block.y).abs() / range_y, lo, hi);
                }
                NormalizationMode::Centered => {
                    out[at] = bound(dx / range_x, lo, hi);
                    out[at + 1] = bound((self.player_y - block.y) / range_y, lo, hi);
                }
            }
            if self.config.include_block_x {
                out[at + 2] = position(block.x, width, mode, lo, hi);
            }
        }
    }

    fn in_window(&self, player_x: f64, block: &Block) -> bool {
        match self.config.exploration {
            Some(window) => {
                (block.x - player_x).abs() <= window.max_dx
                    && (block.y - self.player_y).abs() <= window.max_dy
            }
            None => true,
        }
    }

    /// Keep the `max_blocks` closest blocks, stable on ties.
    fn rank_blocks(&mut self, state: &RawGameState) {
        self.ranked.clear();
        let keep = self.config.max_blocks;

        for (index, block) in state.blocks.iter().enumerate() {
            if !self.in_window(state.player_x, block) {
                continue;
            }
            let distance = (block.y - self.player_y).abs();
            // Insert after every entry with an equal key so earlier blocks win ties.
            let at = self
                .ranked
                .iter()
                .position(|r| r.distance > distance)
                .unwrap_or(self.ranked.len());
            if at >= keep {
                continue;
            }
            if self.ranked.len() == keep {
                self.ranked.pop();
            }
            self.ranked.insert(at, Ranked { distance, index });
        }
    }
}

fn baseline_for(config: &EncoderConfig) -> f64 {
    player_baseline(
        f64::from(config.viewport.height),
        config.geometry.player_height,
        config.geometry.player_y_offset,
    )
}

/// Absolute horizontal position.
fn position(x: f64, width: f64, mode: NormalizationMode, lo: f32, hi: f32) -> f32 {
    match mode {
        NormalizationMode::Unit => bound(x / width, lo, hi),
        NormalizationMode::Centered => bound(x / (width / 2.0) - 1.0, lo, hi),
    }
}

/// Viewport dimension relative to its supported bounds.
fn span(value: f64, min: u32, max: u32, mode: NormalizationMode, lo: f32, hi: f32) -> f32 {
    let unit = (value - f64::from(min)) / f64::from(max - min);
    match mode {
        NormalizationMode::Unit => bound(unit, lo, hi),
        NormalizationMode::Centered => bound(unit * 2.0 - 1.0, lo, hi),
    }
}

fn bound(value: f64, lo: f32, hi: f32) -> f32 {
    let v = value as f32;
    if v.is_nan() {
        0.0
    } else {
        v.clamp(lo, hi)
    }
}
