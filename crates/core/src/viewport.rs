use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{Viewport, ViewportConfig};
use crate::error::ConfigError;

/// Picks the viewport for each episode.
///
/// Fixed configs always return the same viewport. Randomized configs draw
/// width and height uniformly (inclusive) from a seeded ChaCha stream, so a
/// given seed replays the same sequence of viewports.
#[derive(Debug, Clone)]
pub struct ViewportSampler {
    config: ViewportConfig,
    rng: ChaCha8Rng,
}

impl ViewportSampler {
    pub fn new(config: ViewportConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = match config {
            ViewportConfig::Randomized { seed: Some(s), .. } => s,
            _ => rand::random::<u64>(),
        };
        Ok(Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn is_randomized(&self) -> bool {
        self.config.is_randomized()
    }

    pub fn next_viewport(&mut self) -> Viewport {
        match self.config {
            ViewportConfig::Fixed { width, height } => Viewport::new(width, height),
            ViewportConfig::Randomized {
                min_width,
                max_width,
                min_height,
                max_height,
                ..
            } => {
                let width = self.rng.gen_range(min_width..=max_width);
                let height = self.rng.gen_range(min_height..=max_height);
                Viewport::new(width, height)
            }
        }
    }
}
