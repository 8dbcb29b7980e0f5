//! Pure observation and reward logic for the dodger environment.
//!
//! Nothing in this crate performs I/O. Given the same configuration and the
//! same sequence of [`RawGameState`](types::RawGameState) values, every
//! function here produces bit-identical output, which is what lets the adapter
//! and the pool workers share it.
//!
//! # Module Structure
//!
//! - [`config`]: serde-friendly configuration for encoding, shaping and viewports
//! - [`encoder`]: fixed-length observation vectors from raw states
//! - [`reward`]: pluggable reward strategies and the per-episode shaping context
//! - [`frame_stack`]: fixed-depth observation history
//! - [`viewport`]: per-episode viewport selection
//!
//! # Example
//!
//! ```
//! use dodger_gym_core::{EncoderConfig, ObservationEncoder};
//! use dodger_gym_core::types::{Block, RawGameState};
//!
//! let mut encoder = ObservationEncoder::new(EncoderConfig::default()).unwrap();
//! let state = RawGameState::new(370.0, vec![Block::new(400.0, 550.0)], false);
//! let obs = encoder.encode(&state);
//! assert_eq!(obs.len(), encoder.observation_len());
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod frame_stack;
pub mod reward;
pub mod viewport;

pub use dodger_gym_types as types;

pub use config::{
    Arena, DirectionalEvasionParams, EncoderConfig, ExplorationWindow, NormalizationMode,
    PlayerGeometry, RewardConfig, TerminalOnlyParams, ThreatTransitionParams, Viewport,
    ViewportConfig,
};
pub use encoder::ObservationEncoder;
pub use error::ConfigError;
pub use frame_stack::FrameStack;
pub use reward::{build_shaper, RewardShaper, Shaped, ShapingContext};
pub use viewport::ViewportSampler;
