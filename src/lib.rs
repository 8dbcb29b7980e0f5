//! dodger-gym - a remote dodger engine as a reinforcement-learning environment
//!
//! This crate re-exports the workspace crates:
//!
//! - [`types`]: game constants, blocks, raw states, action labels
//! - [`core`]: observation encoding, reward shaping, frame stacking
//! - [`adapter`]: engine connection and the reset/step environments
//! - [`pool`]: batched environments across processes or threads

pub use dodger_gym_adapter as adapter;
pub use dodger_gym_core as core;
pub use dodger_gym_pool as pool;
pub use dodger_gym_types as types;
