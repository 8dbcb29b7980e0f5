//! Environment adapter - a remote dodger engine behind a reset/step contract
//!
//! The engine runs elsewhere and speaks an asynchronous JSON protocol over a
//! persistent socket. This crate owns that connection and turns it into a
//! reinforcement-learning environment with fixed-shape observations and
//! scalar rewards.
//!
//! # Layers
//!
//! - [`protocol`]: wire messages (`restart`, `step`, `become_shared_owner` / `state`)
//! - [`transport`]: socket plus background receive task feeding a bounded queue
//! - [`session`]: protocol state machine, one request in flight, timeouts, close signal
//! - [`env`]: [`DodgerEnv`], the async environment combining session, encoder, shaper and frame stack
//! - [`runtime`]: blocking bridges, [`LocalEnv`] and [`ThreadedEnv`]
//!
//! # Transports
//!
//! The framing follows the URI scheme:
//!
//! - `ws://host:port` (default `ws://localhost:8080`): WebSocket text frames
//! - `tcp://host:port`: newline-delimited JSON
//!
//! # Environment Variables
//!
//! [`EnvConfig::from_env`] reads:
//!
//! - `DODGER_URI`: engine endpoint
//! - `DODGER_WIDTH` / `DODGER_HEIGHT`: fixed viewport
//! - `DODGER_RANDOMIZE_VIEWPORT`: draw a viewport per episode (`DODGER_SEED` seeds it)
//! - `DODGER_MAX_BLOCKS`, `DODGER_FRAME_STACK`: observation shape
//! - `DODGER_REWARD`: `terminal_only`, `threat_transition`, `curriculum` or `directional_evasion`
//! - `DODGER_MAX_EPISODE_STEPS`: truncation limit
//! - `DODGER_AUTO_RESTART`: restart finished episodes from `step`
//! - `DODGER_OWNERSHIP`: send `become_shared_owner` once per connection
//! - `DODGER_REPLY_TIMEOUT_MS`: reply timeout
//!
//! # Example Protocol Flow
//!
//! ```text
//! Client -> Engine: {"type":"restart"}
//! Engine -> Client: {"type":"state","state":{"playerX":370,"blocks":[],"gameOver":false}}
//! Client -> Engine: {"type":"step","action":"LEFT"}
//! Engine -> Client: {"type":"state","state":{"playerX":365,"blocks":[{"x":400,"y":0}],"gameOver":false}}
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dodger_gym_adapter::{EnvConfig, LocalEnv, SyncEnv};
//!
//! let mut env = LocalEnv::new(EnvConfig::from_env()).unwrap();
//! let first = env.reset().unwrap();
//! let step = env.step(2).unwrap();
//! assert_eq!(first.observation.len(), step.observation.len());
//! env.close().unwrap();
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod inbox;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod transport;

pub use dodger_gym_core as core;
pub use dodger_gym_types as types;

pub use config::{EnvConfig, PostTerminalPolicy, DEFAULT_URI};
pub use env::{DodgerEnv, Reset, ResetInfo, Step, StepInfo};
pub use error::{AdapterError, Result};
pub use runtime::{LocalEnv, SyncEnv, ThreadedEnv};
pub use session::{CloseHandle, SessionState};
