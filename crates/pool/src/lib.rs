//! Episode orchestrator - many dodger environments stepped as one batch
//!
//! Each slot owns one environment with its own engine connection. Nothing is
//! shared between slots.
//!
//! - [`EnvPool::spawn_processes`]: one `dodger-worker` child per slot, talking
//!   newline-delimited JSON over stdio (see [`wire`])
//! - [`EnvPool::spawn_threads`]: one thread per slot, for tests and small runs
//!
//! Slots auto-reset: when a step ends an episode, the worker restarts it before
//! replying and the final observation travels in
//! [`BatchStep::terminal_observations`].
//!
//! # Example
//!
//! ```no_run
//! use dodger_gym_pool::{EnvPool, PoolConfig};
//!
//! let mut pool = EnvPool::spawn_processes(PoolConfig::default()).unwrap();
//! let observations = pool.reset_all().unwrap();
//! let actions = vec![2; observations.len()];
//! let batch = pool.step_all(&actions).unwrap();
//! assert_eq!(batch.len(), pool.num_envs());
//! pool.close();
//! ```

pub mod error;
pub mod pool;
pub mod slot;
pub mod wire;
pub mod worker;

pub use dodger_gym_adapter as adapter;

pub use error::{PoolError, Result};
pub use pool::{BatchStep, EnvPool, PoolConfig};
pub use slot::{worker_binary, ProcessSlot, SlotChannel, ThreadSlot, WORKER_BIN};
pub use wire::{WorkerRequest, WorkerResponse};
pub use worker::{serve, serve_stdio, WorkerCore};
