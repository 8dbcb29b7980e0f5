//! Worker side of the pool: one environment driven by [`WorkerRequest`]s.

use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::adapter::{LocalEnv, SyncEnv};
use crate::wire::{self, WorkerRequest, WorkerResponse};

/// Request handler for one slot.
///
/// Episodes that end in a `step` are reset before replying, so the pool
/// always receives an observation it can act on.
#[derive(Debug, Default)]
pub struct WorkerCore {
    slot: Option<usize>,
    env: Option<LocalEnv>,
}

impl WorkerCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one request. The flag is true once the worker should stop.
    pub fn handle(&mut self, request: WorkerRequest) -> (WorkerResponse, bool) {
        match request {
            WorkerRequest::Init { slot, config } => {
                if let Some(mut old) = self.env.take() {
                    let _ = old.close();
                }
                match LocalEnv::new(*config) {
                    Ok(env) => {
                        info!(slot, "worker ready");
                        let response = WorkerResponse::Ready {
                            observation_len: env.observation_len(),
                            action_count: env.action_count(),
                        };
                        self.slot = Some(slot);
                        self.env = Some(env);
                        (response, false)
                    }
                    Err(e) => (WorkerResponse::error(e.kind(), &e), false),
                }
            }
            WorkerRequest::Reset => {
                let Some(env) = self.env.as_mut() else {
                    return (not_initialized(), false);
                };
                match env.reset() {
                    Ok(reset) => (
                        WorkerResponse::Reset {
                            observation: reset.observation,
                        },
                        false,
                    ),
                    Err(e) => (WorkerResponse::error(e.kind(), &e), false),
                }
            }
            WorkerRequest::Step { action } => {
                let Some(env) = self.env.as_mut() else {
                    return (not_initialized(), false);
                };
                (step_with_auto_reset(env, action), false)
            }
            WorkerRequest::Close => {
                if let Some(mut env) = self.env.take() {
                    let _ = env.close();
                }
                debug!(slot = ?self.slot, "worker closed");
                (WorkerResponse::Closed, true)
            }
        }
    }
}

fn not_initialized() -> WorkerResponse {
    WorkerResponse::error("not_initialized", "init must be the first request")
}

fn step_with_auto_reset(env: &mut LocalEnv, action: usize) -> WorkerResponse {
    let step = match env.step(action) {
        Ok(step) => step,
        Err(e) => return WorkerResponse::error(e.kind(), &e),
    };
    if !step.done() {
        return WorkerResponse::Step {
            observation: step.observation,
            reward: step.reward,
            terminated: step.terminated,
            truncated: step.truncated,
            terminal_observation: None,
            did_restart: step.info.did_restart,
        };
    }
    match env.reset() {
        Ok(reset) => WorkerResponse::Step {
            observation: reset.observation,
            reward: step.reward,
            terminated: step.terminated,
            truncated: step.truncated,
            terminal_observation: Some(step.observation),
            did_restart: false,
        },
        Err(e) => WorkerResponse::error(e.kind(), &e),
    }
}

/// Serve requests from `input` until `close` or end of input.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> anyhow::Result<()> {
    let mut core = WorkerCore::new();
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (response, stop) = match wire::decode::<WorkerRequest>(&line) {
            Ok(request) => core.handle(request),
            Err(e) => (WorkerResponse::error("wire", &e), false),
        };
        output.write_all(wire::encode(&response)?.as_bytes())?;
        output.flush()?;
        if stop {
            return Ok(());
        }
    }
    // Parent went away without saying goodbye.
    core.handle(WorkerRequest::Close);
    Ok(())
}

/// Serve the pool protocol over this process's stdin/stdout.
pub fn serve_stdio() -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(stdin.lock(), stdout.lock())
}
