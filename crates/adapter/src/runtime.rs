//! Blocking front ends for [`DodgerEnv`].
//!
//! Training loops call `reset`/`step` synchronously. Two strategies bridge
//! those calls onto the async environment:
//!
//! - [`LocalEnv`]: a current-thread runtime owned by the caller; each call
//!   runs one `block_on`. Suited to one environment per process.
//! - [`ThreadedEnv`]: a named background thread runs the runtime and a
//!   command loop; calls are marshalled over a channel and the caller waits
//!   on a oneshot reply.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::EnvConfig;
use crate::env::{DodgerEnv, Reset, Step};
use crate::error::{AdapterError, Result};
use crate::session::CloseHandle;

/// Synchronous environment contract.
pub trait SyncEnv: Send {
    fn reset(&mut self) -> Result<Reset>;

    fn step(&mut self, action: usize) -> Result<Step>;

    /// Close the environment. Later calls fail with [`AdapterError::Closed`].
    fn close(&mut self) -> Result<()>;

    /// Handle that can close the environment from another thread, including
    /// while a call is in flight.
    fn close_handle(&self) -> CloseHandle;

    fn observation_len(&self) -> usize;

    fn action_count(&self) -> usize;
}

fn current_thread_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AdapterError::Runtime(e.to_string()))
}

// ---------------------------------------------------------------------------
// LocalEnv
// ---------------------------------------------------------------------------

/// Same-thread bridge.
#[derive(Debug)]
pub struct LocalEnv {
    rt: Runtime,
    env: DodgerEnv,
}

impl LocalEnv {
    pub fn new(config: EnvConfig) -> Result<Self> {
        let env = DodgerEnv::new(config)?;
        Ok(Self {
            rt: current_thread_runtime()?,
            env,
        })
    }

    pub fn env(&self) -> &DodgerEnv {
        &self.env
    }
}

impl SyncEnv for LocalEnv {
    fn reset(&mut self) -> Result<Reset> {
        self.rt.block_on(self.env.reset())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        self.rt.block_on(self.env.step(action))
    }

    fn close(&mut self) -> Result<()> {
        self.rt.block_on(self.env.close());
        Ok(())
    }

    fn close_handle(&self) -> CloseHandle {
        self.env.close_handle()
    }

    fn observation_len(&self) -> usize {
        self.env.observation_len()
    }

    fn action_count(&self) -> usize {
        self.env.action_count()
    }
}

// ---------------------------------------------------------------------------
// ThreadedEnv
// ---------------------------------------------------------------------------

enum Command {
    Reset(oneshot::Sender<Result<Reset>>),
    Step(usize, oneshot::Sender<Result<Step>>),
    Close(oneshot::Sender<()>),
}

/// Background-thread bridge.
#[derive(Debug)]
pub struct ThreadedEnv {
    commands: Option<mpsc::Sender<Command>>,
    worker: Option<thread::JoinHandle<()>>,
    exited: std_mpsc::Receiver<()>,
    close: CloseHandle,
    close_grace: Duration,
    observation_len: usize,
    action_count: usize,
}

impl ThreadedEnv {
    pub fn new(config: EnvConfig) -> Result<Self> {
        let close_grace = config.close_grace();
        let env = DodgerEnv::new(config)?;
        let close = env.close_handle();
        let observation_len = env.observation_len();
        let action_count = env.action_count();
        let rt = current_thread_runtime()?;

        let (tx, rx) = mpsc::channel::<Command>(8);
        let (exit_tx, exited) = std_mpsc::channel();

        let worker = thread::Builder::new()
            .name("dodger-env".to_string())
            .spawn(move || {
                rt.block_on(command_loop(env, rx));
                let _ = exit_tx.send(());
            })
            .map_err(|e| AdapterError::Runtime(format!("spawn env thread: {e}")))?;

        Ok(Self {
            commands: Some(tx),
            worker: Some(worker),
            exited,
            close,
            close_grace,
            observation_len,
            action_count,
        })
    }

    fn call<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        if self.close.is_closed() {
            return Err(AdapterError::Closed);
        }
        let commands = self.commands.as_ref().ok_or(AdapterError::Closed)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .blocking_send(make(reply_tx))
            .map_err(|_| AdapterError::Closed)?;
        reply_rx.blocking_recv().map_err(|_| AdapterError::Closed)?
    }
}

async fn command_loop(mut env: DodgerEnv, mut rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Reset(reply) => {
                let _ = reply.send(env.reset().await);
            }
            Command::Step(action, reply) => {
                let _ = reply.send(env.step(action).await);
            }
            Command::Close(reply) => {
                env.close().await;
                let _ = reply.send(());
                debug!("env thread closed");
                return;
            }
        }
    }
    // Every sender is gone.
    env.close().await;
}

impl SyncEnv for ThreadedEnv {
    fn reset(&mut self) -> Result<Reset> {
        self.call(Command::Reset)
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        self.call(|reply| Command::Step(action, reply))
    }

    fn close(&mut self) -> Result<()> {
        self.close.close();
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };
        let (reply_tx, _reply_rx) = oneshot::channel();
        // A full queue means the worker is busy; dropping the sender ends its loop.
        let _ = commands.try_send(Command::Close(reply_tx));
        drop(commands);

        match self.exited.recv_timeout(self.close_grace) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(worker) = self.worker.take() {
                    let _ = worker.join();
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(grace = ?self.close_grace, "env thread did not stop in time, detaching");
                self.worker = None;
            }
        }
        Ok(())
    }

    fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    fn observation_len(&self) -> usize {
        self.observation_len
    }

    fn action_count(&self) -> usize {
        self.action_count
    }
}

impl Drop for ThreadedEnv {
    fn drop(&mut self) {
        let _ = SyncEnv::close(self);
    }
}
