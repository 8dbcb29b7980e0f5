//! Where a pool slot's environment lives.
//!
//! - [`ProcessSlot`]: a child `dodger-worker` process, talking over stdio
//! - [`ThreadSlot`]: a dedicated thread in this process

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{PoolError, Result};
use crate::wire::{self, WorkerRequest, WorkerResponse};
use crate::worker::WorkerCore;

/// Name of the worker executable.
pub const WORKER_BIN: &str = "dodger-worker";

/// One request/response channel to a slot's environment.
pub trait SlotChannel: Send {
    fn slot(&self) -> usize;

    fn send(&mut self, request: &WorkerRequest) -> Result<()>;

    fn recv(&mut self, timeout: Duration) -> Result<WorkerResponse>;

    /// Ask the worker to close and wait up to `grace` for it to stop.
    fn shutdown(&mut self, grace: Duration);
}

/// Locate the worker executable.
///
/// `DODGER_WORKER_BIN` wins; otherwise look next to the current executable
/// and one directory up (test binaries live in `target/<profile>/deps`).
pub fn worker_binary() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("DODGER_WORKER_BIN") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let exe = std::env::current_exe()?;
    let name = format!("{WORKER_BIN}{}", std::env::consts::EXE_SUFFIX);
    let mut dir = exe.parent();
    for _ in 0..2 {
        let Some(d) = dir else { break };
        let candidate = d.join(&name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        dir = d.parent();
    }
    Err(PoolError::Spawn {
        slot: 0,
        message: format!("{name} not found; set DODGER_WORKER_BIN"),
    })
}

// ---------------------------------------------------------------------------
// ProcessSlot
// ---------------------------------------------------------------------------

/// Environment hosted in a child process.
pub struct ProcessSlot {
    slot: usize,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    responses: mpsc::Receiver<Result<WorkerResponse>>,
}

impl ProcessSlot {
    pub fn spawn(binary: &Path, slot: usize) -> Result<Self> {
        let mut child = Command::new(binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| PoolError::Spawn {
                slot,
                message: format!("{}: {e}", binary.display()),
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                return Err(PoolError::Spawn {
                    slot,
                    message: "worker stdio not captured".to_string(),
                });
            }
        };

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("dodger-slot-{slot}"))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let item = match line {
                        Ok(line) if line.trim().is_empty() => continue,
                        Ok(line) => wire::decode::<WorkerResponse>(&line),
                        Err(e) => Err(PoolError::Io(e)),
                    };
                    if tx.send(item).is_err() {
                        return;
                    }
                }
                let _ = tx.send(Err(PoolError::WorkerExited { slot }));
            })?;

        debug!(slot, pid = child.id(), "spawned worker process");
        Ok(Self {
            slot,
            child,
            stdin: Some(BufWriter::new(stdin)),
            responses: rx,
        })
    }

    fn wait_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(_) => return false,
            }
        }
        false
    }
}

impl SlotChannel for ProcessSlot {
    fn slot(&self) -> usize {
        self.slot
    }

    fn send(&mut self, request: &WorkerRequest) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(PoolError::WorkerExited { slot: self.slot })?;
        let line = wire::encode(request)?;
        stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|_| PoolError::WorkerExited { slot: self.slot })
    }

    fn recv(&mut self, timeout: Duration) -> Result<WorkerResponse> {
        match self.responses.recv_timeout(timeout) {
            Ok(item) => item,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(PoolError::Timeout {
                slot: self.slot,
                after: timeout,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(PoolError::WorkerExited { slot: self.slot })
            }
        }
    }

    fn shutdown(&mut self, grace: Duration) {
        if self.send(&WorkerRequest::Close).is_ok() {
            let _ = self.recv(grace);
        }
        // Closing stdin also tells the worker to stop.
        self.stdin = None;
        if !self.wait_exit(grace) {
            warn!(slot = self.slot, "worker did not exit in time, killing");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

impl Drop for ProcessSlot {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

// ---------------------------------------------------------------------------
// ThreadSlot
// ---------------------------------------------------------------------------

/// Environment hosted on a dedicated thread of this process.
pub struct ThreadSlot {
    slot: usize,
    requests: Option<mpsc::Sender<WorkerRequest>>,
    responses: mpsc::Receiver<WorkerResponse>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ThreadSlot {
    pub fn spawn(slot: usize) -> Result<Self> {
        let (req_tx, req_rx) = mpsc::channel::<WorkerRequest>();
        let (resp_tx, resp_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(format!("dodger-slot-{slot}"))
            .spawn(move || {
                let mut core = WorkerCore::new();
                for request in req_rx {
                    let (response, stop) = core.handle(request);
                    if resp_tx.send(response).is_err() || stop {
                        break;
                    }
                }
                core.handle(WorkerRequest::Close);
            })
            .map_err(|e| PoolError::Spawn {
                slot,
                message: e.to_string(),
            })?;
        Ok(Self {
            slot,
            requests: Some(req_tx),
            responses: resp_rx,
            worker: Some(worker),
        })
    }
}

impl SlotChannel for ThreadSlot {
    fn slot(&self) -> usize {
        self.slot
    }

    fn send(&mut self, request: &WorkerRequest) -> Result<()> {
        self.requests
            .as_ref()
            .ok_or(PoolError::WorkerExited { slot: self.slot })?
            .send(request.clone())
            .map_err(|_| PoolError::WorkerExited { slot: self.slot })
    }

    fn recv(&mut self, timeout: Duration) -> Result<WorkerResponse> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(PoolError::Timeout {
                slot: self.slot,
                after: timeout,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(PoolError::WorkerExited { slot: self.slot })
            }
        }
    }

    fn shutdown(&mut self, grace: Duration) {
        if self.send(&WorkerRequest::Close).is_ok() {
            let _ = self.recv(grace);
        }
        self.requests = None;
        let Some(worker) = self.worker.take() else {
            return;
        };
        let deadline = Instant::now() + grace;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if worker.is_finished() {
            let _ = worker.join();
        } else {
            warn!(slot = self.slot, "slot thread still busy, detaching");
        }
    }
}
