//! Batched environment pool.
//!
//! Every call fans a request out to all slots before collecting any reply,
//! so slots run in parallel, and results always come back in slot order.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapter::core::{ConfigError, ViewportConfig};
use crate::adapter::EnvConfig;
use crate::error::{PoolError, Result};
use crate::slot::{worker_binary, ProcessSlot, SlotChannel, ThreadSlot};
use crate::wire::{WorkerRequest, WorkerResponse};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_envs: usize,
    /// Template for every slot.
    pub env: EnvConfig,
    /// Base viewport seed; slot `i` uses `seed + i`. Only used with randomized viewports.
    pub seed: Option<u64>,
    /// Upper bound on any single worker reply, including auto-resets.
    pub reply_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Worker executable for process slots. Resolved with [`worker_binary`] when unset.
    pub worker_binary: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_envs: 8,
            env: EnvConfig::default(),
            seed: None,
            reply_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
            worker_binary: None,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.num_envs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "num_envs",
                message: "0 (must be > 0)".to_string(),
            });
        }
        self.env.validate()
    }

    /// Environment config for slot `slot`.
    pub fn slot_config(&self, slot: usize) -> EnvConfig {
        let mut config = self.env.clone();
        if let (Some(base), ViewportConfig::Randomized { seed, .. }) =
            (self.seed, &mut config.viewport)
        {
            *seed = Some(base);
        }
        config.viewport = config.viewport.for_slot(slot);
        config
    }
}

/// One batched step.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStep {
    pub observations: Vec<Vec<f32>>,
    pub rewards: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    /// Final observation of slots whose episode ended this step.
    pub terminal_observations: Vec<Option<Vec<f32>>>,
}

impl BatchStep {
    fn with_capacity(n: usize) -> Self {
        Self {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            terminated: Vec::with_capacity(n),
            truncated: Vec::with_capacity(n),
            terminal_observations: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// K independent environments stepped in lockstep.
pub struct EnvPool {
    slots: Vec<Box<dyn SlotChannel>>,
    observation_len: usize,
    action_count: usize,
    reply_timeout: Duration,
    shutdown_grace: Duration,
    closed: bool,
    /// First slot whose reply stream can no longer be trusted.
    out_of_sync: Option<usize>,
}

impl std::fmt::Debug for EnvPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvPool")
            .field("num_envs", &self.slots.len())
            .field("observation_len", &self.observation_len)
            .field("closed", &self.closed)
            .field("out_of_sync", &self.out_of_sync)
            .finish()
    }
}

impl EnvPool {
    /// One `dodger-worker` child process per slot.
    pub fn spawn_processes(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let binary = match &config.worker_binary {
            Some(path) => path.clone(),
            None => worker_binary()?,
        };
        let slots = (0..config.num_envs)
            .map(|i| ProcessSlot::spawn(&binary, i).map(|s| Box::new(s) as Box<dyn SlotChannel>))
            .collect::<Result<Vec<_>>>()?;
        info!(num_envs = config.num_envs, binary = %binary.display(), "spawned process pool");
        Self::init(slots, &config)
    }

    /// One thread per slot in this process.
    pub fn spawn_threads(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let slots = (0..config.num_envs)
            .map(|i| ThreadSlot::spawn(i).map(|s| Box::new(s) as Box<dyn SlotChannel>))
            .collect::<Result<Vec<_>>>()?;
        info!(num_envs = config.num_envs, "spawned thread pool");
        Self::init(slots, &config)
    }

    /// Build a pool over caller-provided slots.
    pub fn from_slots(slots: Vec<Box<dyn SlotChannel>>, config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        if slots.len() != config.num_envs {
            return Err(ConfigError::InvalidValue {
                field: "num_envs",
                message: format!("{} (but {} slots were given)", config.num_envs, slots.len()),
            }
            .into());
        }
        Self::init(slots, config)
    }

    fn init(slots: Vec<Box<dyn SlotChannel>>, config: &PoolConfig) -> Result<Self> {
        let mut pool = Self {
            slots,
            observation_len: 0,
            action_count: 0,
            reply_timeout: config.reply_timeout,
            shutdown_grace: config.shutdown_grace,
            closed: false,
            out_of_sync: None,
        };
        let replies = pool.round_trip(|slot| WorkerRequest::Init {
            slot,
            config: Box::new(config.slot_config(slot)),
        })?;
        for (slot, reply) in replies.into_iter().enumerate() {
            match reply {
                WorkerResponse::Ready {
                    observation_len,
                    action_count,
                } => {
                    if slot == 0 {
                        pool.observation_len = observation_len;
                        pool.action_count = action_count;
                    } else if observation_len != pool.observation_len
                        || action_count != pool.action_count
                    {
                        return Err(PoolError::Wire(format!(
                            "slot {slot} reports a different shape"
                        )));
                    }
                }
                other => return Err(unexpected(slot, "ready", &other)),
            }
        }
        Ok(pool)
    }

    pub fn num_envs(&self) -> usize {
        self.slots.len()
    }

    pub fn observation_len(&self) -> usize {
        self.observation_len
    }

    pub fn action_count(&self) -> usize {
        self.action_count
    }

    /// Reset every slot; observations in slot order.
    pub fn reset_all(&mut self) -> Result<Vec<Vec<f32>>> {
        let replies = self.round_trip(|_| WorkerRequest::Reset)?;
        replies
            .into_iter()
            .enumerate()
            .map(|(slot, reply)| match reply {
                WorkerResponse::Reset { observation } => Ok(observation),
                other => Err(unexpected(slot, "reset", &other)),
            })
            .collect()
    }

    /// Step every slot with its action. Finished slots are reset before returning.
    pub fn step_all(&mut self, actions: &[usize]) -> Result<BatchStep> {
        if actions.len() != self.slots.len() {
            return Err(PoolError::ActionCount {
                expected: self.slots.len(),
                got: actions.len(),
            });
        }
        let replies = self.round_trip(|slot| WorkerRequest::Step {
            action: actions[slot],
        })?;

        let mut batch = BatchStep::with_capacity(replies.len());
        for (slot, reply) in replies.into_iter().enumerate() {
            match reply {
                WorkerResponse::Step {
                    observation,
                    reward,
                    terminated,
                    truncated,
                    terminal_observation,
                    ..
                } => {
                    batch.observations.push(observation);
                    batch.rewards.push(reward);
                    batch.terminated.push(terminated);
                    batch.truncated.push(truncated);
                    batch.terminal_observations.push(terminal_observation);
                }
                other => return Err(unexpected(slot, "step", &other)),
            }
        }
        Ok(batch)
    }

    /// Close every slot. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for slot in &mut self.slots {
            slot.shutdown(self.shutdown_grace);
        }
        info!("pool closed");
    }

    /// Send one request per slot, then collect every reply in slot order.
    ///
    /// All replies are drained even when one fails so the slots stay in sync;
    /// the first failure is returned. A send or receive failure (timeout,
    /// exit, i/o, bad frame) leaves that slot's stream in an unknown position,
    /// so every later call fails with [`PoolError::OutOfSync`].
    fn round_trip(
        &mut self,
        mut request: impl FnMut(usize) -> WorkerRequest,
    ) -> Result<Vec<WorkerResponse>> {
        if self.closed {
            return Err(PoolError::Closed);
        }
        if let Some(slot) = self.out_of_sync {
            return Err(PoolError::OutOfSync { slot });
        }
        let mut broken = None;
        let mut sent = Vec::with_capacity(self.slots.len());
        let mut first_err = None;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            match slot.send(&request(i)) {
                Ok(()) => sent.push(true),
                Err(e) => {
                    sent.push(false);
                    broken.get_or_insert(i);
                    first_err.get_or_insert(e);
                }
            }
        }

        let mut replies = Vec::with_capacity(self.slots.len());
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if !sent[i] {
                continue;
            }
            match slot.recv(self.reply_timeout) {
                Ok(WorkerResponse::Error { kind, message }) => {
                    warn!(slot = i, kind = %kind, error = %message, "worker error");
                    first_err.get_or_insert(PoolError::WorkerFailed {
                        slot: i,
                        kind,
                        message,
                    });
                }
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    warn!(slot = i, error = %e, "slot reply stream lost");
                    broken.get_or_insert(i);
                    first_err.get_or_insert(e);
                }
            }
        }
        if broken.is_some() {
            self.out_of_sync = broken;
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }
}

impl Drop for EnvPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn unexpected(slot: usize, expected: &str, got: &WorkerResponse) -> PoolError {
    PoolError::Wire(format!(
        "slot {slot}: expected {expected} response, got {}",
        got.name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Slot that replays canned responses.
    struct Canned {
        slot: usize,
        replies: VecDeque<WorkerResponse>,
        seen: Vec<WorkerRequest>,
    }

    impl SlotChannel for Canned {
        fn slot(&self) -> usize {
            self.slot
        }

        fn send(&mut self, request: &WorkerRequest) -> Result<()> {
            self.seen.push(request.clone());
            Ok(())
        }

        fn recv(&mut self, _timeout: Duration) -> Result<WorkerResponse> {
            self.replies
                .pop_front()
                .ok_or(PoolError::WorkerExited { slot: self.slot })
        }

        fn shutdown(&mut self, _grace: Duration) {}
    }

    fn canned(slot: usize, replies: Vec<WorkerResponse>) -> Box<dyn SlotChannel> {
        let mut all = VecDeque::from(vec![WorkerResponse::Ready {
            observation_len: 2,
            action_count: 3,
        }]);
        all.extend(replies);
        Box::new(Canned {
            slot,
            replies: all,
            seen: Vec::new(),
        })
    }

    fn step_reply(value: f32, terminal: bool) -> WorkerResponse {
        WorkerResponse::Step {
            observation: vec![value, value],
            reward: value,
            terminated: terminal,
            truncated: false,
            terminal_observation: terminal.then(|| vec![-value, -value]),
            did_restart: false,
        }
    }

    fn config(n: usize) -> PoolConfig {
        PoolConfig {
            num_envs: n,
            ..PoolConfig::default()
        }
    }

    #[test]
    fn step_results_come_back_in_slot_order() {
        let slots = vec![
            canned(0, vec![step_reply(0.0, false)]),
            canned(1, vec![step_reply(1.0, true)]),
            canned(2, vec![step_reply(2.0, false)]),
        ];
        let mut pool = EnvPool::from_slots(slots, &config(3)).unwrap();
        assert_eq!(pool.observation_len(), 2);

        let batch = pool.step_all(&[0, 1, 2]).unwrap();
        assert_eq!(batch.rewards, vec![0.0, 1.0, 2.0]);
        assert_eq!(batch.terminated, vec![false, true, false]);
        assert_eq!(batch.terminal_observations[1], Some(vec![-1.0, -1.0]));
        assert_eq!(batch.terminal_observations[0], None);
    }

    #[test]
    fn wrong_action_count_is_rejected() {
        let mut pool = EnvPool::from_slots(vec![canned(0, vec![])], &config(1)).unwrap();
        assert!(matches!(
            pool.step_all(&[0, 1]),
            Err(PoolError::ActionCount {
                expected: 1,
                got: 2
            })
        ));
    }

    #[test]
    fn worker_error_is_reported_after_draining_every_slot() {
        let slots = vec![
            canned(0, vec![WorkerResponse::error("timeout", "slow engine")]),
            canned(1, vec![step_reply(1.0, false)]),
        ];
        let mut pool = EnvPool::from_slots(slots, &config(2)).unwrap();
        match pool.step_all(&[0, 0]) {
            Err(PoolError::WorkerFailed { slot: 0, kind, .. }) => assert_eq!(kind, "timeout"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn closed_pool_rejects_calls() {
        let mut pool = EnvPool::from_slots(vec![canned(0, vec![])], &config(1)).unwrap();
        pool.close();
        assert!(matches!(pool.reset_all(), Err(PoolError::Closed)));
    }

    #[test]
    fn slot_seeds_follow_base_seed() {
        let config = PoolConfig {
            num_envs: 4,
            env: EnvConfig {
                viewport: ViewportConfig::full_range(None),
                ..EnvConfig::default()
            },
            seed: Some(100),
            ..PoolConfig::default()
        };
        match config.slot_config(3).viewport {
            ViewportConfig::Randomized { seed, .. } => assert_eq!(seed, Some(103)),
            other => panic!("unexpected {other:?}"),
        }
        // Fixed viewports have nothing to seed.
        let fixed = PoolConfig {
            seed: Some(100),
            ..PoolConfig::default()
        };
        assert_eq!(fixed.slot_config(1).viewport, ViewportConfig::default());
    }

    #[test]
    fn zero_envs_is_rejected() {
        assert!(EnvPool::from_slots(vec![], &config(0)).is_err());
    }

    #[test]
    fn slot_count_must_match_num_envs() {
        let slots = vec![canned(0, vec![]), canned(1, vec![])];
        assert!(matches!(
            EnvPool::from_slots(slots, &config(3)),
            Err(PoolError::Config(_))
        ));
    }

    /// Slot whose replies are scripted as results, so a timeout can be
    /// followed by the late reply it was waiting for.
    struct Scripted {
        script: VecDeque<Result<WorkerResponse>>,
    }

    impl SlotChannel for Scripted {
        fn slot(&self) -> usize {
            0
        }

        fn send(&mut self, _request: &WorkerRequest) -> Result<()> {
            Ok(())
        }

        fn recv(&mut self, _timeout: Duration) -> Result<WorkerResponse> {
            self.script
                .pop_front()
                .unwrap_or(Err(PoolError::WorkerExited { slot: 0 }))
        }

        fn shutdown(&mut self, _grace: Duration) {}
    }

    #[test]
    fn timeout_leaves_the_pool_out_of_sync() {
        let after = Duration::from_millis(200);
        let slot = Scripted {
            script: VecDeque::from(vec![
                Ok(WorkerResponse::Ready {
                    observation_len: 2,
                    action_count: 3,
                }),
                Err(PoolError::Timeout { slot: 0, after }),
                // Late reply to the timed-out step.
                Ok(step_reply(1.0, false)),
                Ok(step_reply(2.0, false)),
            ]),
        };
        let mut pool = EnvPool::from_slots(vec![Box::new(slot)], &config(1)).unwrap();

        assert!(matches!(
            pool.step_all(&[0]),
            Err(PoolError::Timeout { slot: 0, .. })
        ));
        // The late reply must never be handed out as the next step's result.
        assert!(matches!(
            pool.step_all(&[0]),
            Err(PoolError::OutOfSync { slot: 0 })
        ));
        assert!(matches!(
            pool.reset_all(),
            Err(PoolError::OutOfSync { slot: 0 })
        ));
        pool.close();
        assert!(matches!(pool.reset_all(), Err(PoolError::Closed)));
    }

    #[test]
    fn worker_error_reply_keeps_the_pool_usable() {
        let slots = vec![canned(
            0,
            vec![
                WorkerResponse::error("episode_terminated", "call reset()"),
                step_reply(3.0, false),
            ],
        )];
        let mut pool = EnvPool::from_slots(slots, &config(1)).unwrap();
        assert!(matches!(
            pool.step_all(&[0]),
            Err(PoolError::WorkerFailed { .. })
        ));
        assert_eq!(pool.step_all(&[0]).unwrap().rewards, vec![3.0]);
    }
}
