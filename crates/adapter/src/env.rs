//! The async environment: session + encoder + shaper + frame stack.

use tracing::{debug, info};

use crate::config::{EnvConfig, PostTerminalPolicy};
use crate::core::{
    build_shaper, Arena, FrameStack, ObservationEncoder, RewardShaper, ShapingContext, Viewport,
    ViewportSampler,
};
use crate::error::{AdapterError, Result};
use crate::session::{CloseHandle, Session, SessionConfig, SessionState};
use crate::transport::TransportConfig;
use crate::types::{ActionTable, RawGameState};

/// Result of [`DodgerEnv::reset`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reset {
    pub observation: Vec<f32>,
    pub info: ResetInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResetInfo {
    pub viewport: Viewport,
    /// 1-based episode counter.
    pub episode: u64,
}

/// Result of [`DodgerEnv::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub observation: Vec<f32>,
    pub reward: f32,
    /// The engine reported game over.
    pub terminated: bool,
    /// The episode hit `max_episode_steps`.
    pub truncated: bool,
    pub info: StepInfo,
}

impl Step {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepInfo {
    /// This step restarted a finished episode instead of advancing it.
    pub did_restart: bool,
    /// Engine-reported score, when present.
    pub score: Option<f64>,
    /// Steps taken in the current episode, including this one.
    pub steps: u32,
}

/// A dodger environment bound to one engine connection.
///
/// All mutable episode state is private and changes only after the engine
/// has answered, so a failed call leaves the environment as it was.
pub struct DodgerEnv {
    config: EnvConfig,
    session: Session,
    encoder: ObservationEncoder,
    shaper: Box<dyn RewardShaper>,
    context: ShapingContext,
    frames: FrameStack,
    sampler: ViewportSampler,
    actions: ActionTable,
    arena: Arena,
    frame: Vec<f32>,
    latest: Option<RawGameState>,
    steps: u32,
    episode: u64,
    done: bool,
    close: CloseHandle,
}

impl std::fmt::Debug for DodgerEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DodgerEnv")
            .field("uri", &self.config.uri)
            .field("shaper", &self.shaper.name())
            .field("episode", &self.episode)
            .field("steps", &self.steps)
            .field("done", &self.done)
            .finish()
    }
}

impl DodgerEnv {
    /// Validate `config` and build an unconnected environment.
    pub fn new(config: EnvConfig) -> Result<Self> {
        config.validate()?;
        let encoder = ObservationEncoder::new(config.encoder_config())?;
        let frames = FrameStack::new(config.frame_stack, encoder.observation_len())?;
        let sampler = ViewportSampler::new(config.viewport.clone())?;
        let actions = config.action_table()?;
        let close = CloseHandle::new();
        let session = Session::new(
            SessionConfig {
                transport: TransportConfig {
                    uri: config.uri.clone(),
                    connect_timeout: config.connect_timeout(),
                    queue_capacity: config.queue_capacity,
                    max_protocol_errors: config.max_protocol_errors,
                },
                ownership_handshake: config.ownership_handshake,
                reply_timeout: config.reply_timeout(),
            },
            &close,
        );
        let arena = Arena::new(encoder.viewport(), config.geometry);
        let frame = vec![0.0; encoder.observation_len()];

        Ok(Self {
            shaper: build_shaper(&config.reward),
            config,
            session,
            encoder,
            context: ShapingContext::default(),
            frames,
            sampler,
            actions,
            arena,
            frame,
            latest: None,
            steps: 0,
            episode: 0,
            done: false,
            close,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Length of every observation returned by `reset` and `step`.
    pub fn observation_len(&self) -> usize {
        self.frames.stacked_len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Most recent engine state.
    pub fn latest_state(&self) -> Option<&RawGameState> {
        self.latest.as_ref()
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    /// Connect without starting an episode. `reset` connects on demand too.
    pub async fn connect(&mut self) -> Result<()> {
        self.session.connect().await
    }

    /// Start a new episode.
    pub async fn reset(&mut self) -> Result<Reset> {
        if self.close.is_closed() {
            return Err(AdapterError::Closed);
        }
        let viewport = self.sampler.next_viewport();
        viewport.validate()?;
        let dims = self
            .sampler
            .is_randomized()
            .then_some((viewport.width, viewport.height));

        let state = self.session.reset(dims).await?;

        self.encoder.set_viewport(viewport)?;
        self.arena = Arena::new(viewport, self.config.geometry);
        self.encoder.encode_into(&state, &mut self.frame);
        let observation = self.frames.reset(&self.frame).to_vec();
        self.context = ShapingContext::default();
        self.steps = 0;
        self.episode += 1;
        self.done = state.game_over;
        self.latest = Some(state);

        info!(
            episode = self.episode,
            width = viewport.width,
            height = viewport.height,
            "episode started"
        );
        Ok(Reset {
            observation,
            info: ResetInfo {
                viewport,
                episode: self.episode,
            },
        })
    }

    /// Apply the action at `action` in the action table and advance one frame.
    pub async fn step(&mut self, action: usize) -> Result<Step> {
        if self.close.is_closed() {
            return Err(AdapterError::Closed);
        }
        let label = self
            .actions
            .label(action)
            .ok_or(AdapterError::InvalidAction {
                index: action,
                len: self.actions.len(),
            })?
            .to_string();
        if self.latest.is_none() {
            return Err(AdapterError::NotReset);
        }

        if self.done {
            return match self.config.post_terminal {
                PostTerminalPolicy::RequireReset => Err(AdapterError::EpisodeTerminated),
                PostTerminalPolicy::AutoRestart => {
                    let reset = self.reset().await?;
                    Ok(Step {
                        observation: reset.observation,
                        reward: 0.0,
                        terminated: false,
                        truncated: false,
                        info: StepInfo {
                            did_restart: true,
                            score: None,
                            steps: 0,
                        },
                    })
                }
            };
        }

        let state = self.session.step(&label).await?;

        let terminated = state.game_over;
        let shaped = self.shaper.shape(
            &self.arena,
            self.latest.as_ref(),
            &state,
            terminated,
            &self.context,
        );
        let steps = self.steps.saturating_add(1);
        let truncated = !terminated
            && self
                .config
                .max_episode_steps
                .map(|limit| steps >= limit)
                .unwrap_or(false);

        self.encoder.encode_into(&state, &mut self.frame);
        let observation = self.frames.push(&self.frame).to_vec();
        self.context = shaped.context;
        self.steps = steps;
        self.done = terminated || truncated;
        let score = state.score;
        self.latest = Some(state);

        if self.done {
            info!(
                episode = self.episode,
                steps,
                terminated,
                truncated,
                "episode ended"
            );
        } else {
            debug!(action = %label, reward = shaped.reward, "step");
        }

        Ok(Step {
            observation,
            reward: shaped.reward,
            terminated,
            truncated,
            info: StepInfo {
                did_restart: false,
                score,
                steps,
            },
        })
    }

    /// Trip the close signal and shut the connection. Idempotent.
    pub async fn close(&mut self) {
        self.close.close();
        self.session.close().await;
    }
}
