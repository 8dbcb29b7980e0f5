//! Adapter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{
    ConfigError, EncoderConfig, ExplorationWindow, NormalizationMode, PlayerGeometry,
    RewardConfig, ViewportConfig,
};
use crate::types::{ActionTable, DEFAULT_HEIGHT, DEFAULT_MAX_BLOCKS, DEFAULT_WIDTH};

pub const DEFAULT_URI: &str = "ws://localhost:8080";

/// What `step()` does after the episode has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostTerminalPolicy {
    /// Fail with `EpisodeTerminated` until `reset()` is called.
    #[default]
    RequireReset,
    /// Restart the engine and return the fresh observation with reward 0.
    AutoRestart,
}

/// Full environment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// `ws://`, `wss://` or `tcp://` endpoint of the engine.
    pub uri: String,
    pub viewport: ViewportConfig,
    pub max_blocks: usize,
    pub geometry: PlayerGeometry,
    pub normalization: NormalizationMode,
    pub exploration: Option<ExplorationWindow>,
    pub include_block_x: bool,
    pub include_viewport: bool,
    pub reward: RewardConfig,
    pub frame_stack: usize,
    /// Truncate episodes after this many steps.
    pub max_episode_steps: Option<u32>,
    pub post_terminal: PostTerminalPolicy,
    /// Send `become_shared_owner` once per connection before the first restart.
    pub ownership_handshake: bool,
    pub connect_timeout_ms: u64,
    pub reply_timeout_ms: u64,
    pub queue_capacity: usize,
    pub max_protocol_errors: u32,
    pub close_grace_ms: u64,
    /// Action labels indexed by the policy's discrete action.
    pub actions: Vec<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            viewport: ViewportConfig::default(),
            max_blocks: DEFAULT_MAX_BLOCKS,
            geometry: PlayerGeometry::default(),
            normalization: NormalizationMode::Centered,
            exploration: None,
            include_block_x: true,
            include_viewport: false,
            reward: RewardConfig::default(),
            frame_stack: 4,
            max_episode_steps: None,
            post_terminal: PostTerminalPolicy::RequireReset,
            ownership_handshake: false,
            connect_timeout_ms: 5_000,
            reply_timeout_ms: 5_000,
            queue_capacity: 64,
            max_protocol_errors: 16,
            close_grace_ms: 1_000,
            actions: ActionTable::default().labels().to_vec(),
        }
    }
}

impl EnvConfig {
    /// Build from `DODGER_*` environment variables.
    ///
    /// Unset or unparseable variables keep their defaults. Call
    /// [`validate`](Self::validate) on the result before use.
    pub fn from_env() -> Self {
        use std::env;

        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            env::var(key).ok().and_then(|s| s.trim().parse().ok())
        }

        fn flag(key: &str) -> Option<bool> {
            env::var(key)
                .ok()
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        }

        let mut config = Self::default();

        if let Ok(uri) = env::var("DODGER_URI") {
            let uri = uri.trim();
            if !uri.is_empty() {
                config.uri = uri.to_string();
            }
        }

        let width = parsed("DODGER_WIDTH").unwrap_or(DEFAULT_WIDTH);
        let height = parsed("DODGER_HEIGHT").unwrap_or(DEFAULT_HEIGHT);
        config.viewport = if flag("DODGER_RANDOMIZE_VIEWPORT").unwrap_or(false) {
            ViewportConfig::full_range(parsed("DODGER_SEED"))
        } else {
            ViewportConfig::Fixed { width, height }
        };

        if let Some(n) = parsed("DODGER_MAX_BLOCKS") {
            config.max_blocks = n;
        }
        if let Some(n) = parsed("DODGER_FRAME_STACK") {
            config.frame_stack = n;
        }
        if let Some(reward) = env::var("DODGER_REWARD")
            .ok()
            .and_then(|s| RewardConfig::from_name(s.trim()))
        {
            config.reward = reward;
        }
        config.max_episode_steps = parsed("DODGER_MAX_EPISODE_STEPS").filter(|n| *n > 0);
        if flag("DODGER_AUTO_RESTART").unwrap_or(false) {
            config.post_terminal = PostTerminalPolicy::AutoRestart;
        }
        if let Some(ownership) = flag("DODGER_OWNERSHIP") {
            config.ownership_handshake = ownership;
        }
        if let Some(ms) = parsed("DODGER_REPLY_TIMEOUT_MS") {
            config.reply_timeout_ms = ms;
        }

        config
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            viewport: self.viewport.initial(),
            max_blocks: self.max_blocks,
            geometry: self.geometry,
            normalization: self.normalization,
            exploration: self.exploration,
            include_block_x: self.include_block_x,
            include_viewport: self.include_viewport,
        }
    }

    pub fn action_table(&self) -> Result<ActionTable, ConfigError> {
        if self.actions.is_empty() {
            return Err(ConfigError::EmptyActionTable);
        }
        for (i, label) in self.actions.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "actions",
                    message: format!("label {i} is empty"),
                });
            }
            if self.actions[..i].contains(label) {
                return Err(ConfigError::DuplicateAction(label.clone()));
            }
        }
        Ok(ActionTable::new(self.actions.clone()))
    }

    /// Length of one stacked observation.
    pub fn observation_len(&self) -> usize {
        self.encoder_config().observation_len() * self.frame_stack
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme_ok = ["ws://", "wss://", "tcp://"]
            .iter()
            .any(|scheme| self.uri.starts_with(scheme));
        if !scheme_ok {
            return Err(ConfigError::InvalidValue {
                field: "uri",
                message: format!("{} (expected ws://, wss:// or tcp://)", self.uri),
            });
        }
        self.viewport.validate()?;
        self.encoder_config().validate()?;
        self.reward.validate()?;
        if self.frame_stack == 0 {
            return Err(ConfigError::InvalidFrameStack);
        }
        if self.max_episode_steps == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_episode_steps",
                message: "0 (must be > 0 when set)".to_string(),
            });
        }
        for (field, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("reply_timeout_ms", self.reply_timeout_ms),
            ("queue_capacity", self.queue_capacity as u64),
            ("max_protocol_errors", u64::from(self.max_protocol_errors)),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: "0 (must be > 0)".to_string(),
                });
            }
        }
        self.action_table()?;
        Ok(())
    }
}
