//! Configuration types for encoding, shaping, and viewport selection.
//!
//! Every type here is plain data with serde support so a configuration can be
//! shipped to a worker process as JSON. Call `validate()` before use; the
//! constructors of [`ObservationEncoder`](crate::ObservationEncoder) and
//! [`FrameStack`](crate::FrameStack) do so themselves.

use serde::{Deserialize, Serialize};

use crate::error::{require_positive, ConfigError};
use crate::types::{
    BLOCK_SIZE, DANGER_ZONE_FRACTION, DEFAULT_HEIGHT, DEFAULT_MAX_BLOCKS, DEFAULT_WIDTH,
    HEIGHT_EXPLORATION_RANGE, MAX_HEIGHT, MAX_WIDTH, MIN_HEIGHT, MIN_WIDTH, PLAYER_HEIGHT,
    PLAYER_WIDTH, PLAYER_Y_OFFSET, WIDTH_EXPLORATION_RANGE,
};

/// Viewport size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Fails unless both dimensions lie inside the engine's supported bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (MIN_WIDTH..=MAX_WIDTH).contains(&self.width)
            && (MIN_HEIGHT..=MAX_HEIGHT).contains(&self.height)
        {
            Ok(())
        } else {
            Err(ConfigError::ViewportOutOfRange {
                width: self.width,
                height: self.height,
            })
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

/// Player and block geometry shared by the encoder and the reward shapers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerGeometry {
    pub player_width: f64,
    pub player_height: f64,
    pub player_y_offset: f64,
    pub block_size: f64,
}

impl Default for PlayerGeometry {
    fn default() -> Self {
        Self {
            player_width: PLAYER_WIDTH,
            player_height: PLAYER_HEIGHT,
            player_y_offset: PLAYER_Y_OFFSET,
            block_size: BLOCK_SIZE,
        }
    }
}

impl PlayerGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("player_width", self.player_width)?;
        require_positive("player_height", self.player_height)?;
        require_positive("block_size", self.block_size)?;
        if !self.player_y_offset.is_finite() || self.player_y_offset < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "player_y_offset",
                message: format!("{} (must be finite and >= 0)", self.player_y_offset),
            });
        }
        Ok(())
    }
}

/// The playfield a state was produced in: current viewport plus fixed geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub width: f64,
    pub height: f64,
    pub geometry: PlayerGeometry,
}

impl Arena {
    pub fn new(viewport: Viewport, geometry: PlayerGeometry) -> Self {
        Self {
            width: f64::from(viewport.width),
            height: f64::from(viewport.height),
            geometry,
        }
    }

    /// Top edge of the player paddle.
    pub fn player_y(&self) -> f64 {
        crate::types::player_baseline(
            self.height,
            self.geometry.player_height,
            self.geometry.player_y_offset,
        )
    }
}

/// Output range of every encoded feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Features in `[-1, 1]`, zero at the viewport centre / player position.
    #[default]
    Centered,
    /// Features in `[0, 1]`.
    ///
    /// Scaled by the configured viewport: block `dx` maps through
    /// `dx / (2 * range) + 0.5`, where `range` is the viewport width or the
    /// exploration window's `max_dx`, and the player position through
    /// `x / width`.
    /// Older dodger clients divided by fixed constants instead
    /// (`dx / 1200 + 0.5`, `x / MAX_WIDTH`); those values match only at the
    /// 600 px width and the widest viewport respectively.
    Unit,
}

impl NormalizationMode {
    pub fn bounds(&self) -> (f32, f32) {
        match self {
            NormalizationMode::Centered => (-1.0, 1.0),
            NormalizationMode::Unit => (0.0, 1.0),
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "centered" => Some(NormalizationMode::Centered),
            "unit" => Some(NormalizationMode::Unit),
            _ => None,
        }
    }
}

/// Optional pre-ranking filter: only blocks this close to the player are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplorationWindow {
    pub max_dx: f64,
    pub max_dy: f64,
}

impl Default for ExplorationWindow {
    fn default() -> Self {
        Self {
            max_dx: WIDTH_EXPLORATION_RANGE,
            max_dy: HEIGHT_EXPLORATION_RANGE,
        }
    }
}

/// Observation encoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub viewport: Viewport,
    pub max_blocks: usize,
    pub geometry: PlayerGeometry,
    pub normalization: NormalizationMode,
    /// Off by default.
    pub exploration: Option<ExplorationWindow>,
    /// Emit each block's absolute x after its offsets.
    pub include_block_x: bool,
    /// Emit normalized viewport height and width after the player position.
    pub include_viewport: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            max_blocks: DEFAULT_MAX_BLOCKS,
            geometry: PlayerGeometry::default(),
            normalization: NormalizationMode::Centered,
            exploration: None,
            include_block_x: true,
            include_viewport: false,
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_blocks == 0 {
            return Err(ConfigError::InvalidMaxBlocks);
        }
        self.viewport.validate()?;
        self.geometry.validate()?;
        if let Some(window) = self.exploration {
            require_positive("exploration.max_dx", window.max_dx)?;
            require_positive("exploration.max_dy", window.max_dy)?;
        }
        Ok(())
    }

    /// Leading features that do not depend on blocks.
    pub fn constant_features(&self) -> usize {
        if self.include_viewport {
            3
        } else {
            1
        }
    }

    pub fn per_block_features(&self) -> usize {
        if self.include_block_x {
            3
        } else {
            2
        }
    }

    pub fn observation_len(&self) -> usize {
        self.constant_features() + self.per_block_features() * self.max_blocks
    }
}

/// How the viewport is chosen for each episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewportConfig {
    /// Same viewport every episode; restart requests carry no dimensions.
    Fixed { width: u32, height: u32 },
    /// Fresh uniform draw per episode; restart requests carry the drawn dimensions.
    Randomized {
        min_width: u32,
        max_width: u32,
        min_height: u32,
        max_height: u32,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl Default for ViewportConfig {
    fn default() -> Self {
        ViewportConfig::Fixed {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl ViewportConfig {
    /// Randomize over the full supported range.
    pub fn full_range(seed: Option<u64>) -> Self {
        ViewportConfig::Randomized {
            min_width: MIN_WIDTH,
            max_width: MAX_WIDTH,
            min_height: MIN_HEIGHT,
            max_height: MAX_HEIGHT,
            seed,
        }
    }

    pub fn is_randomized(&self) -> bool {
        matches!(self, ViewportConfig::Randomized { .. })
    }

    /// Viewport the encoder is built with before the first episode.
    pub fn initial(&self) -> Viewport {
        match *self {
            ViewportConfig::Fixed { width, height } => Viewport::new(width, height),
            ViewportConfig::Randomized {
                min_width,
                min_height,
                ..
            } => Viewport::new(min_width, min_height),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            ViewportConfig::Fixed { width, height } => Viewport::new(width, height).validate(),
            ViewportConfig::Randomized {
                min_width,
                max_width,
                min_height,
                max_height,
                ..
            } => {
                if min_width > max_width {
                    return Err(ConfigError::InvalidRange {
                        field: "width",
                        min: min_width,
                        max: max_width,
                    });
                }
                if min_height > max_height {
                    return Err(ConfigError::InvalidRange {
                        field: "height",
                        min: min_height,
                        max: max_height,
                    });
                }
                Viewport::new(min_width, min_height).validate()?;
                Viewport::new(max_width, max_height).validate()
            }
        }
    }

    /// Derive the config for pool slot `slot`: randomized seeds are offset by the slot index.
    pub fn for_slot(&self, slot: usize) -> Self {
        match self.clone() {
            ViewportConfig::Randomized {
                min_width,
                max_width,
                min_height,
                max_height,
                seed,
            } => ViewportConfig::Randomized {
                min_width,
                max_width,
                min_height,
                max_height,
                seed: seed.map(|s| s.wrapping_add(slot as u64)),
            },
            fixed => fixed,
        }
    }
}

/// Parameters for [`TerminalOnly`](crate::reward::TerminalOnly).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalOnlyParams {
    pub alive_reward: f32,
    pub terminal_penalty: f32,
}

impl Default for TerminalOnlyParams {
    fn default() -> Self {
        Self {
            alive_reward: 1.0,
            terminal_penalty: -1000.0,
        }
    }
}

/// Parameters for [`ThreatTransition`](crate::reward::ThreatTransition).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatTransitionParams {
    pub danger_fraction: f64,
    pub baseline: f32,
    pub dodge_bonus: f32,
    pub entry_penalty: f32,
    pub terminal_penalty: f32,
}

impl ThreatTransitionParams {
    pub fn standard() -> Self {
        Self {
            danger_fraction: DANGER_ZONE_FRACTION,
            baseline: 0.001,
            dodge_bonus: 2.0,
            entry_penalty: -1.5,
            terminal_penalty: -5.0,
        }
    }

    /// Softer entry penalty, no dodge bonus, harsher terminal.
    pub fn curriculum() -> Self {
        Self {
            danger_fraction: DANGER_ZONE_FRACTION,
            baseline: 0.005,
            dodge_bonus: 0.0,
            entry_penalty: -0.25,
            terminal_penalty: -10.0,
        }
    }
}

impl Default for ThreatTransitionParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Parameters for [`DirectionalEvasion`](crate::reward::DirectionalEvasion).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalEvasionParams {
    pub danger_fraction: f64,
    pub proximity_rate: f64,
    pub per_frame_scale: f32,
    pub survival_base: f32,
    pub survival_growth: f32,
    pub survival_cap: f32,
    pub terminal_penalty: f32,
}

impl Default for DirectionalEvasionParams {
    fn default() -> Self {
        Self {
            danger_fraction: DANGER_ZONE_FRACTION,
            proximity_rate: 3.0,
            per_frame_scale: 0.01,
            survival_base: 0.001,
            survival_growth: 0.000_01,
            survival_cap: 0.01,
            terminal_penalty: -10.0,
        }
    }
}

/// Reward strategy selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardConfig {
    TerminalOnly(TerminalOnlyParams),
    ThreatTransition(ThreatTransitionParams),
    DirectionalEvasion(DirectionalEvasionParams),
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig::ThreatTransition(ThreatTransitionParams::standard())
    }
}

impl RewardConfig {
    /// Look up a strategy with its default parameters.
    ///
    /// Accepts `terminal_only`, `threat_transition`, `curriculum`, and `directional_evasion`.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "terminal_only" => Some(RewardConfig::TerminalOnly(TerminalOnlyParams::default())),
            "threat_transition" => Some(RewardConfig::ThreatTransition(
                ThreatTransitionParams::standard(),
            )),
            "curriculum" | "threat_transition_curriculum" => Some(
                RewardConfig::ThreatTransition(ThreatTransitionParams::curriculum()),
            ),
            "directional_evasion" => Some(RewardConfig::DirectionalEvasion(
                DirectionalEvasionParams::default(),
            )),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction = match self {
            RewardConfig::TerminalOnly(_) => return Ok(()),
            RewardConfig::ThreatTransition(p) => p.danger_fraction,
            RewardConfig::DirectionalEvasion(p) => {
                require_positive("proximity_rate", p.proximity_rate)?;
                p.danger_fraction
            }
        };
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "danger_fraction",
                message: format!("{} (must be in (0, 1))", fraction),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_encoder_layout_is_player_plus_three_per_block() {
        let config = EncoderConfig::default();
        assert_eq!(config.observation_len(), 1 + 3 * DEFAULT_MAX_BLOCKS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn viewport_layout_adds_two_constant_features() {
        let config = EncoderConfig {
            include_viewport: true,
            include_block_x: false,
            max_blocks: 20,
            ..EncoderConfig::default()
        };
        assert_eq!(config.observation_len(), 3 + 2 * 20);
    }

    #[test]
    fn zero_max_blocks_is_rejected() {
        let config = EncoderConfig {
            max_blocks: 0,
            ..EncoderConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxBlocks));
    }

    #[test]
    fn out_of_range_viewport_is_rejected_not_clamped() {
        let config = ViewportConfig::Fixed {
            width: 100,
            height: 600,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ViewportOutOfRange { width: 100, .. })
        ));
    }

    #[test]
    fn inverted_randomized_range_is_rejected() {
        let config = ViewportConfig::Randomized {
            min_width: 900,
            max_width: 800,
            min_height: 500,
            max_height: 600,
            seed: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRange { field: "width", .. })
        ));
    }

    #[test]
    fn slot_seeds_are_offset() {
        let config = ViewportConfig::full_range(Some(7));
        match config.for_slot(3) {
            ViewportConfig::Randomized { seed, .. } => assert_eq!(seed, Some(10)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reward_config_serde_uses_kind_tag() {
        let json = serde_json::to_value(RewardConfig::default()).unwrap();
        assert_eq!(json["kind"], "threat_transition");
        assert_eq!(json["dodge_bonus"], 2.0);

        let parsed: RewardConfig =
            serde_json::from_str(r#"{"kind":"terminal_only","terminal_penalty":-1.0}"#).unwrap();
        assert_eq!(
            parsed,
            RewardConfig::TerminalOnly(TerminalOnlyParams {
                alive_reward: 1.0,
                terminal_penalty: -1.0,
            })
        );
    }

    #[test]
    fn reward_names_resolve() {
        assert!(matches!(
            RewardConfig::from_name("curriculum"),
            Some(RewardConfig::ThreatTransition(p)) if p.entry_penalty == -0.25
        ));
        assert!(RewardConfig::from_name("directional-evasion").is_some());
        assert!(RewardConfig::from_name("bogus").is_none());
    }

    #[test]
    fn danger_fraction_must_be_a_fraction() {
        let config = RewardConfig::ThreatTransition(ThreatTransitionParams {
            danger_fraction: 1.5,
            ..ThreatTransitionParams::standard()
        });
        assert!(config.validate().is_err());
    }
}
