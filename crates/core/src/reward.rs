//! Reward shaping strategies.
//!
//! Every strategy implements [`RewardShaper`]. A shaper is stateless; the state it
//! needs across steps lives in a [`ShapingContext`] owned by the adapter, which
//! passes the current context in and commits the returned one.
//!
//! - [`TerminalOnly`]: constant reward per live step, fixed penalty on termination
//! - [`ThreatTransition`]: bonus for leaving danger, penalty for entering it
//! - [`DirectionalEvasion`]: dense reward for moving away from nearby threats

use crate::config::{
    Arena, DirectionalEvasionParams, RewardConfig, TerminalOnlyParams, ThreatTransitionParams,
};
use crate::types::{Block, Direction, RawGameState};

/// Per-episode shaping state. `Default` is the value at episode start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShapingContext {
    pub was_threatened: bool,
    pub steps_survived: u32,
    pub last_direction: Option<Direction>,
}

/// Result of shaping one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shaped {
    pub reward: f32,
    pub context: ShapingContext,
}

/// A reward strategy.
pub trait RewardShaper: Send + std::fmt::Debug {
    /// Score the transition `previous -> current` and return the next context.
    ///
    /// `previous` is `None` on the first step after a reset.
    fn shape(
        &self,
        arena: &Arena,
        previous: Option<&RawGameState>,
        current: &RawGameState,
        done: bool,
        context: &ShapingContext,
    ) -> Shaped;

    fn name(&self) -> &'static str;
}

/// Build the shaper selected by `config`.
pub fn build_shaper(config: &RewardConfig) -> Box<dyn RewardShaper> {
    match *config {
        RewardConfig::TerminalOnly(params) => Box::new(TerminalOnly::new(params)),
        RewardConfig::ThreatTransition(params) => Box::new(ThreatTransition::new(params)),
        RewardConfig::DirectionalEvasion(params) => Box::new(DirectionalEvasion::new(params)),
    }
}

/// True if `block` is inside the danger band and horizontally overlaps the player.
pub fn is_threat(arena: &Arena, danger_fraction: f64, player_x: f64, block: &Block) -> bool {
    let band_top = arena.height * danger_fraction;
    if block.y <= band_top {
        return false;
    }
    let player_end = player_x + arena.geometry.player_width;
    let block_end = block.x + arena.geometry.block_size;
    player_x < block_end && player_end > block.x
}

pub fn is_player_threatened(arena: &Arena, danger_fraction: f64, state: &RawGameState) -> bool {
    state
        .blocks
        .iter()
        .any(|b| is_threat(arena, danger_fraction, state.player_x, b))
}

// ---------------------------------------------------------------------------
// TerminalOnly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TerminalOnly {
    params: TerminalOnlyParams,
}

impl TerminalOnly {
    pub fn new(params: TerminalOnlyParams) -> Self {
        Self { params }
    }
}

impl RewardShaper for TerminalOnly {
    fn shape(
        &self,
        _arena: &Arena,
        _previous: Option<&RawGameState>,
        _current: &RawGameState,
        done: bool,
        context: &ShapingContext,
    ) -> Shaped {
        if done {
            return Shaped {
                reward: self.params.terminal_penalty,
                context: *context,
            };
        }
        Shaped {
            reward: self.params.alive_reward,
            context: ShapingContext {
                steps_survived: context.steps_survived.saturating_add(1),
                ..*context
            },
        }
    }

    fn name(&self) -> &'static str {
        "terminal_only"
    }
}

// ---------------------------------------------------------------------------
// ThreatTransition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ThreatTransition {
    params: ThreatTransitionParams,
}

impl ThreatTransition {
    pub fn new(params: ThreatTransitionParams) -> Self {
        Self { params }
    }
}

impl RewardShaper for ThreatTransition {
    fn shape(
        &self,
        arena: &Arena,
        _previous: Option<&RawGameState>,
        current: &RawGameState,
        done: bool,
        context: &ShapingContext,
    ) -> Shaped {
        if done {
            // Context is left as-is on termination.
            return Shaped {
                reward: self.params.terminal_penalty,
                context: *context,
            };
        }

        let now = is_player_threatened(arena, self.params.danger_fraction, current);
        let reward = match (context.was_threatened, now) {
            (true, false) => self.params.dodge_bonus,
            (false, true) => self.params.entry_penalty,
            _ => self.params.baseline,
        };

        Shaped {
            reward,
            context: ShapingContext {
                was_threatened: now,
                steps_survived: context.steps_survived.saturating_add(1),
                ..*context
            },
        }
    }

    fn name(&self) -> &'static str {
        "threat_transition"
    }
}

// ---------------------------------------------------------------------------
// DirectionalEvasion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DirectionalEvasion {
    params: DirectionalEvasionParams,
}

impl DirectionalEvasion {
    pub fn new(params: DirectionalEvasionParams) -> Self {
        Self { params }
    }

    /// Signed, unscaled evasion score summed over every threatening block.
    fn evasion_score(&self, arena: &Arena, state: &RawGameState, moved: Option<Direction>) -> f64 {
        let band_top = arena.height * self.params.danger_fraction;
        let band_height = (arena.height - band_top).max(f64::EPSILON);
        let player_center = state.player_x + arena.geometry.player_width / 2.0;

        let mut total = 0.0;
        for block in &state.blocks {
            if !is_threat(arena, self.params.danger_fraction, state.player_x, block) {
                continue;
            }
            let depth = ((block.y - band_top) / band_height).clamp(0.0, 1.0);
            let proximity = (self.params.proximity_rate * depth).exp() - 1.0;

            let block_center = block.x + arena.geometry.block_size / 2.0;
            let away = if block_center >= player_center {
                Direction::Left
            } else {
                Direction::Right
            };
            if moved == Some(away) {
                total += proximity;
            } else {
                total -= proximity;
            }
        }
        total
    }
}

impl RewardShaper for DirectionalEvasion {
    fn shape(
        &self,
        arena: &Arena,
        previous: Option<&RawGameState>,
        current: &RawGameState,
        done: bool,
        context: &ShapingContext,
    ) -> Shaped {
        if done {
            return Shaped {
                reward: self.params.terminal_penalty,
                context: *context,
            };
        }

        let moved = previous.and_then(|p| Direction::between(p.player_x, current.player_x));
        let evasion = self.evasion_score(arena, current, moved) as f32 * self.params.per_frame_scale;
        let survival = (self.params.survival_base
            + self.params.survival_growth * context.steps_survived as f32)
            .min(self.params.survival_cap);

        Shaped {
            reward: evasion + survival,
            context: ShapingContext {
                was_threatened: is_player_threatened(arena, self.params.danger_fraction, current),
                steps_survived: context.steps_survived.saturating_add(1),
                last_direction: moved,
            },
        }
    }

    fn name(&self) -> &'static str {
        "directional_evasion"
    }
}
