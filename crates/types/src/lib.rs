//! Core types module - shared data structures and constants
//!
//! This module defines the fundamental types used throughout the workspace.
//! All types are pure data structures with no external dependencies, making them
//! usable in any context (feature encoding, reward shaping, wire protocol).
//!
//! # Game Geometry
//!
//! The engine draws a player paddle near the bottom edge of the viewport and
//! drops square blocks from the top. All positions are top-left corners in pixels.
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `PLAYER_WIDTH` | 60 | Player paddle width |
//! | `PLAYER_HEIGHT` | 20 | Player paddle height |
//! | `PLAYER_Y_OFFSET` | 10 | Gap between paddle and bottom edge |
//! | `BLOCK_SIZE` | 30 | Side length of a falling block |
//!
//! # Viewport Bounds
//!
//! Viewports are randomized per episode within these bounds during training:
//!
//! - **Width**: `MIN_WIDTH`..=`MAX_WIDTH` (360..=2400)
//! - **Height**: `MIN_HEIGHT`..=`MAX_HEIGHT` (500..=1200)
//!
//! # Examples
//!
//! ```
//! use dodger_gym_types::{Action, ActionTable, Block, RawGameState};
//!
//! // Parse an action label (case-insensitive)
//! assert_eq!(Action::from_str("left"), Some(Action::Left));
//!
//! // Resolve a policy index through the default label table
//! let table = ActionTable::default();
//! assert_eq!(table.label(2), Some("NONE"));
//!
//! // Build a state by hand
//! let state = RawGameState::new(370.0, vec![Block::new(400.0, 550.0)], false);
//! assert_eq!(state.blocks.len(), 1);
//! ```

/// Default viewport width in pixels
pub const DEFAULT_WIDTH: u32 = 800;

/// Default viewport height in pixels
pub const DEFAULT_HEIGHT: u32 = 600;

/// Smallest viewport width the engine supports
pub const MIN_WIDTH: u32 = 360;

/// Largest viewport width the engine supports
pub const MAX_WIDTH: u32 = 2400;

/// Smallest viewport height the engine supports
pub const MIN_HEIGHT: u32 = 500;

/// Largest viewport height the engine supports
pub const MAX_HEIGHT: u32 = 1200;

/// Player paddle width in pixels
pub const PLAYER_WIDTH: f64 = 60.0;

/// Player paddle height in pixels
pub const PLAYER_HEIGHT: f64 = 20.0;

/// Gap between the paddle and the bottom edge in pixels
pub const PLAYER_Y_OFFSET: f64 = 10.0;

/// Falling block side length in pixels
pub const BLOCK_SIZE: f64 = 30.0;

/// Engine frame rate (frames per second)
pub const FRAMES_PER_SECOND: u32 = 60;

/// Default number of block slots in an observation
pub const DEFAULT_MAX_BLOCKS: usize = 10;

/// Default horizontal exploration window (pixels either side of the player)
pub const WIDTH_EXPLORATION_RANGE: f64 = 1200.0;

/// Default vertical exploration window: four seconds of block travel at 3 px/frame
pub const HEIGHT_EXPLORATION_RANGE: f64 = 60.0 * 4.0 * 3.0;

/// Fraction of the viewport height above which a block counts as a threat
pub const DANGER_ZONE_FRACTION: f64 = 0.65;

/// Vertical row of the player's top edge for a viewport of the given height.
///
/// # Examples
///
/// ```
/// use dodger_gym_types::player_baseline;
///
/// assert_eq!(player_baseline(600.0, 20.0, 10.0), 570.0);
/// ```
pub fn player_baseline(height: f64, player_height: f64, player_y_offset: f64) -> f64 {
    height - player_height - player_y_offset
}

/// A falling block as reported by the engine.
///
/// Blocks have no identity; the same block in two messages is two unrelated values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub x: f64,
    pub y: f64,
}

impl Block {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One engine state snapshot.
///
/// Produced by the engine and never mutated after it is received.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawGameState {
    /// Left edge of the player paddle
    pub player_x: f64,
    /// Blocks in engine order
    pub blocks: Vec<Block>,
    /// True once the player has collided with a block
    pub game_over: bool,
    /// Seconds survived, when the engine reports it
    pub score: Option<f64>,
}

impl RawGameState {
    pub fn new(player_x: f64, blocks: Vec<Block>, game_over: bool) -> Self {
        Self {
            player_x,
            blocks,
            game_over,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Horizontal movement direction of the player between two states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// Direction of travel from `from_x` to `to_x`, or `None` when the player did not move.
    ///
    /// # Examples
    ///
    /// ```
    /// use dodger_gym_types::Direction;
    ///
    /// assert_eq!(Direction::between(100.0, 95.0), Some(Direction::Left));
    /// assert_eq!(Direction::between(100.0, 100.0), None);
    /// ```
    pub fn between(from_x: f64, to_x: f64) -> Option<Self> {
        let delta = to_x - from_x;
        if delta < -f64::EPSILON {
            Some(Direction::Left)
        } else if delta > f64::EPSILON {
            Some(Direction::Right)
        } else {
            None
        }
    }
}

/// Engine actions
///
/// These are the labels the engine understands in a `step` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Move the paddle left for one frame
    Left,
    /// Move the paddle right for one frame
    Right,
    /// Stay in place for one frame
    None,
}

impl Action {
    /// Parse action from string (case-insensitive)
    ///
    /// # Examples
    ///
    /// ```
    /// use dodger_gym_types::Action;
    ///
    /// assert_eq!(Action::from_str("LEFT"), Some(Action::Left));
    /// assert_eq!(Action::from_str("right"), Some(Action::Right));
    /// assert_eq!(Action::from_str("unknown"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LEFT" => Some(Action::Left),
            "RIGHT" => Some(Action::Right),
            "NONE" => Some(Action::None),
            _ => None,
        }
    }

    /// Convert to the upper-case wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
            Action::None => "NONE",
        }
    }
}

/// Fixed-order table mapping discrete policy indices to wire labels.
///
/// The default order is `[LEFT, RIGHT, NONE]`. Tables may carry labels beyond the
/// built-in [`Action`] set for engines that understand more moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTable {
    labels: Vec<String>,
}

impl ActionTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Wire label for a policy index
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::new(
            [Action::Left, Action::Right, Action::None]
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_parity_geometry_defaults() {
        assert_eq!(PLAYER_WIDTH, 60.0);
        assert_eq!(PLAYER_HEIGHT, 20.0);
        assert_eq!(PLAYER_Y_OFFSET, 10.0);
        assert_eq!(BLOCK_SIZE, 30.0);
        assert_eq!(HEIGHT_EXPLORATION_RANGE, 720.0);
    }

    #[test]
    fn default_action_table_order() {
        let table = ActionTable::default();
        assert_eq!(table.len(), 3);
        assert_eq!(table.label(0), Some("LEFT"));
        assert_eq!(table.label(1), Some("RIGHT"));
        assert_eq!(table.label(2), Some("NONE"));
        assert_eq!(table.label(3), None);
    }

    #[test]
    fn action_labels_round_trip_through_table() {
        let table = ActionTable::default();
        for i in 0..table.len() {
            let label = table.label(i).unwrap();
            assert_eq!(Action::from_str(label).unwrap().as_str(), label);
        }
    }

    #[test]
    fn baseline_for_default_viewport() {
        assert_eq!(
            player_baseline(DEFAULT_HEIGHT as f64, PLAYER_HEIGHT, PLAYER_Y_OFFSET),
            570.0
        );
    }

    #[test]
    fn direction_ignores_sub_epsilon_jitter() {
        assert_eq!(Direction::between(10.0, 10.0 + f64::EPSILON / 2.0), None);
        assert_eq!(Direction::between(10.0, 15.0), Some(Direction::Right));
    }
}
