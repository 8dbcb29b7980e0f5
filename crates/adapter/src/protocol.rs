//! Engine wire messages.
//!
//! Every message is one JSON object tagged by `type`.
//!
//! ```text
//! client -> engine   {"type":"restart","width":800,"height":600}
//! client -> engine   {"type":"step","action":"LEFT"}
//! client -> engine   {"type":"become_shared_owner"}
//! engine -> client   {"type":"state","state":{"playerX":370,"blocks":[{"x":400,"y":550}],"gameOver":false}}
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{Block, RawGameState};

/// Messages sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a new episode. Dimensions are only sent when the viewport changes per episode.
    Restart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    /// Advance one frame with the given action label.
    Step { action: String },
    /// Ask to join the engine's shared owners. The engine does not reply.
    BecomeSharedOwner,
}

impl ClientMessage {
    pub fn restart(viewport: Option<(u32, u32)>) -> Self {
        match viewport {
            Some((width, height)) => ClientMessage::Restart {
                width: Some(width),
                height: Some(height),
            },
            None => ClientMessage::Restart {
                width: None,
                height: None,
            },
        }
    }

    pub fn step(action: impl Into<String>) -> Self {
        ClientMessage::Step {
            action: action.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Restart { .. } => "restart",
            ClientMessage::Step { .. } => "step",
            ClientMessage::BecomeSharedOwner => "become_shared_owner",
        }
    }

    /// Whether the engine answers this message with a state.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, ClientMessage::BecomeSharedOwner)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Block as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub x: f64,
    pub y: f64,
}

/// Body of a `state` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    #[serde(rename = "playerX")]
    pub player_x: f64,
    /// Accepted and ignored; the player row is derived from the viewport.
    #[serde(rename = "playerY", default, skip_serializing_if = "Option::is_none")]
    pub player_y: Option<f64>,
    #[serde(default)]
    pub blocks: Vec<BlockPayload>,
    #[serde(rename = "gameOver")]
    pub game_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl From<StatePayload> for RawGameState {
    fn from(p: StatePayload) -> Self {
        RawGameState {
            player_x: p.player_x,
            blocks: p.blocks.into_iter().map(|b| Block::new(b.x, b.y)).collect(),
            game_over: p.game_over,
            score: p.score,
        }
    }
}

impl From<&RawGameState> for StatePayload {
    fn from(s: &RawGameState) -> Self {
        StatePayload {
            player_x: s.player_x,
            player_y: None,
            blocks: s
                .blocks
                .iter()
                .map(|b| BlockPayload { x: b.x, y: b.y })
                .collect(),
            game_over: s.game_over,
            score: s.score,
        }
    }
}

/// Messages sent by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    State { state: StatePayload },
}

impl ServerMessage {
    pub fn state(state: &RawGameState) -> Self {
        ServerMessage::State {
            state: state.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    State(RawGameState),
    /// Well-formed JSON with a `type` this client does not handle.
    Unknown(String),
}

/// Decode one inbound frame.
///
/// Unknown message types are not an error: the engine may grow new
/// broadcasts, and those are skipped by the receive loop.
pub fn parse_message(json: &str) -> Result<ParsedMessage, serde_json::Error> {
    match serde_json::from_str::<ServerMessage>(json) {
        Ok(ServerMessage::State { state }) => Ok(ParsedMessage::State(state.into())),
        Err(e) => {
            #[derive(Deserialize)]
            struct TypeOnly {
                #[serde(rename = "type")]
                msg_type: Option<String>,
            }
            let msg_type = serde_json::from_str::<TypeOnly>(json)?
                .msg_type
                .unwrap_or_else(|| "unknown".to_string());
            if msg_type != "state" {
                return Ok(ParsedMessage::Unknown(msg_type));
            }
            Err(e)
        }
    }
}
