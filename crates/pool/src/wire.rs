//! Pool <-> worker messages, one JSON document per line.
//!
//! ```text
//! pool   -> worker  {"type":"init","slot":0,"config":{...}}
//! worker -> pool    {"type":"ready","observation_len":124,"action_count":3}
//! pool   -> worker  {"type":"step","action":2}
//! worker -> pool    {"type":"step","observation":[...],"reward":0.001,"terminated":false,...}
//! ```

use serde::{Deserialize, Serialize};

use crate::adapter::EnvConfig;
use crate::error::{PoolError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Build the environment. Must be the first request.
    Init { slot: usize, config: Box<EnvConfig> },
    Reset,
    Step { action: usize },
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ready {
        observation_len: usize,
        action_count: usize,
    },
    Reset {
        observation: Vec<f32>,
    },
    /// When the episode ended, `observation` already belongs to the next
    /// episode and the final one is in `terminal_observation`.
    Step {
        observation: Vec<f32>,
        reward: f32,
        terminated: bool,
        truncated: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        terminal_observation: Option<Vec<f32>>,
        #[serde(default)]
        did_restart: bool,
    },
    Closed,
    Error {
        kind: String,
        message: String,
    },
}

impl WorkerResponse {
    pub fn error(kind: impl Into<String>, message: impl ToString) -> Self {
        WorkerResponse::Error {
            kind: kind.into(),
            message: message.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkerResponse::Ready { .. } => "ready",
            WorkerResponse::Reset { .. } => "reset",
            WorkerResponse::Step { .. } => "step",
            WorkerResponse::Closed => "closed",
            WorkerResponse::Error { .. } => "error",
        }
    }
}

pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    let mut line = serde_json::to_string(msg).map_err(|e| PoolError::Wire(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

pub fn decode<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T> {
    serde_json::from_str(line.trim()).map_err(|e| PoolError::Wire(format!("{e}: {line}")))
}
