use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::id::ClientId;
use crate::types::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Start,
    Stop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// Fire-and-forget instruction published on a client's command topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub target: ClientId,
    pub action: Action,
    pub issued_time: Timestamp,
}

impl Command {
    #[must_use]
    pub const fn new(target: ClientId, action: Action, issued_time: Timestamp) -> Self {
        Self {
            target,
            action,
            issued_time,
        }
    }
}
