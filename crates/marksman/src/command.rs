//! Inbound commands
//!
//! Commands arrive as JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "start"}
//! {"type": "reset"}
//! {"type": "end", "reason": "instructor stopped the drill"}
//! {"type": "zoom", "value": 2.0}
//! {"type": "center", "value": {"x": 0.5, "y": 0.25}}
//! ```
//!
//! Anything that fails to parse or validate is logged and dropped without
//! touching session or aim state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aim::{AimController, AimError, AimPoint};
use crate::session::{EndReason, SessionController, SessionSummary};

/// Relative position inside the current zoom window, both axes in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativePoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Start,
    Reset,
    End {
        #[serde(default)]
        reason: Option<String>,
    },
    Zoom {
        value: f64,
    },
    Center {
        value: RelativePoint,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Malformed command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid command value: {0}")]
    InvalidValue(#[from] AimError),
}

impl Command {
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// What a dispatched command did
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Started,
    Reset(bool),
    Ended(Option<SessionSummary>),
    Zoomed(f64),
    Centered(AimPoint),
}

/// Routes session commands to the session and aim commands to the aim
/// controller.
#[derive(Clone)]
pub struct CommandRouter {
    session: Arc<SessionController>,
    aim: Arc<AimController>,
}

impl CommandRouter {
    pub fn new(session: Arc<SessionController>, aim: Arc<AimController>) -> Self {
        Self { session, aim }
    }

    pub fn dispatch(&self, command: Command) -> Result<CommandOutcome, CommandError> {
        match command {
            Command::Start => {
                self.session.start();
                Ok(CommandOutcome::Started)
            }
            Command::Reset => Ok(CommandOutcome::Reset(self.session.reset())),
            Command::End { reason } => {
                let reason = reason.unwrap_or_else(|| "requested".to_string());
                Ok(CommandOutcome::Ended(
                    self.session.end_session(EndReason::Requested(reason)),
                ))
            }
            Command::Zoom { value } => {
                self.aim.set_zoom(value)?;
                Ok(CommandOutcome::Zoomed(value))
            }
            Command::Center { value } => {
                let point = self.aim.set_center_relative(value.x, value.y)?;
                Ok(CommandOutcome::Centered(point))
            }
        }
    }

    /// Parse and dispatch one raw command, logging and dropping failures.
    pub fn handle_raw(&self, raw: &str) -> Option<CommandOutcome> {
        let result = Command::parse(raw).and_then(|command| {
            info!("Command received: {:?}", command);
            self.dispatch(command)
        });
        match result {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Ignoring command {:?}: {}", raw.trim(), e);
                None
            }
        }
    }
}
