//! Input classification.
//!
//! Every line the player types is classified exactly once: either it is an
//! out-of-character control command (leading `/`) or it is narrative input
//! for the story.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reserved prefix marking control input.
pub const CONTROL_PREFIX: char = '/';

/// A control command name that the table does not recognize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command: /{name}")]
pub struct UnknownCommandError {
    pub name: String,
}

/// One classified line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Nothing but whitespace.
    Empty,
    /// Out-of-character input, e.g. `/combat`.
    Control { name: String, args: Vec<String> },
    /// In-character input for the story.
    Narrative { text: String },
}

/// Classify a raw line. Leading and trailing whitespace is ignored.
pub fn classify(raw: &str) -> Input {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }

    match trimmed.strip_prefix(CONTROL_PREFIX) {
        Some(rest) => {
            let mut words = rest.split_whitespace();
            let name = words.next().unwrap_or_default().to_lowercase();
            let args = words.map(str::to_string).collect();
            Input::Control { name, args }
        }
        None => Input::Narrative {
            text: trimmed.to_string(),
        },
    }
}

/// The recognized control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Force an encounter to start.
    Combat,
    /// Show the cached stat blocks.
    StatBlocks,
    /// End the active encounter.
    EndCombat,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 3] = [
        ControlCommand::Combat,
        ControlCommand::StatBlocks,
        ControlCommand::EndCombat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Combat => "combat",
            ControlCommand::StatBlocks => "statblocks",
            ControlCommand::EndCombat => "endcombat",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            ControlCommand::Combat => "start an encounter with the willing NPCs in the scene",
            ControlCommand::StatBlocks => "show the stat blocks of the current encounter",
            ControlCommand::EndCombat => "end the current encounter",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CONTROL_PREFIX, self.name())
    }
}

impl FromStr for ControlCommand {
    type Err = UnknownCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches(CONTROL_PREFIX).to_lowercase();
        ControlCommand::ALL
            .into_iter()
            .find(|cmd| cmd.name() == name)
            .ok_or(UnknownCommandError { name })
    }
}
