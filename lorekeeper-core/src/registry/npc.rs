//! Non-player character records.

use super::{Record, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback description for an unintroduced NPC without a placeholder.
const DEFAULT_PLACEHOLDER: &str = "an unfamiliar figure";

/// Stand-in used when a placeholder would give the canonical name away.
pub const NAMELESS_PLACEHOLDER: &str = "someone";

/// How an NPC stands toward the party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Ally,
    Neutral,
    Hostile,
    /// Also what older documents with an empty or free-form value load as.
    #[default]
    #[serde(other)]
    Unknown,
}

impl Relationship {
    pub fn name(&self) -> &'static str {
        match self {
            Relationship::Ally => "ally",
            Relationship::Neutral => "neutral",
            Relationship::Hostile => "hostile",
            Relationship::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Relationship {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ally" => Ok(Relationship::Ally),
            "neutral" => Ok(Relationship::Neutral),
            "hostile" => Ok(Relationship::Hostile),
            "unknown" => Ok(Relationship::Unknown),
            _ => Err(ValidationError::InvalidValue {
                field: "relationship_to_party",
                value: s.to_string(),
                expected: "ally, neutral, hostile or unknown",
            }),
        }
    }
}

/// A non-player character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcRecord {
    /// Canonical name. Hidden from the players until `known_to_players`.
    pub name: String,
    pub appearance: String,
    pub personality: String,
    pub goals: String,
    /// Facts the NPC may reveal.
    pub knowledge: String,
    #[serde(rename = "relationship_to_party")]
    pub relationship: Relationship,
    /// Free-form alignment, e.g. "chaotic evil" or "LN".
    pub alignment: String,
    pub known_to_players: bool,
    /// How narration refers to the NPC before introduction.
    pub placeholder: String,
}

impl NpcRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The name the players may see: canonical once introduced, otherwise
    /// the placeholder description.
    pub fn visible_name(&self) -> &str {
        if self.known_to_players {
            &self.name
        } else {
            self.placeholder_or_default()
        }
    }

    /// Placeholder description, falling back to a generic one. A
    /// placeholder that spells out the canonical name is never returned.
    pub fn placeholder_or_default(&self) -> &str {
        let placeholder = self.placeholder.trim();
        if placeholder.is_empty() {
            DEFAULT_PLACEHOLDER
        } else if contains_words(placeholder, &self.name) {
            NAMELESS_PLACEHOLDER
        } else {
            placeholder
        }
    }

    /// Whether the canonical name must be withheld from the players.
    pub fn is_hidden(&self) -> bool {
        !self.known_to_players && !self.name.trim().is_empty()
    }
}

/// Whether the words of `name` appear consecutively in `text`, ignoring case
/// and punctuation.
fn contains_words(text: &str, name: &str) -> bool {
    fn words(s: &str) -> Vec<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
    let needle = words(name);
    !needle.is_empty() && words(text).windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Partial update for an [`NpcRecord`]. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NpcPatch {
    pub appearance: Option<String>,
    pub personality: Option<String>,
    pub goals: Option<String>,
    pub knowledge: Option<String>,
    #[serde(alias = "relationship")]
    pub relationship_to_party: Option<String>,
    pub alignment: Option<String>,
    pub known_to_players: Option<bool>,
    pub placeholder: Option<String>,
}

impl NpcPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn appearance(mut self, value: impl Into<String>) -> Self {
        self.appearance = Some(value.into());
        self
    }

    pub fn personality(mut self, value: impl Into<String>) -> Self {
        self.personality = Some(value.into());
        self
    }

    pub fn goals(mut self, value: impl Into<String>) -> Self {
        self.goals = Some(value.into());
        self
    }

    pub fn knowledge(mut self, value: impl Into<String>) -> Self {
        self.knowledge = Some(value.into());
        self
    }

    pub fn relationship(mut self, value: Relationship) -> Self {
        self.relationship_to_party = Some(value.name().to_string());
        self
    }

    pub fn alignment(mut self, value: impl Into<String>) -> Self {
        self.alignment = Some(value.into());
        self
    }

    pub fn known_to_players(mut self, known: bool) -> Self {
        self.known_to_players = Some(known);
        self
    }

    pub fn placeholder(mut self, value: impl Into<String>) -> Self {
        self.placeholder = Some(value.into());
        self
    }
}

impl Record for NpcRecord {
    type Patch = NpcPatch;
    const KIND: &'static str = "NPC";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn apply(&mut self, patch: NpcPatch) -> Result<(), ValidationError> {
        // Parse first so a bad value leaves every field untouched.
        let relationship = patch
            .relationship_to_party
            .as_deref()
            .map(str::parse::<Relationship>)
            .transpose()?;

        if let Some(v) = patch.appearance {
            self.appearance = v;
        }
        if let Some(v) = patch.personality {
            self.personality = v;
        }
        if let Some(v) = patch.goals {
            self.goals = v;
        }
        if let Some(v) = patch.knowledge {
            self.knowledge = v;
        }
        if let Some(v) = relationship {
            self.relationship = v;
        }
        if let Some(v) = patch.alignment {
            self.alignment = v;
        }
        if let Some(v) = patch.known_to_players {
            self.known_to_players = v;
        }
        if let Some(v) = patch.placeholder {
            self.placeholder = v;
        }
        Ok(())
    }
}
