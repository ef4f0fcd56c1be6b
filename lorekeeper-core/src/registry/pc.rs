//! Player character records.
//!
//! Narrative facts only; there are no ability scores or hit points here.

use super::{Record, ValidationError};
use serde::{Deserialize, Serialize};

/// A player character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcRecord {
    pub name: String,
    pub race: String,
    pub class: String,
    pub appearance: String,
    pub personality: String,
    pub backstory: String,
    /// Free-form notes.
    pub notes: String,
}

impl PcRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update for a [`PcRecord`]. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PcPatch {
    pub race: Option<String>,
    pub class: Option<String>,
    pub appearance: Option<String>,
    pub personality: Option<String>,
    pub backstory: Option<String>,
    pub notes: Option<String>,
}

impl PcPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn race(mut self, value: impl Into<String>) -> Self {
        self.race = Some(value.into());
        self
    }

    pub fn class(mut self, value: impl Into<String>) -> Self {
        self.class = Some(value.into());
        self
    }

    pub fn appearance(mut self, value: impl Into<String>) -> Self {
        self.appearance = Some(value.into());
        self
    }

    pub fn personality(mut self, value: impl Into<String>) -> Self {
        self.personality = Some(value.into());
        self
    }

    pub fn backstory(mut self, value: impl Into<String>) -> Self {
        self.backstory = Some(value.into());
        self
    }

    pub fn notes(mut self, value: impl Into<String>) -> Self {
        self.notes = Some(value.into());
        self
    }
}

impl Record for PcRecord {
    type Patch = PcPatch;
    const KIND: &'static str = "PC";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn apply(&mut self, patch: PcPatch) -> Result<(), ValidationError> {
        let PcPatch {
            race,
            class,
            appearance,
            personality,
            backstory,
            notes,
        } = patch;

        for (slot, value) in [
            (&mut self.race, race),
            (&mut self.class, class),
            (&mut self.appearance, appearance),
            (&mut self.personality, personality),
            (&mut self.backstory, backstory),
            (&mut self.notes, notes),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_merges() {
        let mut pc = PcRecord::new("Dirk Daring");
        pc.apply(PcPatch::new().race("halfling").class("rogue")).unwrap();
        pc.apply(PcPatch::new().notes("owes the ferryman two silver")).unwrap();

        assert_eq!(pc.race, "halfling");
        assert_eq!(pc.class, "rogue");
        assert_eq!(pc.notes, "owes the ferryman two silver");
        assert_eq!(pc.backstory, "");
    }

    #[test]
    fn test_legacy_document_shape() {
        let raw = r#"{"name": "John Doe", "race": "human", "class": "fighter",
                      "appearance": "", "personality": "", "backstory": "", "notes": ""}"#;
        let pc: PcRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(pc.class, "fighter");
    }

    #[test]
    fn test_patch_rejects_numeric_stats() {
        let err = serde_json::from_str::<PcPatch>(r#"{"strength": 16}"#);
        assert!(err.is_err());
    }
}
