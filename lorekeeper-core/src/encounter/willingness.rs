//! Whether an NPC will fight the party.

use crate::registry::{NpcRecord, Relationship};
use std::fmt;

/// How readily an NPC joins a fight against the party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Willingness {
    Eager,
    Willing,
    Reluctant,
    Refuses,
}

impl Willingness {
    /// Only eager and willing NPCs join the fight; reluctant ones stand aside.
    pub fn is_combatant(&self) -> bool {
        matches!(self, Willingness::Eager | Willingness::Willing)
    }
}

impl fmt::Display for Willingness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Willingness::Eager => "eager",
            Willingness::Willing => "willing",
            Willingness::Reluctant => "reluctant",
            Willingness::Refuses => "refuses",
        })
    }
}

/// Derives willingness from an NPC record.
pub trait WillingnessPolicy: Send + Sync {
    fn willingness(&self, npc: &NpcRecord) -> Willingness;
}

/// Lawful / neutral / chaotic axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ethics {
    Lawful,
    Neutral,
    Chaotic,
}

/// Good / neutral / evil axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Morals {
    Good,
    Neutral,
    Evil,
}

/// A parsed alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub ethics: Ethics,
    pub morals: Morals,
}

impl Alignment {
    pub const TRUE_NEUTRAL: Alignment = Alignment {
        ethics: Ethics::Neutral,
        morals: Morals::Neutral,
    };

    /// Parse free-form alignment text: "chaotic evil", "Lawful Good",
    /// abbreviations such as "CE" or "N", "true neutral", "unaligned".
    ///
    /// Returns `None` for empty or unrecognizable text.
    pub fn parse(text: &str) -> Option<Alignment> {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }

        if let Some(alignment) = Self::parse_abbreviation(&lower) {
            return Some(alignment);
        }

        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |w: &str| words.contains(&w);

        let ethics = if has("lawful") {
            Some(Ethics::Lawful)
        } else if has("chaotic") {
            Some(Ethics::Chaotic)
        } else {
            None
        };
        let morals = if has("good") {
            Some(Morals::Good)
        } else if has("evil") {
            Some(Morals::Evil)
        } else {
            None
        };

        let neutral = has("neutral") || has("unaligned");
        match (ethics, morals) {
            (None, None) if neutral => Some(Self::TRUE_NEUTRAL),
            (None, None) => None,
            (ethics, morals) => Some(Alignment {
                ethics: ethics.unwrap_or(Ethics::Neutral),
                morals: morals.unwrap_or(Morals::Neutral),
            }),
        }
    }

    fn parse_abbreviation(lower: &str) -> Option<Alignment> {
        let compact: String = lower.chars().filter(|c| c.is_alphabetic()).collect();
        if compact == "n" || compact == "tn" {
            return Some(Self::TRUE_NEUTRAL);
        }
        let mut chars = compact.chars();
        let (Some(e), Some(m), None) = (chars.next(), chars.next(), chars.next()) else {
            return None;
        };
        let ethics = match e {
            'l' => Ethics::Lawful,
            'n' => Ethics::Neutral,
            'c' => Ethics::Chaotic,
            _ => return None,
        };
        let morals = match m {
            'g' => Morals::Good,
            'n' => Morals::Neutral,
            'e' => Morals::Evil,
            _ => return None,
        };
        Some(Alignment { ethics, morals })
    }
}

/// The default policy: relationship first, then alignment.
///
/// | relationship | evil      | neutral   | good      |
/// |--------------|-----------|-----------|-----------|
/// | ally         | refuses   | refuses   | refuses   |
/// | hostile      | eager     | willing   | reluctant |
/// | unknown      | willing   | reluctant | refuses   |
/// | neutral      | reluctant | refuses   | refuses   |
///
/// Chaotic NPCs are one step less reluctant. An alignment that cannot be
/// parsed counts as true neutral.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignmentWillingness;

impl WillingnessPolicy for AlignmentWillingness {
    fn willingness(&self, npc: &NpcRecord) -> Willingness {
        use Willingness::*;

        let alignment = Alignment::parse(&npc.alignment).unwrap_or(Alignment::TRUE_NEUTRAL);
        let base = match (npc.relationship, alignment.morals) {
            (Relationship::Ally, _) => return Refuses,
            (Relationship::Hostile, Morals::Evil) => Eager,
            (Relationship::Hostile, Morals::Neutral) => Willing,
            (Relationship::Hostile, Morals::Good) => Reluctant,
            (Relationship::Unknown, Morals::Evil) => Willing,
            (Relationship::Unknown, Morals::Neutral) => Reluctant,
            (Relationship::Unknown, Morals::Good) => Refuses,
            (Relationship::Neutral, Morals::Evil) => Reluctant,
            (Relationship::Neutral, _) => Refuses,
        };

        match (alignment.ethics, base) {
            (Ethics::Chaotic, Reluctant) => Willing,
            _ => base,
        }
    }
}
