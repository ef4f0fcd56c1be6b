//! Narrative stat blocks.

use crate::generation::{GenerationError, Generator, Redactor, Scene};
use crate::registry::NpcRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How dangerous a combatant is, in story terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatTier {
    Minion,
    #[default]
    Standard,
    Elite,
    Boss,
}

impl ThreatTier {
    /// Lenient parse; anything unrecognized is a standard threat.
    pub fn from_loose(s: &str) -> Self {
        let s = s.to_lowercase();
        if s.contains("boss") || s.contains("legendary") {
            ThreatTier::Boss
        } else if s.contains("elite") || s.contains("dangerous") {
            ThreatTier::Elite
        } else if s.contains("minion") || s.contains("weak") {
            ThreatTier::Minion
        } else {
            ThreatTier::Standard
        }
    }
}

impl fmt::Display for ThreatTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThreatTier::Minion => "minion",
            ThreatTier::Standard => "standard",
            ThreatTier::Elite => "elite",
            ThreatTier::Boss => "boss",
        })
    }
}

/// Combat descriptors for one combatant. No numbers, only flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    /// Canonical name if introduced, otherwise the placeholder description.
    pub display_name: String,
    pub threat: ThreatTier,
    pub abilities: Vec<String>,
    pub condition: String,
    pub tactics: String,
}

impl fmt::Display for StatBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.display_name, self.threat)?;
        if !self.condition.is_empty() {
            writeln!(f, "  Condition: {}", self.condition)?;
        }
        for ability in &self.abilities {
            writeln!(f, "  - {ability}")?;
        }
        if !self.tactics.is_empty() {
            writeln!(f, "  Tactics: {}", self.tactics)?;
        }
        Ok(())
    }
}

/// Reply shape requested from the generator.
#[derive(Debug, Deserialize)]
struct StatBlockReply {
    #[serde(default)]
    threat: Option<String>,
    #[serde(default)]
    abilities: Vec<String>,
    #[serde(default)]
    condition: String,
    #[serde(default)]
    tactics: String,
}

/// Generate one stat block for `npc`.
pub async fn generate_stat_block(
    generator: &dyn Generator,
    scene: &Scene<'_>,
    npc: &NpcRecord,
) -> Result<StatBlock, GenerationError> {
    let reply = generator.generate(scene.stat_block_request(npc)).await?;
    let redactor = Redactor::for_registry(scene.npcs);
    parse_stat_block(npc.visible_name(), &reply, &redactor)
}

/// Parse a generator reply into a stat block, scrubbing hidden names.
pub fn parse_stat_block(
    display_name: &str,
    reply: &str,
    redactor: &Redactor,
) -> Result<StatBlock, GenerationError> {
    let json = extract_json(reply)
        .ok_or_else(|| GenerationError::Malformed(format!("no JSON object in stat block reply: {reply}")))?;
    let parsed: StatBlockReply = serde_json::from_str(json)
        .map_err(|e| GenerationError::Malformed(format!("{e}: {json}")))?;

    let scrub = |s: &str| redactor.redact(s.trim()).into_owned();
    Ok(StatBlock {
        display_name: scrub(display_name),
        threat: parsed
            .threat
            .as_deref()
            .map(ThreatTier::from_loose)
            .unwrap_or_default(),
        abilities: parsed
            .abilities
            .iter()
            .map(|a| scrub(a))
            .filter(|a| !a.is_empty())
            .collect(),
        condition: scrub(&parsed.condition),
        tactics: scrub(&parsed.tactics),
    })
}

/// The outermost `{ ... }` span, tolerating prose or code fences around it.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
