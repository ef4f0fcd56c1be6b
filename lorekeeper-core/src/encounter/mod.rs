//! Encounter engine.
//!
//! Tracks whether combat is underway and caches the stat blocks of its
//! combatants. Encounters live only as long as the process; they are never
//! written to the session document.
//!
//! ```text
//! NO_ENCOUNTER --(/combat or trigger)--> ENCOUNTER_ACTIVE
//! ENCOUNTER_ACTIVE --(/endcombat or resolution)--> NO_ENCOUNTER
//! ENCOUNTER_ACTIVE --(/combat)--> ENCOUNTER_ACTIVE (fresh stat blocks)
//! ```

mod statblock;
mod trigger;
mod willingness;

pub use statblock::{generate_stat_block, parse_stat_block, StatBlock, ThreatTier};
pub use trigger::{CombatTrigger, KeywordTrigger};
pub use willingness::{Alignment, AlignmentWillingness, Ethics, Morals, Willingness, WillingnessPolicy};

use crate::generation::{GenerationError, Generator, Scene};
use crate::registry::NpcRecord;
use thiserror::Error;

/// Errors from encounter transitions.
#[derive(Debug, Error)]
pub enum EncounterError {
    #[error("could not generate a stat block for {combatant}: {source}")]
    StatBlock {
        combatant: String,
        #[source]
        source: GenerationError,
    },
}

impl EncounterError {
    /// The underlying generation failure.
    pub fn generation_error(&self) -> &GenerationError {
        match self {
            EncounterError::StatBlock { source, .. } => source,
        }
    }
}

/// What started an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartReason {
    /// The `/combat` command.
    Command,
    /// The trigger policy fired on a narrative turn.
    Narration,
}

/// An active encounter.
#[derive(Debug, Clone, PartialEq)]
pub struct Encounter {
    combatants: Vec<StatBlock>,
    reason: StartReason,
}

impl Encounter {
    /// Stat blocks in the order the combatants were selected.
    pub fn combatants(&self) -> &[StatBlock] {
        &self.combatants
    }

    pub fn reason(&self) -> StartReason {
        self.reason
    }
}

/// Owns the current encounter and the policies that drive it.
pub struct EncounterEngine {
    current: Option<Encounter>,
    trigger: Box<dyn CombatTrigger>,
    willingness: Box<dyn WillingnessPolicy>,
}

impl Default for EncounterEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EncounterEngine {
    /// Engine with the keyword trigger and alignment-based willingness.
    pub fn new() -> Self {
        Self {
            current: None,
            trigger: Box::new(KeywordTrigger),
            willingness: Box::new(AlignmentWillingness),
        }
    }

    pub fn with_trigger(mut self, trigger: impl CombatTrigger + 'static) -> Self {
        self.trigger = Box::new(trigger);
        self
    }

    pub fn with_willingness(mut self, policy: impl WillingnessPolicy + 'static) -> Self {
        self.willingness = Box::new(policy);
        self
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&Encounter> {
        self.current.as_ref()
    }

    /// Cached stat blocks, or `None` when no encounter is active.
    pub fn stat_blocks(&self) -> Option<&[StatBlock]> {
        self.current.as_ref().map(Encounter::combatants)
    }

    pub fn should_start(&self, player_input: &str, narration: &str) -> bool {
        let start = !self.is_active() && self.trigger.should_start(player_input, narration);
        if start {
            tracing::debug!(policy = self.trigger.version(), "combat trigger fired");
        }
        start
    }

    pub fn should_end(&self, player_input: &str, narration: &str) -> bool {
        self.is_active() && self.trigger.should_end(player_input, narration)
    }

    /// Active NPCs willing to fight, in scene order.
    pub fn select_combatants<'a>(&self, scene: &Scene<'a>) -> Vec<&'a NpcRecord> {
        scene
            .active_npcs()
            .into_iter()
            .filter(|npc| {
                let willingness = self.willingness.willingness(npc);
                tracing::debug!(npc = %npc.visible_name(), %willingness, "combat willingness");
                willingness.is_combatant()
            })
            .collect()
    }

    /// Start (or restart) an encounter, generating every stat block first.
    ///
    /// If any stat block fails, the previous encounter state is kept as it
    /// was and nothing partial is committed.
    pub async fn start(
        &mut self,
        scene: &Scene<'_>,
        generator: &dyn Generator,
        reason: StartReason,
    ) -> Result<&Encounter, EncounterError> {
        let mut combatants = Vec::new();
        for npc in self.select_combatants(scene) {
            let block = generate_stat_block(generator, scene, npc)
                .await
                .map_err(|source| EncounterError::StatBlock {
                    combatant: npc.visible_name().to_string(),
                    source,
                })?;
            combatants.push(block);
        }

        tracing::info!(?reason, combatants = combatants.len(), "encounter started");
        Ok(&*self.current.insert(Encounter { combatants, reason }))
    }

    /// End the active encounter, discarding its stat blocks.
    pub fn end(&mut self) -> Option<Encounter> {
        let ended = self.current.take();
        if ended.is_some() {
            tracing::info!("encounter ended");
        }
        ended
    }
}

impl std::fmt::Debug for EncounterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncounterEngine")
            .field("current", &self.current)
            .field("trigger", &self.trigger.version())
            .finish()
    }
}
