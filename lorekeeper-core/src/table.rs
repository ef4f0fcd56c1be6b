//! The table: one running session and everything a turn needs.
//!
//! A [`Table`] owns the narrative state, both registries, the encounter
//! engine, the loaded module text and the generator. Each call to
//! [`Table::handle_input`] processes exactly one line of player input to
//! completion and persists the session before returning.

use crate::dispatch::{classify, ControlCommand, Input, UnknownCommandError, CONTROL_PREFIX};
use crate::encounter::{EncounterEngine, EncounterError, StartReason, StatBlock};
use crate::generation::{name_pattern, ContextLimits, GenerationError, Generator, Redactor, Scene};
use crate::registry::{NpcRecord, NpcRegistry, PcRegistry, RegistryError, ValidationError};
use crate::session::{NarrativeState, Role, SessionError, SessionLocator, StoryWindow};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced from a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    UnknownCommand(#[from] UnknownCommandError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Encounter(#[from] EncounterError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl TurnError {
    /// Whether the session can carry on with the next input.
    ///
    /// Persistence failures are not recoverable: the document on disk no
    /// longer matches memory.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TurnError::UnknownCommand(_)
            | TurnError::Generation(_)
            | TurnError::Encounter(_)
            | TurnError::Validation(_) => true,
            TurnError::Registry(RegistryError::Validation(_)) => true,
            TurnError::Session(_) | TurnError::Registry(_) => false,
        }
    }
}

/// Configuration for a [`Table`].
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Directory holding named sessions.
    pub sessions_dir: PathBuf,
    pub npc_store: PathBuf,
    pub pc_store: PathBuf,
    /// Module text file; a missing file means no module.
    pub module_path: Option<PathBuf>,
    /// The PC this player controls.
    pub player_character: Option<String>,
    pub limits: ContextLimits,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("sessions"),
            npc_store: PathBuf::from("npc_store.json"),
            pc_store: PathBuf::from("pc_store.json"),
            module_path: Some(PathBuf::from("data/module_text.txt")),
            player_character: None,
            limits: ContextLimits::default(),
        }
    }
}

impl TableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put the sessions directory and both stores under `root`, with no
    /// module.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            sessions_dir: root.join("sessions"),
            npc_store: root.join("npc_store.json"),
            pc_store: root.join("pc_store.json"),
            module_path: None,
            ..Self::default()
        }
    }

    pub fn with_sessions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sessions_dir = dir.into();
        self
    }

    pub fn with_npc_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.npc_store = path.into();
        self
    }

    pub fn with_pc_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.pc_store = path.into();
        self
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(path.into());
        self
    }

    pub fn without_module(mut self) -> Self {
        self.module_path = None;
        self
    }

    pub fn with_player_character(mut self, name: impl Into<String>) -> Self {
        self.player_character = Some(name.into());
        self
    }

    pub fn with_story_window(mut self, max_entries: usize, max_chars: usize) -> Self {
        self.limits.story_window = StoryWindow::new(max_entries, max_chars);
        self
    }

    pub fn with_history_messages(mut self, count: usize) -> Self {
        self.limits.history_messages = count;
        self
    }

    pub fn with_module_chars(mut self, chars: usize) -> Self {
        self.limits.module_chars = chars;
        self
    }
}

/// How the encounter changed during a narrative turn.
#[derive(Debug)]
pub enum EncounterChange {
    Started(Vec<StatBlock>),
    Ended,
    /// The trigger fired but stat blocks could not be generated; the
    /// narration itself was kept.
    StartFailed(EncounterError),
}

/// The result of one successfully processed input.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Blank input; nothing happened.
    Idle,
    Narration {
        text: String,
        /// NPCs that entered the scene this turn (visible names).
        activated: Vec<String>,
        encounter: Option<EncounterChange>,
    },
    EncounterStarted(Vec<StatBlock>),
    StatBlocks(Vec<StatBlock>),
    EncounterEnded,
    /// `/statblocks` or `/endcombat` without an active encounter.
    NoEncounter,
}

/// A running session.
pub struct Table<G> {
    config: TableConfig,
    state: NarrativeState,
    npcs: NpcRegistry,
    pcs: PcRegistry,
    encounter: EncounterEngine,
    module_text: Option<String>,
    generator: G,
}

impl<G: Generator> Table<G> {
    /// Load the session, both registries and the module text.
    pub async fn open(
        config: TableConfig,
        session: SessionLocator,
        generator: G,
    ) -> Result<Self, TurnError> {
        let state = NarrativeState::load(session, &config.sessions_dir).await?;
        let npcs = NpcRegistry::load(config.npc_store.clone()).await?;
        let pcs = PcRegistry::load(config.pc_store.clone()).await?;
        let module_text = match config.module_path {
            Some(ref path) => load_module_text(path).await,
            None => None,
        };

        tracing::info!(
            session = %state.path().display(),
            npcs = npcs.len(),
            pcs = pcs.len(),
            module = module_text.is_some(),
            "table opened"
        );

        Ok(Self {
            config,
            state,
            npcs,
            pcs,
            encounter: EncounterEngine::new(),
            module_text,
            generator,
        })
    }

    /// Replace the encounter engine, e.g. to plug in other policies.
    pub fn with_encounter_engine(mut self, engine: EncounterEngine) -> Self {
        self.encounter = engine;
        self
    }

    /// Use this module text instead of whatever was loaded.
    pub fn with_module_text(mut self, text: impl Into<String>) -> Self {
        self.module_text = Some(text.into());
        self
    }

    /// Process one line of input.
    pub async fn handle_input(&mut self, raw: &str) -> Result<TurnOutcome, TurnError> {
        match classify(raw) {
            Input::Empty => Ok(TurnOutcome::Idle),
            Input::Control { name, args } => self.handle_control(&name, &args).await,
            Input::Narrative { text } => self.narrate(&text).await,
        }
    }

    async fn handle_control(&mut self, name: &str, args: &[String]) -> Result<TurnOutcome, TurnError> {
        let command: ControlCommand = name.parse()?;
        if !args.is_empty() {
            tracing::debug!(%command, ?args, "ignoring command arguments");
        }
        tracing::info!(%command, "control command");

        match command {
            ControlCommand::Combat => {
                let combatants = self.start_encounter(StartReason::Command).await?;
                Ok(TurnOutcome::EncounterStarted(combatants))
            }
            ControlCommand::StatBlocks => Ok(match self.encounter.stat_blocks() {
                Some(blocks) => TurnOutcome::StatBlocks(blocks.to_vec()),
                None => TurnOutcome::NoEncounter,
            }),
            ControlCommand::EndCombat => Ok(match self.encounter.end() {
                Some(_) => TurnOutcome::EncounterEnded,
                None => TurnOutcome::NoEncounter,
            }),
        }
    }

    async fn narrate(&mut self, player_input: &str) -> Result<TurnOutcome, TurnError> {
        let request = self.scene().narration_request(&self.config.limits, player_input);

        // Nothing is mutated until the generator has answered.
        let raw = self.generator.generate(request).await.map_err(|e| {
            tracing::warn!(error = %e, "narration failed, turn aborted");
            e
        })?;

        let narration = Redactor::for_registry(&self.npcs).redact(&raw).into_owned();
        let log_text = story_text(&narration);
        if log_text.is_empty() {
            tracing::warn!(reply = %raw, "narration empty once control prefixes are stripped");
            return Err(GenerationError::Malformed(format!("narration has no story text: {raw:?}")).into());
        }

        self.state.append_story_log(log_text)?;
        self.state.append_message(Role::Player, player_input);
        self.state.append_message(Role::Assistant, narration.as_str());

        let activated = self.track_mentions(&narration);

        let encounter = if self.encounter.should_end(player_input, &narration) {
            self.encounter.end();
            Some(EncounterChange::Ended)
        } else if self.encounter.should_start(player_input, &narration) {
            match self.start_encounter(StartReason::Narration).await {
                Ok(combatants) => Some(EncounterChange::Started(combatants)),
                Err(e) => {
                    tracing::warn!(error = %e, "encounter not started");
                    Some(EncounterChange::StartFailed(e))
                }
            }
        } else {
            None
        };

        self.state.save().await?;
        tracing::debug!(
            messages = self.state.messages().len(),
            story_log = self.state.story_log().len(),
            "turn complete"
        );

        Ok(TurnOutcome::Narration {
            text: narration,
            activated,
            encounter,
        })
    }

    async fn start_encounter(&mut self, reason: StartReason) -> Result<Vec<StatBlock>, EncounterError> {
        let scene = Scene {
            state: &self.state,
            npcs: &self.npcs,
            pcs: &self.pcs,
            module_text: self.module_text.as_deref(),
            player_character: self.config.player_character.as_deref(),
            encounter: None,
        };
        let encounter = self.encounter.start(&scene, &self.generator, reason).await?;
        Ok(encounter.combatants().to_vec())
    }

    /// Activate registry NPCs whose visible name appears in the narration.
    fn track_mentions(&mut self, narration: &str) -> Vec<String> {
        let mentioned: Vec<(String, String)> = self
            .npcs
            .list()
            .into_iter()
            .filter(|npc| !self.state.is_active(&npc.name))
            .filter_map(|npc| {
                let label = mention_label(npc)?;
                mentions(narration, label).then(|| (npc.name.clone(), label.to_string()))
            })
            .collect();

        let mut activated = Vec::new();
        for (name, label) in mentioned {
            if self.state.activate_npc(&name) {
                tracing::info!(npc = %label, "NPC entered the scene");
                activated.push(label);
            }
        }
        activated
    }

    fn scene(&self) -> Scene<'_> {
        Scene {
            state: &self.state,
            npcs: &self.npcs,
            pcs: &self.pcs,
            module_text: self.module_text.as_deref(),
            player_character: self.config.player_character.as_deref(),
            encounter: self.encounter.current(),
        }
    }

    /// Put a registry NPC on screen and persist the session.
    pub async fn activate_npc(&mut self, name: &str) -> Result<bool, TurnError> {
        let canonical = self
            .npcs
            .get(name)
            .map(|npc| npc.name.clone())
            .ok_or_else(|| ValidationError::UnknownNpc(name.to_string()))?;
        let added = self.state.activate_npc(&canonical);
        if added {
            self.state.save().await?;
        }
        Ok(added)
    }

    /// Take an NPC off screen and persist the session.
    pub async fn deactivate_npc(&mut self, name: &str) -> Result<bool, TurnError> {
        let removed = self.state.deactivate_npc(name);
        if removed {
            self.state.save().await?;
        }
        Ok(removed)
    }

    /// Reset the session and drop any encounter. Registries are untouched.
    pub async fn clear(&mut self) -> Result<(), TurnError> {
        self.encounter.end();
        self.state.clear().await?;
        Ok(())
    }

    pub fn state(&self) -> &NarrativeState {
        &self.state
    }

    pub fn npcs(&self) -> &NpcRegistry {
        &self.npcs
    }

    /// Registry edits are persisted by the registry itself.
    pub fn npcs_mut(&mut self) -> &mut NpcRegistry {
        &mut self.npcs
    }

    pub fn pcs(&self) -> &PcRegistry {
        &self.pcs
    }

    pub fn pcs_mut(&mut self) -> &mut PcRegistry {
        &mut self.pcs
    }

    pub fn encounter(&self) -> &EncounterEngine {
        &self.encounter
    }

    pub fn module_text(&self) -> Option<&str> {
        self.module_text.as_deref()
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }
}

/// What narration would call this NPC, if anything specific. Hidden NPCs
/// whose placeholder is missing or would give the name away have no label.
fn mention_label(npc: &NpcRecord) -> Option<&str> {
    if npc.known_to_players {
        Some(npc.name.trim()).filter(|n| !n.is_empty())
    } else {
        Some(npc.placeholder_or_default()).filter(|p| *p == npc.placeholder.trim())
    }
}

/// Case-insensitive whole-phrase match.
fn mentions(text: &str, phrase: &str) -> bool {
    name_pattern(phrase)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Narration as it goes into the story log: leading control prefixes and
/// whitespace removed, however they interleave.
fn story_text(narration: &str) -> &str {
    narration
        .trim_start_matches(|c: char| c == CONTROL_PREFIX || c.is_whitespace())
        .trim_end()
}

/// Load module text. A missing, unreadable or blank file means no module.
pub async fn load_module_text(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if text.trim().is_empty() => {
            tracing::info!(path = %path.display(), "module file is empty, running without module");
            None
        }
        Ok(text) => {
            tracing::info!(path = %path.display(), chars = text.chars().count(), "module loaded");
            Some(text)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no module found, running without module");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read module, running without module");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NpcPatch;
    use tempfile::TempDir;

    #[test]
    fn test_mentions() {
        assert!(mentions("The Hooded  Scribe looks up.", "the hooded scribe"));
        assert!(!mentions("Brandy spills.", "Bran"));
        assert!(mentions("Bran!", "Bran"));
    }

    #[test]
    fn test_mention_label() {
        let mut npc = NpcRecord::new("Mira");
        assert_eq!(mention_label(&npc), None);
        npc.placeholder = "the hooded scribe".into();
        assert_eq!(mention_label(&npc), Some("the hooded scribe"));
        npc.known_to_players = true;
        assert_eq!(mention_label(&npc), Some("Mira"));

        let mut hask = NpcRecord::new("Hask");
        hask.placeholder = "the crone of Hask Hollow".into();
        assert_eq!(mention_label(&hask), None);
    }

    #[test]
    fn test_story_text_strips_interleaved_prefixes() {
        assert_eq!(story_text("/ /The lantern gutters."), "The lantern gutters.");
        assert_eq!(story_text("  //  Waves crash.  "), "Waves crash.");
        assert_eq!(story_text("/ / "), "");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(TurnError::from(UnknownCommandError { name: "hp".into() }).is_recoverable());
        assert!(TurnError::from(GenerationError::Network("down".into())).is_recoverable());
        assert!(TurnError::from(ValidationError::UnknownNpc("x".into())).is_recoverable());
        assert!(!TurnError::from(SessionError::NotFound {
            path: PathBuf::from("x.json")
        })
        .is_recoverable());
    }

    #[test]
    fn test_config_builder() {
        let config = TableConfig::new()
            .with_sessions_dir("s")
            .with_player_character("Dirk")
            .with_story_window(10, 500)
            .with_history_messages(6)
            .without_module();
        assert_eq!(config.sessions_dir, PathBuf::from("s"));
        assert_eq!(config.player_character.as_deref(), Some("Dirk"));
        assert_eq!(config.limits.story_window, StoryWindow::new(10, 500));
        assert_eq!(config.limits.history_messages, 6);
        assert!(config.module_path.is_none());
        assert_eq!(TableConfig::default().limits.module_chars, 30_000);
    }

    #[tokio::test]
    async fn test_load_module_text() {
        let dir = TempDir::new().unwrap();
        assert!(load_module_text(&dir.path().join("missing.txt")).await.is_none());

        let blank = dir.path().join("blank.txt");
        std::fs::write(&blank, "\n\n").unwrap();
        assert!(load_module_text(&blank).await.is_none());

        let module = dir.path().join("module.txt");
        std::fs::write(&module, "Chapter 1: The Lighthouse").unwrap();
        assert_eq!(
            load_module_text(&module).await.as_deref(),
            Some("Chapter 1: The Lighthouse")
        );
    }

    #[tokio::test]
    async fn test_activate_unknown_npc_is_rejected() {
        let dir = TempDir::new().unwrap();
        let generator = crate::testing::ScriptedGenerator::new();
        let mut table = Table::open(TableConfig::rooted_at(dir.path()), SessionLocator::default(), generator)
            .await
            .unwrap();

        let err = table.activate_npc("Nobody").await.unwrap_err();
        assert!(matches!(err, TurnError::Validation(ValidationError::UnknownNpc(_))));

        table
            .npcs_mut()
            .upsert("Bran", NpcPatch::new())
            .await
            .unwrap();
        assert!(table.activate_npc("bran").await.unwrap());
        assert_eq!(table.state().active_npcs(), ["Bran"]);
        assert!(!table.activate_npc("BRAN").await.unwrap());
    }
}
