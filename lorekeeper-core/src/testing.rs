//! Testing utilities.
//!
//! - [`ScriptedGenerator`] answers generation requests from a queue, without
//!   any network calls, and records every request it sees
//! - [`TestTable`] wraps a [`Table`] rooted in a scratch directory
//! - `assert_*` helpers for checking table state

use crate::encounter::StatBlock;
use crate::generation::{GenerationError, GenerationRequest, Generator, Purpose};
use crate::registry::{NpcPatch, PcPatch};
use crate::session::SessionLocator;
use crate::table::{Table, TableConfig, TurnError, TurnOutcome};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Narration returned once the script runs out.
pub const FALLBACK_NARRATION: &str = "The world holds its breath, waiting.";

/// Stat-block reply returned when none is queued.
pub const DEFAULT_STAT_BLOCK: &str = r#"{
  "threat": "standard",
  "abilities": ["a practiced strike", "fights dirty when cornered"],
  "condition": "fresh",
  "tactics": "presses the weakest target and flees when outmatched"
}"#;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A generator that replays scripted replies.
///
/// Narration and stat-block requests draw from separate queues.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    narration: Mutex<VecDeque<Result<String, GenerationError>>>,
    stat_blocks: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue narration for the next narrative turn.
    pub fn push_narration(&self, text: impl Into<String>) {
        lock(&self.narration).push_back(Ok(text.into()));
    }

    /// Make the next narrative turn fail.
    pub fn push_narration_error(&self, error: GenerationError) {
        lock(&self.narration).push_back(Err(error));
    }

    /// Queue a raw stat-block reply (normally JSON).
    pub fn push_stat_block(&self, reply: impl Into<String>) {
        lock(&self.stat_blocks).push_back(Ok(reply.into()));
    }

    /// Make the next stat-block request fail.
    pub fn push_stat_block_error(&self, error: GenerationError) {
        lock(&self.stat_blocks).push_back(Err(error));
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        lock(&self.requests).last().cloned()
    }

    /// Number of requests for the given purpose.
    pub fn request_count(&self, purpose: Purpose) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.purpose == purpose)
            .count()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let purpose = request.purpose;
        lock(&self.requests).push(request);

        match purpose {
            Purpose::Narration => lock(&self.narration)
                .pop_front()
                .unwrap_or_else(|| Ok(FALLBACK_NARRATION.to_string())),
            Purpose::StatBlock => lock(&self.stat_blocks)
                .pop_front()
                .unwrap_or_else(|| Ok(DEFAULT_STAT_BLOCK.to_string())),
        }
    }
}

/// A table over a scratch directory, driven by a [`ScriptedGenerator`].
pub struct TestTable {
    pub table: Table<ScriptedGenerator>,
}

impl TestTable {
    /// Open the default session with both stores under `root`.
    pub async fn new(root: &Path) -> Result<Self, TurnError> {
        Self::with_config(TableConfig::rooted_at(root), SessionLocator::default()).await
    }

    pub async fn with_config(config: TableConfig, session: SessionLocator) -> Result<Self, TurnError> {
        let table = Table::open(config, session, ScriptedGenerator::new()).await?;
        Ok(Self { table })
    }

    /// Add (or update) an NPC in the registry.
    pub async fn add_npc(&mut self, name: &str, patch: NpcPatch) -> &mut Self {
        if let Err(e) = self.table.npcs_mut().upsert(name, patch).await {
            panic!("failed to add NPC {name}: {e}");
        }
        self
    }

    /// Add an NPC and put it on screen.
    pub async fn add_active_npc(&mut self, name: &str, patch: NpcPatch) -> &mut Self {
        self.add_npc(name, patch).await;
        if let Err(e) = self.table.activate_npc(name).await {
            panic!("failed to activate NPC {name}: {e}");
        }
        self
    }

    pub async fn add_pc(&mut self, name: &str, patch: PcPatch) -> &mut Self {
        if let Err(e) = self.table.pcs_mut().upsert(name, patch).await {
            panic!("failed to add PC {name}: {e}");
        }
        self
    }

    /// Queue the narration for the next narrative turn.
    pub fn expect_narration(&mut self, text: impl Into<String>) -> &mut Self {
        self.table.generator().push_narration(text);
        self
    }

    pub fn generator(&self) -> &ScriptedGenerator {
        self.table.generator()
    }

    pub async fn input(&mut self, raw: &str) -> Result<TurnOutcome, TurnError> {
        self.table.handle_input(raw).await
    }

    /// Blocks from `/statblocks`, panicking on any other outcome.
    #[track_caller]
    pub fn expect_stat_blocks(outcome: Result<TurnOutcome, TurnError>) -> Vec<StatBlock> {
        match outcome {
            Ok(TurnOutcome::StatBlocks(blocks)) => blocks,
            other => panic!("expected stat blocks, got {other:?}"),
        }
    }

    pub fn in_combat(&self) -> bool {
        self.table.encounter().is_active()
    }

    pub fn message_count(&self) -> usize {
        self.table.state().messages().len()
    }

    pub fn story_log_len(&self) -> usize {
        self.table.state().story_log().len()
    }

    pub fn last_story_entry(&self) -> Option<&str> {
        self.table.state().story_log().last().map(|e| e.text())
    }
}

// ============================================================================
// Assertion helpers
// ============================================================================

#[track_caller]
pub fn assert_in_combat(harness: &TestTable) {
    assert!(harness.in_combat(), "expected an active encounter");
}

#[track_caller]
pub fn assert_not_in_combat(harness: &TestTable) {
    assert!(!harness.in_combat(), "expected no active encounter");
}

/// No story-log entry may look like control input.
#[track_caller]
pub fn assert_story_log_clean(harness: &TestTable) {
    for entry in harness.table.state().story_log() {
        assert!(
            !entry.text().starts_with(crate::dispatch::CONTROL_PREFIX),
            "control text in story log: {entry}"
        );
    }
}

/// `name` appears in no stored message, story entry or cached stat block.
#[track_caller]
pub fn assert_name_never_shown(harness: &TestTable, name: &str) {
    let lower = name.to_lowercase();
    let state = harness.table.state();
    for message in state.messages() {
        if message.role == crate::session::Role::Assistant {
            assert!(
                !message.text.to_lowercase().contains(&lower),
                "narration reveals {name}: {}",
                message.text
            );
        }
    }
    for entry in state.story_log() {
        assert!(
            !entry.text().to_lowercase().contains(&lower),
            "story log reveals {name}: {entry}"
        );
    }
    for block in harness.table.encounter().stat_blocks().unwrap_or_default() {
        assert!(
            !block.to_string().to_lowercase().contains(&lower),
            "stat block reveals {name}: {block}"
        );
    }
}
