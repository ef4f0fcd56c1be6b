//! Context payload construction.

use super::{ChatTurn, GenerationRequest, Purpose, Redactor};
use crate::encounter::Encounter;
use crate::registry::{NpcRecord, NpcRegistry, PcRecord, PcRegistry};
use crate::session::{NarrativeState, Role, StoryWindow};

const NARRATOR_RULES: &str = include_str!("prompts/narrator.txt");
const STAT_BLOCK_RULES: &str = include_str!("prompts/stat_block.txt");

/// Story entries shown alongside a stat-block request.
const STAT_BLOCK_STORY: StoryWindow = StoryWindow {
    max_entries: 5,
    max_chars: 4_000,
};

/// Bounds on how much state is replayed into each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub story_window: StoryWindow,
    /// Most recent messages replayed as chat turns.
    pub history_messages: usize,
    /// Characters of module text included.
    pub module_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            story_window: StoryWindow::default(),
            history_messages: 20,
            module_chars: 30_000,
        }
    }
}

/// Everything the table knows about the current scene, borrowed for the
/// duration of one request.
#[derive(Clone, Copy)]
pub struct Scene<'a> {
    pub state: &'a NarrativeState,
    pub npcs: &'a NpcRegistry,
    pub pcs: &'a PcRegistry,
    pub module_text: Option<&'a str>,
    /// Name of the PC this player controls; all PCs are described if unset.
    pub player_character: Option<&'a str>,
    pub encounter: Option<&'a Encounter>,
}

impl<'a> Scene<'a> {
    /// Active NPC records. References to deleted NPCs are skipped.
    pub fn active_npcs(&self) -> Vec<&'a NpcRecord> {
        self.state
            .active_npcs()
            .iter()
            .filter_map(|name| {
                let record = self.npcs.get(name);
                if record.is_none() {
                    tracing::debug!(npc = %name, "active NPC no longer in registry");
                }
                record
            })
            .collect()
    }

    /// Player characters to describe.
    pub fn player_characters(&self) -> Vec<&'a PcRecord> {
        if let Some(name) = self.player_character {
            if let Some(pc) = self.pcs.get(name) {
                return vec![pc];
            }
            tracing::warn!(pc = %name, "player character not in registry, describing all");
        }
        self.pcs.list()
    }

    /// Build the request for a narrative turn.
    pub fn narration_request(&self, limits: &ContextLimits, player_input: &str) -> GenerationRequest {
        let mut turns: Vec<ChatTurn> = self
            .state
            .recent_messages(limits.history_messages)
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ChatTurn {
                role: m.role,
                text: m.text.clone(),
            })
            .collect();
        turns.push(ChatTurn::player(player_input));

        GenerationRequest {
            purpose: Purpose::Narration,
            system: self.system_prompt(limits),
            turns,
        }
    }

    /// Build the request for one combatant's stat block.
    pub fn stat_block_request(&self, npc: &NpcRecord) -> GenerationRequest {
        let redactor = Redactor::for_registry(self.npcs);

        let mut system = String::from(STAT_BLOCK_RULES);
        system.push_str("\n## Combatant\n");
        system.push_str(&redactor.redact(&describe_npc(npc)));

        let story = STAT_BLOCK_STORY.select(self.state.story_log());
        if !story.is_empty() {
            system.push_str("\n## Recent Events\n");
            for entry in &story {
                system.push_str(&format!("- {}\n", redactor.redact(entry)));
            }
        }

        let ask = if npc.known_to_players {
            format!("Write the stat block for {}.", npc.name)
        } else {
            format!(
                "Write the stat block for the combatant described as \"{}\".",
                npc.placeholder_or_default()
            )
        };

        GenerationRequest {
            purpose: Purpose::StatBlock,
            system,
            turns: vec![ChatTurn::player(redactor.redact(&ask))],
        }
    }

    fn system_prompt(&self, limits: &ContextLimits) -> String {
        let mut prompt = String::from(NARRATOR_RULES);
        let redactor = Redactor::for_registry(self.npcs);

        let module = self
            .module_text
            .map(|text| excerpt(text, limits.module_chars))
            .unwrap_or_default();
        if !module.is_empty() {
            prompt.push_str("\n## Module\n");
            prompt.push_str(&module);
            prompt.push('\n');
        }

        let npcs = self.active_npcs();
        if !npcs.is_empty() {
            prompt.push_str("\n## NPCs In The Scene\n");
            for npc in npcs {
                prompt.push_str(&redactor.redact(&describe_npc(npc)));
            }
        }

        let pcs = self.player_characters();
        if !pcs.is_empty() {
            prompt.push_str("\n## Player Characters\n");
            for pc in pcs {
                prompt.push_str(&describe_pc(pc));
            }
        }

        let story = limits.story_window.select(self.state.story_log());
        if !story.is_empty() {
            prompt.push_str("\n## Story So Far\n");
            for (i, entry) in story.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, entry));
            }
        }

        if let Some(encounter) = self.encounter {
            prompt.push_str("\n## Combat In Progress\n");
            if encounter.combatants().is_empty() {
                prompt.push_str("No NPC in the scene is willing to fight.\n");
            }
            for block in encounter.combatants() {
                prompt.push_str(&format!(
                    "- {} ({}, {}): {}\n",
                    block.display_name, block.threat, block.condition, block.tactics
                ));
            }
        }

        prompt
    }
}

/// The first `max_chars` characters of the module text, trimmed.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn describe_npc(npc: &NpcRecord) -> String {
    let mut out = if npc.known_to_players {
        format!("### {}\n", npc.name)
    } else {
        format!(
            "### {} (not yet introduced: refer to them only by this description)\n",
            npc.placeholder_or_default()
        )
    };
    push_field(&mut out, "Appearance", &npc.appearance);
    push_field(&mut out, "Personality", &npc.personality);
    push_field(&mut out, "Goals", &npc.goals);
    push_field(&mut out, "Knows", &npc.knowledge);
    push_field(&mut out, "Relationship to party", npc.relationship.name());
    push_field(&mut out, "Alignment", &npc.alignment);
    out
}

fn describe_pc(pc: &PcRecord) -> String {
    let mut out = format!("### {}\n", pc.name);
    push_field(&mut out, "Race", &pc.race);
    push_field(&mut out, "Class", &pc.class);
    push_field(&mut out, "Appearance", &pc.appearance);
    push_field(&mut out, "Personality", &pc.personality);
    push_field(&mut out, "Backstory", &pc.backstory);
    push_field(&mut out, "Notes", &pc.notes);
    out
}

fn push_field(out: &mut String, label: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        out.push_str(&format!("- {label}: {value}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NpcPatch, PcPatch, Relationship};
    use crate::session::{SessionDocument, SessionLocator};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        state: NarrativeState,
        npcs: NpcRegistry,
        pcs: PcRegistry,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut npcs = NpcRegistry::empty(dir.path().join("npcs.json"));
        npcs.upsert(
            "Bran",
            NpcPatch::new()
                .appearance("missing two fingers")
                .relationship(Relationship::Neutral)
                .known_to_players(true),
        )
        .await
        .unwrap();
        npcs.upsert(
            "Mira Vell",
            NpcPatch::new()
                .placeholder("the hooded scribe")
                .goals("keep Mira Vell's ledger secret"),
        )
        .await
        .unwrap();

        let mut pcs = PcRegistry::empty(dir.path().join("pcs.json"));
        pcs.upsert("Dirk", PcPatch::new().class("rogue")).await.unwrap();
        pcs.upsert("Ysolde", PcPatch::new().class("cleric")).await.unwrap();

        let mut state = NarrativeState::from_document(
            SessionLocator::default(),
            PathBuf::from("unused.json"),
            SessionDocument::default(),
        );
        state.activate_npc("Bran");
        state.activate_npc("Mira Vell");
        state.activate_npc("Ghost Of Nobody");

        Fixture {
            _dir: dir,
            state,
            npcs,
            pcs,
        }
    }

    fn scene(f: &Fixture) -> Scene<'_> {
        Scene {
            state: &f.state,
            npcs: &f.npcs,
            pcs: &f.pcs,
            module_text: Some("The lighthouse of Saltmarsh stands abandoned."),
            player_character: None,
            encounter: None,
        }
    }

    #[test]
    fn test_excerpt_is_char_safe() {
        assert_eq!(excerpt("héllo wörld", 5), "héllo");
        assert_eq!(excerpt("short", 100), "short");
        assert_eq!(excerpt("  padded  ", 100), "padded");
    }

    #[tokio::test]
    async fn test_dangling_npc_dropped_silently() {
        let f = fixture().await;
        let names: Vec<_> = scene(&f).active_npcs().iter().map(|n| n.name.clone()).collect();
        assert_eq!(names, vec!["Bran", "Mira Vell"]);
    }

    #[tokio::test]
    async fn test_system_prompt_hides_unintroduced_names() {
        let f = fixture().await;
        let request = scene(&f).narration_request(&ContextLimits::default(), "We look around.");

        assert!(request.system.contains("### Bran"));
        assert!(request.system.contains("the hooded scribe"));
        assert!(!request.system.contains("Mira"));
        assert!(request.system.contains("Saltmarsh"));
        assert!(request.system.contains("### Dirk"));
        assert!(request.system.contains("### Ysolde"));
    }

    #[tokio::test]
    async fn test_player_character_selects_one_pc() {
        let f = fixture().await;
        let mut scene = scene(&f);
        scene.player_character = Some("dirk");
        let request = scene.narration_request(&ContextLimits::default(), "hi");
        assert!(request.system.contains("### Dirk"));
        assert!(!request.system.contains("Ysolde"));
    }

    #[tokio::test]
    async fn test_history_window_and_pending_input() {
        let mut f = fixture().await;
        for i in 0..30 {
            f.state.append_message(Role::Player, format!("p{i}"));
            f.state.append_message(Role::Assistant, format!("a{i}"));
        }
        let limits = ContextLimits {
            history_messages: 4,
            ..ContextLimits::default()
        };
        let request = scene(&f).narration_request(&limits, "now");

        let texts: Vec<_> = request.turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["p28", "a28", "p29", "a29", "now"]);
        assert_eq!(request.purpose, Purpose::Narration);
    }

    #[tokio::test]
    async fn test_story_window_in_prompt() {
        let mut f = fixture().await;
        f.state.append_story_log("The door creaks.").unwrap();
        f.state.append_story_log("A gull cries.").unwrap();
        let limits = ContextLimits {
            story_window: StoryWindow::new(1, 1000),
            ..ContextLimits::default()
        };
        let request = scene(&f).narration_request(&limits, "hi");
        assert!(request.system.contains("1. A gull cries."));
        assert!(!request.system.contains("The door creaks."));
    }

    #[tokio::test]
    async fn test_stat_block_request_for_hidden_npc() {
        let f = fixture().await;
        let mira = f.npcs.get("Mira Vell").unwrap();
        let request = scene(&f).stat_block_request(mira);

        assert_eq!(request.purpose, Purpose::StatBlock);
        assert!(request.player_input().unwrap().contains("the hooded scribe"));
        assert!(!request.system.contains("Mira"));
        assert!(!request.turns[0].text.contains("Mira"));
    }
}
