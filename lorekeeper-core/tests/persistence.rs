//! Session and registry persistence across table restarts.

use lorekeeper_core::registry::{NpcPatch, PcPatch, Relationship};
use lorekeeper_core::session::{Role, SessionDocument, SessionError, SessionLocator};
use lorekeeper_core::testing::TestTable;
use lorekeeper_core::{NarrativeState, ScriptedGenerator, Table, TableConfig, TurnError};
use tempfile::TempDir;

#[tokio::test]
async fn test_session_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = TableConfig::rooted_at(dir.path());
    let locator = SessionLocator::Named("lighthouse".into());

    let saved: SessionDocument = {
        let mut h = TestTable::with_config(config.clone(), locator.clone()).await.unwrap();
        h.add_npc("Bran", NpcPatch::new().known_to_players(true)).await;
        h.expect_narration("Bran waves from the jetty.");
        h.input("We row toward the island.").await.unwrap();
        h.table.state().document().clone()
    };
    assert!(dir.path().join("sessions/lighthouse.json").exists());

    let reopened = TestTable::with_config(config, locator).await.unwrap();
    assert_eq!(reopened.table.state().document(), &saved);
    assert_eq!(reopened.table.state().active_npcs(), ["Bran"]);
    assert!(!reopened.in_combat(), "encounters are not persisted");
}

#[tokio::test]
async fn test_legacy_session_document_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("old_run.json");
    std::fs::write(
        &path,
        r#"{
            "messages": [
                {"role": "user", "content": "We enter the crypt."},
                {"role": "assistant", "content": "Cold air spills out."}
            ],
            "story_log": ["Cold air spills out."]
        }"#,
    )
    .unwrap();

    let state = NarrativeState::load(SessionLocator::Path(path), dir.path())
        .await
        .unwrap();

    assert_eq!(state.messages().len(), 2);
    assert_eq!(state.messages()[0].role, Role::Player);
    assert_eq!(state.messages()[1].text, "Cold air spills out.");
    assert_eq!(state.story_log().len(), 1);
    assert!(state.active_npcs().is_empty());
}

#[tokio::test]
async fn test_legacy_npc_store_loads() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("npc_store.json"),
        r#"{
            "Bran": {
                "name": "Bran",
                "appearance": "broad-shouldered",
                "personality": "gruff",
                "goals": "",
                "knowledge": "",
                "relationship_to_party": ""
            }
        }"#,
    )
    .unwrap();

    let h = TestTable::new(dir.path()).await.unwrap();
    let bran = h.table.npcs().get("bran").unwrap();
    assert_eq!(bran.relationship, Relationship::Unknown);
    assert!(!bran.known_to_players);
    assert_eq!(bran.personality, "gruff");
}

#[tokio::test]
async fn test_explicit_session_path_must_be_creatable() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("no/such/place/run.json");

    let result = Table::open(
        TableConfig::rooted_at(dir.path()),
        SessionLocator::Path(missing),
        ScriptedGenerator::new(),
    )
    .await;

    let Err(err) = result else {
        panic!("expected NotFound");
    };
    assert!(matches!(err, TurnError::Session(SessionError::NotFound { .. })));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_explicit_session_path_is_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.json");

    let h = TestTable::with_config(
        TableConfig::rooted_at(dir.path()),
        SessionLocator::Path(path.clone()),
    )
    .await
    .unwrap();

    assert!(path.exists());
    assert_eq!(h.table.state().path(), path.as_path());
}

#[tokio::test]
async fn test_registry_updates_merge_and_persist() {
    let dir = TempDir::new().unwrap();
    {
        let mut h = TestTable::new(dir.path()).await.unwrap();
        h.add_npc(
            "Bran",
            NpcPatch::new()
                .appearance("missing two fingers")
                .personality("gruff but fair")
                .goals("keep the ferry running")
                .knowledge("saw lights on the lighthouse")
                .relationship(Relationship::Neutral)
                .alignment("lawful neutral")
                .known_to_players(true),
        )
        .await;
        h.table
            .npcs_mut()
            .upsert_fields("bran", serde_json::json!({"goals": "find his brother"}))
            .await
            .unwrap();
        h.add_pc("Dirk", PcPatch::new().race("halfling").class("rogue")).await;
    }

    let h = TestTable::new(dir.path()).await.unwrap();
    let bran = h.table.npcs().get("Bran").unwrap();
    assert_eq!(bran.goals, "find his brother");
    assert_eq!(bran.appearance, "missing two fingers");
    assert_eq!(bran.personality, "gruff but fair");
    assert_eq!(bran.knowledge, "saw lights on the lighthouse");
    assert_eq!(bran.relationship, Relationship::Neutral);
    assert_eq!(bran.alignment, "lawful neutral");
    assert!(bran.known_to_players);
    assert_eq!(h.table.pcs().get("dirk").unwrap().class, "rogue");
}

#[tokio::test]
async fn test_deleted_npc_leaves_dangling_reference() {
    let dir = TempDir::new().unwrap();
    let mut h = TestTable::new(dir.path()).await.unwrap();
    h.add_active_npc("Gorrak", NpcPatch::new().relationship(Relationship::Hostile)).await;

    h.table.npcs_mut().delete("Gorrak").await.unwrap();
    assert_eq!(h.table.state().active_npcs(), ["Gorrak"]);

    // Context building and encounters skip the missing record.
    h.input("We wait.").await.unwrap();
    h.input("/combat").await.unwrap();
    assert!(TestTable::expect_stat_blocks(h.input("/statblocks").await).is_empty());
}

#[tokio::test]
async fn test_clear_twice_equals_clear_once() {
    let dir = TempDir::new().unwrap();
    let config = TableConfig::rooted_at(dir.path());
    let mut h = TestTable::new(dir.path()).await.unwrap();
    h.input("We light a fire.").await.unwrap();

    h.table.clear().await.unwrap();
    let once = std::fs::read_to_string(h.table.state().path()).unwrap();
    h.table.clear().await.unwrap();
    let twice = std::fs::read_to_string(h.table.state().path()).unwrap();

    assert_eq!(once, twice);
    let reopened = TestTable::with_config(config, SessionLocator::default()).await.unwrap();
    assert_eq!(reopened.table.state().document(), &SessionDocument::default());
}
