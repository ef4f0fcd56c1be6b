//! Narrative state: the persisted session.
//!
//! A session is one JSON document holding the conversation history, the
//! story log (narration only, never control traffic) and the names of the
//! NPCs currently on screen. It is loaded once, mutated by each turn and
//! rewritten whole after every turn.

use crate::dispatch::CONTROL_PREFIX;
use crate::registry::normalize_key;
use crate::store::{self, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the session used when none is selected.
pub const DEFAULT_SESSION: &str = "default";

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file not found and could not be created: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("control input cannot be written to the story log: {0:?}")]
    ControlText(String),

    #[error("story log entries must not be empty")]
    EmptyStoryText,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "user")]
    Player,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Player => "player",
            Role::Assistant => "assistant",
            Role::System => "system",
        })
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// One piece of narrative continuity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryLogEntry(String);

impl StoryLogEntry {
    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoryLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted session document.
///
/// Missing fields load as empty collections so older documents stay
/// readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub story_log: Vec<StoryLogEntry>,
    #[serde(default)]
    pub active_npcs: Vec<String>,
}

/// Which session document to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLocator {
    /// `<sessions dir>/<name>.json`; a missing file is a fresh session.
    Named(String),
    /// An explicit file path; it must exist or be creatable in place.
    Path(PathBuf),
}

impl SessionLocator {
    /// Interpret a `--session` argument: anything ending in `.json` is a
    /// path, anything else a session name.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg.map(str::trim).filter(|a| !a.is_empty()) {
            None => SessionLocator::Named(DEFAULT_SESSION.to_string()),
            Some(a) if a.ends_with(".json") => SessionLocator::Path(PathBuf::from(a)),
            Some(a) => SessionLocator::Named(a.to_string()),
        }
    }

    /// Resolve to a file path.
    pub fn resolve(&self, sessions_dir: &Path) -> PathBuf {
        match self {
            SessionLocator::Named(name) => sessions_dir.join(format!("{name}.json")),
            SessionLocator::Path(path) => path.clone(),
        }
    }
}

impl Default for SessionLocator {
    fn default() -> Self {
        SessionLocator::Named(DEFAULT_SESSION.to_string())
    }
}

/// How much of the story log is replayed into the generation context.
///
/// The newest entries are kept first; older entries are dropped once
/// either limit is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoryWindow {
    pub max_entries: usize,
    pub max_chars: usize,
}

impl StoryWindow {
    pub fn new(max_entries: usize, max_chars: usize) -> Self {
        Self {
            max_entries,
            max_chars,
        }
    }

    /// Select the trailing window, returned in chronological order.
    ///
    /// If even the newest entry exceeds the character budget, its tail is
    /// kept so the most recent continuity is never lost entirely.
    pub fn select(&self, entries: &[StoryLogEntry]) -> Vec<String> {
        let mut budget = self.max_chars;
        let mut selected = Vec::new();

        for entry in entries.iter().rev() {
            if selected.len() == self.max_entries || budget == 0 {
                break;
            }
            let len = entry.text().chars().count();
            if len <= budget {
                selected.push(entry.text().to_string());
                budget -= len;
            } else {
                if selected.is_empty() {
                    let tail: String = entry.text().chars().skip(len - budget).collect();
                    selected.push(tail);
                }
                break;
            }
        }

        selected.reverse();
        selected
    }
}

impl Default for StoryWindow {
    fn default() -> Self {
        Self::new(40, 24_000)
    }
}

/// The live narrative state of one session.
#[derive(Debug, Clone)]
pub struct NarrativeState {
    locator: SessionLocator,
    path: PathBuf,
    document: SessionDocument,
}

impl NarrativeState {
    /// Load a session.
    ///
    /// A missing named session is a fresh, empty session (nothing is written
    /// until the first save). A missing explicit path is created on the
    /// spot; if that fails the load fails with [`SessionError::NotFound`].
    pub async fn load(locator: SessionLocator, sessions_dir: &Path) -> Result<Self, SessionError> {
        let path = locator.resolve(sessions_dir);
        let existing: Option<SessionDocument> = store::read_document(&path).await?;

        let document = match (existing, &locator) {
            (Some(document), _) => document,
            (None, SessionLocator::Named(_)) => {
                tracing::info!(path = %path.display(), "starting a fresh session");
                SessionDocument::default()
            }
            (None, SessionLocator::Path(_)) => {
                let document = SessionDocument::default();
                if let Err(e) = store::write_document(&path, &document).await {
                    tracing::warn!(path = %path.display(), error = %e, "cannot create session file");
                    return Err(SessionError::NotFound { path });
                }
                tracing::info!(path = %path.display(), "created session file");
                document
            }
        };

        tracing::debug!(
            path = %path.display(),
            messages = document.messages.len(),
            story_log = document.story_log.len(),
            active_npcs = document.active_npcs.len(),
            "session loaded"
        );

        Ok(Self {
            locator,
            path,
            document,
        })
    }

    /// Build an in-memory state around an existing document.
    pub fn from_document(locator: SessionLocator, path: PathBuf, document: SessionDocument) -> Self {
        Self {
            locator,
            path,
            document,
        }
    }

    /// Write the whole session document.
    pub async fn save(&self) -> Result<(), SessionError> {
        if matches!(self.locator, SessionLocator::Named(_)) {
            store::ensure_parent_dir(&self.path).await?;
        }
        store::write_document(&self.path, &self.document).await?;
        Ok(())
    }

    /// Reset messages, story log and active NPCs, and persist immediately.
    pub async fn clear(&mut self) -> Result<(), SessionError> {
        self.document = SessionDocument::default();
        self.save().await?;
        tracing::info!(path = %self.path.display(), "session cleared");
        Ok(())
    }

    pub fn append_message(&mut self, role: Role, text: impl Into<String>) {
        self.document.messages.push(Message::new(role, text));
    }

    /// Append narration to the story log. Control input is refused.
    pub fn append_story_log(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyStoryText);
        }
        if trimmed.starts_with(CONTROL_PREFIX) {
            return Err(SessionError::ControlText(text));
        }
        self.document
            .story_log
            .push(StoryLogEntry(trimmed.to_string()));
        Ok(())
    }

    /// Mark an NPC as on screen. Returns `false` if it already was.
    ///
    /// Callers check the name against the NPC registry first.
    pub fn activate_npc(&mut self, name: &str) -> bool {
        if self.is_active(name) || normalize_key(name).is_empty() {
            return false;
        }
        self.document.active_npcs.push(name.trim().to_string());
        true
    }

    /// Remove an NPC from the scene. Returns `false` if it was not active.
    pub fn deactivate_npc(&mut self, name: &str) -> bool {
        let key = normalize_key(name);
        let before = self.document.active_npcs.len();
        self.document
            .active_npcs
            .retain(|n| normalize_key(n) != key);
        self.document.active_npcs.len() != before
    }

    pub fn is_active(&self, name: &str) -> bool {
        let key = normalize_key(name);
        self.document
            .active_npcs
            .iter()
            .any(|n| normalize_key(n) == key)
    }

    pub fn messages(&self) -> &[Message] {
        &self.document.messages
    }

    /// The last `n` messages.
    pub fn recent_messages(&self, n: usize) -> &[Message] {
        let messages = &self.document.messages;
        &messages[messages.len().saturating_sub(n)..]
    }

    pub fn story_log(&self) -> &[StoryLogEntry] {
        &self.document.story_log
    }

    pub fn active_npcs(&self) -> &[String] {
        &self.document.active_npcs
    }

    pub fn document(&self) -> &SessionDocument {
        &self.document
    }

    pub fn locator(&self) -> &SessionLocator {
        &self.locator
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(texts: &[&str]) -> Vec<StoryLogEntry> {
        texts.iter().map(|t| StoryLogEntry(t.to_string())).collect()
    }

    #[test]
    fn test_locator_from_arg() {
        assert_eq!(
            SessionLocator::from_arg(None),
            SessionLocator::Named("default".into())
        );
        assert_eq!(
            SessionLocator::from_arg(Some("lighthouse")),
            SessionLocator::Named("lighthouse".into())
        );
        assert_eq!(
            SessionLocator::from_arg(Some("saves/run.json")),
            SessionLocator::Path(PathBuf::from("saves/run.json"))
        );
        assert_eq!(
            SessionLocator::Named("x".into()).resolve(Path::new("sessions")),
            PathBuf::from("sessions/x.json")
        );
    }

    #[test]
    fn test_legacy_messages_load() {
        let raw = r#"{"messages": [{"role": "user", "content": "hello"},
                                   {"role": "assistant", "content": "Welcome."}],
                      "story_log": ["Welcome."]}"#;
        let doc: SessionDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.messages[0].role, Role::Player);
        assert_eq!(doc.messages[0].text, "hello");
        assert!(doc.messages[0].timestamp.is_none());
        assert_eq!(doc.story_log[0].text(), "Welcome.");
        assert!(doc.active_npcs.is_empty());
    }

    #[test]
    fn test_empty_object_loads_as_empty_session() {
        let doc: SessionDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc, SessionDocument::default());
    }

    #[test]
    fn test_story_log_rejects_control_text() {
        let mut state = NarrativeState::from_document(
            SessionLocator::default(),
            PathBuf::from("unused.json"),
            SessionDocument::default(),
        );

        assert!(matches!(
            state.append_story_log("/combat"),
            Err(SessionError::ControlText(_))
        ));
        assert!(matches!(
            state.append_story_log("   "),
            Err(SessionError::EmptyStoryText)
        ));
        state.append_story_log("  The tide turns.  ").unwrap();
        assert_eq!(state.story_log().len(), 1);
        assert_eq!(state.story_log()[0].text(), "The tide turns.");
    }

    #[test]
    fn test_activate_is_case_insensitive_set() {
        let mut state = NarrativeState::from_document(
            SessionLocator::default(),
            PathBuf::from("unused.json"),
            SessionDocument::default(),
        );

        assert!(state.activate_npc("Bran"));
        assert!(!state.activate_npc("bran"));
        assert_eq!(state.active_npcs(), ["Bran"]);
        assert!(state.deactivate_npc("BRAN"));
        assert!(!state.deactivate_npc("Bran"));
        assert!(state.active_npcs().is_empty());
    }

    #[test]
    fn test_recent_messages() {
        let mut state = NarrativeState::from_document(
            SessionLocator::default(),
            PathBuf::from("unused.json"),
            SessionDocument::default(),
        );
        for i in 0..5 {
            state.append_message(Role::Player, format!("m{i}"));
        }
        let recent: Vec<_> = state.recent_messages(2).iter().map(|m| m.text.as_str()).collect();
        assert_eq!(recent, vec!["m3", "m4"]);
        assert_eq!(state.recent_messages(50).len(), 5);
    }

    #[test]
    fn test_window_keeps_newest_in_order() {
        let log = entries(&["one", "two", "three", "four"]);
        let window = StoryWindow::new(2, 1000);
        assert_eq!(window.select(&log), vec!["three", "four"]);
    }

    #[test]
    fn test_window_respects_char_budget() {
        let log = entries(&["aaaa", "bbbb", "cccc"]);
        // 8 chars fit exactly two entries; the third would overflow.
        assert_eq!(StoryWindow::new(10, 8).select(&log), vec!["bbbb", "cccc"]);
        assert_eq!(StoryWindow::new(10, 7).select(&log), vec!["cccc"]);
    }

    #[test]
    fn test_window_truncates_oversized_newest_entry() {
        let log = entries(&["older", "abcdefghij"]);
        assert_eq!(StoryWindow::new(10, 4).select(&log), vec!["ghij"]);
    }

    #[test]
    fn test_window_zero_limits() {
        let log = entries(&["a", "b"]);
        assert!(StoryWindow::new(0, 100).select(&log).is_empty());
        assert!(StoryWindow::new(5, 0).select(&log).is_empty());
        assert!(StoryWindow::default().select(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_missing_named_session_is_fresh_and_unwritten() {
        let dir = TempDir::new().unwrap();
        let sessions = dir.path().join("sessions");
        let state = NarrativeState::load(SessionLocator::Named("new".into()), &sessions)
            .await
            .unwrap();

        assert!(state.messages().is_empty());
        assert!(!state.path().exists());
    }

    #[tokio::test]
    async fn test_missing_explicit_path_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        let state = NarrativeState::load(SessionLocator::Path(path.clone()), dir.path())
            .await
            .unwrap();

        assert!(path.exists());
        assert!(state.story_log().is_empty());
    }

    #[tokio::test]
    async fn test_uncreatable_explicit_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no/such/dir/run.json");
        let err = NarrativeState::load(SessionLocator::Path(path.clone()), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::NotFound { path: p } if p == path));
        assert!(!dir.path().join("no").exists());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let locator = SessionLocator::Named("trip".into());
        let mut state = NarrativeState::load(locator.clone(), dir.path()).await.unwrap();
        state.append_message(Role::Player, "We enter the ruined lighthouse.");
        state.append_message(Role::Assistant, "Salt wind howls through the door.");
        state.append_story_log("Salt wind howls through the door.").unwrap();
        state.activate_npc("Bran");
        state.save().await.unwrap();

        let loaded = NarrativeState::load(locator, dir.path()).await.unwrap();
        assert_eq!(loaded.document(), state.document());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let locator = SessionLocator::Named("c".into());
        let mut state = NarrativeState::load(locator.clone(), dir.path()).await.unwrap();
        state.append_message(Role::Player, "hi");
        state.append_story_log("A gull cries.").unwrap();
        state.activate_npc("Bran");
        state.save().await.unwrap();

        state.clear().await.unwrap();
        let once = NarrativeState::load(locator.clone(), dir.path()).await.unwrap();
        state.clear().await.unwrap();
        let twice = NarrativeState::load(locator, dir.path()).await.unwrap();

        assert_eq!(once.document(), &SessionDocument::default());
        assert_eq!(once.document(), twice.document());
    }
}
