//! Character registries.
//!
//! NPCs and player characters live in their own JSON documents, each a
//! mapping from canonical name to record fields. Lookups are
//! case-insensitive: "Bran" and "bran" address the same record.
//!
//! Every mutation is written through to disk immediately.

mod npc;
mod pc;

pub use npc::{NpcPatch, NpcRecord, Relationship, NAMELESS_PLACEHOLDER};
pub use pc::{PcPatch, PcRecord};

use crate::store::{self, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A malformed registry update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("record name must not be empty")]
    EmptyName,

    #[error("invalid fields for {kind} '{name}': {reason}")]
    InvalidFields {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("invalid value for '{field}': {value:?} (expected {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("no NPC named '{0}' in the registry")]
    UnknownNpc(String),
}

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A character record that can live in a [`Registry`].
pub trait Record: Clone + Default + Serialize + DeserializeOwned {
    /// Partial update merged into an existing record by [`Registry::upsert`].
    type Patch: DeserializeOwned;

    /// Human-readable record kind for error messages.
    const KIND: &'static str;

    /// Canonical (display-cased) name.
    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    /// Merge the fields present in `patch`, leaving the others untouched.
    fn apply(&mut self, patch: Self::Patch) -> Result<(), ValidationError>;
}

/// Normalize a record name into its registry key.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A name-keyed registry backed by one JSON document.
#[derive(Debug, Clone)]
pub struct Registry<R> {
    path: PathBuf,
    records: BTreeMap<String, R>,
}

/// Registry of non-player characters.
pub type NpcRegistry = Registry<NpcRecord>;

/// Registry of player characters.
pub type PcRegistry = Registry<PcRecord>;

impl<R: Record> Registry<R> {
    /// Create an empty registry that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
        }
    }

    /// Load a registry document. A missing document is an empty registry.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let document: BTreeMap<String, R> =
            store::read_document(&path).await?.unwrap_or_default();

        let mut records = BTreeMap::new();
        for (name, mut record) in document {
            if record.name().trim().is_empty() {
                record.set_name(name.trim().to_string());
            }
            let key = normalize_key(&name);
            if key.is_empty() {
                tracing::warn!(kind = R::KIND, path = %path.display(), "skipping record with empty name");
                continue;
            }
            if records.contains_key(&key) {
                tracing::warn!(kind = R::KIND, name = %name, "duplicate record name, keeping first");
                continue;
            }
            records.insert(key, record);
        }

        tracing::debug!(kind = R::KIND, count = records.len(), path = %path.display(), "registry loaded");
        Ok(Self { path, records })
    }

    /// Write the whole registry document.
    pub async fn save(&self) -> Result<(), RegistryError> {
        let document: BTreeMap<&str, &R> = self
            .records
            .values()
            .map(|record| (record.name(), record))
            .collect();
        store::ensure_parent_dir(&self.path).await?;
        store::write_document(&self.path, &document).await?;
        Ok(())
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a record by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&R> {
        self.records.get(&normalize_key(name))
    }

    /// Whether a record with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(&normalize_key(name))
    }

    /// All records, ordered by key.
    pub fn list(&self) -> Vec<&R> {
        self.records.values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Create or update a record, merging the patch into existing fields.
    ///
    /// A new record takes `name` as its canonical name; an existing record
    /// keeps the casing it was created with. Nothing changes if the patch
    /// is invalid or the document cannot be written.
    pub async fn upsert(&mut self, name: &str, patch: R::Patch) -> Result<&R, RegistryError> {
        let key = normalize_key(name);
        if key.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }

        let previous = self.records.get(&key).cloned();
        let mut record = previous.clone().unwrap_or_else(|| {
            let mut record = R::default();
            record.set_name(name.split_whitespace().collect::<Vec<_>>().join(" "));
            record
        });
        record.apply(patch)?;

        self.records.insert(key.clone(), record);
        if let Err(e) = self.save().await {
            match previous {
                Some(previous) => self.records.insert(key.clone(), previous),
                None => self.records.remove(&key),
            };
            return Err(e);
        }

        tracing::info!(kind = R::KIND, name = %name, "record upserted");
        self.records
            .get(&key)
            .ok_or_else(|| ValidationError::EmptyName.into())
    }

    /// Create or update a record from a loose JSON object of fields.
    ///
    /// Unknown fields and values of the wrong type are rejected with
    /// [`ValidationError::InvalidFields`].
    pub async fn upsert_fields(
        &mut self,
        name: &str,
        fields: serde_json::Value,
    ) -> Result<&R, RegistryError> {
        let patch: R::Patch =
            serde_json::from_value(fields).map_err(|e| ValidationError::InvalidFields {
                kind: R::KIND,
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        self.upsert(name, patch).await
    }

    /// Remove a record. Returns the removed record, if any.
    ///
    /// Sessions referencing the record are not touched.
    pub async fn delete(&mut self, name: &str) -> Result<Option<R>, RegistryError> {
        let key = normalize_key(name);
        let Some(removed) = self.records.remove(&key) else {
            return Ok(None);
        };

        if let Err(e) = self.save().await {
            self.records.insert(key, removed);
            return Err(e);
        }

        tracing::info!(kind = R::KIND, name = %name, "record deleted");
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Bran"), "bran");
        assert_eq!(normalize_key("  Old   Mother Hask "), "old mother hask");
        assert_eq!(normalize_key("   "), "");
    }

    #[tokio::test]
    async fn test_case_insensitive_keys_share_one_record() {
        let dir = TempDir::new().unwrap();
        let mut npcs = NpcRegistry::empty(dir.path().join("npcs.json"));

        npcs.upsert("Bran", NpcPatch::new().goals("find his brother"))
            .await
            .unwrap();
        npcs.upsert("bran", NpcPatch::new().personality("gruff"))
            .await
            .unwrap();

        assert_eq!(npcs.len(), 1);
        let bran = npcs.get("BRAN").unwrap();
        assert_eq!(bran.name, "Bran");
        assert_eq!(bran.goals, "find his brother");
        assert_eq!(bran.personality, "gruff");
    }

    #[tokio::test]
    async fn test_upsert_rejects_empty_name() {
        let dir = TempDir::new().unwrap();
        let mut pcs = PcRegistry::empty(dir.path().join("pcs.json"));

        let err = pcs.upsert("  ", PcPatch::default()).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Validation(ValidationError::EmptyName)
        ));
        assert!(pcs.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_fields_rejects_unknown_field() {
        let dir = TempDir::new().unwrap();
        let mut npcs = NpcRegistry::empty(dir.path().join("npcs.json"));

        let err = npcs
            .upsert_fields("Bran", json!({"hit_points": 12}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Validation(ValidationError::InvalidFields { .. })
        ));
        assert!(!npcs.contains("Bran"));
    }

    #[tokio::test]
    async fn test_invalid_value_leaves_record_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut npcs = NpcRegistry::empty(dir.path().join("npcs.json"));
        npcs.upsert_fields("Bran", json!({"relationship_to_party": "ally"}))
            .await
            .unwrap();

        let err = npcs
            .upsert_fields("Bran", json!({"relationship_to_party": "frenemy", "goals": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Validation(ValidationError::InvalidValue { .. })
        ));

        let bran = npcs.get("Bran").unwrap();
        assert_eq!(bran.relationship, Relationship::Ally);
        assert_eq!(bran.goals, "");
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/npcs.json");
        let mut npcs = NpcRegistry::empty(&path);
        npcs.upsert("Mira", NpcPatch::new().appearance("ink-stained fingers"))
            .await
            .unwrap();

        let reloaded = NpcRegistry::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("mira").unwrap().appearance, "ink-stained fingers");

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("Mira").is_some(), "document is keyed by canonical name");
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let mut pcs = PcRegistry::empty(dir.path().join("pcs.json"));
        pcs.upsert("Dirk", PcPatch::new().class("rogue")).await.unwrap();

        let removed = pcs.delete("DIRK").await.unwrap();
        assert_eq!(removed.unwrap().class, "rogue");
        assert!(pcs.delete("Dirk").await.unwrap().is_none());
        assert!(PcRegistry::load(pcs.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let npcs = NpcRegistry::load(dir.path().join("absent.json")).await.unwrap();
        assert!(npcs.is_empty());
    }

    #[tokio::test]
    async fn test_load_fills_name_from_key_and_skips_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("npcs.json");
        std::fs::write(
            &path,
            r#"{"Bran": {"goals": "first"}, "bran": {"goals": "second"}}"#,
        )
        .unwrap();

        let npcs = NpcRegistry::load(&path).await.unwrap();
        assert_eq!(npcs.len(), 1);
        let bran = npcs.get("bran").unwrap();
        assert_eq!(bran.name, "Bran");
        assert_eq!(bran.goals, "first");
    }
}
