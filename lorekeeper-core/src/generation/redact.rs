//! Scrubbing unintroduced NPC names out of player-facing text.

use crate::registry::{NpcRecord, NpcRegistry, NAMELESS_PLACEHOLDER};
use regex::{NoExpand, Regex};
use std::borrow::Cow;

/// Replaces the canonical name of every unintroduced NPC with its
/// placeholder description.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    rules: Vec<(Regex, String)>,
}

impl Redactor {
    /// Build rules for every hidden NPC in the registry.
    pub fn for_registry(npcs: &NpcRegistry) -> Self {
        Self::for_records(npcs.list())
    }

    pub fn for_records<'a>(records: impl IntoIterator<Item = &'a NpcRecord>) -> Self {
        let mut hidden: Vec<&NpcRecord> = records.into_iter().filter(|r| r.is_hidden()).collect();
        // Longest names first so "Old Hask" wins over "Hask".
        hidden.sort_by_key(|r| std::cmp::Reverse(r.name.trim().chars().count()));

        let mut rules = Vec::with_capacity(hidden.len());
        for record in hidden {
            let regex = match name_pattern(&record.name) {
                Ok(regex) => regex,
                Err(e) => {
                    tracing::warn!(npc = %record.name, error = %e, "cannot build redaction rule");
                    continue;
                }
            };

            let placeholder = record.placeholder_or_default();
            let replacement = if regex.is_match(placeholder) {
                NAMELESS_PLACEHOLDER.to_string()
            } else {
                placeholder.to_string()
            };
            rules.push((regex, replacement));
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Return `text` with every hidden name replaced.
    pub fn redact<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let mut out = Cow::Borrowed(text);
        for (regex, replacement) in &self.rules {
            if regex.is_match(&out) {
                out = Cow::Owned(
                    regex
                        .replace_all(&out, NoExpand(replacement.as_str()))
                        .into_owned(),
                );
            }
        }
        out
    }

    /// Whether `text` still contains any hidden name.
    pub fn leaks(&self, text: &str) -> bool {
        self.rules.iter().any(|(regex, _)| regex.is_match(text))
    }
}

/// Case-insensitive, whitespace-tolerant pattern for `name`. Word boundaries
/// are only required on the sides where the name starts or ends with a word
/// character, so "Dr. Kess" and "Kess Jr." both match in running text.
pub(crate) fn name_pattern(name: &str) -> Result<Regex, regex::Error> {
    let name = name.trim();
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let escaped = name
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let start = if is_word(name.chars().next()) { r"\b" } else { "" };
    let end = if is_word(name.chars().last()) { r"\b" } else { "" };
    Regex::new(&format!("(?i){start}{escaped}{end}"))
}
