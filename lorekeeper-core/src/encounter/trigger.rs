//! Deciding when narration escalates into (or out of) combat.

/// Maps a narrative turn to encounter transitions.
///
/// Implementations must be deterministic: the same input under the same
/// [`version`](CombatTrigger::version) always gives the same answer.
pub trait CombatTrigger: Send + Sync {
    /// Identifies the policy, for logs.
    fn version(&self) -> &str;

    /// Whether this turn starts an encounter.
    fn should_start(&self, player_input: &str, narration: &str) -> bool;

    /// Whether this turn ends the active encounter.
    fn should_end(&self, player_input: &str, narration: &str) -> bool;
}

/// Phrase-matching trigger.
///
/// Combat starts when the narration announces it or an NPC turns violent,
/// or when the player declares an attack. It ends when the narration says
/// the fight is over or the enemy gives up.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordTrigger;

impl KeywordTrigger {
    pub const VERSION: &'static str = "keyword-1";
}

const NARRATION_START: &[&str] = &[
    "combat has begun",
    "combat begins",
    "roll initiative",
    "roll for initiative",
    "attacks you",
    "lunges at you",
    "swings at you",
    "charges at you",
    "draws a blade",
    "draws a sword",
    "draws steel",
    "opens fire",
    "tries to restrain you",
    "grabs you",
];

const PLAYER_START: &[&str] = &[
    "i attack",
    "we attack",
    "attack the",
    "attack him",
    "attack her",
    "attack them",
    "attack it",
    "i strike",
    "i stab",
    "i shoot",
    "i fire at",
    "i swing at",
    "i punch",
    "i tackle",
    "i charge",
    "we charge",
];

const NARRATION_END: &[&str] = &[
    "combat ends",
    "combat is over",
    "combat has ended",
    "the fight is over",
    "the fight ends",
    "the battle is over",
    "the battle ends",
    "surrenders",
    "surrender",
    "lays down",
    "lay down their arms",
    "yields",
    "the last of them falls",
    "no enemies remain",
];

impl CombatTrigger for KeywordTrigger {
    fn version(&self) -> &str {
        Self::VERSION
    }

    fn should_start(&self, player_input: &str, narration: &str) -> bool {
        contains_phrase(&normalize(narration), NARRATION_START)
            || contains_phrase(&normalize(player_input), PLAYER_START)
    }

    fn should_end(&self, _player_input: &str, narration: &str) -> bool {
        contains_phrase(&normalize(narration), NARRATION_END)
    }
}

/// Lowercase, punctuation to spaces, whitespace collapsed, padded with a
/// space on each side so phrases match on word boundaries.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn contains_phrase(normalized: &str, phrases: &[&str]) -> bool {
    phrases
        .iter()
        .any(|phrase| normalized.contains(&format!(" {phrase} ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announcement_starts_combat() {
        let t = KeywordTrigger;
        assert!(t.should_start("I open the door.", "Combat has begun! Two guards rush in."));
        assert!(t.should_start("hello", "The guard DRAWS A SWORD, snarling."));
    }

    #[test]
    fn test_player_aggression_starts_combat() {
        let t = KeywordTrigger;
        assert!(t.should_start("I attack the guard!", "The guard stumbles back."));
        assert!(t.should_start("We charge.", ""));
    }

    #[test]
    fn test_peaceful_turn_does_not_start() {
        let t = KeywordTrigger;
        assert!(!t.should_start(
            "We enter the ruined lighthouse.",
            "Salt wind howls through the broken door."
        ));
        // Word boundaries: "attacked" and "counterattack" are not declarations.
        assert!(!t.should_start("I ask who attacked the village.", "She mentions a counterattack."));
    }

    #[test]
    fn test_end_detection() {
        let t = KeywordTrigger;
        assert!(t.should_end("", "The bandit surrenders, dropping his knife."));
        assert!(t.should_end("", "The fight is over. Silence returns."));
        assert!(!t.should_end("", "The bandit presses the attack."));
    }

    #[test]
    fn test_deterministic() {
        let t = KeywordTrigger;
        let input = ("I stab the cultist.", "Blood on the altar.");
        let first = t.should_start(input.0, input.1);
        for _ in 0..10 {
            assert_eq!(t.should_start(input.0, input.1), first);
        }
        assert_eq!(t.version(), "keyword-1");
    }
}
