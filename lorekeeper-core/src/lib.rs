//! Session and encounter state engine for an AI Dungeon Master.
//!
//! This crate provides:
//! - Persistent sessions: conversation history, story log and on-screen NPCs
//! - NPC and player character registries backed by JSON documents
//! - Control command dispatch (`/combat`, `/statblocks`, `/endcombat`)
//! - An encounter engine with pluggable combat triggers and willingness
//! - Prompt context building and a Claude-backed generator
//!
//! # Quick Start
//!
//! ```ignore
//! use lorekeeper_core::{ClaudeGenerator, SessionLocator, Table, TableConfig, TurnOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = ClaudeGenerator::from_env()?;
//!     let config = TableConfig::new().with_player_character("Dirk");
//!
//!     let mut table = Table::open(config, SessionLocator::from_arg(Some("lighthouse")), generator).await?;
//!
//!     if let TurnOutcome::Narration { text, .. } = table.handle_input("We enter the ruined lighthouse.").await? {
//!         println!("{text}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod encounter;
pub mod generation;
pub mod registry;
pub mod session;
pub mod store;
pub mod table;
pub mod testing;

// Primary public API
pub use dispatch::{classify, ControlCommand, Input, UnknownCommandError, CONTROL_PREFIX};
pub use encounter::{EncounterEngine, EncounterError, StatBlock};
pub use generation::{ClaudeGenerator, GenerationError, Generator, GeneratorConfig};
pub use registry::{
    NpcPatch, NpcRecord, NpcRegistry, PcPatch, PcRecord, PcRegistry, RegistryError, Relationship,
    ValidationError,
};
pub use session::{NarrativeState, SessionError, SessionLocator};
pub use table::{EncounterChange, Table, TableConfig, TurnError, TurnOutcome};
pub use testing::{ScriptedGenerator, TestTable};
