//! Terminal Dungeon Master.
//!
//! Reads player input line by line, narrates through Claude and keeps the
//! session, NPC store and PC store on disk between runs.
//!
//! ```bash
//! cargo run -p lorekeeper -- -s lighthouse --pc "Dirk"
//! cargo run -p lorekeeper -- -s lighthouse --clear-session
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=lorekeeper_core=debug` for detail.

mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use lorekeeper_core::generation::GeneratorConfig;
use lorekeeper_core::{ClaudeGenerator, NarrativeState, SessionLocator, Table, TableConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lorekeeper")]
#[command(about = "AI Dungeon Master with persistent sessions and encounters", long_about = None)]
struct Cli {
    /// Session name (stored under the sessions directory) or a path ending in .json
    #[arg(short, long, value_name = "NAME|PATH.json")]
    session: Option<String>,

    /// Module text file
    #[arg(short, long, value_name = "PATH", default_value = "data/module_text.txt")]
    module: PathBuf,

    /// Directory for named sessions
    #[arg(long, value_name = "DIR", default_value = "sessions")]
    sessions_dir: PathBuf,

    /// NPC store document
    #[arg(long, value_name = "PATH", default_value = "npc_store.json")]
    npcs: PathBuf,

    /// PC store document
    #[arg(long, value_name = "PATH", default_value = "pc_store.json")]
    pcs: PathBuf,

    /// The player character you control (all PCs are described if omitted)
    #[arg(long, value_name = "NAME")]
    pc: Option<String>,

    /// Claude model override
    #[arg(long)]
    model: Option<String>,

    /// Maximum tokens per narration
    #[arg(long, default_value_t = 600)]
    max_tokens: usize,

    /// Reset the selected session and exit
    #[arg(long)]
    clear_session: bool,
}

impl Cli {
    fn table_config(&self) -> TableConfig {
        let mut config = TableConfig::new()
            .with_sessions_dir(&self.sessions_dir)
            .with_npc_store(&self.npcs)
            .with_pc_store(&self.pcs)
            .with_module(&self.module);
        if let Some(ref pc) = self.pc {
            config = config.with_player_character(pc);
        }
        config
    }

    fn generator_config(&self) -> GeneratorConfig {
        let mut config = GeneratorConfig::new().with_max_tokens(self.max_tokens);
        if let Some(ref model) = self.model {
            config = config.with_model(model);
        }
        config
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = cli.table_config();
    let locator = SessionLocator::from_arg(cli.session.as_deref());

    if cli.clear_session {
        let mut state = NarrativeState::load(locator, &config.sessions_dir)
            .await
            .context("failed to open session")?;
        state.clear().await.context("failed to clear session")?;
        println!("Session cleared: {}", state.path().display());
        return Ok(());
    }

    let generator = ClaudeGenerator::from_env()
        .context("ANTHROPIC_API_KEY is not set (export it or put it in .env)")?
        .with_config(cli.generator_config());

    let table = Table::open(config, locator, generator)
        .await
        .context("failed to open session")?;

    repl::run(table).await
}
