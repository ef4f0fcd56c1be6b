//! Line-oriented play loop.

use anyhow::Result;
use colored::Colorize;
use lorekeeper_core::encounter::StatBlock;
use lorekeeper_core::{ControlCommand, EncounterChange, Generator, Table, TurnOutcome};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

/// Run until end of input or an exit word.
pub async fn run<G: Generator>(mut table: Table<G>) -> Result<()> {
    print_banner(&table);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", "You: ".green());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let input = line.trim();
        if EXIT_WORDS.contains(&input.to_lowercase().as_str()) {
            println!("{}", "The tale pauses here. Farewell.".cyan());
            break;
        }

        match table.handle_input(input).await {
            Ok(outcome) => render(&outcome),
            Err(e) if e.is_recoverable() => println!("{}", format!("[error] {e}").red()),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn print_banner<G: Generator>(table: &Table<G>) {
    let state = table.state();
    println!("{}", "=== Lorekeeper ===".bold());
    println!("Session: {}", state.path().display());
    println!(
        "Story so far: {} entries, {} NPCs on screen",
        state.story_log().len(),
        state.active_npcs().len()
    );
    if table.module_text().is_none() {
        println!("{}", "No module loaded.".yellow());
    }
    println!();
    println!("Commands:");
    for command in ControlCommand::ALL {
        println!("  {:<12} {}", command.to_string(), command.help());
    }
    println!("  {:<12} leave the table", "exit");
    println!();

    if let Some(last) = state.story_log().last() {
        println!("{}", last.text().cyan());
        println!();
    }
}

fn render(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Idle => {}
        TurnOutcome::Narration {
            text,
            activated,
            encounter,
        } => {
            println!("{}", text.cyan());
            if !activated.is_empty() {
                println!("{}", format!("(now in the scene: {})", activated.join(", ")).dimmed());
            }
            match encounter {
                Some(EncounterChange::Started(blocks)) => {
                    println!("{}", "-- Encounter started --".yellow().bold());
                    render_blocks(blocks);
                }
                Some(EncounterChange::Ended) => println!("{}", "-- Encounter over --".yellow()),
                Some(EncounterChange::StartFailed(e)) => {
                    println!("{}", format!("[error] encounter not started: {e}").red())
                }
                None => {}
            }
        }
        TurnOutcome::EncounterStarted(blocks) => {
            println!("{}", "-- Encounter started --".yellow().bold());
            render_blocks(blocks);
        }
        TurnOutcome::StatBlocks(blocks) => render_blocks(blocks),
        TurnOutcome::EncounterEnded => println!("{}", "-- Encounter over --".yellow()),
        TurnOutcome::NoEncounter => println!("{}", "No active encounter.".yellow()),
    }
    println!();
}

fn render_blocks(blocks: &[StatBlock]) {
    if blocks.is_empty() {
        println!("{}", "No one here is willing to fight.".yellow());
    }
    for block in blocks {
        print!("{}", block.to_string().magenta());
    }
}
