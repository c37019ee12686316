//! Line-oriented play.
//!
//! Every line is a player action, except lines starting with `#`, which are
//! commands (status, history, delete, quit).

use chronicle_core::history::EntryKind;
use chronicle_core::{LogEntry, SessionDispatcher, SessionError, SessionId, Track, TranscriptDelta};
use std::io::{self, BufRead, Write};

const COMMANDS: &[(&str, &str)] = &[
    ("#status", "Show the session, character and combat"),
    ("#history [track]", "Show the full log of the current or given track"),
    ("#delete <n> [track]", "Delete entry n from a full log"),
    ("#help", "Show this help"),
    ("#quit", "Exit"),
];

/// Play a session on stdin/stdout until `#quit` or end of input.
pub async fn run_headless(
    dispatcher: &SessionDispatcher,
    session_id: SessionId,
) -> Result<(), SessionError> {
    let record = dispatcher.session(session_id)?;
    let sheet = dispatcher.stores().characters.sheet(record.character_id)?;

    println!("=== Chronicle ===");
    println!("Session: {}", record.id);
    println!("Scenario: {}", record.scenario_id);
    println!("Character: {}", sheet.summary());
    println!();
    print_commands();
    println!();

    let transcript = dispatcher.transcript(session_id, record.mode)?;
    if !transcript.is_empty() {
        println!("[STORY SO FAR]");
        for entry in transcript.iter().rev().take(4).rev() {
            print_entry(entry);
        }
        println!();
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => {
                    println!("Goodbye!");
                    break;
                }
                Some("status") => {
                    if let Err(e) = print_status(dispatcher, session_id) {
                        println!("[ERROR] {e}");
                    }
                }
                Some("history") => {
                    let track = match track_arg(dispatcher, session_id, parts.get(1)) {
                        Ok(track) => track,
                        Err(e) => {
                            println!("[ERROR] {e}");
                            continue;
                        }
                    };
                    match dispatcher.transcript(session_id, track) {
                        Ok(entries) => {
                            println!("[HISTORY {track}]");
                            for (i, entry) in entries.iter().enumerate() {
                                print!("{i:>4} ");
                                print_entry(entry);
                            }
                        }
                        Err(e) => println!("[ERROR] {e}"),
                    }
                }
                Some("delete") => {
                    let Some(index) = parts.get(1).and_then(|n| n.parse::<usize>().ok()) else {
                        println!("[ERROR] Usage: #delete <n> [track]");
                        continue;
                    };
                    let track = match track_arg(dispatcher, session_id, parts.get(2)) {
                        Ok(track) => track,
                        Err(e) => {
                            println!("[ERROR] {e}");
                            continue;
                        }
                    };
                    match dispatcher.delete_entry(session_id, track, index).await {
                        Ok(entry) => println!("[DELETED] {}", one_line(&entry)),
                        Err(e) => println!("[ERROR] {e}"),
                    }
                }
                Some("help") => {
                    println!("[HELP]");
                    print_commands();
                    println!("  (anything else is sent as a player action)");
                }
                _ => {
                    println!("[ERROR] Unknown command. Type #help for help.");
                }
            }
            stdout.flush().ok();
            continue;
        }

        print!("[PROCESSING]");
        stdout.flush().ok();

        let result = dispatcher.dispatch(session_id, line).await;
        print!("\r            \r");
        stdout.flush().ok();

        match result {
            Ok(delta) => print_delta(&delta),
            Err(e) => println!("[ERROR] {e}"),
        }
    }

    Ok(())
}

fn print_commands() {
    println!("Commands:");
    for (command, help) in COMMANDS {
        println!("  {command:<20} - {help}");
    }
}

fn print_delta(delta: &TranscriptDelta) {
    for entry in &delta.new_entries {
        if entry.kind == EntryKind::Response {
            print_entry(entry);
        }
    }
    println!();

    if delta.mode != delta.track {
        match delta.mode {
            Track::Combat => println!("[COMBAT] The fight begins."),
            Track::Narrative => println!("[COMBAT OVER]"),
        }
    }
    if delta.scenario_status.is_terminal() {
        println!("[SCENARIO {}]", delta.scenario_status.to_string().to_uppercase());
    }
}

fn print_entry(entry: &LogEntry) {
    let text = entry.display_text();
    if text.trim().is_empty() {
        println!("({})", kind_label(entry));
        return;
    }
    match entry.kind {
        EntryKind::Request => println!("> {text}"),
        EntryKind::Response => {
            for para in text.split("\n\n") {
                println!("{para}");
            }
        }
    }
}

fn one_line(entry: &LogEntry) -> String {
    let text = entry.display_text().replace('\n', " ");
    if text.chars().count() > 60 {
        format!("{}...", text.chars().take(60).collect::<String>())
    } else if text.is_empty() {
        kind_label(entry).to_string()
    } else {
        text
    }
}

fn kind_label(entry: &LogEntry) -> &'static str {
    match entry.kind {
        EntryKind::Request => "tool results",
        EntryKind::Response => "tool calls",
    }
}

fn track_arg(
    dispatcher: &SessionDispatcher,
    session_id: SessionId,
    arg: Option<&&str>,
) -> Result<Track, String> {
    match arg {
        Some(raw) => raw.parse(),
        None => dispatcher
            .session(session_id)
            .map(|r| r.mode)
            .map_err(|e| e.to_string()),
    }
}

fn print_status(
    dispatcher: &SessionDispatcher,
    session_id: SessionId,
) -> Result<(), SessionError> {
    let record = dispatcher.session(session_id)?;
    let stores = dispatcher.stores();
    let sheet = stores.characters.sheet(record.character_id)?;

    println!("[STATUS]");
    println!("  Character: {}", sheet.summary());
    println!("  Scenario: {} ({})", record.scenario_id, record.scenario_status);
    println!("  Mode: {}", record.mode);
    if let Some(state) = stores.combats.load(session_id)? {
        if let Some(current) = state.current_combatant() {
            println!("  Round {}, {}'s turn", state.round, current.name);
        }
        for line in state.describe().lines() {
            println!("  {line}");
        }
    }
    if let Some(result) = &record.last_combat_result {
        println!(
            "  Last combat: {} ({}, {} XP)",
            result.summary, result.end_reason, result.xp_awarded
        );
    }
    Ok(())
}
