//! Chronicle: play a game-master-run role-playing session in the terminal.
//!
//! Start a session for a character, creating the character if it does not
//! exist yet:
//!
//! ```bash
//! cargo run -p chronicle -- --scenario goblin-caves --name "Mira"
//! cargo run -p chronicle -- --character <uuid> --scenario goblin-caves
//! ```
//!
//! Resume a session:
//!
//! ```bash
//! cargo run -p chronicle -- --session <uuid>
//! ```

mod headless;

use chronicle_core::{
    CharacterId, CharacterSheet, ClaudeGameMaster, GameConfig, GameStores, SessionDispatcher,
    SessionId,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Hit points of a character created from the command line.
const DEFAULT_HP: u32 = 20;

/// What the command line asked for.
#[derive(Debug, PartialEq)]
enum Launch {
    Help,
    List,
    Resume(SessionId),
    Start {
        character: Option<CharacterId>,
        scenario: String,
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let launch = match parse_args(&args) {
        Ok(launch) => launch,
        Err(message) => {
            eprintln!("Error: {message}");
            print_help();
            std::process::exit(2);
        }
    };

    let config = GameConfig::from_env();
    let stores = GameStores::file(&config.data_dir);

    if launch == Launch::Help {
        print_help();
        return Ok(());
    }
    if launch == Launch::List {
        for record in stores.sessions.list()? {
            println!(
                "{}  {}  {}  {}",
                record.id, record.scenario_id, record.mode, record.scenario_status
            );
        }
        return Ok(());
    }

    // Check for API key
    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        eprintln!("Error: ANTHROPIC_API_KEY environment variable not set.");
        eprintln!("Please set it in .env file or with: export ANTHROPIC_API_KEY=your_key_here");
        std::process::exit(1);
    }

    let gm = ClaudeGameMaster::from_env()?.with_config(&config);
    let dispatcher = SessionDispatcher::new(stores.clone(), Arc::new(gm), &config);

    let session_id = match launch {
        Launch::Resume(id) => dispatcher.session(id)?.id,
        Launch::Start {
            character,
            scenario,
            name,
        } => {
            let character = character.unwrap_or_default();
            if !stores.characters.exists(character)? {
                let sheet = CharacterSheet::new(name, DEFAULT_HP).with_id(character);
                stores.characters.create(&sheet)?;
                info!(character = %character, name = %sheet.name, "character created");
            }
            dispatcher.start_session(character, &scenario).await?.id
        }
        Launch::Help | Launch::List => return Ok(()),
    };

    headless::run_headless(&dispatcher, session_id).await?;
    Ok(())
}

/// `RUST_LOG` wins; otherwise info for this workspace and warn elsewhere.
/// Logs go to stderr so they never interleave with the game on stdout.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chronicle=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_args(args: &[String]) -> Result<Launch, String> {
    let mut session = None;
    let mut character = None;
    let mut scenario = None;
    let mut name = "Adventurer".to_string();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{arg} needs a value"))
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(Launch::Help),
            "--list" => return Ok(Launch::List),
            "--session" => {
                let raw = value()?;
                session = Some(
                    raw.parse::<SessionId>()
                        .map_err(|e| format!("invalid session id '{raw}': {e}"))?,
                );
            }
            "--character" => {
                let raw = value()?;
                character = Some(
                    raw.parse::<CharacterId>()
                        .map_err(|e| format!("invalid character id '{raw}': {e}"))?,
                );
            }
            "--scenario" => scenario = Some(value()?),
            "--name" => name = value()?,
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    match (session, scenario) {
        (Some(_), Some(_)) => Err("use either --session or --scenario, not both".to_string()),
        (Some(id), None) => Ok(Launch::Resume(id)),
        (None, Some(scenario)) => Ok(Launch::Start {
            character,
            scenario,
            name,
        }),
        (None, None) => Err("either --session or --scenario is required".to_string()),
    }
}

fn print_help() {
    println!("Chronicle - role-playing sessions run by an AI game master");
    println!();
    println!("USAGE:");
    println!("  chronicle --scenario <name> [--character <id>] [--name <name>]");
    println!("  chronicle --session <id>");
    println!("  chronicle --list");
    println!();
    println!("OPTIONS:");
    println!("  --scenario <name>  Start a new session for this scenario");
    println!("  --character <id>   Character to play (created if missing)");
    println!("  --name <name>      Name for a newly created character");
    println!("  --session <id>     Resume an existing session");
    println!("  --list             List stored sessions");
    println!("  -h, --help         Show this help");
    println!();
    println!("ENVIRONMENT:");
    println!("  ANTHROPIC_API_KEY        API key (required to play)");
    println!("  CHRONICLE_DATA_DIR       Where sessions are stored (default: gamedata)");
    println!("  CHRONICLE_TOKEN_BUDGET   Model history budget before compaction");
    println!("  CHRONICLE_KEEP_RECENT    Entries kept verbatim when compacting");
    println!("  CHRONICLE_ROLL_DIE       Attack die: d20 or d100");
    println!("  CHRONICLE_MODEL          Model override");
    println!("  RUST_LOG                 Log filter (default: chronicle=info,warn)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_resume() {
        let id = SessionId::new();
        let launch = parse_args(&args(&["--session", &id.to_string()])).unwrap();
        assert_eq!(launch, Launch::Resume(id));
    }

    #[test]
    fn test_parse_start() {
        let launch = parse_args(&args(&["--scenario", "crypt", "--name", "Mira"])).unwrap();
        assert_eq!(
            launch,
            Launch::Start {
                character: None,
                scenario: "crypt".into(),
                name: "Mira".into(),
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["--session", "nope"])).is_err());
        assert!(parse_args(&args(&["--scenario"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert_eq!(parse_args(&args(&["-h"])).unwrap(), Launch::Help);
    }
}
