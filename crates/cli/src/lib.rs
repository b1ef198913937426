//! Terminal REPL for the Hearth copilot.
//!
//! Deliberately thin: it drives the copilot surface (`select_client`,
//! `submit_user_input`, `execute_chip`) and renders the transcript. All
//! routing decisions live in `hearth-agent`.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use hearth_agent::{Copilot, CopilotServices};
use hearth_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use hearth_core::transcript::{Chip, ChipAction, ClientRef, Role, Turn};
use hearth_core::LogFormat;
use hearth_gateway::{
    ConsentRedirectCollaborator, EndpointResolver, HttpCapabilities, ReqwestTransport,
    WebhookSnapshotClient,
};
use tokio::io::AsyncBufReadExt;

#[derive(Debug, Parser)]
#[command(name = "hearth", about = "Terminal copilot for the Hearth agent dashboard")]
pub struct Cli {
    /// Path to a hearth.toml config file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Explicit backend origin, tried before the default candidates
    #[arg(long)]
    pub api_base: Option<String>,
    /// Session credential for authenticated capabilities
    #[arg(long)]
    pub session_token: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Watchdog bound for in-flight turns, in seconds
    #[arg(long)]
    pub turn_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Quit,
    Help,
    SelectClient(String),
    ListChips,
    ExecuteChip(usize),
    Amend,
    Snapshot,
    Submit(String),
    Empty,
}

pub fn parse_line(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = trimmed.strip_prefix(':') else {
        return ReplCommand::Submit(trimmed.to_owned());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "q" | "quit" | "exit" => ReplCommand::Quit,
        "h" | "help" => ReplCommand::Help,
        "client" if !rest.is_empty() => ReplCommand::SelectClient(rest.to_owned()),
        "chips" => ReplCommand::ListChips,
        "chip" => match rest.parse::<usize>() {
            Ok(index) if index >= 1 => ReplCommand::ExecuteChip(index - 1),
            _ => ReplCommand::Help,
        },
        "amend" => ReplCommand::Amend,
        "snapshot" => ReplCommand::Snapshot,
        _ => ReplCommand::Help,
    }
}

/// Stable id for an ad hoc client entered at the prompt.
pub fn client_slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn build_copilot(config: &AppConfig) -> Copilot {
    let resolver = Arc::new(EndpointResolver::from_config(&config.endpoints));
    let capabilities =
        Arc::new(HttpCapabilities::new(resolver.clone(), config.session.token.clone()));
    let services = CopilotServices {
        follow_up: capabilities.clone(),
        qa: capabilities.clone(),
        client_chat: capabilities.clone(),
        general_chat: capabilities.clone(),
        contract_changes: capabilities.clone(),
        actions: capabilities.clone(),
        history: capabilities.clone(),
        auth: capabilities.clone(),
        snapshots: Arc::new(WebhookSnapshotClient::new(
            ReqwestTransport::new(),
            config.endpoints.snapshot_webhook.clone(),
        )),
        consent: Arc::new(ConsentRedirectCollaborator::new(
            resolver,
            config.session.token.clone(),
        )),
    };
    Copilot::new(services, Duration::from_secs(config.watchdog.turn_timeout_secs))
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config,
        require_file: false,
        overrides: ConfigOverrides {
            api_base: cli.api_base,
            session_token: cli.session_token,
            log_level: cli.log_level,
            turn_timeout_secs: cli.turn_timeout_secs,
            ..ConfigOverrides::default()
        },
    })?;
    init_logging(&config);

    let copilot = build_copilot(&config);
    println!("Hearth copilot. :client <name> to select a client, :help for commands.");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut printed = 0usize;

    loop {
        prompt(&copilot).await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_line(&line) {
            ReplCommand::Quit => break,
            ReplCommand::Empty => {}
            ReplCommand::Help => print_help(),
            ReplCommand::SelectClient(name) => {
                copilot.select_client(ClientRef::new(client_slug(&name), name)).await;
                printed = 0;
                println!("-- switched client; conversation reset --");
            }
            ReplCommand::ListChips => {
                print_chips(&latest_chips(&copilot).await);
            }
            ReplCommand::ExecuteChip(index) => {
                let chips = latest_chips(&copilot).await;
                match chips.get(index) {
                    Some(chip) => copilot.execute_chip(chip).await,
                    None => println!("no chip #{} on the latest reply", index + 1),
                }
            }
            ReplCommand::Amend => {
                let chip = Chip::new(
                    "amend",
                    "Amend Contract",
                    ChipAction::AmendContract,
                    Default::default(),
                );
                copilot.execute_chip(&chip).await;
            }
            ReplCommand::Snapshot => {
                let chip = Chip::new(
                    "snapshot",
                    "Get Client Snapshot",
                    ChipAction::ClientSnapshot,
                    Default::default(),
                );
                copilot.execute_chip(&chip).await;
            }
            ReplCommand::Submit(text) => copilot.submit_user_input(&text).await,
        }

        printed = render_new_turns(&copilot, printed).await;
    }

    Ok(())
}

async fn prompt(copilot: &Copilot) -> Result<()> {
    let client = copilot.selected_client().await;
    match client {
        Some(client) => print!("{}> ", client.name),
        None => print!("(no client)> "),
    }
    std::io::stdout().flush()?;
    Ok(())
}

async fn latest_chips(copilot: &Copilot) -> Vec<Chip> {
    copilot
        .transcript()
        .await
        .iter()
        .rev()
        .find(|turn| !turn.chips().is_empty())
        .map(|turn| turn.chips().to_vec())
        .unwrap_or_default()
}

async fn render_new_turns(copilot: &Copilot, printed: usize) -> usize {
    let turns = copilot.transcript().await;
    for turn in turns.iter().skip(printed) {
        render_turn(turn);
    }
    turns.len()
}

fn render_turn(turn: &Turn) {
    let speaker = match turn.role {
        Role::User => "you",
        Role::Assistant => "copilot",
    };
    println!("{speaker}> {}", turn.content);

    if let Some(attachments) = &turn.attachments {
        if let Some(snapshot) = &attachments.snapshot {
            println!("  client: {}", snapshot.name);
            for (label, value) in [
                ("budget", &snapshot.budget),
                ("timeline", &snapshot.timeline),
                ("status", &snapshot.status),
                ("notes", &snapshot.notes),
                ("answer", &snapshot.answer),
            ] {
                if let Some(value) = value {
                    println!("  {label}: {value}");
                }
            }
        }
        print_chips(&attachments.chips);
    }
}

fn print_chips(chips: &[Chip]) {
    for (index, chip) in chips.iter().enumerate() {
        println!("  [{}] {}", index + 1, chip.label);
    }
    if !chips.is_empty() {
        println!("  (run one with :chip <n>)");
    }
}

fn print_help() {
    println!(
        ":client <name>   select a client (resets the conversation)\n\
         :chips           list chips on the latest reply\n\
         :chip <n>        execute chip n from the latest reply\n\
         :amend           start the contract amendment flow\n\
         :snapshot        fetch the client snapshot\n\
         :quit            exit\n\
         anything else is sent to the copilot"
    );
}
