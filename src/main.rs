use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use weatherly_core::{AppError, Config, ConfigError};
use weatherly_weather::{
    FetchState, FileSlot, HistoryStore, MemorySlot, PersistenceSlot, SessionHandle,
    SessionUpdate, Snapshot, WeatherApiProvider, WeatherSession,
};

mod commands;
mod display;

use commands::Command;

#[derive(Parser)]
#[command(name = "weatherly")]
#[command(about = "Current weather by place name, with recent searches", long_about = None)]
struct Cli {
    /// Look up this place once and exit (e.g. `weatherly New York`)
    place: Vec<String>,

    /// Path to config.toml (default: <config dir>/weatherly/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// WeatherAPI.com key, overriding the config file and WEATHER_API_KEY
    #[arg(long)]
    api_key: Option<String>,

    /// Keep recent searches in memory only for this run
    #[arg(long)]
    no_history: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// File, then environment, then command-line overrides; validated last.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    config.apply_overrides(cli.api_key.clone());
    config.check()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    weatherly_core::init(if cli.verbose { "debug" } else { "warn" })?;

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            if let Some(config_err) = e.downcast_ref::<ConfigError>() {
                eprintln!("{}", config_err.user_message());
            }
            return Err(e);
        }
    };

    let provider = WeatherApiProvider::new(&config.provider)
        .map_err(AppError::from)
        .context("Failed to create weather provider")?;

    let slot: Arc<dyn PersistenceSlot> = if cli.no_history || !config.history.persist {
        Arc::new(MemorySlot::new())
    } else {
        Arc::new(FileSlot::new(&config.history.data_dir()))
    };

    let session = WeatherSession::new(HistoryStore::new(slot), Arc::new(provider));
    let cancel = CancellationToken::new();
    let (handle, updates, task) = session.start(cancel.clone());

    let code = if cli.place.is_empty() {
        interactive(handle, updates).await?;
        ExitCode::SUCCESS
    } else {
        one_shot(&handle, updates, &cli.place.join(" ")).await
    };

    cancel.cancel();
    task.await.context("Session task failed")?;

    tracing::debug!("Weatherly exiting");
    Ok(code)
}

/// Submit one typed lookup and print its outcome.
async fn one_shot(
    handle: &SessionHandle,
    mut updates: UnboundedReceiver<SessionUpdate>,
    place: &str,
) -> ExitCode {
    handle.submit(place);

    while let Some(update) = updates.recv().await {
        match update {
            SessionUpdate::State(snapshot) => match &snapshot.state {
                FetchState::Success(report) => {
                    println!("{}", display::render_report(report));
                    return ExitCode::SUCCESS;
                }
                FetchState::Failed(reason) => {
                    eprintln!("Error: {}", reason);
                    return ExitCode::FAILURE;
                }
                FetchState::Idle | FetchState::Loading(_) => {}
            },
            SessionUpdate::Rejected(rejection) => {
                if let Some(message) = display::render_rejection(&rejection) {
                    eprintln!("{}", message);
                }
                return ExitCode::FAILURE;
            }
            SessionUpdate::Warning(message) => eprintln!("warning: {}", message),
        }
    }

    ExitCode::FAILURE
}

/// Line-committed prompt. Input stays live while a lookup is in flight.
async fn interactive(
    handle: SessionHandle,
    mut updates: UnboundedReceiver<SessionUpdate>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut latest: Option<Snapshot> = None;

    println!("Weatherly - {}", commands::HELP.lines().next().unwrap_or_default());
    println!("Type :help for commands.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match commands::parse(&line) {
                    Some(Command::Lookup(place)) => {
                        handle.submit(place);
                    }
                    Some(Command::Select(index)) => {
                        handle.select_history(index);
                    }
                    Some(Command::ShowHistory) => {
                        if let Some(snapshot) = &latest {
                            println!("{}", display::render_history(&snapshot.history));
                        }
                        prompt();
                    }
                    Some(Command::Help) => {
                        println!("{}", commands::HELP);
                        prompt();
                    }
                    Some(Command::Quit) => break,
                    None => {
                        println!("Unknown command. Type :help for commands.");
                        prompt();
                    }
                }
            }
            update = updates.recv() => {
                let Some(update) = update else { break };
                match update {
                    SessionUpdate::State(snapshot) => {
                        println!("\n{}", display::render_snapshot(&snapshot));
                        latest = Some(snapshot);
                    }
                    SessionUpdate::Rejected(rejection) => {
                        if let Some(message) = display::render_rejection(&rejection) {
                            println!("{}", message);
                        }
                    }
                    SessionUpdate::Warning(message) => println!("warning: {}", message),
                }
                prompt();
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
