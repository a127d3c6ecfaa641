use anyhow::Context;
use log::{debug, error, info, warn};
use mcsm_protocol::backup::BackupRecord;
use mcsm_protocol::event::LogEvent;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::management::{ServerManager, StartError};
use crate::utils::{StopSignal, TListener};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP: &str = "\
:start [--force]   launch the server (--force replaces a running one)
:stop              ask the server to stop
:status            lifecycle state
:players           players currently online
:backup            take a manual snapshot in the background
:list              list snapshots, newest first
:restore <folder>  restore a snapshot (server must be stopped)
:delete <folder>   delete a snapshot
:quit              stop everything and exit
anything else is sent to the server console";

/// One line typed into the daemon's own terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start { force: bool },
    Stop,
    Status,
    Players,
    Backup,
    List,
    Restore(String),
    Delete(String),
    Quit,
    Help,
    Forward(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.trim_start().strip_prefix(':') else {
            return Ok(Some(ConsoleCommand::Forward(line.to_owned())));
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        let command = match (name, args.as_slice()) {
            ("start", []) => ConsoleCommand::Start { force: false },
            ("start", ["--force"]) => ConsoleCommand::Start { force: true },
            ("stop", []) => ConsoleCommand::Stop,
            ("status", []) => ConsoleCommand::Status,
            ("players", []) => ConsoleCommand::Players,
            ("backup", []) => ConsoleCommand::Backup,
            ("list", []) => ConsoleCommand::List,
            ("restore", [folder]) => ConsoleCommand::Restore((*folder).to_owned()),
            ("delete", [folder]) => ConsoleCommand::Delete((*folder).to_owned()),
            ("quit" | "exit", []) => ConsoleCommand::Quit,
            ("help", _) => ConsoleCommand::Help,
            ("start" | "stop" | "status" | "players" | "backup" | "list" | "restore" | "delete"
            | "quit" | "exit", _) => {
                return Err(format!("wrong arguments for :{} (try :help)", name))
            }
            (other, _) => return Err(format!("unknown command :{} (try :help)", other)),
        };
        Ok(Some(command))
    }
}

/// Forwards stdin lines from a plain thread; a blocked read must not hold
/// up runtime shutdown.
fn read_stdin() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("stdin closed: {}", err);
                    break;
                }
            }
        }
    });
    rx
}

fn print_console(manager: &ServerManager) {
    manager.subscriptions().on_event.add_sync_listener(
        |event: LogEvent| {
            if event.is_console_line() {
                println!("{}", event.text);
            }
        },
        TListener::default(),
    );
}

fn find_snapshot(manager: &ServerManager, server_dir: &Path, folder: &str) -> Option<BackupRecord> {
    manager
        .list_snapshots(server_dir)
        .into_iter()
        .find(|record| record.folder_name().as_deref() == Some(folder))
}

async fn execute(manager: &ServerManager, server_dir: &Path, command: ConsoleCommand) -> bool {
    match command {
        ConsoleCommand::Start { force } => match manager.start(server_dir, force).await {
            Ok(instance) => info!("{} launched as {}", instance.name(), instance.id()),
            Err(StartError::AlreadyRunning(dir)) => {
                warn!("{:?} is already running, use :start --force to replace it", dir)
            }
            Err(err) => error!("could not start {:?}: {}", server_dir, err),
        },
        ConsoleCommand::Stop => {
            if let Err(err) = manager.stop(server_dir).await {
                warn!("{}", err);
            }
        }
        ConsoleCommand::Status => println!("{}", manager.status(server_dir)),
        ConsoleCommand::Players => {
            let players = manager.players(server_dir);
            println!("{} online: {}", players.len(), players.join(", "));
        }
        ConsoleCommand::Backup => {
            // completion is reported through the event bus
            let _ = manager.backup_now(server_dir);
        }
        ConsoleCommand::List => {
            for record in manager.list_snapshots(server_dir) {
                println!(
                    "{}  {}  {}{}",
                    record.folder_name().unwrap_or_default(),
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.entries.join(","),
                    if record.success { "" } else { "  (incomplete)" }
                );
            }
        }
        ConsoleCommand::Restore(folder) => match find_snapshot(manager, server_dir, &folder) {
            Some(record) => match manager.restore(server_dir, &record).await {
                Ok(()) => info!("restored {}", folder),
                Err(err) => error!("restore failed: {}", err),
            },
            None => warn!("no snapshot named {}", folder),
        },
        ConsoleCommand::Delete(folder) => match find_snapshot(manager, server_dir, &folder) {
            Some(record) => match manager.delete_snapshot(&record) {
                Ok(()) => info!("deleted {}", folder),
                Err(err) => error!("could not delete {}: {}", folder, err),
            },
            None => warn!("no snapshot named {}", folder),
        },
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Forward(text) => {
            if let Err(err) = manager.send_line(server_dir, &text).await {
                warn!("not sent: {}", err);
            }
        }
    }
    true
}

async fn console_loop(manager: Arc<ServerManager>, server_dir: PathBuf, stop: StopSignal) {
    let mut lines = read_stdin();
    loop {
        let line = select! {
            _ = stop.raised() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            // detached from a terminal: keep running until ctrl+c
            debug!("stdin finished, operator console disabled");
            return;
        };
        match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => {
                if !execute(&manager, &server_dir, command).await {
                    stop.raise();
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => warn!("{}", err),
        }
    }
}

/// Runs the daemon in front of one server directory until `:quit` or ctrl+c.
pub async fn run_app(config_path: PathBuf, server_dir: PathBuf) -> anyhow::Result<()> {
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load {:?}", config_path))?;
    debug!("config loaded: {}", serde_json::to_string_pretty(&config)?);
    info!("mcsm-daemon {} managing {:?}", VERSION, server_dir);

    let manager = ServerManager::new(config);
    print_console(&manager);

    let stop = StopSignal::new();
    let console = tokio::spawn(console_loop(manager.clone(), server_dir, stop.clone()));
    select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("interrupted, shutting down"),
                Err(err) => {
                    error!("can't listen for ctrl+c: {}", err);
                    stop.raised().await;
                }
            }
        }
        _ = stop.raised() => {}
    }
    stop.raise();
    let _ = console.await;

    manager.shutdown().await;
    info!("Bye.");
    Ok(())
}
