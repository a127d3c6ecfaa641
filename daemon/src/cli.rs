use clap::{Parser, ValueHint};
use std::path::PathBuf;

use crate::config::CONFIG_FILE_NAME;

/// Command line of the `mcsm-daemon` binary.
#[derive(Debug, Parser)]
#[command(name = "mcsm-daemon", version, about = "Supervises a Minecraft server and its world backups")]
pub struct DaemonArgs {
    /// Daemon configuration; created with defaults when missing.
    #[arg(long, short = 'c', value_hint = ValueHint::FilePath, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Log filter in `RUST_LOG` syntax.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log: String,

    /// Directory holding the server jar and its world.
    #[arg(value_hint = ValueHint::DirPath, value_parser = existing_dir, default_value = ".")]
    pub server_dir: PathBuf,
}

fn existing_dir(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("{} is not a directory", value))
    }
}
