pub mod config;
pub mod engine;
pub mod error;
pub mod naming;
pub mod periodic;
pub mod world;

pub use config::{BackupConfig, StartupEviction};
pub use engine::{BackupEngine, ConsoleHandle, ConsoleRegistry};
pub use error::{BackupError, RestoreError};
pub use periodic::{PeriodicBackup, PeriodicSchedule};
