pub mod comm;
pub mod config;
pub mod error;
pub mod instance;
pub mod launch;
pub mod manager;
pub mod matchers;
pub mod roster;
pub mod state;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{StartError, StopError, TransitionError, WriteError};
pub use instance::ServerInstance;
pub use launch::{resolve_runtime, LaunchCommand};
pub use manager::ServerManager;
pub use matchers::{LineMatch, LineMatcher};
pub use roster::PlayerRoster;
pub use supervisor::Supervisor;
