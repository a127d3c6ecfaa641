use mcsm_protocol::management::instance::LifecycleState;
use mcsm_protocol::utils::MemoryParseError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("a server is already running in {0}")]
    AlreadyRunning(PathBuf),
    #[error("invalid launch configuration: {0}")]
    InvalidConfig(String),
    #[error("server jar not found: {0}")]
    MissingExecutable(PathBuf),
    #[error("java runtime not found: {0}")]
    RuntimeNotFound(String),
    #[error("failed to spawn server process: {0}")]
    Spawn(#[source] std::io::Error),
}

impl From<MemoryParseError> for StartError {
    fn from(err: MemoryParseError) -> Self {
        StartError::InvalidConfig(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("server is not running")]
    NotRunning,
    #[error("failed to write to server console: {0}")]
    Io(#[from] std::io::Error),
    #[error("console write timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("illegal state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("no server is running in {0}")]
    NotRunning(PathBuf),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}
