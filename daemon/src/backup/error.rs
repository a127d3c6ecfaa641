use mcsm_protocol::backup::BackupRecord;
use mcsm_protocol::management::instance::LifecycleState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("server directory {0:?} does not exist")]
    ServerDirMissing(PathBuf),
    #[error("nothing could be copied from {0:?}")]
    NothingCopied(PathBuf),
    #[error("snapshot {:?} is incomplete: {} path(s) failed to copy", .record.path, .record.failures.len())]
    Partial { record: Box<BackupRecord> },
    #[error("backup failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("backup worker failed: {0}")]
    Worker(String),
}

impl BackupError {
    /// The snapshot that was written despite the error, if any.
    pub fn record(&self) -> Option<&BackupRecord> {
        match self {
            BackupError::Partial { record } => Some(record.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("server is {0}; stop it before restoring")]
    ServerRunning(LifecycleState),
    #[error("snapshot {0:?} no longer exists")]
    MissingSnapshot(PathBuf),
    #[error("snapshot {0:?} is incomplete and cannot be restored")]
    IncompleteSnapshot(PathBuf),
    #[error("could not stage {entry}: {reason}")]
    Staging { entry: String, reason: String },
    #[error("restore failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("restore worker failed: {0}")]
    Worker(String),
}
