pub mod config;
pub mod status;

pub use config::{BackupExtras, ServerSettings, DEFAULT_XMS, DEFAULT_XMX};
pub use status::LifecycleState;
