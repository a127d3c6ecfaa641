pub mod record;

pub use record::{BackupRecord, CopyFailure, RetentionPolicy, TriggerKind};

pub const DEFAULT_KEEP_COUNT: u32 = 10;
