pub mod file;
pub mod files;
pub mod properties;
pub mod settings;

pub use files::{copy_tree, find_server_jar, remove_entry, CopyReport};
pub use properties::ServerProperties;
pub use settings::SettingsStore;
