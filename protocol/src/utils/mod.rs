pub mod encoding;
pub mod memory;

pub use encoding::Encoding;
pub use memory::{MemoryParseError, MemorySize, MemoryUnit};
