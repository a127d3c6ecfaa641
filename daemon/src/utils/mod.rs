pub use event::*;
pub use signal::*;

mod event;
mod signal;
