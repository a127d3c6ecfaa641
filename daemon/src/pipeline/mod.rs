pub mod bus;
pub mod config;
pub mod dispatch;
pub mod line_source;
pub mod transcript;

pub use bus::{channel, EventBus, EventReceiver};
pub use config::DispatchConfig;
pub use dispatch::{Dispatcher, Subscriptions};
pub use line_source::LineSource;
pub use transcript::ConsoleTranscript;
