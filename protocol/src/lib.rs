pub mod backup;
pub mod event;
pub mod management;
pub mod utils;
