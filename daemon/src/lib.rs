pub mod app;
pub mod backup;
pub mod cli;
pub mod config;
pub mod management;
pub mod pipeline;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
