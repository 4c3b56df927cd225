pub mod audio;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod error_recovery;
pub mod library;
pub mod logging;
pub mod models;
pub mod render;
pub mod sequencer;
pub mod session;
pub mod spectrum;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod integration_tests;

pub use error::*;
pub use models::*;
