//! Oblivionis CLI library.
//!
//! This crate provides the CLI interface and the event-source adapter that
//! feeds presence events into the session tracker.

mod cli;
pub mod commands;
mod config;
pub mod dispatch;

pub use cli::{Cli, Commands};
pub use config::Config;
