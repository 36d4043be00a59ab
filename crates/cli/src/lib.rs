//! adcycle command-line front end: configuration, logging, the run
//! orchestrator and the diagnostic subcommands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod signal;
pub mod styles;
