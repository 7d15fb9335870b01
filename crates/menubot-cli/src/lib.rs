//! Process entry plumbing for the `menubot` binary: CLI and environment
//! parsing, tracing setup, and wiring of the supervisor with the keep-alive
//! server.

mod bootstrap;
mod cli_args;
mod runtime_config;

pub use bootstrap::{init_tracing, run, spawn_stop_signal_listener};
pub use cli_args::Cli;
pub use runtime_config::{load_menu_catalog, ConfigError, RuntimeConfig};
