//! Command-line interface for mailfind.
//!
//! The binary is a thin wrapper over [`app::run`]; everything it does is
//! available here so it can be driven from tests.
//!
//! # Key Abstractions
//!
//! - [`CliArgs`]: clap argument tree (`index`, `search`, `show`, `config`)
//! - [`MailfindConfig`]: layered TOML/env configuration
//! - [`App`]: a loaded configuration plus the commands that use it

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;

pub use app::{App, init_logging, run};
pub use cli::{CliArgs, Command, ConfigAction, ConfigCommand, ModeArg};
pub use config::{MailfindConfig, StoreConfig};
