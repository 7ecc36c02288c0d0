//! Adapters module: user-facing surfaces.
//!
//! # Supported Channels
//!
//! - **CLI**: interactive command line interface

pub mod cli;

pub use cli::{is_exit_command, CliChannel};
