//! emaileria command-line front-end
//!
//! The binary is a thin wrapper: argument parsing lives in [`args`], each
//! subcommand in [`commands`], and terminal rendering of dispatch events in
//! [`output`]. Exposing them as a library lets the commands be driven from
//! tests.

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Cli, Commands};
