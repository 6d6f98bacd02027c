//! CLI module for EstateWise
//!
//! Argument parsing and the interactive chat commands.

pub mod args;
pub mod commands;

pub use args::{Args, Commands, Verbosity};
pub use commands::{print_help, print_reply, render_weights, ChatCommand};
