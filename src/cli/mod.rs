//! CLI module for rootcause - command-line interface.

pub mod commands;

pub use commands::Cli;
