//! Command-line interface for cachetap
//!
//! This module contains CLI argument parsing and configuration

pub mod args;

pub use args::Args;
