//! Structured error types for cachetap
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

/// Offset table could not be loaded or failed validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    ReadFailed { path: PathBuf, source: std::io::Error },

    #[error("Config is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("Config must be a JSON array of offset groups, found {0}")]
    NotAnArray(&'static str),

    #[error("Group {group} must be a JSON object mapping symbols to offsets, found {found}")]
    GroupNotAnObject { group: usize, found: &'static str },

    #[error("Group {group}: symbol {key:?} must be exactly one byte")]
    InvalidSymbol { group: usize, key: String },

    #[error("Group {group}: offset for {key:?} must be an unsigned integer, found {value}")]
    InvalidOffset { group: usize, key: String, value: String },

    #[error(
        "Group {group}: offset 0x{offset:x} for {key:?} is outside the mapped region (size 0x{region_size:x})"
    )]
    OffsetOutOfRange { group: usize, key: String, offset: u64, region_size: usize },

    #[error("Config contains no (symbol, offset) entries")]
    Empty,
}

/// Target image could not be opened or mapped
#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Failed to open {path}: {source}")]
    OpenFailed { path: PathBuf, source: std::io::Error },

    #[error("Failed to stat {path}: {source}")]
    MetadataFailed { path: PathBuf, source: std::io::Error },

    #[error("Cannot map {0}: file is empty")]
    EmptyFile(PathBuf),

    #[error("Failed to mmap {path}: {source}")]
    MapFailed { path: PathBuf, source: std::io::Error },
}
