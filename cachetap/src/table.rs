//! Symbol → offset table loaded from a JSON config
//!
//! ## Format
//!
//! ```json
//! [
//!   { "a": 10, "b": 20 },
//!   { "a": 30 }
//! ]
//! ```
//!
//! The document is an array of groups; each group maps a one-byte symbol to
//! an unsigned byte offset into the target image. Groups and members are kept
//! in document order (serde_json's `preserve_order`), and that order is the
//! poll order. The same symbol may appear in several groups: every offset for
//! it feeds the same classifier counter.
//!
//! Validation happens once, here. After [`SymbolOffsetTable::build`]
//! succeeds every offset is known to lie inside the mapped region, which is
//! what lets the probe skip bounds checks.

use log::debug;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

use crate::domain::{ConfigError, Offset, Symbol};

/// One monitored location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetEntry {
    pub symbol: Symbol,
    pub offset: Offset,
}

/// Ordered (symbol, offset) pairs probed as one round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetGroup {
    entries: Vec<OffsetEntry>,
}

impl OffsetGroup {
    #[must_use]
    pub fn entries(&self) -> &[OffsetEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parsed but not yet bounds-checked config document
#[derive(Debug, Clone)]
pub struct TableConfig {
    groups: Vec<serde_json::Map<String, Value>>,
}

impl TableConfig {
    /// Read and parse a config file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or is not an array of objects.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFailed { path: path.to_path_buf(), source })?;
        text.parse()
    }
}

impl std::str::FromStr for TableConfig {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let root: Value = serde_json::from_str(text)?;
        let Value::Array(items) = root else {
            return Err(ConfigError::NotAnArray(json_kind(&root)));
        };

        let groups = items
            .into_iter()
            .enumerate()
            .map(|(group, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(ConfigError::GroupNotAnObject { group, found: json_kind(&other) }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { groups })
    }
}

/// Validated, ordered offset groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolOffsetTable {
    groups: Vec<OffsetGroup>,
}

impl SymbolOffsetTable {
    /// Validate a parsed config against the size of the mapped region.
    ///
    /// Offsets are never clamped: anything at or beyond `region_size` is an error.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on a bad symbol, a bad or out-of-range offset,
    /// or a table without any entries.
    pub fn build(config: &TableConfig, region_size: usize) -> Result<Self, ConfigError> {
        let mut groups = Vec::with_capacity(config.groups.len());

        for (group, members) in config.groups.iter().enumerate() {
            let mut entries = Vec::with_capacity(members.len());
            for (key, value) in members {
                let symbol = parse_symbol(group, key)?;
                let offset = parse_offset(group, key, value, region_size)?;
                entries.push(OffsetEntry { symbol, offset });
            }
            debug!("Group {group}: {} entries", entries.len());
            groups.push(OffsetGroup { entries });
        }

        let table = Self { groups };
        if table.is_empty() {
            return Err(ConfigError::Empty);
        }
        Ok(table)
    }

    /// Read, parse and validate in one step.
    ///
    /// # Errors
    /// See [`TableConfig::from_path`] and [`SymbolOffsetTable::build`].
    pub fn load<P: AsRef<Path>>(path: P, region_size: usize) -> Result<Self, ConfigError> {
        Self::build(&TableConfig::from_path(path)?, region_size)
    }

    #[must_use]
    pub fn groups(&self) -> &[OffsetGroup] {
        &self.groups
    }

    /// All entries in poll order (group order, then member order)
    pub fn iter(&self) -> impl Iterator<Item = &OffsetEntry> {
        self.groups.iter().flat_map(|g| g.entries.iter())
    }

    /// Total number of entries across all groups
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(OffsetGroup::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct symbols, sorted
    #[must_use]
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.iter().map(|e| e.symbol).collect()
    }
}

fn parse_symbol(group: usize, key: &str) -> Result<Symbol, ConfigError> {
    match key.as_bytes() {
        [byte] => Ok(Symbol(*byte)),
        _ => Err(ConfigError::InvalidSymbol { group, key: key.to_string() }),
    }
}

fn parse_offset(
    group: usize,
    key: &str,
    value: &Value,
    region_size: usize,
) -> Result<Offset, ConfigError> {
    let raw = value.as_u64().ok_or_else(|| ConfigError::InvalidOffset {
        group,
        key: key.to_string(),
        value: value.to_string(),
    })?;

    match usize::try_from(raw) {
        Ok(offset) if offset < region_size => Ok(Offset(offset)),
        _ => Err(ConfigError::OffsetOutOfRange {
            group,
            key: key.to_string(),
            offset: raw,
            region_size,
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
