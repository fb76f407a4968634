//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep a symbol byte, a region offset and a latency
//! sample from being mixed up in probe and classifier signatures.

use std::fmt;

/// Leaked value label (one byte, usually a printable character)
///
/// Classifier state is keyed by this value, not by offset, so every offset
/// that maps to the same symbol shares one quiet counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub u8);

impl Symbol {
    /// Raw byte written to the output stream on emission
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() || self.0 == b' ' {
            write!(f, "'{}'", self.0 as char)
        } else {
            write!(f, "'\\x{:02x}'", self.0)
        }
    }
}

/// Byte offset into the shared region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Offset(pub usize);

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Reload latency in timer ticks (TSC cycles on x86_64, `cntvct_el0` ticks on aarch64)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Sample(pub u64);

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}
