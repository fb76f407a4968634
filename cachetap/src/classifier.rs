//! Debounce classifier: hit/miss stream → discrete symbol emissions
//!
//! A single victim access keeps a line warm for many consecutive probes, and
//! our own probing can keep it warm too. Emitting on every hit would print
//! the same symbol hundreds of times per second, so each symbol carries a
//! quiet counter of consecutive misses:
//!
//! ```text
//!            miss: n += 1                 miss: n += 1
//!           ┌──────────┐                 ┌──────────┐
//!           ▼          │   n ≥ arm_after ▼          │
//!      ┌─────────┐─────┘  ─────────────▶ ┌─────────┐┘
//!  ──▶ │ COOLING │                       │  ARMED  │
//!      └─────────┘ ◀──────────────────── └─────────┘
//!        ▲    │        hit: EMIT, n = 0
//!        └────┘
//!   hit: n = 0 (suppressed)
//! ```
//!
//! Every symbol starts at n = 0, so nothing fires until it has been quiet
//! for `arm_after` probes. Counters are keyed by symbol, not offset.

use crate::domain::Symbol;

/// Consecutive misses required before a hit counts as a new event
pub const DEFAULT_QUIET_COUNT: u64 = 2000;

/// Per-symbol quiet counters, one slot per possible symbol byte.
///
/// Owned by the poll loop and handed to [`DebounceClassifier::observe`] by
/// reference; there is no global state.
#[derive(Clone, PartialEq, Eq)]
pub struct ClassifierState {
    quiet: [u64; 256],
}

impl ClassifierState {
    #[must_use]
    pub fn new() -> Self {
        Self { quiet: [0; 256] }
    }

    /// Consecutive misses seen for `symbol` since its last hit
    #[must_use]
    pub fn quiet_count(&self, symbol: Symbol) -> u64 {
        self.quiet[usize::from(symbol.0)]
    }
}

impl Default for ClassifierState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClassifierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only symbols that have been observed
        f.debug_map()
            .entries(
                self.quiet
                    .iter()
                    .enumerate()
                    .filter(|&(_, &n)| n > 0)
                    .map(|(byte, n)| (Symbol(u8::try_from(byte).unwrap_or(u8::MAX)), n)),
            )
            .finish()
    }
}

/// Edge-triggered emission rule shared by all symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceClassifier {
    arm_after: u64,
}

impl DebounceClassifier {
    #[must_use]
    pub fn new(arm_after: u64) -> Self {
        Self { arm_after }
    }

    /// Quiet count at which a symbol becomes armed
    #[must_use]
    pub fn arm_after(&self) -> u64 {
        self.arm_after
    }

    /// Feed one classified probe for `symbol`; returns the symbol if it fires.
    #[inline]
    pub fn observe(&self, state: &mut ClassifierState, symbol: Symbol, hit: bool) -> Option<Symbol> {
        let quiet = &mut state.quiet[usize::from(symbol.0)];
        if !hit {
            *quiet = quiet.saturating_add(1);
            return None;
        }

        let armed = *quiet >= self.arm_after;
        *quiet = 0;
        armed.then_some(symbol)
    }
}

impl Default for DebounceClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_COUNT)
    }
}
