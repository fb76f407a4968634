//! # Flush+Reload probing primitive
//!
//! A probe of one address is a timed load followed by a cache line flush:
//!
//! ```text
//!   t0 = timer()            ─┐
//!   load byte at addr        │ reload-and-time → Sample
//!   t1 = timer()            ─┘
//!   flush line of addr        evict from every cache level
//! ```
//!
//! Because the line is flushed right after each measurement, the next probe
//! of the same line only comes back fast if someone else (the victim, which
//! shares the physical page through the page cache) loaded it in between.
//!
//! ## Architecture Support
//!
//! | Target    | Flush                 | Timer                    |
//! |-----------|-----------------------|--------------------------|
//! | `x86_64`  | `clflush` + `mfence`  | `rdtsc` fenced by `mfence` |
//! | `aarch64` | `dc civac` + `dsb ish`| `cntvct_el0` after `isb` |
//!
//! The `aarch64` virtual counter usually runs at 24–1000 MHz, far coarser
//! than the TSC, so the default fixed threshold only makes sense on x86_64.
//! Use calibration elsewhere.
//!
//! There are no bounds checks here. Offsets are validated once, when the
//! offset table is built against the mapped region.

use crate::domain::Sample;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::NativeProbe;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::NativeProbe;
    } else {
        compile_error!("cachetap needs a flush instruction and a cycle timer: x86_64 or aarch64 only");
    }
}

/// Cache line size assumed for alignment of calibration buffers
pub const CACHE_LINE_SIZE: usize = 64;

/// Flush and timed-reload capability for one instruction set.
///
/// Methods take `&mut self` so test doubles can script their samples.
#[allow(unsafe_code)]
pub trait CacheProbe {
    /// Evict the cache line containing `addr` from all cache levels.
    ///
    /// # Safety
    /// `addr` must point into memory mapped readable for this process.
    unsafe fn flush(&mut self, addr: *const u8);

    /// Load the byte at `addr` and return how long the load took.
    ///
    /// # Safety
    /// `addr` must point into memory mapped readable for this process.
    unsafe fn timed_reload(&mut self, addr: *const u8) -> Sample;

    /// Reload-and-time, then flush, leaving the line cold for the next probe.
    ///
    /// # Safety
    /// `addr` must point into memory mapped readable for this process.
    unsafe fn probe(&mut self, addr: *const u8) -> Sample {
        let sample = self.timed_reload(addr);
        self.flush(addr);
        sample
    }
}
