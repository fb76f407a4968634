//! x86_64 probe: `clflush` for eviction, fenced `rdtsc` for timing

#![allow(unsafe_code)]

use std::arch::asm;

use super::CacheProbe;
use crate::domain::Sample;

/// Flush+Reload on x86_64 using `clflush` and the time-stamp counter
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProbe;

impl NativeProbe {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Read the TSC with `mfence` on both sides so the timed load can't be
/// reordered across it.
#[inline(always)]
fn rdtsc_fenced() -> u64 {
    let lo: u32;
    let hi: u32;
    unsafe {
        asm!(
            "mfence",
            "rdtsc",
            "mfence",
            out("eax") lo,
            out("edx") hi,
            options(nostack, preserves_flags),
        );
    }
    (u64::from(hi) << 32) | u64::from(lo)
}

impl CacheProbe for NativeProbe {
    #[inline(always)]
    unsafe fn flush(&mut self, addr: *const u8) {
        asm!(
            "mfence",
            "clflush [{addr}]",
            "mfence",
            addr = in(reg) addr,
            options(nostack, preserves_flags),
        );
    }

    #[inline(always)]
    unsafe fn timed_reload(&mut self, addr: *const u8) -> Sample {
        let start = rdtsc_fenced();
        let _ = std::ptr::read_volatile(addr);
        let end = rdtsc_fenced();
        Sample(end.wrapping_sub(start))
    }
}
