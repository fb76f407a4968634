//! aarch64 probe: `dc civac` for eviction, `cntvct_el0` for timing
//!
//! Linux sets `SCTLR_EL1.UCI`, so `dc civac` is allowed from EL0.

#![allow(unsafe_code)]

use std::arch::asm;

use super::CacheProbe;
use crate::domain::Sample;

/// Flush+Reload on aarch64 using clean+invalidate by VA and the virtual counter
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProbe;

impl NativeProbe {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[inline(always)]
fn counter_fenced() -> u64 {
    let ticks: u64;
    unsafe {
        asm!(
            "dsb ish",
            "isb",
            "mrs {ticks}, cntvct_el0",
            "isb",
            ticks = out(reg) ticks,
            options(nostack, preserves_flags),
        );
    }
    ticks
}

impl CacheProbe for NativeProbe {
    #[inline(always)]
    unsafe fn flush(&mut self, addr: *const u8) {
        asm!(
            "dc civac, {addr}",
            "dsb ish",
            "isb",
            addr = in(reg) addr,
            options(nostack, preserves_flags),
        );
    }

    #[inline(always)]
    unsafe fn timed_reload(&mut self, addr: *const u8) -> Sample {
        let start = counter_fenced();
        let _ = std::ptr::read_volatile(addr);
        let end = counter_fenced();
        Sample(end.wrapping_sub(start))
    }
}
