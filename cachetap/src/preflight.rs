//! Pre-flight checks for cachetap
//!
//! Validates inputs and the timing environment before the poll loop starts.
//! Problems that only degrade accuracy are reported as warnings; only a
//! missing config is fatal here. Target open/map failures are left to
//! [`crate::region::SharedRegion::open`] so they keep their own exit code.

use anyhow::{bail, Result};
use log::warn;
use std::path::Path;

/// Run all pre-flight checks before mapping the target
pub fn run_preflight_checks(config_path: &Path) -> Result<()> {
    check_config_exists(config_path)?;
    check_timing_environment();
    Ok(())
}

/// Check that the config path exists and is a file
fn check_config_exists(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        bail!(
            "Config not found: {}\n\n\
             Pass a JSON array of {{\"<symbol>\": <offset>}} groups.",
            config_path.display()
        );
    }
    if !config_path.is_file() {
        bail!("Not a file: {}\n\nCONFIG must point to a JSON file.", config_path.display());
    }
    Ok(())
}

/// Warn about CPU features that make reload timings unreliable
fn check_timing_environment() {
    let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") else {
        return;
    };
    for warning in timing_warnings(&cpuinfo) {
        warn!("{warning}");
    }
}

/// Timing caveats derived from the first CPU's `/proc/cpuinfo` flags
fn timing_warnings(cpuinfo: &str) -> Vec<&'static str> {
    let Some(flags) = cpuinfo
        .lines()
        .find(|l| l.starts_with("flags") || l.starts_with("Features"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, flags)| flags.split_whitespace().collect::<Vec<_>>())
    else {
        return Vec::new();
    };

    let mut warnings = Vec::new();
    if flags.contains(&"hypervisor") {
        warnings.push(
            "running under a hypervisor: reload timings are noisy, consider --calibrate",
        );
    }
    if cfg!(target_arch = "x86_64") {
        if !flags.contains(&"clflush") && flags.contains(&"fpu") {
            warnings.push("CPU does not advertise clflush; probes will not evict lines");
        }
        if !flags.contains(&"constant_tsc") && flags.contains(&"tsc") {
            warnings.push("TSC rate varies with frequency scaling; the fixed threshold may drift");
        }
    }
    warnings
}

/// Short description of the target's object format, if it has one
///
/// Only the header is inspected, so a prefix of the file is enough.
#[must_use]
pub fn describe_image(head: &[u8]) -> Option<String> {
    object::FileKind::parse(head).ok().map(|kind| format!("{kind:?}"))
}
