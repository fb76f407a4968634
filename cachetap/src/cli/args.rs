//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::classifier::DEFAULT_QUIET_COUNT;
use crate::region::DEFAULT_REGION_SIZE;
use crate::threshold::{DEFAULT_CALIBRATION_ROUNDS, DEFAULT_THRESHOLD};

#[derive(Parser, Debug)]
#[command(
    name = "cachetap",
    version,
    about = "Watch shared file pages with Flush+Reload and print a symbol per detected access",
    after_help = "\
CONFIG FORMAT:
    [ {\"a\": 4096, \"b\": 8256}, {\"a\": 12352} ]
    An array of groups, each mapping a one-byte symbol to a byte offset in TARGET.
    Groups and members are probed in file order.

EXAMPLES:
    cachetap /usr/lib/libfoo.so keys.json                 Fixed threshold (220 ticks)
    cachetap --calibrate /usr/lib/libfoo.so keys.json     Measure the threshold first
    RUST_LOG=debug cachetap target.bin keys.json          Log every emission to stderr"
)]
pub struct Args {
    /// File to map and probe (shared with the victim through the page cache)
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// JSON offset table
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Reload latency at or below which a probe counts as a hit (timer ticks)
    #[arg(long, env = "CACHETAP_THRESHOLD", default_value_t = DEFAULT_THRESHOLD.0)]
    pub threshold: u64,

    /// Measure hit/miss latencies and derive the threshold instead of using --threshold
    #[arg(long)]
    pub calibrate: bool,

    /// Samples per distribution when calibrating
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CALIBRATION_ROUNDS)]
    pub calibration_rounds: usize,

    /// Consecutive misses a symbol needs before its next hit is reported
    #[arg(long, value_name = "N", env = "CACHETAP_QUIET_COUNT", default_value_t = DEFAULT_QUIET_COUNT)]
    pub quiet_count: u64,

    /// Map at most this many bytes of TARGET (decimal or 0x-prefixed hex)
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_REGION_SIZE, value_parser = parse_size)]
    pub region_size: usize,

    /// Written after every emitted symbol (default: nothing)
    #[arg(long, value_name = "STR")]
    pub separator: Option<String>,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Suppress the banner and exit summary on stderr
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_size(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(0) => Err("region size must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid size '{s}': {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn default_of(id: &str) -> String {
        let command = Args::command();
        let arg = command.get_arguments().find(|a| a.get_id().as_str() == id).unwrap();
        arg.get_default_values()[0].to_string_lossy().into_owned()
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["cachetap", "target.bin", "config.json"]).unwrap();
        assert_eq!(args.target, PathBuf::from("target.bin"));
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert_eq!(args.region_size, 64 * 1024 * 1024);
        assert!(!args.calibrate);
        assert!(args.separator.is_none());
    }

    #[test]
    fn test_env_backed_defaults() {
        // Checked on the command definition so exported CACHETAP_* variables don't leak in
        assert_eq!(default_of("threshold"), DEFAULT_THRESHOLD.0.to_string());
        assert_eq!(default_of("quiet_count"), DEFAULT_QUIET_COUNT.to_string());
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(Args::try_parse_from(["cachetap", "target.bin"]).is_err());
        assert!(Args::try_parse_from(["cachetap", "a", "b", "c"]).is_err());
    }

    #[test]
    fn test_tunables() {
        let args = Args::try_parse_from([
            "cachetap",
            "--threshold",
            "180",
            "--quiet-count",
            "500",
            "--region-size",
            "0x1000",
            "--separator",
            " ",
            "t",
            "c",
        ])
        .unwrap();
        assert_eq!(args.threshold, 180);
        assert_eq!(args.quiet_count, 500);
        assert_eq!(args.region_size, 0x1000);
        assert_eq!(args.separator.as_deref(), Some(" "));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x4000000"), Ok(64 * 1024 * 1024));
        assert!(parse_size("0").is_err());
        assert!(parse_size("lots").is_err());
    }
}
