//! # cachetap - Flush+Reload Symbol Tap
//!
//! cachetap watches cache lines of a file that another process also maps
//! (a shared library, a resource pack, any page-cache-backed image) and turns
//! "this line was touched" into a stream of symbols. Each watched offset is
//! labelled with a one-byte symbol; when the victim executes or reads the
//! code/data at that offset, the symbol is printed.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Victim Process                           │
//! │          (maps TARGET, touches lines per input event)           │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ shared physical pages (page cache)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       cachetap (this crate)                     │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ SharedRegion │   │ OffsetTable  │   │  Threshold   │         │
//! │  │   (mmap)     │   │   (JSON)     │   │ fixed/calib. │         │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘         │
//! │         │                  │                  │                 │
//! │         ▼                  ▼                  ▼                 │
//! │  ┌──────────────────────────────────────────────────────┐       │
//! │  │ PollLoop: probe → is_hit → DebounceClassifier → emit │       │
//! │  └──────────────────────────┬───────────────────────────┘       │
//! │                             │ yield after every probe           │
//! └─────────────────────────────┼───────────────────────────────────┘
//!                               ▼
//!                     stdout: raw symbol stream
//! ```
//!
//! ## Module Structure
//!
//! - [`probe`]: the flush and timed-reload primitive, one implementation per
//!   instruction set behind the [`probe::CacheProbe`] trait
//! - [`threshold`]: hit/miss boundary, fixed or calibrated
//! - [`table`]: JSON offset table, validated against the region once
//! - [`classifier`]: per-symbol quiet counters and the debounce rule
//! - [`poll`]: the scheduler-cooperative loop tying it all together
//! - [`region`]: read-only shared mapping of the target file
//! - [`preflight`]: input and timing-environment checks
//! - [`cli`]: command-line arguments
//! - [`domain`]: newtypes ([`domain::Symbol`], [`domain::Offset`],
//!   [`domain::Sample`]) and error enums
//!
//! ## Typical Usage
//!
//! ```bash
//! # Fixed threshold of 220 TSC ticks, 2000-probe quiet period
//! ./cachetap /path/to/shared/image keys.json
//!
//! # Calibrate the threshold on this machine first
//! ./cachetap --calibrate /path/to/shared/image keys.json
//! ```
//!
//! ## Key Concepts
//!
//! - **Flush+Reload**: evict a line, later time a load of it; a fast load
//!   means someone else brought it back into the cache
//! - **Quiet counter**: consecutive misses per symbol; a hit only counts as a
//!   new event after a long enough quiet period
//! - **Yielding**: the loop gives up the CPU after every probe so the victim
//!   gets scheduled

pub mod classifier;
pub mod cli;
pub mod domain;
pub mod poll;
pub mod preflight;
pub mod probe;
pub mod region;
pub mod table;
pub mod threshold;
