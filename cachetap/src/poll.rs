//! # Poll Loop
//!
//! Drives the probe over every table entry, forever, in table order:
//!
//! ```text
//! loop {                                   ◀── cancel flag checked here
//!     for group in table {
//!         for (symbol, offset) in group {
//!             sample = probe(region + offset)
//!             hit    = threshold.is_hit(sample)
//!             if classifier.observe(&mut state, symbol, hit) {
//!                 write symbol, flush
//!             }
//!             yield_now()                  ◀── let the victim run
//!         }
//!     }
//! }
//! ```
//!
//! The yield after every probe is what gives the victim CPU time to touch
//! the lines we watch; without it a busy loop on the victim's core starves
//! the very activity being observed.
//!
//! Everything here runs on one thread. The classifier state lives in the
//! loop and is passed by reference into each classifier step.

use log::debug;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::classifier::{ClassifierState, DebounceClassifier};
use crate::domain::{ConfigError, Symbol};
use crate::probe::CacheProbe;
use crate::region::SharedRegion;
use crate::table::SymbolOffsetTable;
use crate::threshold::ThresholdModel;

/// Counters accumulated while polling
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollStats {
    /// Completed passes over the whole table
    pub cycles: u64,
    pub probes: u64,
    /// Probes classified as hits, emitted or not
    pub hits: u64,
    pub emissions: u64,
    pub emissions_by_symbol: BTreeMap<Symbol, u64>,
}

/// Single-threaded flush+reload scheduler over a validated offset table
pub struct PollLoop<P, W> {
    region: SharedRegion,
    table: SymbolOffsetTable,
    probe: P,
    threshold: ThresholdModel,
    classifier: DebounceClassifier,
    state: ClassifierState,
    output: W,
    separator: Vec<u8>,
    stats: PollStats,
}

impl<P: CacheProbe, W: Write> PollLoop<P, W> {
    /// Create a poll loop over `table`, whose offsets index into `region`.
    ///
    /// # Errors
    /// Returns [`ConfigError::OffsetOutOfRange`] if any entry falls outside
    /// `region`. Tables built with [`SymbolOffsetTable::build`] against the
    /// same region length always pass.
    pub fn new(
        region: SharedRegion,
        table: SymbolOffsetTable,
        probe: P,
        threshold: ThresholdModel,
        classifier: DebounceClassifier,
        output: W,
    ) -> Result<Self, ConfigError> {
        for (group, g) in table.groups().iter().enumerate() {
            if let Some(entry) = g.entries().iter().find(|e| !region.contains(e.offset)) {
                return Err(ConfigError::OffsetOutOfRange {
                    group,
                    key: (entry.symbol.as_byte() as char).to_string(),
                    offset: entry.offset.0 as u64,
                    region_size: region.size(),
                });
            }
        }

        Ok(Self {
            region,
            table,
            probe,
            threshold,
            classifier,
            state: ClassifierState::new(),
            output,
            separator: Vec::new(),
            stats: PollStats::default(),
        })
    }

    /// Bytes written after every emitted symbol (empty by default)
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<Vec<u8>>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Poll until `cancel` is set. The flag is checked once per full pass.
    ///
    /// # Errors
    /// Returns the I/O error if writing or flushing an emitted symbol fails.
    pub fn run(&mut self, cancel: &AtomicBool) -> io::Result<&PollStats> {
        while !cancel.load(Ordering::Relaxed) {
            self.poll_cycle()?;
        }
        debug!("Poll loop cancelled after {} cycles", self.stats.cycles);
        Ok(&self.stats)
    }

    /// One pass over every group and entry, in table order.
    ///
    /// # Errors
    /// Returns the I/O error if writing or flushing an emitted symbol fails.
    pub fn poll_cycle(&mut self) -> io::Result<()> {
        let Self {
            region,
            table,
            probe,
            threshold,
            classifier,
            state,
            output,
            separator,
            stats,
        } = self;

        for entry in table.iter() {
            // SAFETY: every offset was checked against `region` in `new`
            #[allow(unsafe_code)]
            let sample = unsafe { probe.probe(region.addr(entry.offset)) };
            stats.probes += 1;

            let hit = threshold.is_hit(sample);
            if hit {
                stats.hits += 1;
            }

            let quiet = state.quiet_count(entry.symbol);
            if let Some(symbol) = classifier.observe(state, entry.symbol, hit) {
                debug!("{symbol} at {} ({sample}, quiet for {quiet} probes)", entry.offset);
                output.write_all(&[symbol.as_byte()])?;
                output.write_all(separator)?;
                output.flush()?;

                stats.emissions += 1;
                *stats.emissions_by_symbol.entry(symbol).or_default() += 1;
            }

            std::thread::yield_now();
        }

        stats.cycles += 1;
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    #[must_use]
    pub fn state(&self) -> &ClassifierState {
        &self.state
    }

    #[must_use]
    pub fn threshold(&self) -> &ThresholdModel {
        &self.threshold
    }

    #[must_use]
    pub fn classifier(&self) -> &DebounceClassifier {
        &self.classifier
    }

    #[must_use]
    pub fn table(&self) -> &SymbolOffsetTable {
        &self.table
    }

    /// Consume the loop, returning the output sink
    pub fn into_output(self) -> W {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::DEFAULT_QUIET_COUNT;
    use crate::domain::{Offset, Sample};
    use crate::region::DEFAULT_REGION_SIZE;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    const SLOW: u64 = 500;
    const FAST: u64 = 100;

    /// Replays scripted samples per offset; every unscripted probe is a miss
    struct ScriptedProbe {
        base: usize,
        script: HashMap<usize, VecDeque<u64>>,
        probed: Vec<usize>,
        cancel_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl ScriptedProbe {
        fn new(region: &SharedRegion) -> Self {
            Self {
                base: region.addr(Offset(0)) as usize,
                script: HashMap::new(),
                probed: Vec::new(),
                cancel_after: None,
            }
        }

        fn script(mut self, offset: usize, samples: &[u64]) -> Self {
            self.script.entry(offset).or_default().extend(samples);
            self
        }
    }

    #[allow(unsafe_code)]
    impl CacheProbe for ScriptedProbe {
        unsafe fn flush(&mut self, _addr: *const u8) {}

        unsafe fn timed_reload(&mut self, addr: *const u8) -> Sample {
            let offset = addr as usize - self.base;
            self.probed.push(offset);
            if let Some((after, cancel)) = &self.cancel_after {
                if self.probed.len() >= *after {
                    cancel.store(true, Ordering::Relaxed);
                }
            }
            Sample(self.script.get_mut(&offset).and_then(VecDeque::pop_front).unwrap_or(SLOW))
        }
    }

    fn region() -> (tempfile::NamedTempFile, SharedRegion) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 4096]).unwrap();
        file.flush().unwrap();
        let region = SharedRegion::open(file.path(), DEFAULT_REGION_SIZE).unwrap();
        (file, region)
    }

    fn table(json: &str) -> SymbolOffsetTable {
        SymbolOffsetTable::build(&json.parse().unwrap(), 4096).unwrap()
    }

    /// Records every write and counts flushes
    #[derive(Default)]
    struct FlushCounter {
        written: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushCounter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn poll_loop(
        region: SharedRegion,
        json: &str,
        probe: ScriptedProbe,
        arm_after: u64,
    ) -> PollLoop<ScriptedProbe, Vec<u8>> {
        PollLoop::new(
            region,
            table(json),
            probe,
            ThresholdModel::Fixed(Sample(220)),
            DebounceClassifier::new(arm_after),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_cycle_probes_in_table_order() {
        let (_file, region) = region();
        let probe = ScriptedProbe::new(&region);
        let mut lp = poll_loop(region, r#"[{"a": 10, "b": 20}, {"a": 30}]"#, probe, 2000);

        lp.poll_cycle().unwrap();
        lp.poll_cycle().unwrap();

        assert_eq!(lp.probe.probed, vec![10, 20, 30, 10, 20, 30]);
        assert_eq!(lp.stats().cycles, 2);
        assert_eq!(lp.stats().probes, 6);
    }

    #[test]
    fn test_offsets_share_symbol_counter() {
        let (_file, region) = region();
        // Offset 30 alone has seen one miss when it hits; 'a' as a whole has seen three
        let probe = ScriptedProbe::new(&region).script(30, &[SLOW, FAST]);
        let mut lp = poll_loop(region, r#"[{"a": 10, "b": 20}, {"a": 30}]"#, probe, 3);

        lp.poll_cycle().unwrap();
        assert_eq!(lp.state().quiet_count(Symbol(b'a')), 2);
        lp.poll_cycle().unwrap();

        assert_eq!(lp.state().quiet_count(Symbol(b'a')), 0);
        assert_eq!(lp.state().quiet_count(Symbol(b'b')), 2);
        assert_eq!(lp.stats().emissions, 1);
        assert_eq!(lp.stats().hits, 1);
        assert_eq!(lp.into_output(), b"a");
    }

    #[test]
    fn test_each_emission_flushed_once() {
        let (_file, region) = region();
        // Hit after 1999 misses is suppressed, hit after 2000 emits, the next hit is suppressed
        let mut samples = vec![SLOW; 1999];
        samples.push(FAST);
        samples.extend(std::iter::repeat(SLOW).take(2000));
        samples.extend([FAST, FAST]);
        let cycles = samples.len();
        let probe = ScriptedProbe::new(&region).script(10, &samples);

        let mut lp = PollLoop::new(
            region,
            table(r#"[{"a": 10}]"#),
            probe,
            ThresholdModel::default(),
            DebounceClassifier::default(),
            FlushCounter::default(),
        )
        .unwrap();
        assert_eq!(lp.classifier().arm_after(), DEFAULT_QUIET_COUNT);
        assert_eq!(lp.threshold().threshold(), Sample(220));
        assert_eq!(lp.table().len(), 1);

        for _ in 0..cycles {
            lp.poll_cycle().unwrap();
        }

        assert_eq!(lp.stats().hits, 3);
        assert_eq!(lp.stats().emissions, 1);
        let output = lp.into_output();
        assert_eq!(output.written, b"a");
        assert_eq!(output.flushes, 1);
    }

    #[test]
    fn test_hit_before_quiet_period_suppressed() {
        let (_file, region) = region();
        let probe = ScriptedProbe::new(&region).script(10, &[SLOW, FAST]);
        let mut lp = poll_loop(region, r#"[{"a": 10}]"#, probe, 2);

        lp.poll_cycle().unwrap();
        lp.poll_cycle().unwrap();

        assert_eq!(lp.stats().hits, 1);
        assert_eq!(lp.stats().emissions, 0);
        assert!(lp.into_output().is_empty());
    }

    #[test]
    fn test_separator_written_after_each_symbol() {
        let (_file, region) = region();
        let probe =
            ScriptedProbe::new(&region).script(10, &[SLOW, FAST, SLOW, FAST]).script(20, &[FAST]);
        let mut lp = poll_loop(region, r#"[{"a": 10, "b": 20}]"#, probe, 1).with_separator(" ");

        for _ in 0..4 {
            lp.poll_cycle().unwrap();
        }

        let stats = lp.stats().clone();
        assert_eq!(stats.emissions, 2);
        assert_eq!(stats.emissions_by_symbol.get(&Symbol(b'a')), Some(&2));
        assert_eq!(stats.emissions_by_symbol.get(&Symbol(b'b')), None);
        assert_eq!(lp.into_output(), b"a a ");
    }

    #[test]
    fn test_run_stops_when_cancelled() {
        let (_file, region) = region();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut probe = ScriptedProbe::new(&region);
        probe.cancel_after = Some((4, Arc::clone(&cancel)));
        let mut lp = poll_loop(region, r#"[{"a": 10, "b": 20}, {"c": 30}]"#, probe, 2000);

        let stats = lp.run(&cancel).unwrap();

        // Cancellation is observed between passes, never mid-pass
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.probes, 6);
    }

    #[test]
    fn test_run_already_cancelled() {
        let (_file, region) = region();
        let probe = ScriptedProbe::new(&region);
        let mut lp = poll_loop(region, r#"[{"a": 10}]"#, probe, 2000);

        let stats = lp.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(stats.cycles, 0);
    }

    #[test]
    fn test_new_rejects_table_larger_than_region() {
        let (_file, region) = region();
        let probe = ScriptedProbe::new(&region);
        let big = SymbolOffsetTable::build(&r#"[{"a": 8192}]"#.parse().unwrap(), 16384).unwrap();

        let result = PollLoop::new(
            region,
            big,
            probe,
            ThresholdModel::default(),
            DebounceClassifier::default(),
            Vec::new(),
        );
        assert!(matches!(result, Err(ConfigError::OffsetOutOfRange { offset: 8192, .. })));
    }
}
