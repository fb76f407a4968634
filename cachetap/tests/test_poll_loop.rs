use cachetap::classifier::DebounceClassifier;
use cachetap::domain::{Offset, Sample};
use cachetap::poll::PollLoop;
use cachetap::probe::CacheProbe;
use cachetap::region::{SharedRegion, DEFAULT_REGION_SIZE};
use cachetap::table::SymbolOffsetTable;
use cachetap::threshold::ThresholdModel;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const SLOW: u64 = 500;
const FAST: u64 = 100;

/// Probe double replaying per-offset samples and recording probe order
struct ReplayProbe {
    base: usize,
    samples: HashMap<usize, VecDeque<u64>>,
    probed: Arc<Mutex<Vec<usize>>>,
    stop_after: usize,
    cancel: Arc<AtomicBool>,
}

#[allow(unsafe_code)]
impl CacheProbe for ReplayProbe {
    unsafe fn flush(&mut self, _addr: *const u8) {}

    unsafe fn timed_reload(&mut self, addr: *const u8) -> Sample {
        let offset = addr as usize - self.base;
        let mut probed = self.probed.lock().unwrap();
        probed.push(offset);
        if probed.len() >= self.stop_after {
            self.cancel.store(true, Ordering::Relaxed);
        }
        Sample(self.samples.get_mut(&offset).and_then(VecDeque::pop_front).unwrap_or(SLOW))
    }
}

fn target() -> (tempfile::NamedTempFile, SharedRegion) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 256]).unwrap();
    file.flush().unwrap();
    let region = SharedRegion::open(file.path(), DEFAULT_REGION_SIZE).unwrap();
    (file, region)
}

fn config(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_probes_follow_config_order() {
    let (_file, region) = target();
    let config = config(r#"[{"a": 10, "b": 20}, {"c": 30}]"#);
    let table = SymbolOffsetTable::load(config.path(), region.size()).unwrap();

    let probed = Arc::new(Mutex::new(Vec::new()));
    let cancel = Arc::new(AtomicBool::new(false));
    let probe = ReplayProbe {
        base: region.addr(Offset(0)) as usize,
        samples: HashMap::new(),
        probed: Arc::clone(&probed),
        stop_after: 6,
        cancel: Arc::clone(&cancel),
    };

    let mut poll_loop = PollLoop::new(
        region,
        table,
        probe,
        ThresholdModel::default(),
        DebounceClassifier::new(2000),
        Vec::new(),
    )
    .unwrap();
    let stats = poll_loop.run(&cancel).unwrap().clone();

    assert_eq!(*probed.lock().unwrap(), vec![10, 20, 30, 10, 20, 30]);
    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.probes, 6);
    assert_eq!(stats.emissions, 0);
    assert!(poll_loop.into_output().is_empty());
}

#[test]
fn test_symbol_shared_across_groups_is_debounced_once() {
    let (_file, region) = target();
    // 'a' watches two lines; a hit on either counts against the same quiet counter
    let config = config(r#"[{"a": 0}, {"a": 128}]"#);
    let table = SymbolOffsetTable::load(config.path(), region.size()).unwrap();

    // Cycle 1: both misses (quiet = 2). Cycle 2: hit at 0 emits, hit at 128 is suppressed.
    let mut samples = HashMap::new();
    samples.insert(0, VecDeque::from([SLOW, FAST]));
    samples.insert(128, VecDeque::from([SLOW, FAST]));

    let cancel = Arc::new(AtomicBool::new(false));
    let probe = ReplayProbe {
        base: region.addr(Offset(0)) as usize,
        samples,
        probed: Arc::new(Mutex::new(Vec::new())),
        stop_after: 4,
        cancel: Arc::clone(&cancel),
    };

    let mut poll_loop = PollLoop::new(
        region,
        table,
        probe,
        ThresholdModel::Fixed(Sample(220)),
        DebounceClassifier::new(2),
        Vec::new(),
    )
    .unwrap()
    .with_separator("\n");
    let stats = poll_loop.run(&cancel).unwrap().clone();

    assert_eq!(stats.hits, 2);
    assert_eq!(stats.emissions, 1);
    assert_eq!(poll_loop.into_output(), b"a\n");
}
