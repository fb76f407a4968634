//! Demo victim - touches one cache line per typed character
//!
//! Maps TARGET the same way cachetap does and, for every byte read from
//! stdin, reads the line at that symbol's offset from CONFIG. Run cachetap
//! against the same pair of files in another terminal and type here.
//!
//! Run with: cargo run --example demo-victim -- target.bin keys.json

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Read;

use cachetap::domain::Offset;
use cachetap::region::{SharedRegion, DEFAULT_REGION_SIZE};
use cachetap::table::SymbolOffsetTable;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(target), Some(config)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: demo-victim TARGET CONFIG");
    };

    let region = SharedRegion::open(&target, DEFAULT_REGION_SIZE)?;
    let table = SymbolOffsetTable::load(&config, region.size())
        .with_context(|| format!("Invalid offset table {config}"))?;

    // First offset per symbol is enough to light it up
    let mut lines: HashMap<u8, Offset> = HashMap::new();
    for entry in table.iter() {
        lines.entry(entry.symbol.as_byte()).or_insert(entry.offset);
    }

    println!("🎯 Demo victim: {} symbols armed, type away (Ctrl+D to stop)", lines.len());

    let mut sink = 0u64;
    for byte in std::io::stdin().bytes() {
        let byte = byte?;
        if let Some(offset) = lines.get(&byte) {
            // SAFETY: offsets were validated against the region by the table
            #[allow(unsafe_code)]
            let value = unsafe { std::ptr::read_volatile(region.addr(*offset)) };
            sink = sink.wrapping_add(u64::from(value));
        }
    }

    println!("done ({sink})");
    Ok(())
}
