//! Address-to-CU index.
//!
//! Built once per session from `.debug_aranges`; units without an aranges
//! set fall back to the `[low_pc, high_pc)` of their root DIE. Lookups
//! are a binary search over entries sorted by range start.

use tracing::warn;

use crate::die::{AttrName, AttrValue, Symbol};
use crate::reader::SliceReader;
use crate::unit::CompilationUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArangeEntry {
    low: u64,
    high: u64,
    cu: usize,
}

#[derive(Debug, Default)]
pub struct AddressIndex {
    entries: Vec<ArangeEntry>,
}

impl AddressIndex {
    pub(crate) fn build(
        aranges: &[u8],
        cus: &[CompilationUnit],
        arena: &[Symbol],
        normalizer: &dyn Fn(u64) -> u64,
    ) -> AddressIndex {
        let mut entries = Vec::new();
        let mut covered = vec![false; cus.len()];

        let mut r = SliceReader::new(aranges);
        while !r.is_empty() {
            let set_start = r.pos();
            match read_set(&mut r, set_start, cus, normalizer, &mut entries, &mut covered) {
                Ok(()) => {}
                Err(err) => {
                    // The section is an accelerator; a malformed set only
                    // costs us its entries. Without a trustworthy length
                    // there is no next set to find.
                    warn!(offset = set_start, %err, "abandoning .debug_aranges");
                    break;
                }
            }
        }

        for (i, cu) in cus.iter().enumerate() {
            if covered[i] {
                continue;
            }
            if let Some((low, high)) = root_range(cu, arena) {
                entries.push(ArangeEntry { low, high, cu: i });
            }
        }

        entries.sort_by_key(|e| e.low);
        AddressIndex { entries }
    }

    /// Maps a runtime (normalized) address to the owning CU's index.
    pub fn find(&self, pc: u64) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.low <= pc);
        if idx == 0 {
            return None;
        }
        let e = &self.entries[idx - 1];
        (pc < e.high).then_some(e.cu)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_set(
    r: &mut SliceReader<'_>,
    set_start: usize,
    cus: &[CompilationUnit],
    normalizer: &dyn Fn(u64) -> u64,
    entries: &mut Vec<ArangeEntry>,
    covered: &mut [bool],
) -> crate::error::Result<()> {
    let (length, is_64) = r.read_initial_length()?;
    let set_end = r.pos() + length as usize;
    let version = r.read_u16()?;
    let info_offset = r.read_offset(is_64)?;
    let address_size = r.read_u8()?;
    let _segment_size = r.read_u8()?;

    let cu = match cus.iter().position(|c| c.start == info_offset) {
        Some(cu) if version == 2 => cu,
        _ => {
            r.set_pos(set_end);
            return Ok(());
        }
    };

    // Tuples start at a multiple of the tuple size from the set header.
    let tuple = 2 * address_size as usize;
    if tuple != 0 {
        let rel = r.pos() - set_start;
        let pad = (tuple - rel % tuple) % tuple;
        r.skip(pad)?;
    }

    while r.pos() < set_end {
        let addr = r.read_ulong(address_size)?;
        let len = r.read_ulong(address_size)?;
        if addr == 0 && len == 0 {
            break;
        }
        let low = normalizer(addr);
        entries.push(ArangeEntry { low, high: low + len, cu });
        covered[cu] = true;
    }
    r.set_pos(set_end);
    Ok(())
}

/// `[low_pc, high_pc)` from a CU's root DIE. `high_pc` may be an address
/// or a size constant.
pub(crate) fn root_range(cu: &CompilationUnit, arena: &[Symbol]) -> Option<(u64, u64)> {
    let root = &arena[cu.root.index()];
    let low = match root.attr(AttrName::LowPc)? {
        AttrValue::Address(a) => *a,
        _ => return None,
    };
    let high = match root.attr(AttrName::HighPc)? {
        AttrValue::Address(a) => *a,
        AttrValue::Constant(n) => low + n,
        _ => return None,
    };
    (high > low).then_some((low, high))
}
