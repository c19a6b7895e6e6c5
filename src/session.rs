//! A parse session: section bytes in, symbol graph out.
//!
//! The session owns the section buffers and the arena of every symbol
//! parsed from them. Parsing is single-threaded; once `parse` returns the
//! session is immutable and safe to share across threads. A corrupt CU is
//! abandoned with a diagnostic and the remaining units still parse.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::aranges::AddressIndex;
use crate::die::{AttrName, AttrValue, SymId, Symbol, Tag};
use crate::error::Error;
use crate::line::parse_line_program;
use crate::reader::SliceReader;
use crate::unit::{parse_unit, CompilationUnit, UnitContext};

/// The DWARF sections an ELF loader hands over. Missing sections stay
/// empty; only `.debug_info` and `.debug_abbrev` are essential.
#[derive(Debug, Default)]
pub struct DwarfSections {
    pub debug_info: Vec<u8>,
    pub debug_abbrev: Vec<u8>,
    pub debug_str: Vec<u8>,
    pub debug_line: Vec<u8>,
    pub debug_ranges: Vec<u8>,
    pub debug_loc: Vec<u8>,
    pub debug_aranges: Vec<u8>,
}

/// Cooperative cancellation, checked between CUs and between DIEs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A non-fatal problem recorded during parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Offset of the CU the problem was found in, when attributable.
    pub cu_offset: Option<u64>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cu_offset {
            Some(off) => write!(f, "cu {off:#x}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

pub struct Session {
    sections: DwarfSections,
    cus: Vec<CompilationUnit>,
    symbols: Vec<Symbol>,
    offsets: HashMap<u64, SymId>,
    addresses: AddressIndex,
    diagnostics: Vec<Diagnostic>,
}

impl Session {
    /// Parses every compilation unit in `.debug_info`. `normalizer` maps
    /// raw DWARF addresses to runtime addresses (typically subtracting
    /// the image base); it is applied exactly once per address-form
    /// value. Never fails at session scope: problems become diagnostics.
    pub fn parse(
        sections: DwarfSections,
        normalizer: &dyn Fn(u64) -> u64,
        cancel: &CancelToken,
    ) -> Session {
        let mut cus: Vec<CompilationUnit> = Vec::new();
        let mut symbols: Vec<Symbol> = Vec::new();
        let mut offsets: HashMap<u64, SymId> = HashMap::new();
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        let ctx = UnitContext {
            info: &sections.debug_info,
            abbrev: &sections.debug_abbrev,
            strings: &sections.debug_str,
            normalizer,
        };
        let mut reader = SliceReader::new(&sections.debug_info);
        while !reader.is_empty() {
            if cancel.is_cancelled() {
                diagnostics.push(Diagnostic { cu_offset: None, message: "cancelled".into() });
                break;
            }
            let cu_start = reader.pos() as u64;
            let checkpoint = symbols.len();
            let mut pending: Vec<(u64, SymId)> = Vec::new();
            match parse_unit(&ctx, &mut reader, cus.len(), &mut symbols, &mut pending, cancel) {
                Ok(cu) => {
                    debug!(offset = cu_start, version = cu.version, "parsed cu");
                    offsets.extend(pending);
                    reader.set_pos(cu.end as usize);
                    cus.push(cu);
                }
                Err(Error::Cancelled) => {
                    symbols.truncate(checkpoint);
                    diagnostics.push(Diagnostic {
                        cu_offset: Some(cu_start),
                        message: "cancelled".into(),
                    });
                    break;
                }
                Err(err) => {
                    symbols.truncate(checkpoint);
                    warn!(offset = cu_start, %err, "abandoning cu");
                    diagnostics.push(Diagnostic {
                        cu_offset: Some(cu_start),
                        message: err.to_string(),
                    });
                    // Resynchronize on the next unit header; without a
                    // readable length the section cannot be walked further.
                    match next_unit(&sections.debug_info, cu_start as usize) {
                        Some(end) => reader.set_pos(end),
                        None => break,
                    }
                }
            }
        }

        // The specification edge is itself a reference, so resolution has
        // to finish before the merge pass.
        resolve_references(&mut symbols, &offsets, &cus, &mut diagnostics);
        inject_void_types(&mut symbols, &cus);
        merge_specifications(&mut symbols);

        for cu in &mut cus {
            let stmt_list = match symbols[cu.root.index()].attr(AttrName::StmtList) {
                Some(AttrValue::SecOffset(off)) => Some(*off),
                // DWARF 2 producers used data4 for this.
                Some(AttrValue::Constant(off)) => Some(*off),
                _ => None,
            };
            let Some(offset) = stmt_list else { continue };
            match parse_line_program(&sections.debug_line, offset, cu.address_size, normalizer) {
                Ok(table) => cu.line = table,
                Err(err) => {
                    warn!(offset = cu.start, %err, "abandoning line program");
                    diagnostics.push(Diagnostic {
                        cu_offset: Some(cu.start),
                        message: format!("line program: {err}"),
                    });
                }
            }
        }

        let addresses = AddressIndex::build(&sections.debug_aranges, &cus, &symbols, normalizer);

        Session { sections, cus, symbols, offsets, addresses, diagnostics }
    }

    pub fn cus(&self) -> &[CompilationUnit] {
        &self.cus
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn symbol(&self, id: SymId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_at_offset(&self, offset: u64) -> Option<SymId> {
        self.offsets.get(&offset).copied()
    }

    /// CU owning a normalized runtime address.
    pub fn find_cu(&self, pc: u64) -> Option<usize> {
        self.addresses.find(pc)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn sections(&self) -> &DwarfSections {
        &self.sections
    }

    fn fmt_symbol(&self, f: &mut fmt::Formatter<'_>, id: SymId, depth: usize) -> fmt::Result {
        let sym = self.symbol(id);
        let pad = "  ".repeat(depth);
        writeln!(f, "{pad}{sym}")?;
        for (name, value) in sym.attrs() {
            match value {
                AttrValue::ResolvedReference(target) => {
                    writeln!(f, "{pad}  {name:?} -> {}", self.symbol(*target))?
                }
                other => writeln!(f, "{pad}  {name:?} {other:x?}")?,
            }
        }
        for &child in &sym.children {
            self.fmt_symbol(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cu in &self.cus {
            writeln!(
                f,
                "cu at {:#x}: version {}, {}-bit format, address size {}",
                cu.start,
                cu.version,
                if cu.is_64 { 64 } else { 32 },
                cu.address_size,
            )?;
            self.fmt_symbol(f, cu.root, 1)?;
            if !cu.line.rows.is_empty() {
                writeln!(f, "  {} line rows, {} files", cu.line.rows.len(), cu.line.files.len())?;
            }
        }
        Ok(())
    }
}

/// Peeks the length field at `start` to find where the next unit begins.
fn next_unit(info: &[u8], start: usize) -> Option<usize> {
    let mut r = SliceReader::at(info, start);
    let (length, _) = r.read_initial_length().ok()?;
    let end = r.pos() + length as usize;
    (end <= info.len() && end > start).then_some(end)
}

/// Replaces every `Reference` whose target offset is known with a
/// `ResolvedReference`. A reference with no target stays as decoded and
/// is recorded as a diagnostic; consumers treat the attribute as absent.
pub(crate) fn resolve_references(
    symbols: &mut [Symbol],
    offsets: &HashMap<u64, SymId>,
    cus: &[CompilationUnit],
    diagnostics: &mut Vec<Diagnostic>,
) {
    for sym in symbols.iter_mut() {
        let sym_offset = sym.offset;
        let cu_offset = cus.get(sym.cu).map(|cu| cu.start);
        for (_, value) in sym.attrs_mut().iter_mut() {
            if let AttrValue::Reference(off) = value {
                match offsets.get(off) {
                    Some(&target) => *value = AttrValue::ResolvedReference(target),
                    None => {
                        let err = Error::UnresolvedReference(*off);
                        warn!(symbol = sym_offset, %err, "leaving reference as decoded");
                        diagnostics.push(Diagnostic { cu_offset, message: err.to_string() });
                    }
                }
            }
        }
    }
}

/// Pointer and typedef DIEs without an explicit type mean "void"; point
/// them at their unit's synthetic void symbol.
pub(crate) fn inject_void_types(symbols: &mut [Symbol], cus: &[CompilationUnit]) {
    for i in 0..symbols.len() {
        if !matches!(symbols[i].tag, Tag::PointerType | Tag::Typedef) {
            continue;
        }
        if symbols[i].attr(AttrName::Type).is_some() {
            continue;
        }
        let void = cus[symbols[i].cu].void;
        symbols[i].set_attr(AttrName::Type, AttrValue::ResolvedReference(void));
    }
}

/// Copies a referring DIE's attributes onto its `specification` target,
/// overwriting what is there. One-way: the referrer keeps its own
/// attributes and stays addressable by offset.
pub(crate) fn merge_specifications(symbols: &mut [Symbol]) {
    for i in 0..symbols.len() {
        let target = match symbols[i].attr(AttrName::Specification) {
            Some(AttrValue::ResolvedReference(target)) => *target,
            _ => continue,
        };
        if target.index() == i {
            continue;
        }
        let copied: Vec<_> = symbols[i]
            .attrs()
            .iter()
            .filter(|(name, _)| *name != AttrName::Specification)
            .cloned()
            .collect();
        for (name, value) in copied {
            symbols[target.index()].set_attr(name, value);
        }
    }
}
