//! Compilation-unit parsing: one CU header plus its DIE tree.
//!
//! The DIE loop consults the unit's abbreviation table for the shape of
//! each entry and decodes attribute values form by form. Addresses pass
//! through the session's normalizer exactly once, here. References are
//! rebased to absolute `.debug_info` offsets so the session-wide
//! resolution pass works in a single offset space.

use tracing::trace;

use crate::abbrev::AbbrevTable;
use crate::die::{AttrForm, AttrName, AttrValue, SymId, Symbol, Tag};
use crate::error::{Error, Result};
use crate::line::LineTable;
use crate::reader::{string_at, SliceReader};
use crate::session::CancelToken;

#[derive(Debug)]
pub struct CompilationUnit {
    pub version: u16,
    pub is_64: bool,
    pub address_size: u8,
    /// Offset of the CU header in `.debug_info`.
    pub start: u64,
    /// One past the last byte of this CU's contribution.
    pub end: u64,
    pub abbrev_offset: u64,
    pub root: SymId,
    /// The unit's synthetic void type, first child of the root.
    pub void: SymId,
    /// Materialized line table, filled by the session after DIE parsing.
    pub line: LineTable,
}

pub(crate) struct UnitContext<'a> {
    pub info: &'a [u8],
    pub abbrev: &'a [u8],
    pub strings: &'a [u8],
    pub normalizer: &'a dyn Fn(u64) -> u64,
}

struct UnitHeader {
    start: u64,
    is_64: bool,
    address_size: u8,
}

/// Parses one CU starting at the reader's position. New symbols land in
/// `arena`; their offsets are reported through `offsets` so the caller can
/// commit them to the session index only if the whole unit parses.
pub(crate) fn parse_unit(
    ctx: &UnitContext<'_>,
    reader: &mut SliceReader<'_>,
    cu_index: usize,
    arena: &mut Vec<Symbol>,
    offsets: &mut Vec<(u64, SymId)>,
    cancel: &CancelToken,
) -> Result<CompilationUnit> {
    let start = reader.pos() as u64;
    let (length, is_64) = reader.read_initial_length()?;
    let end = reader.pos() as u64 + length;
    if end > ctx.info.len() as u64 {
        return Err(Error::TruncatedSection { offset: start as usize, wanted: length as usize });
    }
    let version = reader.read_u16()?;
    if !(2..=4).contains(&version) {
        return Err(Error::UnsupportedVersion(version));
    }
    let abbrev_offset = reader.read_offset(is_64)?;
    let address_size = reader.read_u8()?;
    if address_size != 4 && address_size != 8 {
        return Err(Error::MalformedLength(u64::from(address_size)));
    }
    let hdr = UnitHeader { start, is_64, address_size };
    let mut abbrevs = AbbrevTable::new(ctx.abbrev, abbrev_offset);

    let mut stack: Vec<SymId> = Vec::new();
    let mut anchors: Option<(SymId, SymId)> = None; // (root, void)

    while (reader.pos() as u64) < end {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let die_offset = reader.pos() as u64;
        let code = reader.uleb128()?;
        if code == 0 {
            // Close the innermost open DIE. A DIE that declared children
            // but closes immediately has a valid, empty child list.
            stack.pop();
            continue;
        }
        let entry = match abbrevs.get(code)? {
            Some(entry) => entry.clone(),
            None => return Err(Error::UnknownForm(code)),
        };
        let parent = stack.last().copied().or(anchors.map(|(root, _)| root));
        let mut sym = Symbol::new(entry.tag, die_offset as i64, cu_index, parent);
        for &(name, form) in &entry.attrs {
            let value = read_value(reader, form, &hdr, ctx.strings, ctx.normalizer)?;
            sym.set_attr(name, value);
        }
        let id = SymId(arena.len() as u32);
        arena.push(sym);
        offsets.push((die_offset, id));
        trace!(offset = die_offset, code, "die");
        if let Some(p) = parent {
            arena[p.index()].children.push(id);
        }
        if anchors.is_none() {
            // Synthesize the unit's void type as the first child of the
            // root so untyped pointers and typedefs have a target. It is
            // not addressable by offset.
            let mut void = Symbol::new(Tag::BaseType, -1, cu_index, Some(id));
            void.set_attr(AttrName::Name, AttrValue::String("void".into()));
            void.set_attr(AttrName::ByteSize, AttrValue::Constant(0));
            let vid = SymId(arena.len() as u32);
            arena.push(void);
            arena[id.index()].children.push(vid);
            anchors = Some((id, vid));
        }
        if entry.has_children {
            stack.push(id);
        }
    }

    let (root, void) = anchors.ok_or(Error::TruncatedSection {
        offset: start as usize,
        wanted: 1,
    })?;
    Ok(CompilationUnit {
        version,
        is_64,
        address_size,
        start,
        end,
        abbrev_offset,
        root,
        void,
        line: LineTable::default(),
    })
}

fn read_value(
    r: &mut SliceReader<'_>,
    form: AttrForm,
    hdr: &UnitHeader,
    strings: &[u8],
    normalizer: &dyn Fn(u64) -> u64,
) -> Result<AttrValue> {
    let reference = |v: u64| AttrValue::Reference(hdr.start + v);
    match form {
        AttrForm::Addr => Ok(AttrValue::Address(normalizer(r.read_ulong(hdr.address_size)?))),
        AttrForm::Data1 => Ok(AttrValue::Constant(u64::from(r.read_u8()?))),
        AttrForm::Data2 => Ok(AttrValue::Constant(u64::from(r.read_u16()?))),
        AttrForm::Data4 => Ok(AttrValue::Constant(u64::from(r.read_u32()?))),
        AttrForm::Data8 => Ok(AttrValue::Constant(r.read_u64()?)),
        AttrForm::Sdata => Ok(AttrValue::Constant(r.sleb128()? as u64)),
        AttrForm::Udata => Ok(AttrValue::Constant(r.uleb128()?)),
        AttrForm::Block1 => {
            let n = r.read_u8()? as usize;
            Ok(AttrValue::Block(r.read_block(n)?.to_vec()))
        }
        AttrForm::Block2 => {
            let n = r.read_u16()? as usize;
            Ok(AttrValue::Block(r.read_block(n)?.to_vec()))
        }
        AttrForm::Block4 => {
            let n = r.read_u32()? as usize;
            Ok(AttrValue::Block(r.read_block(n)?.to_vec()))
        }
        AttrForm::Block => {
            let n = r.uleb128()? as usize;
            Ok(AttrValue::Block(r.read_block(n)?.to_vec()))
        }
        AttrForm::ExprLoc => {
            let n = r.uleb128()? as usize;
            Ok(AttrValue::ExpressionLocation(r.read_block(n)?.to_vec()))
        }
        AttrForm::String => Ok(AttrValue::String(r.read_string()?)),
        AttrForm::Strp => {
            let off = r.read_offset(hdr.is_64)?;
            Ok(AttrValue::String(string_at(strings, off)?))
        }
        AttrForm::Flag => Ok(AttrValue::Flag(r.read_u8()? != 0)),
        AttrForm::FlagPresent => Ok(AttrValue::Flag(true)),
        AttrForm::Ref1 => Ok(reference(u64::from(r.read_u8()?))),
        AttrForm::Ref2 => Ok(reference(u64::from(r.read_u16()?))),
        AttrForm::Ref4 => Ok(reference(u64::from(r.read_u32()?))),
        AttrForm::Ref8 => Ok(reference(r.read_u64()?)),
        AttrForm::RefUdata => Ok(reference(r.uleb128()?)),
        // ref_addr is already section-absolute, at offset width (DWARF 3+).
        AttrForm::RefAddr => Ok(AttrValue::Reference(r.read_offset(hdr.is_64)?)),
        AttrForm::SecOffset => Ok(AttrValue::SecOffset(r.read_offset(hdr.is_64)?)),
        // Signatures point into .debug_types, which this reader ignores.
        AttrForm::RefSig8 => {
            r.skip(8)?;
            Ok(AttrValue::Invalid)
        }
        AttrForm::Indirect => {
            let code = r.uleb128()?;
            match AttrForm::from(code) {
                AttrForm::Indirect => Err(Error::UnknownForm(code)),
                inner => read_value(r, inner, hdr, strings, normalizer),
            }
        }
        AttrForm::Unrecognized(n) => Err(Error::UnknownForm(n)),
    }
}
