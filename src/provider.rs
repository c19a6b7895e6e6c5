//! The uniform symbol-provider contract and its DWARF implementation.
//!
//! Higher layers (script hosts, code generators) consume this trait and
//! never see DWARF; a PDB-backed sibling serves the same contract. Ids
//! are the session's dense [`SymId`] handles. The provider is read-only
//! and safe to share across threads; the one expensive index (`by_name`)
//! is built behind a one-shot initializer on first use.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::die::{AttrName, AttrValue, SymId, Symbol, Tag};
use crate::error::{Error, Result};
use crate::expr::{evaluate, EvalContext, Location};
use crate::session::Session;

/// Longest type chain (typedef/cv wrappers) the provider will follow.
/// Anything deeper is assumed cyclic through corrupt references.
const MAX_TYPE_CHAIN: usize = 64;

/// Backend-neutral classification of a type symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Base,
    Pointer,
    Array,
    Struct,
    Union,
    Class,
    Enum,
    Function,
    Typedef,
    Const,
    Volatile,
    Reference,
    Unknown,
}

/// Result of a source-line query. A miss is represented by an empty file
/// name, line zero, and a displacement equal to the queried absolute
/// address, so callers always get a well-formed value.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub file: String,
    pub line: u64,
    pub displacement: u64,
}

impl SourceLine {
    pub fn is_found(&self) -> bool {
        !self.file.is_empty()
    }
}

/// What a debugger knows about a stopped frame: the canonical frame
/// address its unwinder computed.
#[derive(Debug, Clone, Copy)]
pub struct FrameDescriptor {
    pub frame_base: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameLocal {
    pub name: String,
    pub type_id: SymId,
    pub location: Location,
}

/// The read contract shared by every symbol backend.
pub trait SymbolProvider {
    fn type_tag(&self, type_id: SymId) -> Result<TagKind>;
    fn type_size(&self, type_id: SymId) -> Result<u64>;
    fn type_id(&self, type_name: &str) -> Result<SymId>;
    fn type_name(&self, type_id: SymId) -> Result<String>;
    /// Target type of a pointer, array, typedef, or cv wrapper.
    fn element_type(&self, type_id: SymId) -> Result<SymId>;
    fn field_names(&self, type_id: SymId) -> Result<Vec<String>>;
    fn field_type_and_offset(&self, type_id: SymId, field_name: &str) -> Result<(SymId, u64)>;
    fn source_line_at(&self, process_address: u64, relative_address: u64) -> SourceLine;
    fn function_at(&self, process_address: u64, relative_address: u64) -> (String, u64);
    fn frame_locals(
        &self,
        frame: &FrameDescriptor,
        relative_address: u64,
        arguments_only: bool,
    ) -> Vec<FrameLocal>;
}

pub struct DwarfProvider {
    session: Session,
    by_name: OnceCell<HashMap<String, SymId>>,
}

impl DwarfProvider {
    pub fn new(session: Session) -> DwarfProvider {
        DwarfProvider { session, by_name: OnceCell::new() }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn sym(&self, id: SymId) -> Result<&Symbol> {
        self.session
            .symbols()
            .get(id.index())
            .ok_or_else(|| Error::UnknownType(format!("#{}", id.0)))
    }

    fn names(&self) -> &HashMap<String, SymId> {
        self.by_name.get_or_init(|| {
            let mut map = HashMap::new();
            for (i, sym) in self.session.symbols().iter().enumerate() {
                if !is_named_type(sym.tag) {
                    continue;
                }
                let Some(name) = sym.name() else { continue };
                // First definition wins; later homonyms in other units
                // stay reachable by id.
                map.entry(name.to_string()).or_insert(SymId(i as u32));
            }
            debug!(types = map.len(), "built name index");
            map
        })
    }

    fn address_size(&self, sym: &Symbol) -> u8 {
        self.session.cus().get(sym.cu).map_or(8, |cu| cu.address_size)
    }

    /// Follows typedef and cv wrappers down to a composite type.
    fn strip_to_composite(&self, type_id: SymId) -> Result<SymId> {
        let mut id = type_id;
        for _ in 0..MAX_TYPE_CHAIN {
            let sym = self.sym(id)?;
            match sym.tag {
                Tag::StructureType | Tag::ClassType | Tag::UnionType => return Ok(id),
                Tag::Typedef | Tag::ConstType | Tag::VolatileType => match sym.reference(AttrName::Type) {
                    Some(next) => id = next,
                    None => break,
                },
                _ => break,
            }
        }
        Err(Error::UnknownType(self.display_name(type_id)))
    }

    fn display_name(&self, id: SymId) -> String {
        self.sym(id)
            .ok()
            .and_then(|s| s.name())
            .map_or_else(|| format!("#{}", id.0), str::to_string)
    }

    fn member_byte_offset(&self, member: &Symbol) -> Result<u64> {
        // Virtual-base offsets need a live object to chase; out of scope.
        if member.attr(AttrName::Virtuality).is_some() {
            return Err(Error::UnsupportedExpression);
        }
        match member.attr(AttrName::DataMemberLocation) {
            None => Ok(0),
            Some(AttrValue::Constant(n)) => Ok(*n),
            Some(AttrValue::Block(expr)) | Some(AttrValue::ExpressionLocation(expr)) => {
                let ctx = EvalContext::member_offset(self.address_size(member));
                match evaluate(expr, &ctx)? {
                    Location::Address(n) | Location::Value(n) => Ok(n),
                    Location::Register(_) => Err(Error::UnsupportedExpression),
                }
            }
            Some(_) => Err(Error::UnsupportedExpression),
        }
    }

    fn array_size(&self, array: &Symbol) -> Result<u64> {
        let Some(element) = array.reference(AttrName::Type) else { return Ok(0) };
        let element_size = self.type_size(element)?;
        let mut total = element_size;
        for &child in &array.children {
            let sub = self.session.symbol(child);
            if sub.tag != Tag::SubrangeType {
                continue;
            }
            let count = match (sub.udata(AttrName::Count), sub.udata(AttrName::UpperBound)) {
                (Some(count), _) => count,
                (None, Some(upper)) => upper + 1,
                (None, None) => 0,
            };
            total *= count;
        }
        Ok(total)
    }

    fn type_name_depth(&self, id: SymId, depth: u8) -> Result<String> {
        let sym = self.sym(id)?;
        if let Some(name) = sym.name() {
            return Ok(name.to_string());
        }
        if sym.tag == Tag::PointerType && depth < 8 {
            if let Some(element) = sym.reference(AttrName::Type) {
                return Ok(format!("{}*", self.type_name_depth(element, depth + 1)?));
            }
        }
        Ok(String::new())
    }

    /// `[low, high)` of a subprogram or lexical block, when both bounds
    /// decode. `high_pc` may be an address or a size constant.
    fn code_range(&self, sym: &Symbol) -> Option<(u64, u64)> {
        let low = match sym.attr(AttrName::LowPc)? {
            AttrValue::Address(a) => *a,
            _ => return None,
        };
        let high = match sym.attr(AttrName::HighPc)? {
            AttrValue::Address(a) => *a,
            AttrValue::Constant(n) => low + n,
            _ => return None,
        };
        (high > low).then_some((low, high))
    }

    fn function_symbol(&self, cu_index: usize, pc: u64) -> Option<(SymId, &Symbol)> {
        self.session
            .symbols()
            .iter()
            .enumerate()
            .filter(|(_, sym)| sym.cu == cu_index && sym.tag == Tag::Subprogram)
            .find(|(_, sym)| {
                self.code_range(sym).is_some_and(|(low, high)| low <= pc && pc < high)
            })
            .map(|(i, sym)| (SymId(i as u32), sym))
    }

    /// The declared frame base, when it evaluates inside the supported
    /// subset; otherwise the unwinder-provided value stands.
    fn refine_frame_base(&self, function: &Symbol, frame: &FrameDescriptor) -> u64 {
        let expr = match function.attr(AttrName::FrameBase) {
            Some(AttrValue::ExpressionLocation(expr)) | Some(AttrValue::Block(expr)) => expr,
            _ => return frame.frame_base,
        };
        let ctx = EvalContext {
            frame_base: Some(frame.frame_base),
            address_size: self.address_size(function),
            source: None,
        };
        match evaluate(expr, &ctx) {
            Ok(Location::Address(a)) | Ok(Location::Value(a)) => a,
            _ => frame.frame_base,
        }
    }

    fn collect_locals(
        &self,
        scope: SymId,
        pc: u64,
        arguments_only: bool,
        frame_base: u64,
        out: &mut Vec<FrameLocal>,
    ) {
        for &child in &self.session.symbol(scope).children {
            let sym = self.session.symbol(child);
            match sym.tag {
                Tag::FormalParameter => self.push_local(sym, frame_base, out),
                Tag::Variable if !arguments_only => self.push_local(sym, frame_base, out),
                Tag::LexicalBlock => {
                    let in_scope = match self.code_range(sym) {
                        Some((low, high)) => low <= pc && pc < high,
                        None => true,
                    };
                    if in_scope {
                        self.collect_locals(child, pc, arguments_only, frame_base, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn push_local(&self, sym: &Symbol, frame_base: u64, out: &mut Vec<FrameLocal>) {
        let Some(name) = sym.name() else { return };
        let Some(type_id) = sym.reference(AttrName::Type) else { return };
        let expr = match sym.attr(AttrName::Location) {
            Some(AttrValue::ExpressionLocation(expr)) | Some(AttrValue::Block(expr)) => expr,
            // Absent or a location list; either way the variable has no
            // single resolvable location here.
            _ => return,
        };
        let ctx = EvalContext {
            frame_base: Some(frame_base),
            address_size: self.address_size(sym),
            source: None,
        };
        let Ok(location) = evaluate(expr, &ctx) else { return };
        out.push(FrameLocal { name: name.to_string(), type_id, location });
    }
}

/// Tags the name index covers. Functions and data symbols are reachable
/// through the address queries instead.
fn is_named_type(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::BaseType
            | Tag::StructureType
            | Tag::ClassType
            | Tag::UnionType
            | Tag::EnumerationType
            | Tag::Typedef
            | Tag::PointerType
            | Tag::ArrayType
            | Tag::SubroutineType
            | Tag::ConstType
            | Tag::VolatileType
            | Tag::ReferenceType
            | Tag::UnspecifiedType
    )
}

fn tag_kind(tag: Tag) -> TagKind {
    match tag {
        Tag::BaseType => TagKind::Base,
        Tag::PointerType | Tag::PtrToMemberType => TagKind::Pointer,
        Tag::ArrayType => TagKind::Array,
        Tag::StructureType => TagKind::Struct,
        Tag::UnionType => TagKind::Union,
        Tag::ClassType => TagKind::Class,
        Tag::EnumerationType => TagKind::Enum,
        Tag::Subprogram | Tag::SubroutineType => TagKind::Function,
        Tag::Typedef => TagKind::Typedef,
        Tag::ConstType => TagKind::Const,
        Tag::VolatileType => TagKind::Volatile,
        Tag::ReferenceType | Tag::RvalueReferenceType => TagKind::Reference,
        _ => TagKind::Unknown,
    }
}

impl SymbolProvider for DwarfProvider {
    fn type_tag(&self, type_id: SymId) -> Result<TagKind> {
        Ok(tag_kind(self.sym(type_id)?.tag))
    }

    fn type_size(&self, type_id: SymId) -> Result<u64> {
        let mut id = type_id;
        for _ in 0..MAX_TYPE_CHAIN {
            let sym = self.sym(id)?;
            if let Some(n) = sym.udata(AttrName::ByteSize) {
                return Ok(n);
            }
            match sym.tag {
                Tag::PointerType => return Ok(u64::from(self.address_size(sym))),
                Tag::ArrayType => return self.array_size(sym),
                Tag::Typedef | Tag::ConstType | Tag::VolatileType => {
                    match sym.reference(AttrName::Type) {
                        Some(next) => id = next,
                        None => return Ok(0),
                    }
                }
                _ => return Ok(0),
            }
        }
        Ok(0)
    }

    fn type_id(&self, type_name: &str) -> Result<SymId> {
        self.names()
            .get(type_name)
            .copied()
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    fn type_name(&self, type_id: SymId) -> Result<String> {
        self.type_name_depth(type_id, 0)
    }

    fn element_type(&self, type_id: SymId) -> Result<SymId> {
        self.sym(type_id)?
            .reference(AttrName::Type)
            .ok_or_else(|| Error::UnknownType(self.display_name(type_id)))
    }

    fn field_names(&self, type_id: SymId) -> Result<Vec<String>> {
        let composite = self.strip_to_composite(type_id)?;
        Ok(self
            .session
            .symbol(composite)
            .children
            .iter()
            .map(|&child| self.session.symbol(child))
            .filter(|sym| sym.tag == Tag::Member)
            .filter_map(|sym| sym.name().map(str::to_string))
            .collect())
    }

    fn field_type_and_offset(&self, type_id: SymId, field_name: &str) -> Result<(SymId, u64)> {
        let composite = self.strip_to_composite(type_id)?;
        for &child in &self.session.symbol(composite).children {
            let sym = self.session.symbol(child);
            if sym.tag != Tag::Member || sym.name() != Some(field_name) {
                continue;
            }
            let field_type = sym
                .reference(AttrName::Type)
                .ok_or_else(|| Error::UnknownType(field_name.to_string()))?;
            return Ok((field_type, self.member_byte_offset(sym)?));
        }
        Err(Error::UnknownType(field_name.to_string()))
    }

    fn source_line_at(&self, process_address: u64, relative_address: u64) -> SourceLine {
        let miss = SourceLine {
            file: String::new(),
            line: 0,
            displacement: process_address.wrapping_add(relative_address),
        };
        let Some(cu_index) = self.session.find_cu(relative_address) else { return miss };
        let cu = &self.session.cus()[cu_index];
        let Some(row) = cu.line.lookup(relative_address) else { return miss };
        let Some(file) = cu.line.file_name(row.file) else { return miss };
        SourceLine { file, line: row.line, displacement: relative_address - row.address }
    }

    fn function_at(&self, process_address: u64, relative_address: u64) -> (String, u64) {
        let miss = (String::new(), process_address.wrapping_add(relative_address));
        let Some(cu_index) = self.session.find_cu(relative_address) else { return miss };
        let Some((_, sym)) = self.function_symbol(cu_index, relative_address) else { return miss };
        let Some((low, _)) = self.code_range(sym) else { return miss };
        let linkage = match sym.attr(AttrName::LinkageName) {
            Some(AttrValue::String(s)) => Some(s.as_str()),
            _ => None,
        };
        let name = sym.name().or(linkage).unwrap_or_default();
        (name.to_string(), relative_address - low)
    }

    fn frame_locals(
        &self,
        frame: &FrameDescriptor,
        relative_address: u64,
        arguments_only: bool,
    ) -> Vec<FrameLocal> {
        let mut out = Vec::new();
        let Some(cu_index) = self.session.find_cu(relative_address) else { return out };
        let Some((id, sym)) = self.function_symbol(cu_index, relative_address) else { return out };
        let frame_base = self.refine_frame_base(sym, frame);
        self.collect_locals(id, relative_address, arguments_only, frame_base, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CancelToken, DwarfSections};
    use crate::testkit::{self, sleb, AbbrevBuilder, CuBuilder, LineBuilder};

    fn provider(sections: DwarfSections) -> DwarfProvider {
        DwarfProvider::new(Session::parse(sections, &|a| a, &CancelToken::new()))
    }

    /// One CU: `struct Point { int32 x; int32 y; }`.
    fn point_image() -> DwarfSections {
        let abbrev = AbbrevBuilder::new()
            .entry(1, testkit::TAG_COMPILE_UNIT, true, &[(testkit::AT_NAME, testkit::FORM_STRING)])
            .entry(2, testkit::TAG_BASE_TYPE, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(3, testkit::TAG_STRUCTURE_TYPE, true, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(4, testkit::TAG_MEMBER, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_TYPE, testkit::FORM_REF4),
                (testkit::AT_DATA_MEMBER_LOCATION, testkit::FORM_DATA1),
            ])
            .finish();
        let mut cu = CuBuilder::new();
        cu.uleb(1);
        cu.cstr("point.c");
        let int_off = cu.next_die_offset();
        cu.uleb(2);
        cu.cstr("int32");
        cu.u8(4);
        cu.uleb(3);
        cu.cstr("Point");
        cu.u8(8);
        cu.uleb(4);
        cu.cstr("x");
        cu.u32(int_off as u32);
        cu.u8(0);
        cu.uleb(4);
        cu.cstr("y");
        cu.u32(int_off as u32);
        cu.u8(4);
        cu.uleb(0); // close struct
        cu.uleb(0); // close cu
        DwarfSections {
            debug_info: cu.finish(),
            debug_abbrev: abbrev,
            ..DwarfSections::default()
        }
    }

    #[test]
    fn struct_fields_enumerate_in_source_order() {
        let p = provider(point_image());
        let point = p.type_id("Point").unwrap();
        assert_eq!(p.type_tag(point).unwrap(), TagKind::Struct);
        assert_eq!(p.type_size(point).unwrap(), 8);
        assert_eq!(p.field_names(point).unwrap(), ["x", "y"]);
        let (field_type, offset) = p.field_type_and_offset(point, "y").unwrap();
        assert_eq!(offset, 4);
        assert_eq!(p.type_name(field_type).unwrap(), "int32");
        assert!(matches!(p.field_type_and_offset(point, "z"), Err(Error::UnknownType(_))));
        assert!(matches!(p.type_id("NoSuch"), Err(Error::UnknownType(_))));
    }

    #[test]
    fn field_offsets_round_trip() {
        let p = provider(point_image());
        let point = p.type_id("Point").unwrap();
        let composite = p.strip_to_composite(point).unwrap();
        for &child in &p.session.symbol(composite).children {
            let member = p.session.symbol(child);
            if member.tag != Tag::Member {
                continue;
            }
            let name = member.name().unwrap();
            let (_, offset) = p.field_type_and_offset(point, name).unwrap();
            assert_eq!(offset, p.member_byte_offset(member).unwrap());
        }
    }

    /// Typedef chain: `U -> T -> *int32`, plus an untyped typedef `V`.
    fn typedef_image() -> DwarfSections {
        let abbrev = AbbrevBuilder::new()
            .entry(1, testkit::TAG_COMPILE_UNIT, true, &[])
            .entry(2, testkit::TAG_BASE_TYPE, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(3, testkit::TAG_POINTER_TYPE, false, &[(testkit::AT_TYPE, testkit::FORM_REF4)])
            .entry(4, testkit::TAG_TYPEDEF, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_TYPE, testkit::FORM_REF4),
            ])
            .entry(5, testkit::TAG_TYPEDEF, false, &[(testkit::AT_NAME, testkit::FORM_STRING)])
            .finish();
        let mut cu = CuBuilder::new();
        cu.uleb(1);
        let int_off = cu.next_die_offset();
        cu.uleb(2);
        cu.cstr("int32");
        cu.u8(4);
        let ptr_off = cu.next_die_offset();
        cu.uleb(3);
        cu.u32(int_off as u32);
        let t_off = cu.next_die_offset();
        cu.uleb(4);
        cu.cstr("T");
        cu.u32(ptr_off as u32);
        cu.uleb(4);
        cu.cstr("U");
        cu.u32(t_off as u32);
        cu.uleb(5);
        cu.cstr("V");
        cu.uleb(0);
        DwarfSections {
            debug_info: cu.finish(),
            debug_abbrev: abbrev,
            ..DwarfSections::default()
        }
    }

    #[test]
    fn typedef_chains_walk_to_the_pointee() {
        let p = provider(typedef_image());
        let u = p.type_id("U").unwrap();
        let t = p.element_type(u).unwrap();
        assert_eq!(p.type_name(t).unwrap(), "T");
        assert_eq!(p.type_tag(t).unwrap(), TagKind::Typedef);
        let ptr = p.element_type(t).unwrap();
        assert_eq!(p.type_tag(ptr).unwrap(), TagKind::Pointer);
        let int = p.element_type(ptr).unwrap();
        assert_eq!(p.type_name(int).unwrap(), "int32");
        assert_eq!(p.type_name(p.element_type(p.element_type(t).unwrap()).unwrap()).unwrap(), "int32");
        // Pointer and typedef sizes resolve through the chain.
        assert_eq!(p.type_size(ptr).unwrap(), 8);
        assert_eq!(p.type_size(u).unwrap(), 8);
        // The synthesized name of the anonymous pointer.
        assert_eq!(p.type_name(ptr).unwrap(), "int32*");
    }

    #[test]
    fn omitted_type_attribute_means_void() {
        let p = provider(typedef_image());
        let v = p.type_id("V").unwrap();
        let void = p.element_type(v).unwrap();
        assert_eq!(p.type_name(void).unwrap(), "void");
        assert_eq!(p.type_tag(void).unwrap(), TagKind::Base);
        assert_eq!(p.type_size(void).unwrap(), 0);
        assert_eq!(p.session.symbol(void).offset, -1);
    }

    /// One CU covering [0x100, 0x140) with a line table, a subprogram
    /// `main`, and frame locals.
    fn program_image() -> DwarfSections {
        let abbrev = AbbrevBuilder::new()
            .entry(1, testkit::TAG_COMPILE_UNIT, true, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_LOW_PC, testkit::FORM_ADDR),
                (testkit::AT_HIGH_PC, testkit::FORM_DATA4),
                (testkit::AT_STMT_LIST, testkit::FORM_SEC_OFFSET),
            ])
            .entry(2, testkit::TAG_BASE_TYPE, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(3, testkit::TAG_SUBPROGRAM, true, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_LOW_PC, testkit::FORM_ADDR),
                (testkit::AT_HIGH_PC, testkit::FORM_DATA4),
            ])
            .entry(4, testkit::TAG_FORMAL_PARAMETER, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_TYPE, testkit::FORM_REF4),
                (testkit::AT_LOCATION, testkit::FORM_EXPRLOC),
            ])
            .entry(5, testkit::TAG_VARIABLE, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_TYPE, testkit::FORM_REF4),
                (testkit::AT_LOCATION, testkit::FORM_EXPRLOC),
            ])
            .finish();

        let mut cu = CuBuilder::new();
        cu.uleb(1);
        cu.cstr("a.c");
        cu.u64(0x100);
        cu.u32(0x40);
        cu.u32(0); // line program at offset 0
        let int_off = cu.next_die_offset();
        cu.uleb(2);
        cu.cstr("int32");
        cu.u8(4);
        cu.uleb(3);
        cu.cstr("main");
        cu.u64(0x100);
        cu.u32(0x10);
        cu.uleb(4); // parameter argc: fbreg -4
        cu.cstr("argc");
        cu.u32(int_off as u32);
        let expr = {
            let mut e = vec![0x91]; // DW_OP_fbreg
            e.extend(sleb(-4));
            e
        };
        cu.uleb(expr.len() as u64);
        cu.bytes(&expr);
        cu.uleb(5); // variable total: fbreg -16
        cu.cstr("total");
        cu.u32(int_off as u32);
        let expr = {
            let mut e = vec![0x91];
            e.extend(sleb(-16));
            e
        };
        cu.uleb(expr.len() as u64);
        cu.bytes(&expr);
        cu.uleb(0); // close main
        cu.uleb(0); // close cu

        let mut line = LineBuilder::new();
        line.file("a.c", 0);
        line.set_address(0x100);
        line.advance_line(9);
        line.copy();
        line.advance_pc(4);
        line.advance_line(1);
        line.copy();
        line.advance_pc(4);
        line.end_sequence();

        DwarfSections {
            debug_info: cu.finish(),
            debug_abbrev: abbrev,
            debug_line: line.finish(),
            ..DwarfSections::default()
        }
    }

    #[test]
    fn source_lines_resolve_with_displacement() {
        let p = provider(program_image());
        let hit = p.source_line_at(0, 0x102);
        assert_eq!(hit, SourceLine { file: "a.c".into(), line: 10, displacement: 2 });
        assert!(hit.is_found());
        let hit = p.source_line_at(0, 0x104);
        assert_eq!((hit.line, hit.displacement), (11, 0));
        // Past the end of the sequence: the sentinel.
        let miss = p.source_line_at(0, 0x108);
        assert!(!miss.is_found());
        assert_eq!(miss, SourceLine { file: String::new(), line: 0, displacement: 0x108 });
    }

    #[test]
    fn functions_resolve_by_address() {
        let p = provider(program_image());
        assert_eq!(p.function_at(0, 0x105), ("main".into(), 5));
        // Inside the CU range but outside any subprogram.
        assert_eq!(p.function_at(0, 0x130), (String::new(), 0x130));
        // Outside every CU.
        assert_eq!(p.function_at(0x7000_0000, 0x999), (String::new(), 0x7000_0999));
    }

    #[test]
    fn frame_locals_evaluate_against_the_frame_base() {
        let p = provider(program_image());
        let frame = FrameDescriptor { frame_base: 0x8000 };
        let all = p.frame_locals(&frame, 0x105, false);
        let names: Vec<&str> = all.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["argc", "total"]);
        assert_eq!(all[0].location, Location::Address(0x8000 - 4));
        assert_eq!(all[1].location, Location::Address(0x8000 - 16));
        assert_eq!(p.type_name(all[1].type_id).unwrap(), "int32");

        let args = p.frame_locals(&frame, 0x105, true);
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].name, "argc");

        assert!(p.frame_locals(&frame, 0x130, false).is_empty());
    }

    #[test]
    fn name_queries_survive_a_corrupt_unit() {
        let abbrev = AbbrevBuilder::new()
            .entry(1, testkit::TAG_COMPILE_UNIT, true, &[])
            .entry(2, testkit::TAG_BASE_TYPE, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .finish();
        let build = |name: &str, size: u8| {
            let mut cu = CuBuilder::new();
            cu.uleb(1);
            cu.uleb(2);
            cu.cstr(name);
            cu.u8(size);
            cu.uleb(0);
            cu.finish()
        };
        let mut info = build("alpha", 4);
        let mut corrupt = CuBuilder::new();
        corrupt.uleb(9); // undefined abbreviation code
        info.extend(corrupt.finish());
        info.extend(build("gamma", 8));

        let p = provider(DwarfSections {
            debug_info: info,
            debug_abbrev: abbrev,
            ..DwarfSections::default()
        });
        assert_eq!(p.session.diagnostics().len(), 1);
        assert_eq!(p.type_size(p.type_id("alpha").unwrap()).unwrap(), 4);
        assert_eq!(p.type_size(p.type_id("gamma").unwrap()).unwrap(), 8);
    }

    #[test]
    fn union_members_default_to_offset_zero() {
        let abbrev = AbbrevBuilder::new()
            .entry(1, testkit::TAG_COMPILE_UNIT, true, &[])
            .entry(2, testkit::TAG_BASE_TYPE, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(3, testkit::TAG_UNION_TYPE, true, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(4, testkit::TAG_MEMBER, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_TYPE, testkit::FORM_REF4),
            ])
            .finish();
        let mut cu = CuBuilder::new();
        cu.uleb(1);
        let int_off = cu.next_die_offset();
        cu.uleb(2);
        cu.cstr("int32");
        cu.u8(4);
        cu.uleb(3);
        cu.cstr("Value");
        cu.u8(8);
        cu.uleb(4);
        cu.cstr("i");
        cu.u32(int_off as u32);
        cu.uleb(4);
        cu.cstr("f");
        cu.u32(int_off as u32);
        cu.uleb(0);
        cu.uleb(0);
        let p = provider(DwarfSections {
            debug_info: cu.finish(),
            debug_abbrev: abbrev,
            ..DwarfSections::default()
        });
        let value = p.type_id("Value").unwrap();
        assert_eq!(p.type_tag(value).unwrap(), TagKind::Union);
        assert_eq!(p.field_type_and_offset(value, "f").unwrap().1, 0);
    }

    #[test]
    fn virtual_bases_are_reported_unsupported() {
        let abbrev = AbbrevBuilder::new()
            .entry(1, testkit::TAG_COMPILE_UNIT, true, &[])
            .entry(2, testkit::TAG_STRUCTURE_TYPE, true, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(3, testkit::TAG_MEMBER, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_VIRTUALITY, testkit::FORM_DATA1),
                (testkit::AT_DATA_MEMBER_LOCATION, testkit::FORM_DATA1),
            ])
            .finish();
        let mut cu = CuBuilder::new();
        cu.uleb(1);
        cu.uleb(2);
        cu.cstr("Derived");
        cu.u8(16);
        cu.uleb(3);
        cu.cstr("base");
        cu.u8(1); // DW_VIRTUALITY_virtual
        cu.u8(8);
        cu.uleb(0);
        cu.uleb(0);
        let p = provider(DwarfSections {
            debug_info: cu.finish(),
            debug_abbrev: abbrev,
            ..DwarfSections::default()
        });
        let derived = p.type_id("Derived").unwrap();
        assert!(matches!(
            p.field_type_and_offset(derived, "base"),
            Err(Error::UnsupportedExpression)
        ));
    }

    #[test]
    fn member_offset_expressions_evaluate() {
        let abbrev = AbbrevBuilder::new()
            .entry(1, testkit::TAG_COMPILE_UNIT, true, &[])
            .entry(2, testkit::TAG_BASE_TYPE, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(3, testkit::TAG_STRUCTURE_TYPE, true, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(4, testkit::TAG_MEMBER, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_TYPE, testkit::FORM_REF4),
                (testkit::AT_DATA_MEMBER_LOCATION, testkit::FORM_BLOCK1),
            ])
            .finish();
        let mut cu = CuBuilder::new();
        cu.uleb(1);
        let int_off = cu.next_die_offset();
        cu.uleb(2);
        cu.cstr("int32");
        cu.u8(4);
        cu.uleb(3);
        cu.cstr("Wide");
        cu.u8(32);
        cu.uleb(4);
        cu.cstr("tail");
        cu.u32(int_off as u32);
        cu.u8(2); // block length
        cu.bytes(&[0x23, 24]); // DW_OP_plus_uconst 24
        cu.uleb(0);
        cu.uleb(0);
        let p = provider(DwarfSections {
            debug_info: cu.finish(),
            debug_abbrev: abbrev,
            ..DwarfSections::default()
        });
        let wide = p.type_id("Wide").unwrap();
        assert_eq!(p.field_type_and_offset(wide, "tail").unwrap().1, 24);
    }

    #[test]
    fn array_sizes_multiply_subranges() {
        let abbrev = AbbrevBuilder::new()
            .entry(1, testkit::TAG_COMPILE_UNIT, true, &[])
            .entry(2, testkit::TAG_BASE_TYPE, false, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_BYTE_SIZE, testkit::FORM_DATA1),
            ])
            .entry(3, testkit::TAG_ARRAY_TYPE, true, &[
                (testkit::AT_NAME, testkit::FORM_STRING),
                (testkit::AT_TYPE, testkit::FORM_REF4),
            ])
            .entry(4, testkit::TAG_SUBRANGE_TYPE, false, &[(testkit::AT_UPPER_BOUND, testkit::FORM_DATA1)])
            .finish();
        let mut cu = CuBuilder::new();
        cu.uleb(1);
        let int_off = cu.next_die_offset();
        cu.uleb(2);
        cu.cstr("int32");
        cu.u8(4);
        cu.uleb(3);
        cu.cstr("Grid");
        cu.u32(int_off as u32);
        cu.uleb(4);
        cu.u8(2); // upper bound 2 -> 3 elements
        cu.uleb(4);
        cu.u8(3); // upper bound 3 -> 4 elements
        cu.uleb(0);
        cu.uleb(0);
        let p = provider(DwarfSections {
            debug_info: cu.finish(),
            debug_abbrev: abbrev,
            ..DwarfSections::default()
        });
        let grid = p.type_id("Grid").unwrap();
        assert_eq!(p.type_tag(grid).unwrap(), TagKind::Array);
        assert_eq!(p.type_size(grid).unwrap(), 4 * 3 * 4);
    }
}
