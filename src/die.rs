//! The in-memory symbol model.
//!
//! A [`Symbol`] is one debug information entry: a tag, an attribute map,
//! and tree edges into the arena that owns every symbol of a parse
//! session. Cross references between symbols are [`SymId`] handles, never
//! owning pointers, so self-referential types (a struct containing a
//! pointer to itself) need no special casing.

use std::fmt;

/// Dense handle into the session's symbol arena, assigned in parse order.
/// Higher layers treat these as opaque 32-bit tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

impl SymId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// DIE tags, DWARF 2 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    ArrayType,
    ClassType,
    EntryPoint,
    EnumerationType,
    FormalParameter,
    ImportedDeclaration,
    Label,
    LexicalBlock,
    Member,
    PointerType,
    ReferenceType,
    CompileUnit,
    StringType,
    StructureType,
    SubroutineType,
    Typedef,
    UnionType,
    UnspecifiedParameters,
    Variant,
    CommonBlock,
    CommonInclusion,
    Inheritance,
    InlinedSubroutine,
    Module,
    PtrToMemberType,
    SetType,
    SubrangeType,
    WithStmt,
    AccessDeclaration,
    BaseType,
    CatchBlock,
    ConstType,
    Constant,
    Enumerator,
    FileType,
    Friend,
    Namelist,
    NamelistItem,
    PackedType,
    Subprogram,
    TemplateTypeParameter,
    TemplateValueParameter,
    ThrownType,
    TryBlock,
    VariantPart,
    Variable,
    VolatileType,
    DwarfProcedure,
    RestrictType,
    InterfaceType,
    Namespace,
    ImportedModule,
    UnspecifiedType,
    PartialUnit,
    ImportedUnit,
    Condition,
    SharedType,
    TypeUnit,
    RvalueReferenceType,
    TemplateAlias,
    /// Vendor extensions and anything newer than DWARF 4.
    Unknown(u64),
}

impl Tag {
    pub fn from(value: u64) -> Tag {
        match value {
            0x01 => Tag::ArrayType,
            0x02 => Tag::ClassType,
            0x03 => Tag::EntryPoint,
            0x04 => Tag::EnumerationType,
            0x05 => Tag::FormalParameter,
            0x08 => Tag::ImportedDeclaration,
            0x0a => Tag::Label,
            0x0b => Tag::LexicalBlock,
            0x0d => Tag::Member,
            0x0f => Tag::PointerType,
            0x10 => Tag::ReferenceType,
            0x11 => Tag::CompileUnit,
            0x12 => Tag::StringType,
            0x13 => Tag::StructureType,
            0x15 => Tag::SubroutineType,
            0x16 => Tag::Typedef,
            0x17 => Tag::UnionType,
            0x18 => Tag::UnspecifiedParameters,
            0x19 => Tag::Variant,
            0x1a => Tag::CommonBlock,
            0x1b => Tag::CommonInclusion,
            0x1c => Tag::Inheritance,
            0x1d => Tag::InlinedSubroutine,
            0x1e => Tag::Module,
            0x1f => Tag::PtrToMemberType,
            0x20 => Tag::SetType,
            0x21 => Tag::SubrangeType,
            0x22 => Tag::WithStmt,
            0x23 => Tag::AccessDeclaration,
            0x24 => Tag::BaseType,
            0x25 => Tag::CatchBlock,
            0x26 => Tag::ConstType,
            0x27 => Tag::Constant,
            0x28 => Tag::Enumerator,
            0x29 => Tag::FileType,
            0x2a => Tag::Friend,
            0x2b => Tag::Namelist,
            0x2c => Tag::NamelistItem,
            0x2d => Tag::PackedType,
            0x2e => Tag::Subprogram,
            0x2f => Tag::TemplateTypeParameter,
            0x30 => Tag::TemplateValueParameter,
            0x31 => Tag::ThrownType,
            0x32 => Tag::TryBlock,
            0x33 => Tag::VariantPart,
            0x34 => Tag::Variable,
            0x35 => Tag::VolatileType,
            0x36 => Tag::DwarfProcedure,
            0x37 => Tag::RestrictType,
            0x38 => Tag::InterfaceType,
            0x39 => Tag::Namespace,
            0x3a => Tag::ImportedModule,
            0x3b => Tag::UnspecifiedType,
            0x3c => Tag::PartialUnit,
            0x3d => Tag::ImportedUnit,
            0x3f => Tag::Condition,
            0x40 => Tag::SharedType,
            0x41 => Tag::TypeUnit,
            0x42 => Tag::RvalueReferenceType,
            0x43 => Tag::TemplateAlias,
            n => Tag::Unknown(n),
        }
    }
}

/// Attribute names, DWARF 2 through 4. Unrecognized codes are carried
/// through so their values can still be decoded (the form tells us the
/// size) and skipped by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrName {
    Sibling,
    Location,
    Name,
    Ordering,
    ByteSize,
    BitOffset,
    BitSize,
    StmtList,
    LowPc,
    HighPc,
    Language,
    Discr,
    DiscrValue,
    Visibility,
    Import,
    StringLength,
    CommonReference,
    CompDir,
    ConstValue,
    ContainingType,
    DefaultValue,
    Inline,
    IsOptional,
    LowerBound,
    Producer,
    Prototyped,
    ReturnAddr,
    StartScope,
    BitStride,
    UpperBound,
    AbstractOrigin,
    Accessibility,
    AddressClass,
    Artificial,
    BaseTypes,
    CallingConvention,
    Count,
    DataMemberLocation,
    DeclColumn,
    DeclFile,
    DeclLine,
    Declaration,
    DiscrList,
    Encoding,
    External,
    FrameBase,
    Friend,
    IdentifierCase,
    MacroInfo,
    NamelistItem,
    Priority,
    Segment,
    Specification,
    StaticLink,
    Type,
    UseLocation,
    VariableParameter,
    Virtuality,
    VtableElemLocation,
    Allocated,
    Associated,
    DataLocation,
    ByteStride,
    EntryPc,
    UseUTF8,
    Extension,
    Ranges,
    Trampoline,
    CallColumn,
    CallFile,
    CallLine,
    Description,
    BinaryScale,
    DecimalScale,
    Small,
    DecimalSign,
    DigitCount,
    PictureString,
    Mutable,
    ThreadsScaled,
    Explicit,
    ObjectPointer,
    Endianity,
    Elemental,
    Pure,
    Recursive,
    Signature,
    MainSubprogram,
    DataBitOffset,
    ConstExpr,
    EnumClass,
    LinkageName,
    Unrecognized(u64),
}

impl AttrName {
    pub fn from(n: u64) -> AttrName {
        match n {
            0x01 => AttrName::Sibling,
            0x02 => AttrName::Location,
            0x03 => AttrName::Name,
            0x09 => AttrName::Ordering,
            0x0b => AttrName::ByteSize,
            0x0c => AttrName::BitOffset,
            0x0d => AttrName::BitSize,
            0x10 => AttrName::StmtList,
            0x11 => AttrName::LowPc,
            0x12 => AttrName::HighPc,
            0x13 => AttrName::Language,
            0x15 => AttrName::Discr,
            0x16 => AttrName::DiscrValue,
            0x17 => AttrName::Visibility,
            0x18 => AttrName::Import,
            0x19 => AttrName::StringLength,
            0x1a => AttrName::CommonReference,
            0x1b => AttrName::CompDir,
            0x1c => AttrName::ConstValue,
            0x1d => AttrName::ContainingType,
            0x1e => AttrName::DefaultValue,
            0x20 => AttrName::Inline,
            0x21 => AttrName::IsOptional,
            0x22 => AttrName::LowerBound,
            0x25 => AttrName::Producer,
            0x27 => AttrName::Prototyped,
            0x2a => AttrName::ReturnAddr,
            0x2c => AttrName::StartScope,
            0x2e => AttrName::BitStride,
            0x2f => AttrName::UpperBound,
            0x31 => AttrName::AbstractOrigin,
            0x32 => AttrName::Accessibility,
            0x33 => AttrName::AddressClass,
            0x34 => AttrName::Artificial,
            0x35 => AttrName::BaseTypes,
            0x36 => AttrName::CallingConvention,
            0x37 => AttrName::Count,
            0x38 => AttrName::DataMemberLocation,
            0x39 => AttrName::DeclColumn,
            0x3a => AttrName::DeclFile,
            0x3b => AttrName::DeclLine,
            0x3c => AttrName::Declaration,
            0x3d => AttrName::DiscrList,
            0x3e => AttrName::Encoding,
            0x3f => AttrName::External,
            0x40 => AttrName::FrameBase,
            0x41 => AttrName::Friend,
            0x42 => AttrName::IdentifierCase,
            0x43 => AttrName::MacroInfo,
            0x44 => AttrName::NamelistItem,
            0x45 => AttrName::Priority,
            0x46 => AttrName::Segment,
            0x47 => AttrName::Specification,
            0x48 => AttrName::StaticLink,
            0x49 => AttrName::Type,
            0x4a => AttrName::UseLocation,
            0x4b => AttrName::VariableParameter,
            0x4c => AttrName::Virtuality,
            0x4d => AttrName::VtableElemLocation,
            0x4e => AttrName::Allocated,
            0x4f => AttrName::Associated,
            0x50 => AttrName::DataLocation,
            0x51 => AttrName::ByteStride,
            0x52 => AttrName::EntryPc,
            0x53 => AttrName::UseUTF8,
            0x54 => AttrName::Extension,
            0x55 => AttrName::Ranges,
            0x56 => AttrName::Trampoline,
            0x57 => AttrName::CallColumn,
            0x58 => AttrName::CallFile,
            0x59 => AttrName::CallLine,
            0x5a => AttrName::Description,
            0x5b => AttrName::BinaryScale,
            0x5c => AttrName::DecimalScale,
            0x5d => AttrName::Small,
            0x5e => AttrName::DecimalSign,
            0x5f => AttrName::DigitCount,
            0x60 => AttrName::PictureString,
            0x61 => AttrName::Mutable,
            0x62 => AttrName::ThreadsScaled,
            0x63 => AttrName::Explicit,
            0x64 => AttrName::ObjectPointer,
            0x65 => AttrName::Endianity,
            0x66 => AttrName::Elemental,
            0x67 => AttrName::Pure,
            0x68 => AttrName::Recursive,
            0x69 => AttrName::Signature,
            0x6a => AttrName::MainSubprogram,
            0x6b => AttrName::DataBitOffset,
            0x6c => AttrName::ConstExpr,
            0x6d => AttrName::EnumClass,
            0x6e => AttrName::LinkageName,
            n => AttrName::Unrecognized(n),
        }
    }
}

/// Attribute encodings, DWARF 2 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrForm {
    Addr,
    Block2,
    Block4,
    Data2,
    Data4,
    Data8,
    String,
    Block,
    Block1,
    Data1,
    Flag,
    Sdata,
    Strp,
    Udata,
    RefAddr,
    Ref1,
    Ref2,
    Ref4,
    Ref8,
    RefUdata,
    Indirect,
    SecOffset,
    ExprLoc,
    FlagPresent,
    RefSig8,
    Unrecognized(u64),
}

impl AttrForm {
    pub fn from(n: u64) -> AttrForm {
        match n {
            0x01 => AttrForm::Addr,
            0x03 => AttrForm::Block2,
            0x04 => AttrForm::Block4,
            0x05 => AttrForm::Data2,
            0x06 => AttrForm::Data4,
            0x07 => AttrForm::Data8,
            0x08 => AttrForm::String,
            0x09 => AttrForm::Block,
            0x0a => AttrForm::Block1,
            0x0b => AttrForm::Data1,
            0x0c => AttrForm::Flag,
            0x0d => AttrForm::Sdata,
            0x0e => AttrForm::Strp,
            0x0f => AttrForm::Udata,
            0x10 => AttrForm::RefAddr,
            0x11 => AttrForm::Ref1,
            0x12 => AttrForm::Ref2,
            0x13 => AttrForm::Ref4,
            0x14 => AttrForm::Ref8,
            0x15 => AttrForm::RefUdata,
            0x16 => AttrForm::Indirect,
            0x17 => AttrForm::SecOffset,
            0x18 => AttrForm::ExprLoc,
            0x19 => AttrForm::FlagPresent,
            0x20 => AttrForm::RefSig8,
            n => AttrForm::Unrecognized(n),
        }
    }
}

/// A decoded attribute value. One arm per form family; the set is closed
/// by the DWARF spec, so consumers match exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Target address, already passed through the session's normalizer.
    Address(u64),
    /// Unsigned constant. `DW_FORM_sdata` is stored as the two's-complement
    /// image of the signed value.
    Constant(u64),
    /// Uninterpreted byte block.
    Block(Vec<u8>),
    String(String),
    Flag(bool),
    /// Absolute `.debug_info` offset of another DIE, not yet resolved.
    Reference(u64),
    /// Resolved cross reference into the session arena.
    ResolvedReference(SymId),
    /// DWARF expression bytes (`DW_FORM_exprloc`).
    ExpressionLocation(Vec<u8>),
    /// Offset into another section (line, ranges, loc, ...).
    SecOffset(u64),
    /// Value the parser could not give meaning to (e.g. `ref_sig8` into an
    /// ignored `.debug_types` section).
    Invalid,
}

impl AttrValue {
    pub fn constant(&self) -> Option<u64> {
        match self {
            AttrValue::Constant(n) => Some(*n),
            _ => None,
        }
    }

    pub fn resolved(&self) -> Option<SymId> {
        match self {
            AttrValue::ResolvedReference(id) => Some(*id),
            _ => None,
        }
    }
}

/// One debug information entry, owned by the session arena.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub tag: Tag,
    /// Absolute offset in `.debug_info`, or -1 for the synthetic void type.
    pub offset: i64,
    /// Index of the owning compilation unit within the session.
    pub cu: usize,
    pub parent: Option<SymId>,
    /// Children in source order.
    pub children: Vec<SymId>,
    attrs: Vec<(AttrName, AttrValue)>,
}

impl Symbol {
    pub fn new(tag: Tag, offset: i64, cu: usize, parent: Option<SymId>) -> Symbol {
        Symbol { tag, offset, cu, parent, children: Vec::new(), attrs: Vec::new() }
    }

    pub fn attr(&self, name: AttrName) -> Option<&AttrValue> {
        self.attrs.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Insert or replace. A duplicate attribute on one DIE keeps the last
    /// value silently.
    pub fn set_attr(&mut self, name: AttrName, value: AttrValue) {
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn attrs(&self) -> &[(AttrName, AttrValue)] {
        &self.attrs
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut Vec<(AttrName, AttrValue)> {
        &mut self.attrs
    }

    pub fn name(&self) -> Option<&str> {
        match self.attr(AttrName::Name) {
            Some(AttrValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn udata(&self, name: AttrName) -> Option<u64> {
        self.attr(name).and_then(AttrValue::constant)
    }

    pub fn reference(&self, name: AttrName) -> Option<SymId> {
        self.attr(name).and_then(AttrValue::resolved)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.tag)?;
        if let Some(name) = self.name() {
            write!(f, " \"{name}\"")?;
        }
        if self.offset >= 0 {
            write!(f, " <{:#x}>", self.offset)?;
        }
        Ok(())
    }
}
