//! `.debug_line` state-machine interpreter.
//!
//! One program per compilation unit, reached through the root DIE's
//! `stmt_list` offset. The program is run once at parse time and the
//! resulting rows are materialized, sorted by `(sequence start, address)`,
//! so PC lookups are a binary search with no restartability concerns.

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::reader::SliceReader;

bitflags! {
    /// Boolean registers of the line-number state machine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LineFlags: u8 {
        const IS_STMT        = 1 << 0;
        const BASIC_BLOCK    = 1 << 1;
        const END_SEQUENCE   = 1 << 2;
        const PROLOGUE_END   = 1 << 3;
        const EPILOGUE_BEGIN = 1 << 4;
    }
}

/// One row of the line matrix: a source position for an address.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRow {
    /// Address of the first row in this row's sequence; the primary sort
    /// key, and the guard that keeps lookups from crossing sequences.
    pub sequence_start: u64,
    pub address: u64,
    /// 1-based index into the unit's file table.
    pub file: u64,
    pub line: u64,
    pub column: u64,
    pub flags: LineFlags,
}

impl LineRow {
    pub fn is_stmt(&self) -> bool {
        self.flags.contains(LineFlags::IS_STMT)
    }

    pub fn end_sequence(&self) -> bool {
        self.flags.contains(LineFlags::END_SEQUENCE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineFile {
    pub name: String,
    pub dir_index: u64,
}

#[derive(Debug, Default)]
pub struct LineTable {
    pub dirs: Vec<String>,
    pub files: Vec<LineFile>,
    pub rows: Vec<LineRow>,
}

impl LineTable {
    /// Resolves a row's file register to a display name. File indices are
    /// 1-based in DWARF 2-4; directory index 0 is the compilation
    /// directory and is left implicit.
    pub fn file_name(&self, index: u64) -> Option<String> {
        if index == 0 {
            return None;
        }
        let f = self.files.get(index as usize - 1)?;
        if f.dir_index == 0 || f.name.starts_with('/') {
            return Some(f.name.clone());
        }
        match self.dirs.get(f.dir_index as usize - 1) {
            Some(d) => Some(format!("{}/{}", d, f.name)),
            None => Some(f.name.clone()),
        }
    }

    /// Greatest row with `address <= pc` that is not past the end of its
    /// sequence.
    pub fn lookup(&self, pc: u64) -> Option<&LineRow> {
        let idx = self.rows.partition_point(|r| r.address <= pc);
        if idx == 0 {
            return None;
        }
        let row = &self.rows[idx - 1];
        if row.end_sequence() {
            return None;
        }
        Some(row)
    }
}

// Standard opcodes.
const LNS_COPY: u8 = 1;
const LNS_ADVANCE_PC: u8 = 2;
const LNS_ADVANCE_LINE: u8 = 3;
const LNS_SET_FILE: u8 = 4;
const LNS_SET_COLUMN: u8 = 5;
const LNS_NEGATE_STMT: u8 = 6;
const LNS_SET_BASIC_BLOCK: u8 = 7;
const LNS_CONST_ADD_PC: u8 = 8;
const LNS_FIXED_ADVANCE_PC: u8 = 9;
const LNS_SET_PROLOGUE_END: u8 = 10;
const LNS_SET_EPILOGUE_BEGIN: u8 = 11;
const LNS_SET_ISA: u8 = 12;

// Extended opcodes.
const LNE_END_SEQUENCE: u8 = 1;
const LNE_SET_ADDRESS: u8 = 2;
const LNE_DEFINE_FILE: u8 = 3;

struct Registers {
    address: u64,
    file: u64,
    line: i64,
    column: u64,
    flags: LineFlags,
    default_is_stmt: bool,
    /// Address of the first emitted row of the current sequence.
    sequence_start: Option<u64>,
}

impl Registers {
    fn new(default_is_stmt: bool) -> Registers {
        let mut r = Registers {
            address: 0,
            file: 1,
            line: 1,
            column: 0,
            flags: LineFlags::empty(),
            default_is_stmt,
            sequence_start: None,
        };
        r.reset();
        r
    }

    fn reset(&mut self) {
        self.address = 0;
        self.file = 1;
        self.line = 1;
        self.column = 0;
        self.flags = if self.default_is_stmt { LineFlags::IS_STMT } else { LineFlags::empty() };
        self.sequence_start = None;
    }

    fn emit(&mut self, rows: &mut Vec<LineRow>) {
        let seq = *self.sequence_start.get_or_insert(self.address);
        rows.push(LineRow {
            sequence_start: seq,
            address: self.address,
            file: self.file,
            line: self.line.max(0) as u64,
            column: self.column,
            flags: self.flags,
        });
        self.flags.remove(LineFlags::BASIC_BLOCK | LineFlags::PROLOGUE_END | LineFlags::EPILOGUE_BEGIN);
    }
}

/// Runs the line program for one unit, starting at `offset` in
/// `.debug_line`.
pub fn parse_line_program(
    section: &[u8],
    offset: u64,
    address_size: u8,
    normalizer: &dyn Fn(u64) -> u64,
) -> Result<LineTable> {
    let mut r = SliceReader::at(section, offset as usize);
    if r.is_empty() {
        return Err(Error::TruncatedSection { offset: offset as usize, wanted: 4 });
    }
    let (unit_length, is_64) = r.read_initial_length()?;
    let unit_end = r.pos() + unit_length as usize;
    if unit_end > section.len() {
        return Err(Error::TruncatedSection { offset: r.pos(), wanted: unit_length as usize });
    }
    let version = r.read_u16()?;
    if !(2..=4).contains(&version) {
        return Err(Error::UnsupportedVersion(version));
    }
    let header_length = r.read_offset(is_64)?;
    let program_start = r.pos() + header_length as usize;
    if program_start > unit_end {
        return Err(Error::TruncatedSection { offset: r.pos(), wanted: header_length as usize });
    }
    let minimum_instruction_length = r.read_u8()?;
    if version >= 4 {
        // maximum_operations_per_instruction; 1 on non-VLIW targets, and
        // op_index tracking for anything else is out of scope.
        let _ = r.read_u8()?;
    }
    let default_is_stmt = r.read_u8()? != 0;
    let line_base = i64::from(r.read_i8()?);
    let line_range = r.read_u8()?;
    if line_range == 0 {
        return Err(Error::MalformedLength(0));
    }
    let opcode_base = r.read_u8()?;
    let mut standard_opcode_lengths = Vec::new();
    for _ in 1..opcode_base {
        standard_opcode_lengths.push(r.read_u8()?);
    }

    let mut table = LineTable::default();
    loop {
        let dir = r.read_string()?;
        if dir.is_empty() {
            break;
        }
        table.dirs.push(dir);
    }
    loop {
        let name = r.read_string()?;
        if name.is_empty() {
            break;
        }
        let dir_index = r.uleb128()?;
        let _mtime = r.uleb128()?;
        let _length = r.uleb128()?;
        table.files.push(LineFile { name, dir_index });
    }

    // The program itself starts where header_length says, regardless of
    // where the tables ended.
    r.set_pos(program_start);
    let mut regs = Registers::new(default_is_stmt);
    let min_inst = u64::from(minimum_instruction_length);

    while r.pos() < unit_end {
        let opcode = r.read_u8()?;
        if opcode >= opcode_base {
            // Special opcode: advance both address and line, emit a row.
            let adjusted = u64::from(opcode - opcode_base);
            regs.address += (adjusted / u64::from(line_range)) * min_inst;
            regs.line += line_base + (adjusted % u64::from(line_range)) as i64;
            regs.emit(&mut table.rows);
            continue;
        }
        match opcode {
            0 => {
                // Extended opcode: length-prefixed.
                let len = r.uleb128()? as usize;
                if len == 0 {
                    return Err(Error::UnknownOpcode(0));
                }
                let end = r.pos() + len;
                let sub = r.read_u8()?;
                match sub {
                    LNE_END_SEQUENCE => {
                        regs.flags.insert(LineFlags::END_SEQUENCE);
                        regs.emit(&mut table.rows);
                        regs.reset();
                    }
                    LNE_SET_ADDRESS => {
                        regs.address = normalizer(r.read_ulong(address_size)?);
                    }
                    LNE_DEFINE_FILE => {
                        let name = r.read_string()?;
                        let dir_index = r.uleb128()?;
                        let _mtime = r.uleb128()?;
                        let _length = r.uleb128()?;
                        table.files.push(LineFile { name, dir_index });
                    }
                    // Vendor extensions are skippable thanks to the length
                    // prefix.
                    _ => {}
                }
                r.set_pos(end);
            }
            LNS_COPY => regs.emit(&mut table.rows),
            LNS_ADVANCE_PC => regs.address += r.uleb128()? * min_inst,
            LNS_ADVANCE_LINE => regs.line += r.sleb128()?,
            LNS_SET_FILE => regs.file = r.uleb128()?,
            LNS_SET_COLUMN => regs.column = r.uleb128()?,
            LNS_NEGATE_STMT => regs.flags.toggle(LineFlags::IS_STMT),
            LNS_SET_BASIC_BLOCK => regs.flags.insert(LineFlags::BASIC_BLOCK),
            LNS_CONST_ADD_PC => {
                let adjusted = u64::from(255 - opcode_base);
                regs.address += (adjusted / u64::from(line_range)) * min_inst;
            }
            LNS_FIXED_ADVANCE_PC => regs.address += u64::from(r.read_u16()?),
            LNS_SET_PROLOGUE_END => regs.flags.insert(LineFlags::PROLOGUE_END),
            LNS_SET_EPILOGUE_BEGIN => regs.flags.insert(LineFlags::EPILOGUE_BEGIN),
            LNS_SET_ISA => {
                let _ = r.uleb128()?;
            }
            n => {
                // A standard opcode this interpreter does not know; the
                // header's operand counts say how to skip it.
                match standard_opcode_lengths.get(n as usize - 1) {
                    Some(&operands) => {
                        for _ in 0..operands {
                            let _ = r.uleb128()?;
                        }
                    }
                    None => return Err(Error::UnknownOpcode(n)),
                }
            }
        }
    }

    table.rows.sort_by_key(|row| (row.sequence_start, row.address));
    Ok(table)
}
