//! Hand-assembled DWARF section images for tests.
//!
//! Numeric tag/attribute/form codes are spelled out here so test images
//! read like `.debug_abbrev` dumps.

pub const TAG_COMPILE_UNIT: u64 = 0x11;
pub const TAG_BASE_TYPE: u64 = 0x24;
pub const TAG_STRUCTURE_TYPE: u64 = 0x13;
pub const TAG_UNION_TYPE: u64 = 0x17;
pub const TAG_MEMBER: u64 = 0x0d;
pub const TAG_POINTER_TYPE: u64 = 0x0f;
pub const TAG_TYPEDEF: u64 = 0x16;
pub const TAG_SUBPROGRAM: u64 = 0x2e;
pub const TAG_VARIABLE: u64 = 0x34;
pub const TAG_FORMAL_PARAMETER: u64 = 0x05;
pub const TAG_LEXICAL_BLOCK: u64 = 0x0b;
pub const TAG_ARRAY_TYPE: u64 = 0x01;
pub const TAG_SUBRANGE_TYPE: u64 = 0x21;

pub const AT_SIBLING: u64 = 0x01;
pub const AT_LOCATION: u64 = 0x02;
pub const AT_NAME: u64 = 0x03;
pub const AT_BYTE_SIZE: u64 = 0x0b;
pub const AT_STMT_LIST: u64 = 0x10;
pub const AT_LOW_PC: u64 = 0x11;
pub const AT_HIGH_PC: u64 = 0x12;
pub const AT_CONST_VALUE: u64 = 0x1c;
pub const AT_UPPER_BOUND: u64 = 0x2f;
pub const AT_COUNT: u64 = 0x37;
pub const AT_DATA_MEMBER_LOCATION: u64 = 0x38;
pub const AT_DECLARATION: u64 = 0x3c;
pub const AT_ENCODING: u64 = 0x3e;
pub const AT_EXTERNAL: u64 = 0x3f;
pub const AT_FRAME_BASE: u64 = 0x40;
pub const AT_SPECIFICATION: u64 = 0x47;
pub const AT_TYPE: u64 = 0x49;
pub const AT_VIRTUALITY: u64 = 0x4c;

pub const FORM_ADDR: u64 = 0x01;
pub const FORM_DATA2: u64 = 0x05;
pub const FORM_DATA4: u64 = 0x06;
pub const FORM_DATA8: u64 = 0x07;
pub const FORM_STRING: u64 = 0x08;
pub const FORM_BLOCK1: u64 = 0x0a;
pub const FORM_DATA1: u64 = 0x0b;
pub const FORM_FLAG: u64 = 0x0c;
pub const FORM_SDATA: u64 = 0x0d;
pub const FORM_STRP: u64 = 0x0e;
pub const FORM_UDATA: u64 = 0x0f;
pub const FORM_REF_ADDR: u64 = 0x10;
pub const FORM_REF4: u64 = 0x13;
pub const FORM_INDIRECT: u64 = 0x16;
pub const FORM_SEC_OFFSET: u64 = 0x17;
pub const FORM_EXPRLOC: u64 = 0x18;
pub const FORM_FLAG_PRESENT: u64 = 0x19;

/// ULEB128. The group count is fixed by the value's bit length, so the
/// encoder emits exactly that many 7-bit groups, continuation bits on
/// all but the last.
pub fn uleb(value: u64) -> Vec<u8> {
    let significant = 64 - value.leading_zeros() as usize;
    let groups = significant.div_ceil(7).max(1);
    (0..groups)
        .map(|i| {
            let group = (value >> (7 * i)) as u8 & 0x7f;
            if i + 1 == groups { group } else { group | 0x80 }
        })
        .collect()
}

/// SLEB128. Like [`uleb`], but a signed value also needs its sign bit
/// inside the last group, hence one extra significant bit beyond the
/// leading run of sign bits.
pub fn sleb(value: i64) -> Vec<u8> {
    let sign_run = if value < 0 { value.leading_ones() } else { value.leading_zeros() };
    let significant = 65 - sign_run as usize;
    let groups = significant.div_ceil(7).max(1);
    (0..groups)
        .map(|i| {
            let group = (value >> (7 * i)) as u8 & 0x7f;
            if i + 1 == groups { group } else { group | 0x80 }
        })
        .collect()
}

/// Builds a `.debug_abbrev` contribution.
pub struct AbbrevBuilder {
    bytes: Vec<u8>,
}

impl AbbrevBuilder {
    pub fn new() -> AbbrevBuilder {
        AbbrevBuilder { bytes: Vec::new() }
    }

    pub fn entry(mut self, code: u64, tag: u64, has_children: bool, attrs: &[(u64, u64)]) -> Self {
        self.bytes.extend(uleb(code));
        self.bytes.extend(uleb(tag));
        self.bytes.push(u8::from(has_children));
        for &(name, form) in attrs {
            self.bytes.extend(uleb(name));
            self.bytes.extend(uleb(form));
        }
        self.bytes.extend([0, 0]);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.push(0);
        self.bytes
    }
}

/// Builds one compilation unit's `.debug_info` contribution (32-bit
/// format). DIE payloads are appended through the raw emitters; the
/// header is assembled by `finish`.
pub struct CuBuilder {
    pub version: u16,
    pub address_size: u8,
    pub abbrev_offset: u32,
    body: Vec<u8>,
}

impl CuBuilder {
    pub fn new() -> CuBuilder {
        CuBuilder { version: 4, address_size: 8, abbrev_offset: 0, body: Vec::new() }
    }

    /// CU-relative offset at which the next emitted byte will land.
    /// Call right before writing a DIE's abbreviation code to learn the
    /// value `ref4` fixups should carry.
    pub fn next_die_offset(&self) -> u64 {
        // 32-bit header: length(4) + version(2) + abbrev offset(4) + address size(1)
        (11 + self.body.len()) as u64
    }

    pub fn uleb(&mut self, v: u64) {
        self.body.extend(uleb(v));
    }

    pub fn sleb(&mut self, v: i64) {
        self.body.extend(sleb(v));
    }

    pub fn u8(&mut self, v: u8) {
        self.body.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.body.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.body.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.body.extend_from_slice(&v.to_le_bytes());
    }

    pub fn cstr(&mut self, s: &str) {
        self.body.extend_from_slice(s.as_bytes());
        self.body.push(0);
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.body.extend_from_slice(b);
    }

    /// Emits a zero u32 and returns its position for `patch_u32`.
    pub fn reserve_u32(&mut self) -> usize {
        let pos = self.body.len();
        self.u32(0);
        pos
    }

    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.body[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn finish(self) -> Vec<u8> {
        let unit_length = (2 + 4 + 1 + self.body.len()) as u32;
        let mut out = unit_length.to_le_bytes().to_vec();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.abbrev_offset.to_le_bytes());
        out.push(self.address_size);
        out.extend(self.body);
        out
    }
}

/// Builds one `.debug_line` unit with the customary v4 header defaults
/// (line base -5, line range 14, opcode base 13, minimum instruction
/// length 1).
pub struct LineBuilder {
    pub version: u16,
    pub opcode_base: u8,
    pub std_lengths: Option<Vec<u8>>,
    dirs: Vec<String>,
    files: Vec<(String, u64)>,
    program: Vec<u8>,
}

impl LineBuilder {
    pub fn new() -> LineBuilder {
        LineBuilder {
            version: 4,
            opcode_base: 13,
            std_lengths: None,
            dirs: Vec::new(),
            files: Vec::new(),
            program: Vec::new(),
        }
    }

    pub fn dir(&mut self, name: &str) {
        self.dirs.push(name.to_string());
    }

    pub fn file(&mut self, name: &str, dir_index: u64) {
        self.files.push((name.to_string(), dir_index));
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.program.extend_from_slice(bytes);
    }

    pub fn set_address(&mut self, addr: u64) {
        self.program.push(0);
        self.program.extend(uleb(9));
        self.program.push(2);
        self.program.extend_from_slice(&addr.to_le_bytes());
    }

    pub fn end_sequence(&mut self) {
        self.program.extend([0, 1, 1]);
    }

    pub fn copy(&mut self) {
        self.program.push(1);
    }

    pub fn advance_pc(&mut self, delta: u64) {
        self.program.push(2);
        self.program.extend(uleb(delta));
    }

    pub fn advance_line(&mut self, delta: i64) {
        self.program.push(3);
        self.program.extend(sleb(delta));
    }

    pub fn set_file(&mut self, file: u64) {
        self.program.push(4);
        self.program.extend(uleb(file));
    }

    pub fn special(&mut self, opcode: u8) {
        self.program.push(opcode);
    }

    pub fn finish(self) -> Vec<u8> {
        let std_lengths = self
            .std_lengths
            .unwrap_or_else(|| vec![0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        assert_eq!(std_lengths.len(), self.opcode_base as usize - 1);

        let mut header = Vec::new();
        header.push(1); // minimum_instruction_length
        if self.version >= 4 {
            header.push(1); // maximum_operations_per_instruction
        }
        header.push(1); // default_is_stmt
        header.push((-5i8) as u8); // line_base
        header.push(14); // line_range
        header.push(self.opcode_base);
        header.extend(std_lengths);
        for dir in &self.dirs {
            header.extend_from_slice(dir.as_bytes());
            header.push(0);
        }
        header.push(0);
        for (name, dir_index) in &self.files {
            header.extend_from_slice(name.as_bytes());
            header.push(0);
            header.extend(uleb(*dir_index));
            header.extend(uleb(0)); // mtime
            header.extend(uleb(0)); // length
        }
        header.push(0);

        let mut out = Vec::new();
        let unit_length = 2 + 4 + header.len() + self.program.len();
        out.extend_from_slice(&(unit_length as u32).to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend(header);
        out.extend(self.program);
        out
    }
}
