//! ELF64 section extraction.
//!
//! Just enough of the ELF format to hand the DWARF sections and the image
//! base to a parse session: header validation, the program-header walk
//! for the load base, and the section-header walk with `.shstrtab` name
//! lookup. Little-endian 64-bit objects only, which is what the debugger
//! host feeds us.

use std::fs::File;
use std::path::Path;

use memmap::Mmap;

use crate::error::{Error, Result};
use crate::reader::SliceReader;
use crate::session::DwarfSections;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const CLASS_64: u8 = 2;
const DATA_LITTLE_ENDIAN: u8 = 1;
const PT_LOAD: u32 = 1;

pub struct LoadedImage {
    pub sections: DwarfSections,
    /// Lowest `PT_LOAD` virtual address; subtract it from raw DWARF
    /// addresses to get module-relative ones.
    pub image_base: u64,
}

/// Maps `path` and extracts its DWARF sections.
pub fn load_sections(path: &Path) -> Result<LoadedImage> {
    let file = File::open(path).map_err(|e| Error::BadImage(e.to_string()))?;
    let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::BadImage(e.to_string()))?;
    parse_image(&map)
}

struct SectionHeader {
    name: u32,
    offset: u64,
    size: u64,
}

pub fn parse_image(bytes: &[u8]) -> Result<LoadedImage> {
    let mut r = SliceReader::new(bytes);
    let ident = r.read_block(16)?;
    if ident[0..4] != ELF_MAGIC {
        return Err(Error::BadImage("not an ELF file".into()));
    }
    if ident[4] != CLASS_64 {
        return Err(Error::BadImage("only 64-bit ELF is supported".into()));
    }
    if ident[5] != DATA_LITTLE_ENDIAN {
        return Err(Error::BadImage("only little-endian ELF is supported".into()));
    }
    let _e_type = r.read_u16()?;
    let _e_machine = r.read_u16()?;
    let _e_version = r.read_u32()?;
    let _e_entry = r.read_u64()?;
    let e_phoff = r.read_u64()?;
    let e_shoff = r.read_u64()?;
    let _e_flags = r.read_u32()?;
    let _e_ehsize = r.read_u16()?;
    let e_phentsize = r.read_u16()?;
    let e_phnum = r.read_u16()?;
    let e_shentsize = r.read_u16()?;
    let e_shnum = r.read_u16()?;
    let e_shstrndx = r.read_u16()?;

    let mut lowest: Option<u64> = None;
    for i in 0..e_phnum {
        let mut ph = SliceReader::at(bytes, (e_phoff + u64::from(i) * u64::from(e_phentsize)) as usize);
        let p_type = ph.read_u32()?;
        let _p_flags = ph.read_u32()?;
        let _p_offset = ph.read_u64()?;
        let p_vaddr = ph.read_u64()?;
        if p_type == PT_LOAD && lowest.map_or(true, |low| p_vaddr < low) {
            lowest = Some(p_vaddr);
        }
    }
    let image_base = lowest.unwrap_or(0);

    let mut headers = Vec::with_capacity(usize::from(e_shnum));
    for i in 0..e_shnum {
        let mut sh = SliceReader::at(bytes, (e_shoff + u64::from(i) * u64::from(e_shentsize)) as usize);
        let name = sh.read_u32()?;
        let _sh_type = sh.read_u32()?;
        let _sh_flags = sh.read_u64()?;
        let _sh_addr = sh.read_u64()?;
        let offset = sh.read_u64()?;
        let size = sh.read_u64()?;
        headers.push(SectionHeader { name, offset, size });
    }

    let strtab = headers
        .get(usize::from(e_shstrndx))
        .ok_or_else(|| Error::BadImage("missing section name table".into()))?;
    let strtab = section_bytes(bytes, strtab)?;

    let mut sections = DwarfSections::default();
    for header in &headers {
        let name = name_at(strtab, header.name as usize);
        let slot = match name {
            ".debug_info" => &mut sections.debug_info,
            ".debug_abbrev" => &mut sections.debug_abbrev,
            ".debug_str" => &mut sections.debug_str,
            ".debug_line" => &mut sections.debug_line,
            ".debug_ranges" => &mut sections.debug_ranges,
            ".debug_loc" => &mut sections.debug_loc,
            ".debug_aranges" => &mut sections.debug_aranges,
            _ => continue,
        };
        *slot = section_bytes(bytes, header)?.to_vec();
    }
    if sections.debug_info.is_empty() {
        return Err(Error::BadImage("no .debug_info section".into()));
    }

    Ok(LoadedImage { sections, image_base })
}

fn section_bytes<'a>(bytes: &'a [u8], header: &SectionHeader) -> Result<&'a [u8]> {
    let start = header.offset as usize;
    let end = start + header.size as usize;
    bytes.get(start..end).ok_or(Error::TruncatedSection {
        offset: start,
        wanted: header.size as usize,
    })
}

fn name_at(strtab: &[u8], offset: usize) -> &str {
    let Some(rest) = strtab.get(offset..) else { return "" };
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    std::str::from_utf8(&rest[..end]).unwrap_or("")
}
