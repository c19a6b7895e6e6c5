//! Lazy decoder for `.debug_abbrev`.
//!
//! Each compilation unit names an offset into the abbreviation section;
//! from there a sequence of declarations runs until a zero code. The table
//! scans forward only as far as the codes actually asked for and memoizes
//! everything seen on the way, so repeated lookups resume in O(1)
//! amortized.

use std::collections::HashMap;

use crate::die::{AttrForm, AttrName, Tag};
use crate::error::Result;
use crate::reader::SliceReader;

#[derive(Debug, Clone, PartialEq)]
pub struct AbbrevEntry {
    pub tag: Tag,
    pub has_children: bool,
    /// Ordered (attribute, form) pairs, terminator excluded.
    pub attrs: Vec<(AttrName, AttrForm)>,
}

pub struct AbbrevTable<'a> {
    section: &'a [u8],
    /// Resume position for the next unscanned declaration.
    cursor: usize,
    /// Set once the terminating zero code has been seen.
    done: bool,
    entries: HashMap<u64, AbbrevEntry>,
}

impl<'a> AbbrevTable<'a> {
    pub fn new(section: &'a [u8], offset: u64) -> AbbrevTable<'a> {
        let cursor = offset as usize;
        AbbrevTable {
            section,
            cursor,
            done: cursor >= section.len(),
            entries: HashMap::new(),
        }
    }

    /// Looks up a CU-local abbreviation code, scanning forward on demand.
    /// `Ok(None)` means the declaration list ended without defining the
    /// code.
    pub fn get(&mut self, code: u64) -> Result<Option<&AbbrevEntry>> {
        while !self.done && !self.entries.contains_key(&code) {
            self.scan_one()?;
        }
        Ok(self.entries.get(&code))
    }

    fn scan_one(&mut self) -> Result<()> {
        let mut r = SliceReader::at(self.section, self.cursor);
        let code = r.uleb128()?;
        if code == 0 {
            self.done = true;
            self.cursor = r.pos();
            return Ok(());
        }
        let tag = r.uleb128()?;
        let has_children = r.read_u8()? != 0;
        let mut attrs = Vec::new();
        loop {
            let name = r.uleb128()?;
            let form = r.uleb128()?;
            if name == 0 && form == 0 {
                break;
            }
            attrs.push((AttrName::from(name), AttrForm::from(form)));
        }
        self.cursor = r.pos();
        self.entries.insert(code, AbbrevEntry { tag: Tag::from(tag), has_children, attrs });
        Ok(())
    }

    #[cfg(test)]
    fn resume_pos(&self) -> usize {
        self.cursor
    }
}
