//! DWARF symbol provider for debugger tooling.
//!
//! Decodes DWARF v2-v4 debugging information from an ELF-linked
//! executable into an in-memory symbol graph and serves it through the
//! backend-neutral [`SymbolProvider`] contract: type queries by name or
//! id, field enumeration, source-line lookup, and frame-local
//! enumeration.
//!
//! ```no_run
//! use dwarfsym::{CancelToken, DwarfProvider, Session, SymbolProvider};
//!
//! # fn main() -> dwarfsym::Result<()> {
//! let image = dwarfsym::elf::load_sections(std::path::Path::new("a.out"))?;
//! let base = image.image_base;
//! let session = Session::parse(image.sections, &|a| a.wrapping_sub(base), &CancelToken::new());
//! let provider = DwarfProvider::new(session);
//! let point = provider.type_id("Point")?;
//! println!("sizeof(Point) = {}", provider.type_size(point)?);
//! # Ok(())
//! # }
//! ```

pub mod abbrev;
pub mod aranges;
pub mod die;
pub mod elf;
pub mod error;
pub mod expr;
pub mod line;
pub mod provider;
pub mod reader;
pub mod session;
pub mod unit;

#[cfg(test)]
pub(crate) mod testkit;

pub use die::{AttrName, AttrValue, SymId, Symbol, Tag};
pub use error::{Error, Result};
pub use expr::{EvalContext, EvalSource, Location};
pub use provider::{
    DwarfProvider, FrameDescriptor, FrameLocal, SourceLine, SymbolProvider, TagKind,
};
pub use session::{CancelToken, Diagnostic, DwarfSections, Session};
pub use unit::CompilationUnit;
