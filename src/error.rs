use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures raised while decoding DWARF data or answering symbol queries.
///
/// Decode-time kinds (`MalformedLength`, `UnknownForm`, `UnknownOpcode`,
/// `TruncatedSection`, `UnsupportedVersion`) abandon the compilation unit
/// they were raised in; the session records a diagnostic and moves on.
/// `UnresolvedReference` is diagnostic-only: the dangling attribute stays
/// as it was decoded and consumers treat it as absent. `UnknownType`
/// surfaces to the caller as "not found". A line-lookup miss is not an
/// error at all; `source_line_at` returns its sentinel value instead.
/// Nothing here is fatal at session scope.
#[derive(Debug, Error)]
pub enum Error {
    #[error("reserved initial length {0:#010x}")]
    MalformedLength(u64),

    #[error("unknown attribute form {0:#04x}")]
    UnknownForm(u64),

    #[error("unknown opcode {0:#04x} in line program")]
    UnknownOpcode(u8),

    #[error("truncated section: {wanted} bytes wanted at offset {offset:#x}")]
    TruncatedSection { offset: usize, wanted: usize },

    #[error("unresolved reference to offset {0:#x}")]
    UnresolvedReference(u64),

    #[error("unsupported location expression")]
    UnsupportedExpression,

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("unsupported DWARF version {0}")]
    UnsupportedVersion(u16),

    #[error("bad image: {0}")]
    BadImage(String),

    #[error("parse cancelled")]
    Cancelled,
}
