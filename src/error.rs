//! The crate-wide error type.
//!
//! Only *fatal* dispositions are represented here. Per-relocation and
//! per-symbol problems are reported through [`crate::diagnostics::Diagnostics`]
//! instead, since the pipeline keeps running and still produces output for
//! those.

use core::fmt;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A read or write against the underlying stream failed.
    Io(std::io::Error),
    /// A scroll parse/serialize primitive failed.
    Scroll(scroll::Error),
    /// None of the known input-format signatures matched, or more than one did.
    FormatDetect(String),
    /// An input format recognized its signature but the bytes that followed were malformed.
    FormatParse(String),
    /// The linker script failed to tokenize or parse.
    ScriptParse(String),
    /// The linker script parsed but evaluating it hit a nonsensical expression
    /// (e.g. `base of` an unknown segment, a `maximum` argument of zero).
    ScriptEval(String),
    /// A hard per-format limit was exceeded at layout or write time
    /// (e.g. more than 16383 MZ relocations).
    LayoutOverCapacity(String),
    /// An internal invariant was violated; this indicates a bug in the core.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Scroll(err) => write!(f, "parse error: {err}"),
            Error::FormatDetect(msg) => write!(f, "could not detect input format: {msg}"),
            Error::FormatParse(msg) => write!(f, "malformed input: {msg}"),
            Error::ScriptParse(msg) => write!(f, "linker script syntax error: {msg}"),
            Error::ScriptEval(msg) => write!(f, "linker script error: {msg}"),
            Error::LayoutOverCapacity(msg) => write!(f, "layout limit exceeded: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Scroll(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
