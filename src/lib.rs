//! A retargetable linker core for historical CPU/OS executable formats.
//!
//! This crate implements the format-independent parts of a linker: a
//! unified object model ([`module::Module`], [`section::Section`],
//! [`segment::Segment`]), the relocation taxonomy segmented and flat
//! architectures need ([`relocation::Relocation`]), a small
//! domain-specific linker script ([`script`]), and the pipeline that
//! glues them together ([`pipeline::LinkPipeline`]).
//!
//! Per-format object readers and executable writers are external
//! collaborators: this crate defines the two traits they implement
//! ([`format_driver::InputFormat`], [`format_driver::FormatDriver`]) and
//! ships exactly one worked pair ([`formats::raw`], [`formats::mz`]) so the
//! core can be exercised end to end. The dozens of historical formats a
//! production linker would support (MZ/NE/LE/LX, CP/M-80/86/68K, Hunk, Mac
//! resource forks, DJGPP COFF, and the rest) live outside this crate.

pub mod byte_image;
pub mod cpu;
pub mod diagnostics;
pub mod error;
pub mod format_driver;
pub mod formats;
pub mod location;
pub mod module;
pub mod options;
pub mod pipeline;
pub mod relocation;
pub mod script;
pub mod section;
pub mod segment;
pub mod symbol;

pub use error::{Error, Result};
