//! The reference `InputFormat`/`FormatDriver` pair shipped to exercise the
//! core end-to-end (§1, §6.4). The dozens of historical formats named in
//! `spec.md` §1 are external collaborators this crate does not implement.

pub mod mz;
pub mod raw;
