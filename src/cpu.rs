//! CPU tags carried by a [`crate::module::Module`].
//!
//! The tag drives nothing in the core beyond merge-compatibility checks and
//! a handful of relocation-kind defaults a [`crate::format_driver::FormatDriver`]
//! may consult; the core does not interpret instruction encodings.

use core::fmt;

/// The processor architecture a [`crate::module::Module`]'s code was
/// assembled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Cpu {
    I8086,
    I80386,
    M68000,
    Z80,
    Z8000,
    Mos6502,
    W65C816,
    Ppc,
    Arm,
    Arm64,
    Mips,
    Sparc,
    Sh,
    We32k,
    Pdp11,
    /// No CPU has been asserted yet; a fresh [`crate::module::Module`]
    /// starts here and adopts the first non-`None` tag it is merged with.
    None,
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::None
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cpu::I8086 => "8086",
            Cpu::I80386 => "80386",
            Cpu::M68000 => "68000",
            Cpu::Z80 => "Z80",
            Cpu::Z8000 => "Z8000",
            Cpu::Mos6502 => "6502",
            Cpu::W65C816 => "65C816",
            Cpu::Ppc => "PowerPC",
            Cpu::Arm => "ARM",
            Cpu::Arm64 => "ARM64",
            Cpu::Mips => "MIPS",
            Cpu::Sparc => "SPARC",
            Cpu::Sh => "SH",
            Cpu::We32k => "WE32K",
            Cpu::Pdp11 => "PDP-11",
            Cpu::None => "none",
        };
        f.write_str(s)
    }
}

impl Cpu {
    /// Resolves two CPU tags at module merge time: `other` is accepted if
    /// `self` has not yet committed to one, otherwise the tags must match.
    pub fn reconcile(self, other: Cpu) -> Result<Cpu, (Cpu, Cpu)> {
        match (self, other) {
            (Cpu::None, other) => Ok(other),
            (mine, Cpu::None) => Ok(mine),
            (mine, theirs) if mine == theirs => Ok(mine),
            (mine, theirs) => Err((mine, theirs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_adopts_other() {
        assert_eq!(Cpu::None.reconcile(Cpu::I8086), Ok(Cpu::I8086));
    }

    #[test]
    fn matching_tags_reconcile() {
        assert_eq!(Cpu::I8086.reconcile(Cpu::I8086), Ok(Cpu::I8086));
    }

    #[test]
    fn mismatched_tags_error() {
        assert_eq!(
            Cpu::I8086.reconcile(Cpu::M68000),
            Err((Cpu::I8086, Cpu::M68000))
        );
    }
}
