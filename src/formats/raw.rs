//! A flat raw-binary [`InputFormat`]: the whole file becomes one
//! `.code` section with no relocations or symbols.
//!
//! This is the minimal input-side half of the crate's worked reference
//! backend (`SPEC_FULL.md` §1): it exists to feed a [`Module`] into
//! [`crate::pipeline::LinkPipeline`] in tests without needing a real
//! historical object-file parser.

use crate::cpu::Cpu;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::format_driver::InputFormat;
use crate::module::Module;
use crate::section::{Section, SectionFlags};

/// Reads an entire file as position-independent code, matching the shape
/// of a CP/M `.COM` or similar originless binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawInput {
    pub cpu: Cpu,
}

impl RawInput {
    pub fn new(cpu: Cpu) -> Self {
        RawInput { cpu }
    }
}

impl InputFormat for RawInput {
    fn matches_signature(&self, _data: &[u8]) -> bool {
        // A raw format has no signature of its own; it is the fallback a
        // pipeline tries only after every self-describing format fails.
        true
    }

    fn produce_module(&self, data: &[u8], _diagnostics: &dyn Diagnostics) -> Result<Module> {
        let mut module = Module::new(self.cpu);
        let mut code = Section::new(".code");
        code.set_flags(SectionFlags::READABLE | SectionFlags::EXECUTABLE);
        for &byte in data {
            let offset = code.size();
            code.write_word(1, offset, byte as u64, crate::byte_image::Endian::Little)?;
        }
        module.add_section(code);
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullDiagnostics;

    #[test]
    fn produces_single_executable_code_section() {
        let input = RawInput::new(Cpu::I8086);
        let module = input.produce_module(&[0x90, 0x90, 0xC3], &NullDiagnostics).unwrap();
        let id = module.section_id_by_name(".code").unwrap();
        let section = module.section(id);
        assert_eq!(section.size(), 3);
        assert!(section.flags().contains(SectionFlags::EXECUTABLE));
        let mut buf = [0u8; 3];
        section.read_data(0, &mut buf);
        assert_eq!(buf, [0x90, 0x90, 0xC3]);
    }
}
