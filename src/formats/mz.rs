//! The MS-DOS MZ executable format: segmented, 16-bit, real-mode.
//!
//! Grounded on `original_source/src/format/mz.cc`/`mz.h` (header layout,
//! relocation table, paragraph rounding) and `SPEC_FULL.md` §8.2 scenarios
//! 1 and 2. This is the worked output-side half of the crate's reference
//! backend; `crate::formats::raw` supplies the input side.

use crate::byte_image::{ByteImage, Endian};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::format_driver::FormatDriver;
use crate::location::Location;
use crate::module::{Module, ENTRY_SYMBOL, STACK_TOP_SYMBOL};
use crate::relocation::{RelocationKind, Target};
use crate::section::SectionFlags;
use crate::segment::Segment;

const HEADER_FIXED_LEN: u64 = 0x1C;
const PARAGRAPH: u64 = 16;
const BLOCK: u64 = 512;
const MAX_RELOCATIONS: usize = 0x3FFF;

/// Lays out and writes a flat module as a single-segment MS-DOS `.exe`.
///
/// One `.image` segment holds every non-resource section; paragraph
/// relocations against it are collected into the MZ relocation table as
/// they're written.
#[derive(Debug, Default)]
pub struct MzDriver {
    relocation_table: Vec<(u16, u16)>,
    entry_cs: u16,
    entry_ip: u16,
    stack_ss: u16,
    stack_sp: u16,
}

impl MzDriver {
    pub fn new() -> Self {
        MzDriver::default()
    }

    fn header_paragraphs(&self) -> u16 {
        let table_bytes = self.relocation_table.len() as u64 * 4;
        let header_bytes = HEADER_FIXED_LEN + table_bytes;
        ((header_bytes + PARAGRAPH - 1) / PARAGRAPH) as u16
    }
}

impl FormatDriver for MzDriver {
    fn on_new_segment(&mut self, _segment: &Segment, _diagnostics: &dyn Diagnostics) {}

    fn get_script(&self, _module: &Module) -> String {
        r#"".image" { at 0; all any; };"#.to_string()
    }

    fn format_supports_segmentation(&self) -> bool {
        true
    }

    fn format_is_16bit(&self) -> bool {
        true
    }

    fn process_module(&mut self, module: &mut Module, diagnostics: &dyn Diagnostics) -> Result<()> {
        if let Some(location) = module.globals().get(ENTRY_SYMBOL).copied() {
            let (seg, off) = paragraph_split(resolve_address(module, &location));
            self.entry_cs = seg;
            self.entry_ip = off;
        }
        if let Some(location) = module.globals().get(STACK_TOP_SYMBOL).copied() {
            let (seg, off) = paragraph_split(resolve_address(module, &location));
            self.stack_ss = seg;
            self.stack_sp = off;
        }

        for relocation in module.relocations().to_vec() {
            let Some(target_address) = resolve_target(module, &relocation.target, diagnostics) else {
                continue;
            };
            let Some(reference_address) = resolve_target(module, &relocation.reference, diagnostics) else {
                continue;
            };
            let value = relocation.compute_value(target_address, reference_address);

            let Some(section) = relocation.source.section else {
                diagnostics.warn("relocation source has no owning section; skipping");
                continue;
            };
            relocation.write_word(module.section_mut(section), value)?;

            if relocation.kind == RelocationKind::ParagraphAddress {
                if self.relocation_table.len() >= MAX_RELOCATIONS {
                    return Err(Error::LayoutOverCapacity(format!(
                        "MZ relocation table cannot exceed {MAX_RELOCATIONS} entries"
                    )));
                }
                let fixup_address =
                    module.section(section).address().unwrap_or(0) + relocation.source.offset;
                let (seg, off) = paragraph_split(fixup_address);
                self.relocation_table.push((off, seg));
            }
        }
        Ok(())
    }

    fn write_file(&self, module: &Module, writer: &mut dyn std::io::Write) -> Result<u64> {
        let header_paragraphs = self.header_paragraphs();
        let header_bytes = header_paragraphs as u64 * PARAGRAPH;

        let mut code = Vec::new();
        for section in module.sections() {
            if section.flags().contains(SectionFlags::RESOURCE) {
                continue;
            }
            let size = section.size();
            let mut buf = vec![0u8; size as usize];
            section.read_data(0, &mut buf);
            code.extend_from_slice(&buf);
        }

        let file_size = header_bytes + code.len() as u64;
        let last_block_size = if file_size > 0 && file_size % BLOCK == 0 {
            0
        } else {
            file_size % BLOCK
        };
        let file_size_blocks = file_size.div_ceil(BLOCK).max(1);

        let mut header = ByteImage::new();
        header.resize(header_bytes as usize);
        header.write_word(2, 0, 0x5A4D, Endian::Little); // "MZ"
        header.write_word(2, 2, last_block_size, Endian::Little);
        header.write_word(2, 4, file_size_blocks, Endian::Little);
        header.write_word(2, 6, self.relocation_table.len() as u64, Endian::Little);
        header.write_word(2, 8, header_paragraphs as u64, Endian::Little);
        header.write_word(2, 10, 0, Endian::Little); // min extra paragraphs
        header.write_word(2, 12, 0xFFFF, Endian::Little); // max extra paragraphs
        header.write_word(2, 14, self.stack_ss as u64, Endian::Little);
        header.write_word(2, 16, self.stack_sp as u64, Endian::Little);
        header.write_word(2, 18, 0, Endian::Little); // checksum
        header.write_word(2, 20, self.entry_ip as u64, Endian::Little);
        header.write_word(2, 22, self.entry_cs as u64, Endian::Little);
        header.write_word(2, 24, HEADER_FIXED_LEN, Endian::Little);
        header.write_word(2, 26, 0, Endian::Little); // overlay number

        for (index, &(offset, segment)) in self.relocation_table.iter().enumerate() {
            let entry_offset = (HEADER_FIXED_LEN + index as u64 * 4) as usize;
            header.write_word(2, entry_offset, offset as u64, Endian::Little);
            header.write_word(2, entry_offset + 2, segment as u64, Endian::Little);
        }

        writer.write_all(header.as_slice())?;
        writer.write_all(&code)?;
        Ok(header_bytes + code.len() as u64)
    }

    fn default_extension(&self, _module: &Module, base: &str) -> String {
        format!("{base}.exe")
    }
}

fn paragraph_split(address: u64) -> (u16, u16) {
    ((address >> 4) as u16, (address & 0xF) as u16)
}

fn resolve_address(module: &Module, location: &Location) -> u64 {
    match location.section {
        Some(id) => module.section(id).address().unwrap_or(0) + location.offset,
        None => location.offset,
    }
}

fn resolve_target(module: &Module, target: &Target, diagnostics: &dyn Diagnostics) -> Option<u64> {
    match target {
        Target::Location(location) => Some(resolve_address(module, location)),
        Target::Symbol(name) => {
            diagnostics.warn(&format!(
                "relocation against unresolved symbol {name:?} cannot be written by an MZ image"
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;
    use crate::diagnostics::NullDiagnostics;
    use crate::relocation::Relocation;
    use crate::section::Section;

    #[test]
    fn empty_module_produces_minimal_header() {
        let mut module = Module::new(Cpu::I8086);
        module.add_section(Section::new(".code"));

        let mut driver = MzDriver::new();
        driver.process_module(&mut module, &NullDiagnostics).unwrap();

        let mut out = Vec::new();
        let written = driver.write_file(&module, &mut out).unwrap();

        assert_eq!(written, 32);
        assert_eq!(&out[0..2], b"MZ");
        assert_eq!(out[2] as u16 | (out[3] as u16) << 8, 0x20);
        assert_eq!(out[4] as u16 | (out[5] as u16) << 8, 1);
        assert_eq!(out[6] as u16 | (out[7] as u16) << 8, 0);
        assert_eq!(out[8] as u16 | (out[9] as u16) << 8, 2);
        assert_eq!(out[20] as u16 | (out[21] as u16) << 8, 0);
        assert_eq!(out[22] as u16 | (out[23] as u16) << 8, 0);
        assert_eq!(out[14] as u16 | (out[15] as u16) << 8, 0);
        assert_eq!(out[16] as u16 | (out[17] as u16) << 8, 0);
    }

    #[test]
    fn one_paragraph_relocation_extends_table_and_header() {
        let mut module = Module::new(Cpu::I8086);
        let mut code = Section::new(".code");
        code.write_word(4, 0, 0, Endian::Little).unwrap();
        let code_id = module.add_section(code);

        let source = Location::in_section(code_id, 0);
        let target = Target::Location(Location::in_section(code_id, 0));
        module.add_relocation(Relocation::paragraph(source, target, Endian::Little));

        let mut driver = MzDriver::new();
        driver.process_module(&mut module, &NullDiagnostics).unwrap();

        assert_eq!(driver.relocation_table, vec![(0, 0)]);
        assert_eq!(driver.header_paragraphs(), 2);

        let mut out = Vec::new();
        let written = driver.write_file(&module, &mut out).unwrap();
        assert_eq!(written, 36);
        assert_eq!(out[6] as u16 | (out[7] as u16) << 8, 1);
        assert!(HEADER_FIXED_LEN <= 0x1C);
        let entry = &out[HEADER_FIXED_LEN as usize..HEADER_FIXED_LEN as usize + 4];
        assert_eq!(entry, &[0, 0, 0, 0]);
    }
}
