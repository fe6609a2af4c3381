//! Integration tests for the six concrete scenarios in `spec.md` §8.2,
//! exercised through the public crate API (`LinkPipeline`/`ScriptEvaluator`
//! directly, since a CLI front end is out of scope for this crate).

use std::collections::HashMap;

use retrolinker::byte_image::Endian;
use retrolinker::cpu::Cpu;
use retrolinker::diagnostics::NullDiagnostics;
use retrolinker::format_driver::InputFormat;
use retrolinker::formats::mz::MzDriver;
use retrolinker::formats::raw::RawInput;
use retrolinker::location::Location;
use retrolinker::module::{Module, ENTRY_SYMBOL};
use retrolinker::pipeline::LinkPipeline;
use retrolinker::relocation::{Relocation, Target};
use retrolinker::script::ScriptEvaluator;
use retrolinker::section::Section;
use retrolinker::symbol::CommonSymbol;

/// Scenario 1: an empty MZ image.
#[test]
fn scenario_1_empty_mz_produces_minimal_header() {
    let pipeline = LinkPipeline::new(&NullDiagnostics);
    let formats: Vec<Box<dyn InputFormat>> = vec![Box::new(RawInput::new(Cpu::I8086))];
    let mut module = pipeline.load_and_merge(&[Vec::new()], &formats).unwrap();
    pipeline.allocate_commons(&mut module);

    let mut driver = MzDriver::new();
    let mut out = Vec::new();
    let written = pipeline
        .link(&mut module, &mut driver, None, HashMap::new(), &mut out)
        .unwrap();

    assert_eq!(written, 32);
    assert_eq!(&out[0..2], b"MZ");
    let u16_at = |offset: usize| out[offset] as u16 | (out[offset + 1] as u16) << 8;
    assert_eq!(u16_at(2), 0x20, "last_block_size");
    assert_eq!(u16_at(4), 1, "file_size_blocks");
    assert_eq!(u16_at(6), 0, "relocation count");
    assert_eq!(u16_at(8), 2, "header_paragraphs");
    assert_eq!(u16_at(20), 0, "ip");
    assert_eq!(u16_at(22), 0, "cs");
    assert_eq!(u16_at(14), 0, "ss");
    assert_eq!(u16_at(16), 0, "sp");
}

/// Scenario 2: MZ with one paragraph relocation against its own section.
#[test]
fn scenario_2_mz_with_one_relocation_gets_one_table_entry() {
    let mut module = Module::new(Cpu::I8086);
    let mut code = Section::new(".code");
    code.write_word(4, 0, 0, Endian::Little).unwrap();
    let code_id = module.add_section(code);
    module.add_relocation(Relocation::paragraph(
        Location::in_section(code_id, 0),
        Target::Location(Location::in_section(code_id, 0)),
        Endian::Little,
    ));

    let mut driver = MzDriver::new();
    let mut out = Vec::new();
    let pipeline = LinkPipeline::new(&NullDiagnostics);
    let written = pipeline
        .link(&mut module, &mut driver, None, HashMap::new(), &mut out)
        .unwrap();

    let u16_at = |offset: usize| out[offset] as u16 | (out[offset + 1] as u16) << 8;
    assert!(u16_at(24) >= 0x1C, "relocation table offset");
    assert_eq!(u16_at(6), 1, "one relocation entry");
    assert_eq!(u16_at(8), 2, "header grows to cover a 4-byte table");
    // table entry: offset=0, segment=0
    assert_eq!(u16_at(0x1C), 0);
    assert_eq!(u16_at(0x1E), 0);
}

/// Scenario 3: symbol displacement under merge.
#[test]
fn scenario_3_symbol_displacement_under_merge() {
    let mut a = Module::new(Cpu::I8086);
    let mut text_a = Section::new(".text");
    text_a.expand(16);
    let text_a_id = a.add_section(text_a);
    a.add_global("foo", Location::in_section(text_a_id, 0x8), &NullDiagnostics);

    let mut b = Module::new(Cpu::I8086);
    let mut text_b = Section::new(".text");
    text_b.expand(32);
    let text_b_id = b.add_section(text_b);
    b.add_global("bar", Location::in_section(text_b_id, 0x10), &NullDiagnostics);

    a.append(b, &NullDiagnostics).unwrap();

    let merged = a.section_id_by_name(".text").unwrap();
    assert_eq!(a.globals()["foo"], Location::in_section(merged, 0x8));
    assert_eq!(a.globals()["bar"], Location::in_section(merged, 0x20));
}

/// Scenario 4: common allocation. `allocate_symbols` alone places c1/c2
/// back to back (size 6); the scenario's total of 8 comes from the
/// *following* alignment a script applies after the `.comm` collection
/// (the section's own alignment, the max of its commons' aligns, is 4) —
/// demonstrated here with the `realign_end` a `Collect`'s trailing `align`
/// action would perform (see `DESIGN.md`).
#[test]
fn scenario_4_common_allocation_places_symbols_and_pads_to_section_align() {
    let mut module = Module::new(Cpu::None);
    module.add_common("c1", CommonSymbol::new(4, 4));
    module.add_common("c2", CommonSymbol::new(2, 2));
    let comm = module.get_or_create_section(".comm");
    module.allocate_symbols(comm, &NullDiagnostics);

    assert_eq!(module.globals()["c1"], Location::in_section(comm, 0));
    assert_eq!(module.globals()["c2"], Location::in_section(comm, 4));
    assert_eq!(module.section(comm).size(), 6);
    assert!(module.commons().is_empty());

    module.with_sections_mut(|sections| sections[comm.0].realign_end(4));
    assert_eq!(module.section(comm).size(), 8);
}

/// Scenario 5: a script template turns N resource sections into N
/// single-section segments, each starting at address 0.
#[test]
fn scenario_5_resource_template_yields_one_segment_per_section() {
    use retrolinker::section::SectionFlags;

    let mut module = Module::new(Cpu::None);
    for name in ["r1", "r2", "r3"] {
        let mut section = Section::new(name);
        section.add_flags(SectionFlags::RESOURCE);
        module.add_section(section);
    }

    let evaluator = ScriptEvaluator::new(&mut module, HashMap::new(), &NullDiagnostics);
    let segments = evaluator
        .run_source("for resource { at 0; all any; };")
        .unwrap();

    assert_eq!(segments.len(), 3);
    for (segment, expected) in segments.iter().zip(["r1", "r2", "r3"]) {
        assert_eq!(segment.name(), expected);
        assert_eq!(segment.base_address(), 0);
        assert_eq!(segment.sections().len(), 1);
    }
}

/// Scenario 6: a 1-byte masked relocation preserves the untouched nibble.
#[test]
fn scenario_6_mask_preserves_untouched_bits() {
    let mut section = Section::new(".text");
    section.write_word(1, 0, 0xA0, Endian::Little).unwrap();
    let source = Location::in_section(retrolinker::location::SectionId(0), 0);
    let target = Target::Location(source);
    let relocation = Relocation::absolute(1, source, target, Endian::Little).with_mask(0x0F);

    relocation.write_word(&mut section, 0x1234).unwrap();

    let mut buf = [0u8; 1];
    section.read_data(0, &mut buf);
    assert_eq!(buf[0], 0xA4);
}

/// `.entry` flows from a `-d` symbol injection through the pipeline into
/// the MZ header's `cs:ip` fields.
#[test]
fn entry_injection_reaches_mz_header() {
    use retrolinker::options::LinkOptions;

    let pipeline = LinkPipeline::new(&NullDiagnostics);
    let formats: Vec<Box<dyn InputFormat>> = vec![Box::new(RawInput::new(Cpu::I8086))];
    let mut module = pipeline
        .load_and_merge(&[vec![0x90, 0x90, 0xC3, 0x90]], &formats)
        .unwrap();

    let mut options = LinkOptions::new();
    options
        .symbol_injections
        .insert(ENTRY_SYMBOL.to_string(), "2".to_string());
    pipeline.apply_symbol_injections(&mut module, &options).unwrap();

    let mut driver = MzDriver::new();
    let mut out = Vec::new();
    pipeline
        .link(&mut module, &mut driver, None, HashMap::new(), &mut out)
        .unwrap();

    let ip = out[20] as u16 | (out[21] as u16) << 8;
    assert_eq!(ip, 2);
}
