//! [`LinkPipeline`]: the end-to-end orchestration described in spec.md
//! §4.6: detect, parse, merge, apply user globals, allocate commons, run
//! the linker script, resolve relocations, and write.
//!
//! Grounded on `original_source/src/linker/linker.cc`'s top-level `Link()`
//! driver. CLI argument parsing is a Non-goal (§1), so this type consumes
//! already-parsed [`LinkOptions`] and already-read input bytes rather than
//! touching argv or opening files itself; a caller builds a CLI on top.

use std::collections::HashMap;
use std::io::Write;

use crate::cpu::Cpu;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::format_driver::{FormatDriver, InputFormat};
use crate::location::Location;
use crate::module::Module;
use crate::options::{LinkOptions, LinkerParameter};
use crate::script::ScriptEvaluator;

/// Orchestrates one link: a set of input byte buffers, an [`InputFormat`]
/// table to detect them with, and a [`FormatDriver`] to lay out and write
/// the result.
///
/// Stateless beyond the [`Diagnostics`] sink it threads through every step
/// (§3.4); a caller links multiple outputs by constructing one
/// `LinkPipeline` per job (§5: independent pipeline objects are safe to
/// run in parallel).
pub struct LinkPipeline<'d> {
    diagnostics: &'d dyn Diagnostics,
}

impl<'d> LinkPipeline<'d> {
    pub fn new(diagnostics: &'d dyn Diagnostics) -> Self {
        LinkPipeline { diagnostics }
    }

    /// Finds the first [`InputFormat`] in `formats` whose signature matches
    /// `data` (§4.6 step 1). Formats are tried in order, so a caller that
    /// wants to detect a format embedded in another (e.g. a protected-mode
    /// extender carried in an MZ stub) lists the more specific formats
    /// first and lets that format's `produce_module` chase the embedding.
    pub fn detect_format<'f>(
        &self,
        data: &[u8],
        formats: &'f [Box<dyn InputFormat>],
    ) -> Result<&'f dyn InputFormat> {
        formats
            .iter()
            .find(|format| format.matches_signature(data))
            .map(|format| format.as_ref())
            .ok_or_else(|| Error::FormatDetect("no input format signature matched".into()))
    }

    /// Parses every input in `inputs` and folds it into one master
    /// [`Module`] in order (§4.6 steps 2-3; §5's section-merge ordering
    /// guarantee). The master module starts with [`Cpu::None`] and adopts
    /// the first input's CPU tag.
    pub fn load_and_merge(
        &self,
        inputs: &[Vec<u8>],
        formats: &[Box<dyn InputFormat>],
    ) -> Result<Module> {
        let mut master = Module::new(Cpu::None);
        for data in inputs {
            let format = self.detect_format(data, formats)?;
            let parsed = format.produce_module(data, self.diagnostics)?;
            master.append(parsed, self.diagnostics)?;
        }
        Ok(master)
    }

    /// Injects every `-d NAME[=VAL|=SEG:OFF]` symbol from `options` as a
    /// Global (§4.6 step 4, §6.1). `VAL` is parsed as a decimal or
    /// `0x`-prefixed hexadecimal absolute address; `SEG:OFF` resolves
    /// `SEG` against an existing section name.
    pub fn apply_symbol_injections(&self, module: &mut Module, options: &LinkOptions) -> Result<()> {
        for (name, raw_value) in &options.symbol_injections {
            let location = parse_injected_location(module, raw_value)?;
            module.add_global(name.clone(), location, self.diagnostics);
        }
        Ok(())
    }

    /// Allocates every not-yet-placed common symbol into the conventional
    /// `.comm` section (§4.6 step 5).
    pub fn allocate_commons(&self, module: &mut Module) {
        module.allocate_symbols_into_comm(self.diagnostics);
    }

    /// Runs the linker script against `module`, feeds every produced
    /// segment to `driver`, resolves relocations, and writes the final
    /// image to `writer` (§4.6 steps 6-9). `script_override` stands in for
    /// a `-T FILE` script the caller has already read; when absent the
    /// driver's built-in script (`driver.get_script`) is used instead.
    pub fn link(
        &self,
        module: &mut Module,
        driver: &mut dyn FormatDriver,
        script_override: Option<&str>,
        parameters: HashMap<String, LinkerParameter>,
        writer: &mut dyn Write,
    ) -> Result<u64> {
        let script = match script_override {
            Some(text) => text.to_string(),
            None => driver.get_script(module),
        };

        let segments = {
            let evaluator = ScriptEvaluator::new(module, parameters, self.diagnostics);
            evaluator.run_source(&script)?
        };
        for segment in &segments {
            driver.on_new_segment(segment, self.diagnostics);
        }

        driver.process_module(module, self.diagnostics)?;
        driver.write_file(module, writer)
    }
}

/// Parses a `-d` symbol injection's right-hand side: either a bare integer
/// (decimal or `0x`-prefixed hex) for an absolute [`Location`], or
/// `SEG:OFF` naming an existing section by name.
fn parse_injected_location(module: &Module, raw: &str) -> Result<Location> {
    if let Some((segment_name, offset_text)) = raw.split_once(':') {
        let section = module.section_id_by_name(segment_name).ok_or_else(|| {
            Error::ScriptEval(format!("injected symbol references unknown section '{segment_name}'"))
        })?;
        let offset = parse_integer(offset_text)?;
        return Ok(Location::in_section(section, offset));
    }
    Ok(Location::absolute(parse_integer(raw)?))
}

fn parse_integer(text: &str) -> Result<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| Error::ScriptEval(format!("bad hex value '{text}': {e}")))
    } else {
        text.parse::<u64>()
            .map_err(|e| Error::ScriptEval(format!("bad integer value '{text}': {e}")))
    }
}
