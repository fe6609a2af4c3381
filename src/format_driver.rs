//! The two contracts a format backend implements: [`InputFormat`] (reads an
//! object file into a [`Module`]) and [`FormatDriver`] (lays out and writes
//! a [`Module`] as an executable). Per `SPEC_FULL.md` §1/§6.4 these are the
//! *external collaborator* seam; this crate ships exactly one pair
//! (`crate::formats::raw`, `crate::formats::mz`) as a worked reference.

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::module::Module;
use crate::section::SectionFlags;
use crate::segment::Segment;

/// Reads one input file's bytes into a transient [`Module`].
pub trait InputFormat {
    /// Whether `data` begins with this format's signature. Consulted by
    /// [`crate::pipeline::LinkPipeline`]'s format-detection table (§4.6
    /// step 1); a format that wraps another (e.g. MZ embedding a
    /// protected-mode extender) should still return `true` here and let
    /// [`InputFormat::produce_module`] chase the embedded format itself.
    fn matches_signature(&self, data: &[u8]) -> bool;

    /// Parses `data` into a fresh [`Module`]. Per-relocation and
    /// per-symbol problems should go through `diagnostics`, not `Result`;
    /// only a genuinely malformed file returns `Err`.
    fn produce_module(&self, data: &[u8], diagnostics: &dyn Diagnostics) -> Result<Module>;
}

/// Lays out and serialises a [`Module`] as one historical executable
/// format.
pub trait FormatDriver {
    /// Called once per segment the script produces, in creation order, so
    /// the driver can recognise `.code`/`.data`/`.bss`/`.stack` or reject an
    /// unsupported one.
    fn on_new_segment(&mut self, segment: &Segment, diagnostics: &dyn Diagnostics);

    /// The linker script text to run against `module`: either a built-in
    /// template the driver selects by format/memory-model, or a
    /// user-supplied override (`-T FILE`) the caller has already read.
    fn get_script(&self, module: &Module) -> String;

    /// Whether this format's address space is segmented (x86 real mode,
    /// Z8000) as opposed to flat.
    fn format_supports_segmentation(&self) -> bool;

    /// Whether this format's native word size is 16 bits, which several
    /// relocation kinds (paragraph, selector) only make sense under.
    fn format_is_16bit(&self) -> bool;

    /// Extra [`SectionFlags`] this driver wants OR'd onto a section by
    /// name (e.g. Amiga `.chip`/`.fast`, a Mac resource-fork protected
    /// bit), consulted while an [`InputFormat`] builds its module.
    fn format_additional_section_flags(&self, _section_name: &str) -> SectionFlags {
        SectionFlags::empty()
    }

    /// Resolves every relocation in `module` into its final written form,
    /// collecting any fix-ups the output format must carry persistently
    /// (e.g. an MZ relocation table entry) as internal driver state.
    /// Per-relocation problems are diagnosed, not returned as `Err`; the
    /// module is still written.
    fn process_module(&mut self, module: &mut Module, diagnostics: &dyn Diagnostics) -> Result<()>;

    /// Serialises headers, segments, and any collected fix-up tables to
    /// `writer`, returning the number of bytes written.
    fn write_file(&self, module: &Module, writer: &mut dyn std::io::Write) -> Result<u64>;

    /// The filename extension this driver prefers when `-o` was not given,
    /// e.g. `"exe"` for MZ.
    fn default_extension(&self, module: &Module, base: &str) -> String {
        let _ = module;
        format!("{base}.out")
    }
}
