//! [`Module`]: the complete object model for one (possibly merged) input
//! file — sections, symbol tables, relocations, and a CPU tag.

use std::collections::HashMap;

use crate::cpu::Cpu;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::location::{Displacement, Location, SectionId};
use crate::relocation::{Relocation, Target};
use crate::section::{Section, SectionFlags};
use crate::symbol::{CommonSymbol, ExportedSymbolName, SymbolName};

/// The conventional section name drivers recognise for common-symbol
/// placement (§6.3).
pub const COMM_SECTION: &str = ".comm";
/// The conventional symbol naming the program entry point.
pub const ENTRY_SYMBOL: &str = ".entry";
/// The conventional symbol naming the initial stack pointer.
pub const STACK_TOP_SYMBOL: &str = ".stack_top";

/// Insertion-ordered `SymbolName -> slot index` table backing `GOTEntry`/
/// `GOTEntryOffset` relocations (generalizing the original's ad hoc
/// `SymbolName::GOT` sentinel, per `SPEC_FULL.md` §4.3.6).
#[derive(Debug, Default, Clone)]
pub struct GlobalOffsetTable {
    order: Vec<SymbolName>,
    slots: HashMap<SymbolName, u64>,
}

impl GlobalOffsetTable {
    pub fn new() -> Self {
        GlobalOffsetTable::default()
    }

    /// Returns the slot index for `symbol`, allocating a new one at the end
    /// of the table the first time this symbol is seen.
    pub fn slot_for(&mut self, symbol: SymbolName) -> u64 {
        if let Some(&slot) = self.slots.get(&symbol) {
            return slot;
        }
        let slot = self.order.len() as u64;
        self.slots.insert(symbol.clone(), slot);
        self.order.push(symbol);
        slot
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn entries(&self) -> &[SymbolName] {
        &self.order
    }
}

/// The merged object model: owns every [`Section`] by value, indexed by
/// [`SectionId`], plus the symbol tables and relocation list that refer to
/// them.
#[derive(Debug, Default)]
pub struct Module {
    cpu: Cpu,
    sections: Vec<Section>,
    section_names: HashMap<String, SectionId>,
    locals: HashMap<String, Location>,
    globals: HashMap<String, Location>,
    commons: HashMap<String, CommonSymbol>,
    imports: Vec<SymbolName>,
    exports: HashMap<ExportedSymbolName, Location>,
    relocations: Vec<Relocation>,
    got: GlobalOffsetTable,
}

impl Module {
    pub fn new(cpu: Cpu) -> Self {
        Module {
            cpu,
            ..Default::default()
        }
    }

    pub fn cpu(&self) -> Cpu {
        self.cpu
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id.0]
    }

    pub fn section_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.sections[id.0]
    }

    pub fn section_id_by_name(&self, name: &str) -> Option<SectionId> {
        self.section_names.get(name).copied()
    }

    pub fn section_ids(&self) -> impl Iterator<Item = SectionId> + '_ {
        (0..self.sections.len()).map(SectionId)
    }

    /// Runs `f` against the raw section arena. [`crate::segment::Segment`]
    /// needs direct `&mut [Section]` access (indexed by [`SectionId`]) to
    /// address and flag sections during layout; this is the one seam that
    /// exposes the arena rather than individual sections.
    pub fn with_sections_mut<R>(&mut self, f: impl FnOnce(&mut [Section]) -> R) -> R {
        f(&mut self.sections)
    }

    /// Adds a brand-new section, returning its id. Panics if a section
    /// with this name already exists — callers that might collide should
    /// go through [`Module::get_or_create_section`] instead.
    pub fn add_section(&mut self, section: Section) -> SectionId {
        let name = section.name().to_string();
        let id = SectionId(self.sections.len());
        self.sections.push(section);
        let previous = self.section_names.insert(name, id);
        debug_assert!(previous.is_none(), "duplicate section name inserted");
        id
    }

    pub fn get_or_create_section(&mut self, name: &str) -> SectionId {
        if let Some(&id) = self.section_names.get(name) {
            return id;
        }
        self.add_section(Section::new(name))
    }

    pub fn locals(&self) -> &HashMap<String, Location> {
        &self.locals
    }

    pub fn globals(&self) -> &HashMap<String, Location> {
        &self.globals
    }

    pub fn commons(&self) -> &HashMap<String, CommonSymbol> {
        &self.commons
    }

    pub fn imports(&self) -> &[SymbolName] {
        &self.imports
    }

    pub fn exports(&self) -> &HashMap<ExportedSymbolName, Location> {
        &self.exports
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    pub fn relocations_mut(&mut self) -> &mut Vec<Relocation> {
        &mut self.relocations
    }

    pub fn got_mut(&mut self) -> &mut GlobalOffsetTable {
        &mut self.got
    }

    pub fn got(&self) -> &GlobalOffsetTable {
        &self.got
    }

    pub fn add_local(&mut self, name: impl Into<String>, location: Location) {
        self.locals.insert(name.into(), location);
    }

    pub fn add_global(&mut self, name: impl Into<String>, location: Location, diagnostics: &dyn Diagnostics) {
        let name = name.into();
        if let Some(existing) = self.globals.get(&name) {
            if *existing != location {
                diagnostics.warn(&format!("duplicate global symbol '{name}', keeping first definition"));
            }
            return;
        }
        self.globals.insert(name, location);
    }

    pub fn add_common(&mut self, name: impl Into<String>, common: CommonSymbol) {
        let name = name.into();
        self.commons
            .entry(name)
            .and_modify(|existing| *existing = existing.merge(common))
            .or_insert(common);
    }

    pub fn add_import(&mut self, symbol: SymbolName) {
        if !self.imports.contains(&symbol) {
            self.imports.push(symbol);
        }
    }

    pub fn add_export(&mut self, name: ExportedSymbolName, location: Location, diagnostics: &dyn Diagnostics) {
        if let Some(existing) = self.exports.get(&name) {
            if *existing != location {
                diagnostics.warn("duplicate exported symbol, keeping first definition");
            }
            return;
        }
        self.exports.insert(name, location);
    }

    pub fn add_relocation(&mut self, relocation: Relocation) {
        self.relocations.push(relocation);
    }

    /// Merges `other` into `self`, consuming it. Implements §4.4:
    /// - CPU tags must match (or `self` adopts `other`'s if still `None`).
    /// - Same-named sections are merged: if both are Mergeable and share a
    ///   `collection_name`, they're overlaid to the maximum length via
    ///   [`Section::overlay`] (§4.2); otherwise they're concatenated via
    ///   [`Section::append`]. Differently-named sections move in wholesale.
    /// - Global/Common/Imported/Exported symbols union, diagnosing
    ///   collisions; relocations are displaced and appended.
    pub fn append(&mut self, mut other: Module, diagnostics: &dyn Diagnostics) -> Result<()> {
        other.resolve_relocations();

        self.cpu = self
            .cpu
            .reconcile(other.cpu)
            .map_err(|(mine, theirs)| {
                Error::FormatParse(format!("cannot merge module for {theirs} into module for {mine}"))
            })?;

        let mut displacement = Displacement::new();
        for (old_index, section) in other.sections.into_iter().enumerate() {
            let old_id = SectionId(old_index);
            if let Some(&existing_id) = self.section_names.get(section.name()) {
                let existing = &self.sections[existing_id.0];
                let overlays = existing.flags().contains(SectionFlags::MERGEABLE)
                    && section.flags().contains(SectionFlags::MERGEABLE)
                    && existing.collection_name().is_some()
                    && existing.collection_name() == section.collection_name();
                let offset = if overlays {
                    self.sections[existing_id.0].overlay(&section)?
                } else {
                    self.sections[existing_id.0].append(&section)?
                };
                displacement.record(old_id, existing_id, offset);
            } else {
                let new_id = SectionId(self.sections.len());
                self.section_names.insert(section.name().to_string(), new_id);
                self.sections.push(section);
                displacement.record(old_id, new_id, 0);
            }
        }

        for (name, mut location) in other.globals {
            location.displace(&displacement);
            self.add_global(name, location, diagnostics);
        }
        for (name, common) in other.commons {
            self.add_common(name, common);
        }
        for symbol in other.imports {
            self.add_import(symbol);
        }
        for (name, mut location) in other.exports {
            location.displace(&displacement);
            self.add_export(name, location, diagnostics);
        }

        for mut relocation in other.relocations {
            relocation.source.displace(&displacement);
            displace_target(&mut relocation.target, &displacement);
            displace_target(&mut relocation.reference, &displacement);
            self.relocations.push(relocation);
        }

        Ok(())
    }

    /// Places every not-yet-allocated common symbol into `section`: pads
    /// the section's end to the symbol's alignment, records the symbol's
    /// location at the (now-aligned) end, expands the section by the
    /// symbol's size, and promotes it to a Global. Commons already
    /// resolved as Globals (shouldn't normally happen) are skipped.
    pub fn allocate_symbols(&mut self, section: SectionId, diagnostics: &dyn Diagnostics) {
        let names: Vec<String> = self.commons.keys().cloned().collect();
        for name in names {
            if self.globals.contains_key(&name) {
                self.commons.remove(&name);
                continue;
            }
            let Some(common) = self.commons.remove(&name) else {
                continue;
            };
            let target = &mut self.sections[section.0];
            target.realign_end(common.align.max(1));
            let offset = target.size();
            target.expand(offset + common.size);
            self.add_global(name, Location::in_section(section, offset), diagnostics);
        }
    }

    /// Convenience overload of [`Module::allocate_symbols`] that allocates
    /// into (creating if necessary) the conventional [`COMM_SECTION`].
    pub fn allocate_symbols_into_comm(&mut self, diagnostics: &dyn Diagnostics) {
        let section = self.get_or_create_section(COMM_SECTION);
        self.allocate_symbols(section, diagnostics);
    }

    /// Rewrites every relocation's target/reference whose `SymbolName` is
    /// `Local` and has a definition in `self.locals` into a direct
    /// [`Location`]. Local symbols carry no meaning once their defining
    /// module has been merged away, so this is always run before a module
    /// is folded into another (see [`Module::append`]).
    pub fn resolve_relocations(&mut self) {
        let locals = &self.locals;
        for relocation in &mut self.relocations {
            resolve_local(&mut relocation.target, locals);
            resolve_local(&mut relocation.reference, locals);
        }
    }
}

fn resolve_local(target: &mut Target, locals: &HashMap<String, Location>) {
    if let Target::Symbol(SymbolName::Local(name)) = target {
        if let Some(&location) = locals.get(name.as_str()) {
            *target = Target::Location(location);
        }
    }
}

fn displace_target(target: &mut Target, displacement: &Displacement) {
    if let Target::Location(location) = target {
        location.displace(displacement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_image::Endian;
    use crate::diagnostics::{CollectingDiagnostics, NullDiagnostics};

    #[test]
    fn append_adopts_cpu_from_empty_module() {
        let mut a = Module::new(Cpu::None);
        let b = Module::new(Cpu::I8086);
        a.append(b, &NullDiagnostics).unwrap();
        assert_eq!(a.cpu(), Cpu::I8086);
    }

    #[test]
    fn append_rejects_mismatched_cpu() {
        let mut a = Module::new(Cpu::I8086);
        let b = Module::new(Cpu::M68000);
        assert!(a.append(b, &NullDiagnostics).is_err());
    }

    #[test]
    fn append_merges_same_named_sections_and_displaces_symbols() {
        // Module A: .text[16 bytes], Global foo @ .text:0x8
        let mut a = Module::new(Cpu::I8086);
        let mut text_a = Section::new(".text");
        text_a.expand(16);
        let text_a_id = a.add_section(text_a);
        a.add_global("foo", Location::in_section(text_a_id, 0x8), &NullDiagnostics);

        // Module B: .text[32 bytes], Global bar @ .text:0x10
        let mut b = Module::new(Cpu::I8086);
        let mut text_b = Section::new(".text");
        text_b.expand(32);
        let text_b_id = b.add_section(text_b);
        b.add_global("bar", Location::in_section(text_b_id, 0x10), &NullDiagnostics);

        a.append(b, &NullDiagnostics).unwrap();

        let merged_text = a.section_id_by_name(".text").unwrap();
        assert_eq!(a.globals()["foo"], Location::in_section(merged_text, 0x8));
        assert_eq!(a.globals()["bar"], Location::in_section(merged_text, 0x20));
        assert_eq!(a.section(merged_text).size(), 48);
    }

    #[test]
    fn append_overlays_mergeable_same_collection_sections_to_max_length() {
        use crate::section::SectionFlags;

        let mut a = Module::new(Cpu::None);
        let mut debug_a = Section::new(".debug");
        debug_a.add_flags(SectionFlags::MERGEABLE);
        debug_a.set_collection_name("dwarf-info");
        debug_a.write_word(2, 0, 0xBEEF, Endian::Little).unwrap();
        debug_a.expand(4);
        a.add_section(debug_a);

        let mut b = Module::new(Cpu::None);
        let mut debug_b = Section::new(".debug");
        debug_b.add_flags(SectionFlags::MERGEABLE);
        debug_b.set_collection_name("dwarf-info");
        debug_b.write_word(2, 0, 0xBEEF, Endian::Little).unwrap();
        debug_b.expand(8);
        b.add_section(debug_b);

        a.append(b, &NullDiagnostics).unwrap();

        let merged = a.section_id_by_name(".debug").unwrap();
        assert_eq!(a.section(merged).size(), 8, "overlay takes the max length, not the sum");
    }

    #[test]
    fn append_warns_on_duplicate_global_and_keeps_first() {
        let mut a = Module::new(Cpu::None);
        let section = a.add_section(Section::new(".text"));
        a.add_global("foo", Location::in_section(section, 0), &NullDiagnostics);

        let mut b = Module::new(Cpu::None);
        let other_section = b.add_section(Section::new(".data"));
        b.add_global("foo", Location::in_section(other_section, 4), &NullDiagnostics);

        let diagnostics = CollectingDiagnostics::default();
        a.append(b, &diagnostics).unwrap();
        assert_eq!(a.globals()["foo"], Location::in_section(section, 0));
        assert_eq!(diagnostics.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn allocate_symbols_places_commons_in_order_with_alignment() {
        let mut module = Module::new(Cpu::None);
        module.add_common("c1", CommonSymbol::new(4, 4));
        module.add_common("c2", CommonSymbol::new(2, 2));
        let comm = module.get_or_create_section(COMM_SECTION);
        module.allocate_symbols(comm, &NullDiagnostics);

        assert_eq!(module.section(comm).size(), 6);
        assert_eq!(module.globals()["c1"], Location::in_section(comm, 0));
        assert_eq!(module.globals()["c2"], Location::in_section(comm, 4));
        assert!(module.commons().is_empty());
    }

    #[test]
    fn resolve_relocations_rewrites_local_symbol_to_location() {
        let mut module = Module::new(Cpu::None);
        let section = module.add_section(Section::new(".text"));
        module.add_local("helper", Location::in_section(section, 0x20));

        let source = Location::in_section(section, 0);
        let reloc = Relocation::absolute(
            2,
            source,
            Target::Symbol(SymbolName::local("helper")),
            Endian::Little,
        );
        module.add_relocation(reloc);
        module.resolve_relocations();

        match &module.relocations()[0].target {
            Target::Location(loc) => assert_eq!(*loc, Location::in_section(section, 0x20)),
            Target::Symbol(_) => panic!("expected resolved location"),
        }
    }

    #[test]
    fn got_table_assigns_stable_slots_in_insertion_order() {
        let mut got = GlobalOffsetTable::new();
        let a = SymbolName::imported_by_name("LIBC", "malloc");
        let b = SymbolName::imported_by_name("LIBC", "free");
        assert_eq!(got.slot_for(a.clone()), 0);
        assert_eq!(got.slot_for(b), 1);
        assert_eq!(got.slot_for(a), 0);
        assert_eq!(got.len(), 2);
    }
}
