//! [`Relocation`]: a deferred fix-up recorded by an input format and
//! resolved once every section has a fixed [`crate::location::Position`].

use crate::byte_image::Endian;
use crate::location::Location;
use crate::section::Section;
use crate::symbol::SymbolName;

/// What a relocation's resolved value represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    /// The target's plain address.
    Direct,
    /// `target.address >> 4` — an x86 real-mode paragraph (segment) number.
    ParagraphAddress,
    /// `target.address >> 16` — a Z8000 segmented-address segment index.
    SegmentIndex,
    /// A protected-mode selector allocated for the target's segment.
    SelectorIndex,
    /// Offset of the target's slot in the module's global offset table.
    GotEntry,
    /// Reserved for a future procedure-linkage-table fixup.
    PltEntry,
    /// The target section's size.
    SizeOf,
}

/// Either a resolved [`Location`] or an as-yet-unresolved
/// [`SymbolName`] reference, with a `segment_of` flag selecting whether the
/// relocation wants the referent itself or the segment/paragraph/selector
/// that contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Location(Location),
    Symbol(SymbolName),
}

impl Target {
    pub fn as_location(&self) -> Option<&Location> {
        match self {
            Target::Location(loc) => Some(loc),
            Target::Symbol(_) => None,
        }
    }
}

/// A deferred fix-up: write `kind`-derived value of `target` (relative to
/// `reference`, scaled by `addend`/`shift`/`mask`) into `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub kind: RelocationKind,
    pub size_in_bytes: usize,
    pub source: Location,
    pub target: Target,
    /// The basis the value is computed relative to. Self-relative
    /// relocations set this equal to `source`.
    pub reference: Target,
    pub segment_of: bool,
    pub addend: i64,
    pub endian: Endian,
    /// Negative shifts left by `-shift`; positive shifts right
    /// (unsigned) by `shift`.
    pub shift: i32,
    pub mask: u64,
    pub subtract: bool,
}

impl Relocation {
    /// `target.address`, written directly with no scaling.
    pub fn absolute(size: usize, source: Location, target: Target, endian: Endian) -> Self {
        Relocation {
            kind: RelocationKind::Direct,
            size_in_bytes: size,
            source,
            reference: Target::Location(Location::absolute(0)),
            target,
            segment_of: false,
            addend: 0,
            endian,
            shift: 0,
            mask: !0,
            subtract: false,
        }
    }

    /// The offset-in-segment portion of a target: `reference` is marked
    /// `segment_of`, so the written value is `target.address -
    /// reference.segment.base_address`.
    pub fn offset(size: usize, source: Location, target: Target, segment_reference: Target, endian: Endian) -> Self {
        Relocation {
            kind: RelocationKind::Direct,
            size_in_bytes: size,
            source,
            target,
            reference: segment_reference,
            segment_of: true,
            addend: 0,
            endian,
            shift: 0,
            mask: !0,
            subtract: false,
        }
    }

    /// Like [`Relocation::offset`] but against an explicit reference
    /// position rather than the target's own segment.
    pub fn offset_from(
        size: usize,
        source: Location,
        target: Target,
        reference: Target,
        endian: Endian,
    ) -> Self {
        Relocation {
            kind: RelocationKind::Direct,
            size_in_bytes: size,
            source,
            target,
            reference,
            segment_of: false,
            addend: 0,
            endian,
            shift: 0,
            mask: !0,
            subtract: false,
        }
    }

    /// Self-relative: `reference` is set to `source`, so the written value
    /// is `target.address - source.address + addend`.
    pub fn relative(size: usize, source: Location, target: Target, endian: Endian) -> Self {
        Relocation {
            kind: RelocationKind::Direct,
            size_in_bytes: size,
            reference: Target::Location(source),
            source,
            target,
            segment_of: false,
            addend: 0,
            endian,
            shift: 0,
            mask: !0,
            subtract: false,
        }
    }

    /// An x86 real-mode paragraph number (`target.address >> 4`).
    pub fn paragraph(source: Location, target: Target, endian: Endian) -> Self {
        Relocation {
            kind: RelocationKind::ParagraphAddress,
            size_in_bytes: 2,
            source,
            target,
            reference: Target::Location(Location::absolute(0)),
            segment_of: true,
            addend: 0,
            endian,
            shift: 0,
            mask: !0,
            subtract: false,
        }
    }

    /// A protected-mode selector index for the target's segment.
    pub fn selector(source: Location, target: Target, endian: Endian) -> Self {
        Relocation {
            kind: RelocationKind::SelectorIndex,
            size_in_bytes: 2,
            source,
            target,
            reference: Target::Location(Location::absolute(0)),
            segment_of: true,
            addend: 0,
            endian,
            shift: 0,
            mask: !0,
            subtract: false,
        }
    }

    /// A Z8000 segmented address, always big-endian.
    pub fn segment(source: Location, target: Target) -> Self {
        Relocation {
            kind: RelocationKind::SegmentIndex,
            size_in_bytes: 2,
            source,
            target,
            reference: Target::Location(Location::absolute(0)),
            segment_of: true,
            addend: 0,
            endian: Endian::Big,
            shift: 0,
            mask: !0,
            subtract: false,
        }
    }

    /// The (reference - target) paragraph-granularity difference used by
    /// ELKS-style runtime-adjustable code.
    pub fn paragraph_difference(source: Location, target: Target, reference: Target, endian: Endian) -> Self {
        Relocation {
            kind: RelocationKind::ParagraphAddress,
            size_in_bytes: 2,
            source,
            target,
            reference,
            segment_of: true,
            addend: 0,
            endian,
            shift: 0,
            mask: !0,
            subtract: true,
        }
    }

    pub fn got_entry(size: usize, source: Location, target: Target, endian: Endian) -> Self {
        Relocation {
            kind: RelocationKind::GotEntry,
            size_in_bytes: size,
            source,
            target,
            reference: Target::Location(Location::absolute(0)),
            segment_of: false,
            addend: 0,
            endian,
            shift: 0,
            mask: !0,
            subtract: false,
        }
    }

    pub fn with_addend(mut self, addend: i64) -> Self {
        self.addend = addend;
        self
    }

    pub fn with_shift(mut self, shift: i32) -> Self {
        self.shift = shift;
        self
    }

    pub fn with_mask(mut self, mask: u64) -> Self {
        self.mask = mask;
        self
    }

    /// True iff `reference` is a [`Location`] equal to `source`: the
    /// relocation is pc-relative.
    pub fn is_relative(&self) -> bool {
        matches!(&self.reference, Target::Location(loc) if *loc == self.source)
    }

    /// Computes the resolved value given already-looked-up target and
    /// reference addresses (both post-layout).
    ///
    /// `raw = target_address - reference_address` (wrapping); negated if
    /// `subtract`. The granularity shift in §4.3.1's kind table is then
    /// applied: [`RelocationKind::ParagraphAddress`] divides by 16 (an x86
    /// paragraph), [`RelocationKind::SegmentIndex`] by 65536 (a Z8000
    /// segment). Every other kind — including [`RelocationKind::Direct`]
    /// with `segment_of` set, which only tells a resolver to feed this
    /// method a *segment base* address rather than the target's own — takes
    /// the raw difference unscaled. [`RelocationKind::SelectorIndex`] and
    /// [`RelocationKind::GotEntry`] resolve through a format-specific
    /// allocation table instead of an address difference at all; a driver
    /// computes those values itself rather than calling this method.
    pub fn compute_value(&self, target_address: u64, reference_address: u64) -> i64 {
        let mut raw = target_address.wrapping_sub(reference_address) as i64;
        if self.subtract {
            raw = raw.wrapping_neg();
        }
        let shifted = match self.kind {
            RelocationKind::ParagraphAddress => raw >> 4,
            RelocationKind::SegmentIndex => raw >> 16,
            _ => raw,
        };
        self.addend.wrapping_add(shifted)
    }

    /// Applies `shift` and `mask` to `value` and writes the result into
    /// `section` at `source.offset`, preserving the bits `mask` excludes
    /// from the section's current word.
    pub fn write_word(&self, section: &mut Section, value: i64) -> crate::error::Result<()> {
        let mut value = value as u64;
        if self.shift < 0 {
            value <<= (-self.shift) as u32;
        } else if self.shift > 0 {
            value >>= self.shift as u32;
        }

        let stored = if self.mask == !0 {
            value
        } else {
            let mut current = [0u8; 8];
            section.read_data(self.source.offset, &mut current[..self.size_in_bytes]);
            let current = crate::byte_image::read_unsigned(
                &current,
                0,
                self.size_in_bytes,
                self.endian,
            );
            (value & self.mask) | (current & !self.mask)
        };

        section.write_word(self.size_in_bytes, self.source.offset, stored, self.endian)
    }

    /// Adds the word already present at `source` to `value`. Used for
    /// input formats whose relocation tables do not carry addends and
    /// instead leave them pre-baked into the section bytes.
    pub fn add_current_value(&self, section: &Section, value: i64) -> i64 {
        let mut current = [0u8; 8];
        section.read_data(self.source.offset, &mut current[..self.size_in_bytes]);
        let current = crate::byte_image::read_signed(&current, 0, self.size_in_bytes, self.endian);
        value + current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::SectionId;

    #[test]
    fn relative_reference_equals_source() {
        let source = Location::in_section(SectionId(0), 4);
        let reloc = Relocation::relative(2, source, Target::Location(source), Endian::Little);
        assert!(reloc.is_relative());
    }

    #[test]
    fn compute_value_self_relative() {
        let source = Location::in_section(SectionId(0), 0);
        let target = Target::Location(Location::in_section(SectionId(0), 0));
        let reloc = Relocation::relative(2, source, target, Endian::Little).with_addend(2);
        // src at 0x100, target at 0x110: (0x110 - 0x100) + 2
        assert_eq!(reloc.compute_value(0x110, 0x100), 0x12);
    }

    #[test]
    fn paragraph_shifts_right_by_four() {
        let source = Location::in_section(SectionId(0), 0);
        let target = Target::Location(Location::in_section(SectionId(0), 0));
        let reloc = Relocation::paragraph(source, target, Endian::Little);
        assert_eq!(reloc.compute_value(0x1230, 0), 0x123);
    }

    #[test]
    fn subtract_negates_raw_before_segment_of() {
        let source = Location::in_section(SectionId(0), 0);
        let target = Target::Location(Location::in_section(SectionId(0), 0));
        let reference = Target::Location(Location::in_section(SectionId(0), 0));
        let reloc = Relocation::paragraph_difference(source, target, reference, Endian::Little);
        // target=0x1000, reference=0x1100: raw = -0x100, negate -> 0x100, >>4 = 0x10
        assert_eq!(reloc.compute_value(0x1000, 0x1100), 0x10);
    }

    #[test]
    fn write_word_preserves_masked_high_nibble() {
        let mut section = Section::new(".text");
        section.write_word(1, 0, 0xA0, Endian::Little).unwrap();
        let source = Location::in_section(SectionId(0), 0);
        let target = Target::Location(Location::in_section(SectionId(0), 0));
        let reloc = Relocation::absolute(1, source, target, Endian::Little).with_mask(0x0F);
        reloc.write_word(&mut section, 0x1234).unwrap();
        let mut buf = [0u8; 1];
        section.read_data(0, &mut buf);
        assert_eq!(buf[0], 0xA4);
    }

    #[test]
    fn offset_is_unshifted_despite_segment_of() {
        let source = Location::in_section(SectionId(0), 0);
        let target = Target::Location(Location::in_section(SectionId(0), 0));
        let segment_reference = Target::Location(Location::in_section(SectionId(1), 0));
        let reloc = Relocation::offset(2, source, target, segment_reference, Endian::Little);
        assert_eq!(reloc.compute_value(0x1234, 0x1000), 0x234);
    }

    #[test]
    fn selector_is_unshifted_despite_segment_of() {
        let source = Location::in_section(SectionId(0), 0);
        let target = Target::Location(Location::in_section(SectionId(0), 0));
        let reloc = Relocation::selector(source, target, Endian::Little);
        assert_eq!(reloc.compute_value(0x1234, 0), 0x1234);
    }

    #[test]
    fn segment_shifts_right_by_sixteen() {
        let source = Location::in_section(SectionId(0), 0);
        let target = Target::Location(Location::in_section(SectionId(0), 0));
        let reloc = Relocation::segment(source, target);
        assert_eq!(reloc.compute_value(0x1_2345, 0), 0x1);
    }

    #[test]
    fn write_word_shift_right_applies_before_mask() {
        let mut section = Section::new(".text");
        section.write_word(1, 0, 0, Endian::Little).unwrap();
        let source = Location::in_section(SectionId(0), 0);
        let target = Target::Location(Location::in_section(SectionId(0), 0));
        let reloc = Relocation::absolute(1, source, target, Endian::Little).with_shift(4);
        reloc.write_word(&mut section, 0x230).unwrap();
        let mut buf = [0u8; 1];
        section.read_data(0, &mut buf);
        assert_eq!(buf[0], 0x23);
    }
}
