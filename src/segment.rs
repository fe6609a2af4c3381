//! [`Segment`]: an ordered, non-owning view over the
//! [`crate::section::Section`]s that share one address space.
//!
//! A `Segment` never owns its sections — the owning
//! [`crate::module::Module`] does, in a `Vec<Section>` — it only holds the
//! ordered list of [`SectionId`]s assigned to it plus the aggregate
//! address/size bookkeeping a [`crate::format_driver::FormatDriver`] needs.

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::location::{SectionId, SegmentId};
use crate::section::Section;

/// An ordered sequence of sections sharing one address space, as produced
/// by [`crate::script::eval::ScriptEvaluator`].
#[derive(Debug, Clone)]
pub struct Segment {
    name: String,
    base_address: u64,
    /// Max of the alignment of every contained section.
    align: u64,
    /// Sum of the sizes of non-ZeroFilled sections.
    data_size: u64,
    /// Sum of the sizes of trailing ZeroFilled sections.
    zero_fill: u64,
    /// Extra space a driver requested beyond the contained sections (e.g.
    /// a stack reservation with no backing section).
    optional_extra: u64,
    sections: Vec<SectionId>,
}

impl Segment {
    pub fn new(name: impl Into<String>, base_address: u64) -> Self {
        Segment {
            name: name.into(),
            base_address,
            align: 1,
            data_size: 0,
            zero_fill: 0,
            optional_extra: 0,
            sections: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn align(&self) -> u64 {
        self.align
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn zero_fill(&self) -> u64 {
        self.zero_fill
    }

    pub fn optional_extra(&self) -> u64 {
        self.optional_extra
    }

    pub fn set_optional_extra(&mut self, extra: u64) {
        self.optional_extra = extra;
    }

    pub fn sections(&self) -> &[SectionId] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Moves this segment's base address to `address`, but only while it
    /// holds no sections yet. A non-`post` `at` statement encountered while
    /// a segment body is still building its first section uses this to set
    /// the segment's real start, matching the original's distinction
    /// between addressing a fresh segment and retroactively moving an
    /// already-populated one (see `script::eval` module docs).
    pub fn rebase_if_empty(&mut self, address: u64) {
        if self.sections.is_empty() {
            self.base_address = address;
        }
    }

    /// Total size of the segment's address range: contained data, trailing
    /// zero-fill, and any requested extra.
    pub fn image_size(&self) -> u64 {
        self.data_size + self.zero_fill + self.optional_extra
    }

    /// Appends `id` (looked up in `arena`) to the end of this segment,
    /// aligning and addressing it. `self_id` is this segment's own handle,
    /// stamped onto the section's back-reference. If the previously-last
    /// section was ZeroFilled and `id`'s section is not, the predecessor is
    /// materialised to real zero bytes first ("Fill"), preserving the
    /// no-ZeroFilled-followed-by-data invariant. Returns the address
    /// assigned to the newly appended section.
    pub fn append(
        &mut self,
        arena: &mut [Section],
        id: SectionId,
        self_id: SegmentId,
        diagnostics: &dyn Diagnostics,
    ) -> Result<u64> {
        if let Some(&last_id) = self.sections.last() {
            if arena[last_id.0].is_zero_filled() && !arena[id.0].is_zero_filled() {
                self.fill_zero_section(arena, last_id);
            }
        }

        let section_align = arena[id.0].align().max(1);
        self.align = self.align.max(section_align);

        let current_end = self.base_address + self.data_size + self.zero_fill;
        let address = align_up(current_end, section_align);
        let padding = address - current_end;

        let section = &mut arena[id.0];
        section.set_address(address, diagnostics);
        section.set_segment(self_id);

        let size = section.size();
        if section.is_zero_filled() {
            self.zero_fill += padding + size;
        } else {
            if padding > 0 {
                // padding before a non-zero-filled section is itself real,
                // unaddressed space; fold it into data_size so ImageSize
                // stays consistent with the bytes a driver will emit.
                self.data_size += padding;
            }
            self.data_size += size;
        }
        self.sections.push(id);
        Ok(address)
    }

    fn fill_zero_section(&mut self, arena: &mut [Section], id: SectionId) {
        let size = arena[id.0].size();
        // set_zero_filled(false) cannot fail here: the section is known
        // ZeroFilled, so the "already has data" guard never triggers.
        arena[id.0]
            .set_zero_filled(false)
            .expect("materialising a zero-filled section cannot fail");
        self.zero_fill -= size;
        self.data_size += size;
    }

    /// Moves the segment (and every contained section's address) so its
    /// base becomes `new_base`, preserving each section's offset from the
    /// old base. Used by `SetCurrentAddress` when it appears in a
    /// segment's post-actions, enabling negative-base layouts.
    pub fn set_start_address(&mut self, arena: &mut [Section], new_base: u64, diagnostics: &dyn Diagnostics) {
        let delta = new_base as i64 - self.base_address as i64;
        self.shift_address(arena, delta, diagnostics);
    }

    /// Shifts every contained section's address by `delta` and moves the
    /// segment's base address by the same amount.
    pub fn shift_address(&mut self, arena: &mut [Section], delta: i64, diagnostics: &dyn Diagnostics) {
        self.base_address = (self.base_address as i64 + delta) as u64;
        for &id in &self.sections {
            if let Some(address) = arena[id.0].address() {
                let shifted = (address as i64 + delta) as u64;
                arena[id.0].force_address(shifted, diagnostics);
            }
        }
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    let remainder = value % align;
    if remainder == 0 {
        value
    } else {
        value + (align - remainder)
    }
}
