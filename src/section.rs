//! [`Section`]: the named, addressable blob an input format produces and a
//! [`crate::segment::Segment`] lays out.

use bitflags::bitflags;

use crate::byte_image::{self, Endian};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::location::SegmentId;

bitflags! {
    /// Attribute bits a [`Section`] carries. `CUSTOM_0`..`CUSTOM_7` are
    /// free for a [`crate::format_driver::FormatDriver`] to attach
    /// format-specific meaning to (e.g. Amiga `.chip`/`.fast`, a Mac
    /// resource-fork protected bit) via
    /// `format_additional_section_flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u32 {
        const READABLE    = 1 << 0;
        const WRITABLE    = 1 << 1;
        const EXECUTABLE  = 1 << 2;
        /// Overlaid with same-`collection_name` sections of the same flag
        /// during module merge, instead of concatenated.
        const MERGEABLE   = 1 << 3;
        /// Stores no bytes; only an extent. See [`Section::set_zero_filled`].
        const ZERO_FILLED = 1 << 4;
        /// Has a fixed address rather than an alignment requirement.
        const FIXED       = 1 << 5;
        const RESOURCE    = 1 << 6;
        /// The driver may drop this section entirely if nothing references it.
        const OPTIONAL    = 1 << 7;
        const STACK       = 1 << 8;
        const HEAP        = 1 << 9;
        const CUSTOM_0 = 1 << 16;
        const CUSTOM_1 = 1 << 17;
        const CUSTOM_2 = 1 << 18;
        const CUSTOM_3 = 1 << 19;
        const CUSTOM_4 = 1 << 20;
        const CUSTOM_5 = 1 << 21;
        const CUSTOM_6 = 1 << 22;
        const CUSTOM_7 = 1 << 23;
    }
}

/// A resource type/id tag, meaningful only when [`SectionFlags::RESOURCE`]
/// is set (Classic Mac OS resource forks, Windows NE/LE resources).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Numeric(u16),
    Named(String),
}

/// Whether a section's placement is pinned (`Fixed`) or merely constrained
/// to a power-of-two boundary (`Align`). Mutually exclusive, matching the
/// "never both" invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Align(u64),
    Fixed(u64),
}

/// A named, addressable blob of bytes (or a zero extent) with flags,
/// alignment/address, bias, and optional resource identity.
#[derive(Debug, Clone)]
pub struct Section {
    name: String,
    flags: SectionFlags,
    placement: Placement,
    /// Offset between this section's data origin and its segment base.
    bias: i64,
    size_in_memory: u64,
    data: Option<Vec<u8>>,
    resource_type: Option<ResourceId>,
    resource_id: Option<ResourceId>,
    segment: Option<SegmentId>,
    collection_name: Option<String>,
}

impl Section {
    /// Creates a new, empty, not-yet-addressed section with alignment 1.
    pub fn new(name: impl Into<String>) -> Self {
        Section {
            name: name.into(),
            flags: SectionFlags::READABLE,
            placement: Placement::Align(1),
            bias: 0,
            size_in_memory: 0,
            data: Some(Vec::new()),
            resource_type: None,
            resource_id: None,
            segment: None,
            collection_name: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> SectionFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: SectionFlags) {
        self.flags = flags;
    }

    pub fn add_flags(&mut self, flags: SectionFlags) {
        self.flags.insert(flags);
    }

    pub fn is_zero_filled(&self) -> bool {
        self.flags.contains(SectionFlags::ZERO_FILLED)
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.placement, Placement::Fixed(_))
    }

    pub fn size(&self) -> u64 {
        self.size_in_memory
    }

    pub fn align(&self) -> u64 {
        match self.placement {
            Placement::Align(a) => a,
            Placement::Fixed(_) => 1,
        }
    }

    pub fn address(&self) -> Option<u64> {
        match self.placement {
            Placement::Fixed(a) => Some(a),
            Placement::Align(_) => None,
        }
    }

    pub fn bias(&self) -> i64 {
        self.bias
    }

    pub fn set_bias(&mut self, bias: i64) {
        self.bias = bias;
    }

    pub fn segment(&self) -> Option<SegmentId> {
        self.segment
    }

    pub fn set_segment(&mut self, segment: SegmentId) {
        self.segment = Some(segment);
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.collection_name.as_deref()
    }

    pub fn set_collection_name(&mut self, name: impl Into<String>) {
        self.collection_name = Some(name.into());
    }

    pub fn resource_type(&self) -> Option<&ResourceId> {
        self.resource_type.as_ref()
    }

    pub fn resource_id(&self) -> Option<&ResourceId> {
        self.resource_id.as_ref()
    }

    pub fn set_resource(&mut self, resource_type: ResourceId, resource_id: ResourceId) {
        self.flags.insert(SectionFlags::RESOURCE);
        self.resource_type = Some(resource_type);
        self.resource_id = Some(resource_id);
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Flips the ZeroFilled flag. Setting it requires the section be
    /// currently empty with no bytes written; clearing it materialises
    /// `size` zero bytes.
    pub fn set_zero_filled(&mut self, zero_filled: bool) -> Result<()> {
        if zero_filled == self.is_zero_filled() {
            return Ok(());
        }
        if zero_filled {
            if self.size_in_memory != 0 || self.data.as_ref().is_some_and(|d| !d.is_empty()) {
                return Err(Error::Internal(format!(
                    "cannot mark section '{}' zero-filled: it already has data",
                    self.name
                )));
            }
            self.flags.insert(SectionFlags::ZERO_FILLED);
            self.data = None;
        } else {
            self.flags.remove(SectionFlags::ZERO_FILLED);
            self.data = Some(vec![0u8; self.size_in_memory as usize]);
        }
        Ok(())
    }

    /// Raises this section's alignment requirement to `n` (must be a power
    /// of two). If the section is already Fixed and its address is not a
    /// multiple of `n`, this is an error rather than a silent realignment.
    pub fn set_align(&mut self, n: u64) -> Result<()> {
        if n == 0 || !n.is_power_of_two() {
            return Err(Error::Internal(format!(
                "alignment {n} is not a power of two"
            )));
        }
        match self.placement {
            Placement::Fixed(address) => {
                if address % n != 0 {
                    return Err(Error::ScriptEval(format!(
                        "section '{}' fixed at {address:#x} is not aligned to {n}",
                        self.name
                    )));
                }
                Ok(())
            }
            Placement::Align(current) => {
                self.placement = Placement::Align(current.max(n));
                Ok(())
            }
        }
    }

    /// Pins this section's address, rounded up to its current alignment.
    /// Calling this again on an already-Fixed section with a different
    /// address warns and leaves the address unchanged (the original's
    /// "first writer wins" rule).
    pub fn set_address(&mut self, address: u64, diagnostics: &dyn Diagnostics) {
        let align = self.align();
        let rounded = align_up(address, align);
        match self.placement {
            Placement::Fixed(existing) if existing != rounded => {
                diagnostics.warn(&format!(
                    "section '{}' address already fixed at {existing:#x}, ignoring new address {rounded:#x}",
                    self.name
                ));
            }
            Placement::Fixed(_) => {}
            Placement::Align(_) => {
                self.placement = Placement::Fixed(rounded);
            }
        }
    }

    /// Unconditionally pins this section's address, bypassing the
    /// already-Fixed warning. Used when a containing
    /// [`crate::segment::Segment`] retroactively shifts its base address;
    /// the address is known-good because it was derived from an address
    /// this section already held.
    pub fn force_address(&mut self, address: u64, _diagnostics: &dyn Diagnostics) {
        self.placement = Placement::Fixed(address);
    }

    /// Grows `size` to `new_size` if larger, appending zero bytes for
    /// non-ZeroFilled sections. This crate does not subclass `Section`, so
    /// the "subtract existing extra storage" formula the original reserves
    /// for subclasses collapses to a plain resize (see `DESIGN.md`).
    pub fn expand(&mut self, new_size: u64) {
        if new_size <= self.size_in_memory {
            return;
        }
        self.size_in_memory = new_size;
        if let Some(data) = &mut self.data {
            data.resize(new_size as usize, 0);
        }
    }

    /// Pads the section's end up to a multiple of `n`.
    pub fn realign_end(&mut self, n: u64) {
        if n <= 1 {
            return;
        }
        let padded = align_up(self.size_in_memory, n);
        self.expand(padded);
    }

    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// count actually read. Reading past a ZeroFilled section's logical
    /// bytes (all of it) yields zeros; reading past the end of a concrete
    /// section's data yields nothing beyond what exists.
    pub fn read_data(&self, offset: u64, buf: &mut [u8]) -> usize {
        let offset = offset as usize;
        if offset >= self.size_in_memory as usize {
            return 0;
        }
        let available = self.size_in_memory as usize - offset;
        let count = buf.len().min(available);
        match &self.data {
            Some(data) => {
                let source_available = data.len().saturating_sub(offset).min(count);
                buf[..source_available].copy_from_slice(&data[offset..offset + source_available]);
                for b in &mut buf[source_available..count] {
                    *b = 0;
                }
            }
            None => {
                for b in &mut buf[..count] {
                    *b = 0;
                }
            }
        }
        count
    }

    /// Writes an integer of `bytes` width at `offset`, auto-expanding the
    /// section. Fails if the section is ZeroFilled and `value != 0`, since
    /// a ZeroFilled section stores no bytes to write into.
    pub fn write_word(&mut self, bytes: usize, offset: u64, value: u64, endian: Endian) -> Result<()> {
        if self.is_zero_filled() && value != 0 {
            return Err(Error::Internal(format!(
                "cannot write non-zero value into zero-filled section '{}'",
                self.name
            )));
        }
        if self.is_zero_filled() {
            self.expand(offset + bytes as u64);
            return Ok(());
        }
        let end = offset + bytes as u64;
        self.expand(end);
        let data = self.data.get_or_insert_with(Vec::new);
        if data.len() < end as usize {
            data.resize(end as usize, 0);
        }
        byte_image::write_unsigned(data, offset as usize, bytes, value, endian);
        Ok(())
    }

    /// Concatenates `other`'s bytes onto the end of `self` (after
    /// realigning `self`'s end to `other`'s alignment), returning the
    /// offset at which `other`'s content now starts. `other` must not be
    /// Fixed, and the two sections' Mergeable flags must match.
    pub fn append(&mut self, other: &Section) -> Result<u64> {
        if other.is_fixed() {
            return Err(Error::Internal(format!(
                "cannot append fixed section '{}' onto '{}'",
                other.name, self.name
            )));
        }
        if self.flags.contains(SectionFlags::MERGEABLE) != other.flags.contains(SectionFlags::MERGEABLE) {
            return Err(Error::Internal(format!(
                "mergeable-flag mismatch appending '{}' onto '{}'",
                other.name, self.name
            )));
        }
        self.realign_end(other.align());
        let offset = self.size_in_memory;

        if other.is_zero_filled() {
            self.expand(offset + other.size_in_memory);
            return Ok(offset);
        }

        if self.is_zero_filled() {
            self.set_zero_filled(false)?;
        }
        self.expand(offset + other.size_in_memory);
        if let (Some(data), Some(other_data)) = (&mut self.data, &other.data) {
            let end = (offset as usize + other_data.len()).min(data.len());
            data[offset as usize..end].copy_from_slice(&other_data[..end - offset as usize]);
        }
        Ok(offset)
    }

    /// Overlays `other` onto `self` in place, per the Mergeable/
    /// `collection_name` semantics of §4.2: the result's length is the
    /// maximum of the two, and every byte both sections define must agree —
    /// a mismatch is a defensive error rather than a silent last-write-wins.
    /// Returns the offset `other`'s content now lives at, always 0 since an
    /// overlay shares `self`'s base rather than being concatenated after it.
    pub fn overlay(&mut self, other: &Section) -> Result<u64> {
        if other.is_fixed() {
            return Err(Error::Internal(format!(
                "cannot overlay fixed section '{}' onto '{}'",
                other.name, self.name
            )));
        }
        let overlap = self.size_in_memory.min(other.size_in_memory);
        for offset in 0..overlap {
            let mut mine = [0u8; 1];
            let mut theirs = [0u8; 1];
            self.read_data(offset, &mut mine);
            other.read_data(offset, &mut theirs);
            if mine != theirs {
                return Err(Error::Internal(format!(
                    "overlaying '{}' onto '{}': byte {offset:#x} disagrees ({:#04x} vs {:#04x})",
                    other.name, self.name, mine[0], theirs[0]
                )));
            }
        }

        let new_size = self.size_in_memory.max(other.size_in_memory);
        if new_size <= self.size_in_memory {
            return Ok(0);
        }
        if self.is_zero_filled() && other.is_zero_filled() {
            self.expand(new_size);
            return Ok(0);
        }
        if self.is_zero_filled() {
            self.set_zero_filled(false)?;
        }
        self.expand(new_size);
        if let Some(other_data) = &other.data {
            let data = self.data.get_or_insert_with(Vec::new);
            if data.len() < new_size as usize {
                data.resize(new_size as usize, 0);
            }
            let start = overlap as usize;
            let end = other_data.len().min(new_size as usize);
            if end > start {
                data[start..end].copy_from_slice(&other_data[start..end]);
            }
        }
        Ok(0)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullDiagnostics;

    #[test]
    fn zero_filled_round_trip_requires_empty() {
        let mut section = Section::new(".bss");
        assert!(section.set_zero_filled(true).is_ok());
        section.expand(16);
        assert_eq!(section.size(), 16);
        assert!(section.data().is_none());

        section.set_zero_filled(false).unwrap();
        assert_eq!(section.data().unwrap().len(), 16);
        assert!(section.data().unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn set_zero_filled_true_rejects_nonempty() {
        let mut section = Section::new(".data");
        section.write_word(1, 0, 0xFF, Endian::Little).unwrap();
        assert!(section.set_zero_filled(true).is_err());
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut section = Section::new(".text");
        section.write_word(4, 0, 0xDEAD_BEEF, Endian::Little).unwrap();
        let mut buf = [0u8; 4];
        let n = section.read_data(0, &mut buf);
        assert_eq!(n, 4);
        assert_eq!(
            byte_image::read_unsigned(&buf, 0, 4, Endian::Little),
            0xDEAD_BEEF
        );
    }

    #[test]
    fn set_address_on_fixed_with_different_value_warns_and_keeps_first() {
        let mut section = Section::new(".text");
        let diagnostics = crate::diagnostics::CollectingDiagnostics::default();
        section.set_address(0x100, &diagnostics);
        section.set_address(0x200, &diagnostics);
        assert_eq!(section.address(), Some(0x100));
        assert_eq!(diagnostics.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn set_align_on_fixed_misaligned_errors() {
        let mut section = Section::new(".text");
        section.set_address(0x101, &NullDiagnostics);
        assert!(section.set_align(4).is_err());
    }

    #[test]
    fn append_concatenates_and_returns_offset() {
        let mut a = Section::new(".text");
        a.write_word(2, 0, 0x1111, Endian::Little).unwrap();
        let mut b = Section::new(".text");
        b.write_word(2, 0, 0x2222, Endian::Little).unwrap();

        let offset = a.append(&b).unwrap();
        assert_eq!(offset, 2);
        assert_eq!(a.size(), 4);
        let mut buf = [0u8; 2];
        a.read_data(2, &mut buf);
        assert_eq!(byte_image::read_unsigned(&buf, 0, 2, Endian::Little), 0x2222);
    }

    #[test]
    fn overlay_grows_to_max_length_and_keeps_agreeing_bytes() {
        let mut a = Section::new(".comm");
        a.add_flags(SectionFlags::MERGEABLE);
        a.set_collection_name("group1");
        a.write_word(2, 0, 0x1234, Endian::Little).unwrap();
        a.expand(4);

        let mut b = Section::new(".comm");
        b.add_flags(SectionFlags::MERGEABLE);
        b.set_collection_name("group1");
        b.write_word(2, 0, 0x1234, Endian::Little).unwrap();
        b.expand(6);

        let offset = a.overlay(&b).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(a.size(), 6);
        let mut buf = [0u8; 2];
        a.read_data(0, &mut buf);
        assert_eq!(byte_image::read_unsigned(&buf, 0, 2, Endian::Little), 0x1234);
    }

    #[test]
    fn overlay_rejects_disagreeing_bytes() {
        let mut a = Section::new(".comm");
        a.set_collection_name("group1");
        a.write_word(2, 0, 0x1111, Endian::Little).unwrap();

        let mut b = Section::new(".comm");
        b.set_collection_name("group1");
        b.write_word(2, 0, 0x2222, Endian::Little).unwrap();

        assert!(a.overlay(&b).is_err());
    }

    #[test]
    fn appending_zero_filled_onto_data_materialises_predecessor() {
        let mut a = Section::new(".data");
        a.write_word(1, 0, 1, Endian::Little).unwrap();
        let mut zero = Section::new(".bss");
        zero.set_zero_filled(true).unwrap();
        zero.expand(4);

        let offset = a.append(&zero).unwrap();
        assert_eq!(offset, 1);
        assert_eq!(a.size(), 5);
        assert!(a.data().is_some());
    }
}
