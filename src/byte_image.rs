//! Endian-aware primitives for reading and writing fixed-width integers.
//!
//! Historical CPUs disagree about more than little vs. big endian: the
//! PDP-11 stores 32-bit values as two little-endian 16-bit halves in
//! big-to-little half order (word-swapped, byte order `2 1 4 3`), and at
//! least one toolchain in the wild does the mirror image of that
//! (`3 4 1 2`, referred to here as anti-PDP-11). [`Endian`] keeps all five
//! modes distinguishable so a [`crate::relocation::Relocation`] can carry
//! whichever one its source format needs.

use core::fmt;

/// Byte order used to read or write a multi-byte integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
    /// PDP-11 "middle" endian: 32-bit words stored as two 16-bit
    /// little-endian halves, high half first (byte order 2143).
    Pdp11,
    /// The mirror image of [`Endian::Pdp11`] (byte order 3412), seen in a
    /// handful of cross toolchains.
    AntiPdp11,
    /// Byte order does not matter for this value (e.g. a single byte, or a
    /// value whose bytes are always zero). Reads/writes as little-endian.
    Undefined,
}

impl Default for Endian {
    fn default() -> Self {
        Endian::Undefined
    }
}

impl From<Endian> for scroll::Endian {
    /// PDP-11 orders have no `scroll::Endian` equivalent; callers needing
    /// scroll's derive-based (de)serialization for those must fall back to
    /// [`read_unsigned`]/[`write_unsigned`] directly.
    fn from(endian: Endian) -> Self {
        match endian {
            Endian::Big => scroll::BE,
            _ => scroll::LE,
        }
    }
}

fn pdp11_word_order(bytes: usize) -> Option<&'static [usize]> {
    // Index `i` gives the byte-stream position of output byte `i`,
    // assuming the in-memory order is little-endian 16-bit halves.
    match bytes {
        1 => Some(&[0]),
        2 => Some(&[0, 1]),
        4 => Some(&[2, 3, 0, 1]),
        _ => None,
    }
}

fn anti_pdp11_word_order(bytes: usize) -> Option<&'static [usize]> {
    match bytes {
        1 => Some(&[0]),
        2 => Some(&[0, 1]),
        4 => Some(&[1, 0, 3, 2]),
        _ => None,
    }
}

/// Reads an unsigned integer of `bytes` bytes (1, 2, 4, or 8; PDP-11 orders
/// support only 1, 2, and 4) out of `data` starting at `offset`.
pub fn read_unsigned(data: &[u8], offset: usize, bytes: usize, endian: Endian) -> u64 {
    match endian {
        Endian::Little | Endian::Big | Endian::Undefined => {
            use scroll::Pread;
            let ctx: scroll::Endian = endian.into();
            match bytes {
                1 => data.pread_with::<u8>(offset, ctx).expect("read_unsigned: out of bounds") as u64,
                2 => data.pread_with::<u16>(offset, ctx).expect("read_unsigned: out of bounds") as u64,
                4 => data.pread_with::<u32>(offset, ctx).expect("read_unsigned: out of bounds") as u64,
                8 => data.pread_with::<u64>(offset, ctx).expect("read_unsigned: out of bounds"),
                other => panic!("read_unsigned only supports 1, 2, 4, or 8 byte reads, got {other}"),
            }
        }
        Endian::Pdp11 => {
            let slice = &data[offset..offset + bytes];
            let order = pdp11_word_order(bytes)
                .unwrap_or_else(|| panic!("PDP-11 endian only supports 1, 2, or 4 byte reads, got {bytes}"));
            let mut value: u64 = 0;
            for (i, &src) in order.iter().enumerate() {
                value |= (slice[src] as u64) << (8 * i);
            }
            value
        }
        Endian::AntiPdp11 => {
            let slice = &data[offset..offset + bytes];
            let order = anti_pdp11_word_order(bytes)
                .unwrap_or_else(|| panic!("anti-PDP-11 endian only supports 1, 2, or 4 byte reads, got {bytes}"));
            let mut value: u64 = 0;
            for (i, &src) in order.iter().enumerate() {
                value |= (slice[src] as u64) << (8 * i);
            }
            value
        }
    }
}

/// Reads a signed integer of `bytes` bytes, sign-extending from the top bit
/// of the `bytes`-byte value.
pub fn read_signed(data: &[u8], offset: usize, bytes: usize, endian: Endian) -> i64 {
    let value = read_unsigned(data, offset, bytes, endian);
    let bits = bytes as u32 * 8;
    if bits >= 64 {
        value as i64
    } else {
        let sign_bit = 1u64 << (bits - 1);
        ((value ^ sign_bit).wrapping_sub(sign_bit)) as i64
    }
}

/// Writes `value`'s low `bytes` bytes into `data` at `offset`, in `endian`
/// order. `data` must already be large enough.
pub fn write_unsigned(data: &mut [u8], offset: usize, bytes: usize, value: u64, endian: Endian) {
    match endian {
        Endian::Little | Endian::Big | Endian::Undefined => {
            use scroll::Pwrite;
            let ctx: scroll::Endian = endian.into();
            match bytes {
                1 => data.pwrite_with::<u8>(value as u8, offset, ctx),
                2 => data.pwrite_with::<u16>(value as u16, offset, ctx),
                4 => data.pwrite_with::<u32>(value as u32, offset, ctx),
                8 => data.pwrite_with::<u64>(value, offset, ctx),
                other => panic!("write_unsigned only supports 1, 2, 4, or 8 byte writes, got {other}"),
            }
            .expect("write_unsigned: out of bounds");
        }
        Endian::Pdp11 => {
            let slice = &mut data[offset..offset + bytes];
            let order = pdp11_word_order(bytes)
                .unwrap_or_else(|| panic!("PDP-11 endian only supports 1, 2, or 4 byte writes, got {bytes}"));
            for (i, &dst) in order.iter().enumerate() {
                slice[dst] = (value >> (8 * i)) as u8;
            }
        }
        Endian::AntiPdp11 => {
            let slice = &mut data[offset..offset + bytes];
            let order = anti_pdp11_word_order(bytes)
                .unwrap_or_else(|| panic!("anti-PDP-11 endian only supports 1, 2, or 4 byte writes, got {bytes}"));
            for (i, &dst) in order.iter().enumerate() {
                slice[dst] = (value >> (8 * i)) as u8;
            }
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Endian::Little => "little",
            Endian::Big => "big",
            Endian::Pdp11 => "pdp11",
            Endian::AntiPdp11 => "anti-pdp11",
            Endian::Undefined => "undefined",
        };
        f.write_str(s)
    }
}

/// A growable, randomly writable byte image, the backing store for
/// [`crate::section::Section`] data and for format drivers serializing
/// their final output.
///
/// This mirrors the original's `Buffer`/`Image` pair, collapsed into one
/// concrete type since Rust has no need for the virtual-dispatch split the
/// C++ hierarchy used it for (see the "deep inheritance" design note).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ByteImage {
    data: Vec<u8>,
}

impl ByteImage {
    pub fn new() -> Self {
        ByteImage { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteImage {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        ByteImage { data }
    }

    pub fn image_size(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn resize(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
    }

    pub fn read_unsigned(&self, bytes: usize, offset: usize, endian: Endian) -> u64 {
        read_unsigned(&self.data, offset, bytes, endian)
    }

    pub fn read_signed(&self, bytes: usize, offset: usize, endian: Endian) -> i64 {
        read_signed(&self.data, offset, bytes, endian)
    }

    pub fn write_word(&mut self, bytes: usize, offset: usize, value: u64, endian: Endian) {
        if offset + bytes > self.data.len() {
            self.data.resize(offset + bytes, 0);
        }
        write_unsigned(&mut self.data, offset, bytes, value, endian);
    }

    /// Writes `count` bytes starting at `offset` to `writer`.
    pub fn write_to<W: std::io::Write>(
        &self,
        writer: &mut W,
        count: usize,
        offset: usize,
    ) -> std::io::Result<usize> {
        if offset >= self.data.len() {
            return Ok(0);
        }
        let available = self.data.len() - offset;
        let count = count.min(available);
        writer.write_all(&self.data[offset..offset + count])?;
        Ok(count)
    }
}

impl From<Vec<u8>> for ByteImage {
    fn from(data: Vec<u8>) -> Self {
        ByteImage::from_vec(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_big_roundtrip() {
        for endian in [Endian::Little, Endian::Big] {
            for bytes in [1usize, 2, 4, 8] {
                let mut buf = vec![0u8; bytes];
                let value = 0x0102_0304_0506_0708u64 & ((1u128 << (8 * bytes)) - 1) as u64;
                write_unsigned(&mut buf, 0, bytes, value, endian);
                assert_eq!(read_unsigned(&buf, 0, bytes, endian), value);
            }
        }
    }

    #[test]
    fn pdp11_roundtrip_32_bit() {
        let value = 0x1234_5678u64;
        let mut buf = vec![0u8; 4];
        write_unsigned(&mut buf, 0, 4, value, Endian::Pdp11);
        // high 16-bit half (0x1234) comes first, each half little-endian.
        assert_eq!(buf, vec![0x34, 0x12, 0x78, 0x56]);
        assert_eq!(read_unsigned(&buf, 0, 4, Endian::Pdp11), value);
    }

    #[test]
    fn anti_pdp11_roundtrip_32_bit() {
        let value = 0x1234_5678u64;
        let mut buf = vec![0u8; 4];
        write_unsigned(&mut buf, 0, 4, value, Endian::AntiPdp11);
        assert_eq!(read_unsigned(&buf, 0, 4, Endian::AntiPdp11), value);
    }

    #[test]
    fn signed_sign_extends_from_top_bit() {
        let mut buf = [0u8; 1];
        write_unsigned(&mut buf, 0, 1, 0xFF, Endian::Little);
        assert_eq!(read_signed(&buf, 0, 1, Endian::Little), -1);
    }

    #[test]
    fn byte_image_write_to_then_read_matches() {
        let mut image = ByteImage::new();
        image.write_word(4, 0, 0xDEAD_BEEF, Endian::Little);
        let mut out = Vec::new();
        let written = image.write_to(&mut out, image.image_size(), 0).unwrap();
        assert_eq!(written, 4);
        assert_eq!(read_unsigned(&out, 0, 4, Endian::Little), 0xDEAD_BEEF);
    }
}
