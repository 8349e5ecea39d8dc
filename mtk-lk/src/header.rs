use std::fmt;

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::little_endian::U32,
};

/// Errors when reading an LK partition header.
#[derive(Debug, snafu::Snafu)]
#[non_exhaustive]
pub enum ReadError {
    #[snafu(display("fewer than {HEADER_LEN} bytes remain at the header position"))]
    TooSmall,
    #[snafu(display("invalid LK header magic 0x{magic:08X}"))]
    InvalidMagic { magic: u32 },
}

type Result<T, E = ReadError> = std::result::Result<T, E>;

/// Magic identifying a valid partition header.
pub const LK_MAGIC: u32 = 0x58881688;

/// Magic at offset 0x30 identifying the extended header layout.
pub const EXT_MAGIC: u32 = 0x58891689;

/// On-disk size of a partition header, both legacy and extended.
pub const HEADER_LEN: usize = 512;

/// Legacy headers carry no alignment field; regions are 8-byte aligned.
pub const LEGACY_ALIGNMENT: u32 = 8;

#[derive(Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct LkHeaderRaw {
    pub magic: U32,              // 0x000 - 0x58881688
    pub dsize: U32,              // 0x004 - data size, low word
    pub name: PartitionName,     // 0x008 - NUL-padded partition name (32 bytes)
    pub maddr: U32,              // 0x028 - load address, low word
    pub mode: U32,               // 0x02C - addressing mode
    pub ext_magic: U32,          // 0x030 - 0x58891689 when extended
    pub hdr_size: U32,           // 0x034 - header size (extended only)
    pub hdr_version: U32,        // 0x038 - header version
    pub image_type: U32,         // 0x03C - image group/id
    pub image_list_end: U32,     // 0x040 - 1 if last partition in the image
    pub alignment: U32,          // 0x044 - region alignment (extended only)
    pub dsize_extend: U32,       // 0x048 - data size, high word (extended only)
    pub maddr_extend: U32,       // 0x04C - load address, high word (extended only)
    pub reserved: [u8; 0x1B0],   // 0x050 - reserved, preserved verbatim
                                 // 0x200 - end of header
}

/// Fixed-width partition name (32 bytes, NUL-padded ASCII).
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    FromBytes,
    IntoBytes,
    KnownLayout,
    Immutable,
    Unaligned,
)]
#[repr(C)]
pub struct PartitionName([u8; 32]);

impl PartitionName {
    /// Returns the name with NUL padding stripped.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let bytes = &self.0;
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..len]).unwrap_or("<invalid>")
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionName({:?})", self.as_str())
    }
}

/// Returns a human-readable name for an addressing mode value.
///
/// The mode is stored as a signed value: -1 selects normal addressing and 0
/// selects backward addressing.
#[must_use]
pub const fn addressing_mode_name(mode: u32) -> &'static str {
    match mode as i32 {
        -1 => "Normal",
        0 => "Backward",
        _ => "Unknown",
    }
}

/// Parsed LK partition header.
///
/// Wraps the raw 512-byte on-disk record. All auxiliary fields are kept
/// verbatim so [`LkHeader::as_bytes()`] is the exact inverse of
/// [`LkHeader::read()`].
#[derive(Debug, Clone)]
#[must_use]
pub struct LkHeader {
    raw_header: LkHeaderRaw,
}

impl LkHeader {
    /// Parses a partition header from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than [`HEADER_LEN`] bytes are available or
    /// the magic number is wrong.
    pub fn read(raw: &[u8]) -> Result<Self> {
        // The only way the prefix read can fail is a short buffer.
        snafu::ensure!(raw.len() >= HEADER_LEN, TooSmallSnafu);

        let (raw_header, _) =
            LkHeaderRaw::read_from_prefix(raw).map_err(|_| TooSmallSnafu.build())?;

        let magic = raw_header.magic.get();
        snafu::ensure!(magic == LK_MAGIC, InvalidMagicSnafu { magic });

        Ok(Self { raw_header })
    }

    /// Returns the partition name.
    pub fn name(&self) -> &PartitionName {
        &self.raw_header.name
    }

    /// Returns `true` if the header uses the extended layout.
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        self.raw_header.ext_magic.get() == EXT_MAGIC
    }

    /// Returns the declared payload size in bytes.
    ///
    /// Extended headers carry a 64-bit size split across two words; legacy
    /// headers only have the low word.
    #[must_use]
    pub const fn data_size(&self) -> u64 {
        let lo = self.raw_header.dsize.get() as u64;
        if self.is_extended() {
            ((self.raw_header.dsize_extend.get() as u64) << 32) | lo
        } else {
            lo
        }
    }

    /// Returns the on-disk size of this header.
    ///
    /// Legacy headers are always [`HEADER_LEN`] bytes; extended headers
    /// declare their own size.
    #[must_use]
    pub const fn header_size(&self) -> usize {
        if self.is_extended() {
            self.raw_header.hdr_size.get() as usize
        } else {
            HEADER_LEN
        }
    }

    /// Returns the region alignment. Zero means unaligned.
    #[must_use]
    pub const fn alignment(&self) -> u32 {
        if self.is_extended() {
            self.raw_header.alignment.get()
        } else {
            LEGACY_ALIGNMENT
        }
    }

    /// Returns the memory (load) address of the partition.
    #[must_use]
    pub const fn memory_address(&self) -> u64 {
        let lo = self.raw_header.maddr.get() as u64;
        if self.is_extended() {
            ((self.raw_header.maddr_extend.get() as u64) << 32) | lo
        } else {
            lo
        }
    }

    /// Returns the addressing mode.
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.raw_header.mode.get()
    }

    /// Returns the human-readable name for the addressing mode.
    #[must_use]
    pub const fn mode_name(&self) -> &'static str {
        addressing_mode_name(self.mode())
    }

    /// Returns the header version (extended headers only, opaque otherwise).
    #[must_use]
    pub const fn header_version(&self) -> u32 {
        self.raw_header.hdr_version.get()
    }

    /// Returns the raw image type word.
    #[must_use]
    pub const fn image_type(&self) -> u32 {
        self.raw_header.image_type.get()
    }

    /// Returns `true` if this header marks the end of the partition list.
    ///
    /// Only meaningful on extended headers; legacy images end at the first
    /// region without a valid magic instead.
    #[must_use]
    pub const fn is_image_list_end(&self) -> bool {
        self.is_extended() && self.raw_header.image_list_end.get() == 1
    }

    /// Returns the exact on-disk representation of this header.
    ///
    /// This is the full 512-byte record; callers emitting an extended header
    /// with a smaller declared size truncate it to [`Self::header_size()`].
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.raw_header.as_bytes()
    }
}

impl fmt::Display for LkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Partition Name  : {}", self.name())?;
        writeln!(f, "Data Size       : {} bytes", self.data_size())?;
        writeln!(f, "Addressing Mode : 0x{:08X} ({})", self.mode(), self.mode_name())?;
        write!(f, "Memory Address  : 0x{:08X}", self.memory_address())?;
        if self.is_extended() {
            writeln!(f)?;
            writeln!(f, "Header Size     : {} bytes", self.header_size())?;
            writeln!(f, "Header Version  : {}", self.header_version())?;
            writeln!(f, "Image Type      : 0x{:08X}", self.image_type())?;
            writeln!(f, "Image List End  : {}", self.is_image_list_end())?;
            write!(f, "Alignment       : {} bytes", self.alignment())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_header_bytes(name: &str, data_size: u32) -> Vec<u8> {
        let mut raw = vec![0u8; HEADER_LEN];
        raw[0x00..0x04].copy_from_slice(&LK_MAGIC.to_le_bytes());
        raw[0x04..0x08].copy_from_slice(&data_size.to_le_bytes());
        raw[0x08..0x08 + name.len()].copy_from_slice(name.as_bytes());
        raw[0x28..0x2C].copy_from_slice(&0x4800_0000u32.to_le_bytes());
        raw[0x2C..0x30].copy_from_slice(&u32::MAX.to_le_bytes());
        raw
    }

    #[test]
    fn read_legacy_header() {
        let raw = legacy_header_bytes("lk", 0x2000);
        let header = LkHeader::read(&raw).unwrap();

        assert_eq!(header.name().as_str(), "lk");
        assert_eq!(header.data_size(), 0x2000);
        assert_eq!(header.memory_address(), 0x4800_0000);
        assert_eq!(header.mode_name(), "Normal");
        assert!(!header.is_extended());
        assert_eq!(header.header_size(), HEADER_LEN);
        assert_eq!(header.alignment(), LEGACY_ALIGNMENT);
        assert!(!header.is_image_list_end());
    }

    #[test]
    fn read_extended_header() {
        let mut raw = legacy_header_bytes("bl2_ext", 0x100);
        raw[0x30..0x34].copy_from_slice(&EXT_MAGIC.to_le_bytes());
        raw[0x34..0x38].copy_from_slice(&512u32.to_le_bytes());
        raw[0x38..0x3C].copy_from_slice(&1u32.to_le_bytes());
        raw[0x40..0x44].copy_from_slice(&1u32.to_le_bytes());
        raw[0x44..0x48].copy_from_slice(&16u32.to_le_bytes());
        raw[0x48..0x4C].copy_from_slice(&1u32.to_le_bytes());

        let header = LkHeader::read(&raw).unwrap();
        assert!(header.is_extended());
        assert_eq!(header.data_size(), 0x1_0000_0100);
        assert_eq!(header.alignment(), 16);
        assert!(header.is_image_list_end());
    }

    #[test]
    fn round_trips_verbatim() {
        let mut raw = legacy_header_bytes("boot", 6);
        // Reserved tail must survive decode/encode untouched.
        raw[0x1FF] = 0xA5;
        raw[0x50] = 0x5A;

        let header = LkHeader::read(&raw).unwrap();
        assert_eq!(header.as_bytes(), &raw[..]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut raw = legacy_header_bytes("lk", 16);
        raw[0] ^= 0xFF;

        match LkHeader::read(&raw) {
            Err(ReadError::InvalidMagic { magic }) => assert_ne!(magic, LK_MAGIC),
            other => panic!("expected InvalidMagic, got {other:?}"),
        }
    }

    #[test]
    fn rejects_short_input() {
        let raw = legacy_header_bytes("lk", 16);
        assert!(matches!(
            LkHeader::read(&raw[..HEADER_LEN - 1]),
            Err(ReadError::TooSmall)
        ));
    }
}
