use std::fmt;

use crate::header::LkHeader;

/// One decoded partition: header, owned payload bytes, and its placement
/// within the source image.
///
/// A partition's payload may be rewritten in place through
/// [`data_mut()`](Self::data_mut) or the patch engine, but never resized: the
/// container has no way to move the regions that follow.
#[derive(Debug, Clone)]
#[must_use]
pub struct LkPartition {
    pub(crate) header: LkHeader,
    /// Header bytes past the fixed 512-byte record, for extended headers
    /// declaring a larger size. Usually empty.
    pub(crate) header_ext: Vec<u8>,
    pub(crate) data: Vec<u8>,
    pub(crate) offset: usize,
    pub(crate) padding: Vec<u8>,
}

impl LkPartition {
    /// Returns the partition header.
    pub fn header(&self) -> &LkHeader {
        &self.header
    }

    /// Returns the partition name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.header.name().as_str()
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a mutable view over the payload bytes.
    ///
    /// The view has a fixed length; only in-place rewrites are possible.
    #[must_use]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Returns the byte offset of this partition's header within the image.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the byte offset of this partition's payload within the image.
    #[must_use]
    pub const fn data_offset(&self) -> usize {
        self.offset + self.header.header_size()
    }

    /// Returns the offset one past this partition's region, including any
    /// alignment padding.
    #[must_use]
    pub fn end_offset(&self) -> usize {
        self.data_offset() + self.data.len() + self.padding.len()
    }

    /// Returns `true` if this partition holds a signing certificate
    /// (`cert1`, `cert1_md`, `cert2`, ...) for the partition preceding it.
    #[must_use]
    pub fn is_cert(&self) -> bool {
        self.name().starts_with("cert")
    }

    /// Re-emits this partition's on-disk region: header, payload, and the
    /// original alignment padding.
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        let header_bytes = self.header.as_bytes();
        let header_size = self.header.header_size();

        out.extend_from_slice(&header_bytes[..header_size.min(header_bytes.len())]);
        out.extend_from_slice(&self.header_ext);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.padding);
    }
}

impl fmt::Display for LkPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}
