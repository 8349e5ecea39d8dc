//! A library for parsing and patching MediaTek LK bootloader images.
//!
//! LK ("Little Kernel") images are flat containers holding a sequence of
//! named partitions (bootloader stages, device-tree blobs, logos), each a
//! fixed 512-byte header followed by its payload, packed back to back.
//!
//! This crate decodes such an image into an addressable set of partitions,
//! applies exact-length binary patches to partition payloads, and
//! re-serializes the result byte-identically except for the patched spans.
//!
//! # Features
//!
//! - Parse legacy and extended LK partition headers
//! - Look up partitions by name and iterate over them in offset order
//! - Apply exact byte-pattern search-and-replace patches with a uniqueness
//!   guarantee (an ambiguous pattern is rejected with every match site)
//! - Round-trip fidelity: an unmodified image serializes to the exact input
//!   bytes, padding included
//!
//! # Example
//!
//! ```no_run
//! use mtk_lk::{LkImage, Patch};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("lk.img")?;
//! let mut image = LkImage::parse(&bytes)?;
//!
//! for part in image.partitions() {
//!     println!("{} at 0x{:X}, {} bytes", part.name, part.offset, part.size);
//! }
//!
//! // Replace a function prologue with `return 0`.
//! let patch = Patch::from_hex("30b583b002ab", "002070470000")?;
//! let site = image.apply_patch(&patch)?;
//! println!("patched {site}");
//!
//! image.save("lk-patched.img")?;
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - <https://github.com/R0rt1z2/liblk>

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

use self::header::LkHeader;

pub mod header;
pub mod partition;
pub mod patch;

pub use self::partition::LkPartition;
pub use self::patch::{MatchSite, Patch, PatchError};

/// Magic at offset 0 of images carrying a bootrom preamble before the first
/// partition header.
const BFBF_MAGIC: &[u8] = b"BFBF";

/// Length of the bootrom preamble.
const BFBF_REGION_LEN: usize = 0x4040;

/// Errors when parsing an LK image.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ParseError {
    #[snafu(display("no LK partition header at image start"))]
    BadFirstHeader { source: header::ReadError },

    #[snafu(display(
        "partition '{name}' at offset 0x{offset:X} declares {expected} data bytes but only {available} remain"
    ))]
    TruncatedData {
        name: String,
        offset: usize,
        expected: u64,
        available: u64,
    },
}

/// Errors when looking up a partition by name.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum FindPartitionError {
    #[snafu(display("partition '{name}' not found"))]
    NotFound { name: String },
}

/// Errors when writing an image to disk.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum SaveError {
    #[snafu(display("cannot create {}", path.display()))]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot write to {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot flush {}", path.display()))]
    SyncFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A parsed LK image.
///
/// Owns the decoded partitions in on-disk offset order plus every byte that
/// belongs to no partition (the optional bootrom preamble and trailing
/// erase-block padding), so [`to_bytes()`](Self::to_bytes) can reproduce the
/// source buffer exactly.
#[derive(Debug, Clone)]
#[must_use]
pub struct LkImage {
    preamble: Vec<u8>,
    partitions: Vec<LkPartition>,
    trailing: Vec<u8>,
    total_size: usize,
}

impl LkImage {
    /// Parses an LK image from raw bytes.
    ///
    /// The partition table ends at the first region without a valid header:
    /// images are commonly padded to an erase-block size, and padding begins
    /// where the magic check first fails. Those bytes are kept as trailing
    /// padding, not reported as an error. A bad magic in the *first* region
    /// means the buffer is not an LK image at all and fails with
    /// [`ParseError::BadFirstHeader`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::TruncatedData`] if a valid header declares more
    /// payload bytes than the buffer holds.
    pub fn parse(raw: impl AsRef<[u8]>) -> Result<Self, ParseError> {
        let raw = raw.as_ref();

        let preamble_len = if raw.starts_with(BFBF_MAGIC) {
            BFBF_REGION_LEN
        } else {
            0
        };

        let mut partitions: Vec<LkPartition> = Vec::new();
        let mut offset = preamble_len;
        let mut trailing_start = raw.len();

        while offset < raw.len() {
            let lk_header = match LkHeader::read(&raw[offset..]) {
                Ok(header) => header,
                // End of the partition table; the remainder is padding.
                // The first region must decode or this is not an LK image.
                Err(_) if !partitions.is_empty() => {
                    trailing_start = offset;
                    break;
                }
                Err(source) => return Err(source).context(BadFirstHeaderSnafu),
            };

            let header_size = lk_header.header_size();
            let data_size = lk_header.data_size();

            // All offset math in u64: a corrupt extended header can declare
            // sizes that would overflow usize arithmetic on 32-bit targets.
            let data_start = offset as u64 + header_size as u64;
            let data_end = match data_start.checked_add(data_size) {
                Some(end) if end <= raw.len() as u64 => end,
                _ => {
                    return TruncatedDataSnafu {
                        name: lk_header.name().as_str().to_string(),
                        offset,
                        expected: data_size,
                        available: (raw.len() as u64).saturating_sub(data_start),
                    }
                    .fail();
                }
            };

            let header_ext = if header_size > header::HEADER_LEN {
                raw[offset + header::HEADER_LEN..data_start as usize].to_vec()
            } else {
                Vec::new()
            };

            let alignment = lk_header.alignment() as u64;
            let mut region_end = data_end;
            if alignment != 0 && region_end % alignment != 0 {
                region_end += alignment - region_end % alignment;
            }
            let region_end = (region_end as usize).min(raw.len());

            let is_list_end = lk_header.is_image_list_end();

            partitions.push(LkPartition {
                header: lk_header,
                header_ext,
                data: raw[data_start as usize..data_end as usize].to_vec(),
                offset,
                padding: raw[data_end as usize..region_end].to_vec(),
            });

            offset = region_end;

            if is_list_end {
                trailing_start = offset;
                break;
            }
        }

        // Nothing decoded means the buffer (or what is left of it after the
        // preamble) never had room for a first header.
        if partitions.is_empty() {
            return Err(header::ReadError::TooSmall).context(BadFirstHeaderSnafu);
        }

        Ok(Self {
            preamble: raw[..preamble_len].to_vec(),
            partitions,
            trailing: raw[trailing_start..].to_vec(),
            total_size: raw.len(),
        })
    }

    /// Returns the number of partitions in the image.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Returns the byte length of the original image.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.total_size
    }

    /// Returns the LK image version.
    ///
    /// Version 2 images carry an `aee` or `bl2_ext` partition; version 1
    /// images do not.
    #[must_use]
    pub fn version(&self) -> u32 {
        let v2 = self
            .partitions
            .iter()
            .any(|p| matches!(p.name(), "aee" | "bl2_ext"));
        if v2 { 2 } else { 1 }
    }

    /// Finds a partition by name.
    ///
    /// Names are unique by convention but not enforced; the first partition
    /// in offset order wins.
    pub fn find_partition(&self, name: &str) -> Result<&LkPartition, FindPartitionError> {
        self.partitions
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| NotFoundSnafu { name }.build())
    }

    /// Finds a partition by name, with mutable payload access.
    pub fn find_partition_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut LkPartition, FindPartitionError> {
        self.partitions
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| NotFoundSnafu { name }.build())
    }

    /// Returns the partition at `index` in offset order.
    #[must_use]
    pub fn partition(&self, index: usize) -> Option<&LkPartition> {
        self.partitions.get(index)
    }

    /// Returns an iterator over the full partitions in offset order.
    pub fn iter(&self) -> std::slice::Iter<'_, LkPartition> {
        self.partitions.iter()
    }

    /// Returns an iterator over partition summaries in offset order.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let bytes = std::fs::read("lk.img")?;
    /// let image = mtk_lk::LkImage::parse(&bytes)?;
    ///
    /// for part in image.partitions() {
    ///     println!("{:<16} {:>8} bytes at 0x{:X}", part.name, part.size, part.offset);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn partitions(&self) -> LkPartitions<'_> {
        LkPartitions {
            inner: self.partitions.iter(),
        }
    }

    /// Returns the certificate partitions immediately following the named
    /// partition (`cert1`/`cert2` regions signing its payload).
    pub fn certs_for<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a LkPartition> + use<'a> {
        let start = self
            .partitions
            .iter()
            .position(|p| p.name() == name)
            .map_or(self.partitions.len(), |i| i + 1);

        self.partitions[start..].iter().take_while(|p| p.is_cert())
    }

    /// Applies `patch` across the whole image.
    ///
    /// Every partition is scanned in offset order and the occurrence must be
    /// unique image-wide; on success the matched span is replaced in place
    /// and its site returned. Any failure leaves the image untouched.
    ///
    /// Note that re-applying the same patch fails with
    /// [`PatchError::NotFound`] since the bytes now equal the replacement;
    /// this is how an already-patched image is detected.
    pub fn apply_patch(&mut self, patch: &Patch) -> Result<MatchSite, PatchError> {
        self.apply_patch_impl(patch, None, None)
    }

    /// Applies `patch`, selecting the `index`-th occurrence (in image offset
    /// order) when the pattern matches more than once.
    pub fn apply_patch_at(&mut self, patch: &Patch, index: usize) -> Result<MatchSite, PatchError> {
        self.apply_patch_impl(patch, None, Some(index))
    }

    /// Applies `patch` within the named partition only.
    pub fn apply_patch_in(&mut self, name: &str, patch: &Patch) -> Result<MatchSite, PatchError> {
        self.apply_patch_impl(patch, Some(name), None)
    }

    /// Applies `patch` within the named partition, selecting the `index`-th
    /// occurrence when the pattern matches more than once.
    pub fn apply_patch_in_at(
        &mut self,
        name: &str,
        patch: &Patch,
        index: usize,
    ) -> Result<MatchSite, PatchError> {
        self.apply_patch_impl(patch, Some(name), Some(index))
    }

    fn apply_patch_impl(
        &mut self,
        patch: &Patch,
        name: Option<&str>,
        index: Option<usize>,
    ) -> Result<MatchSite, PatchError> {
        if let Some(name) = name {
            snafu::ensure!(
                self.partitions.iter().any(|p| p.name() == name),
                patch::PartitionNotFoundSnafu { name }
            );
        }

        let mut sites = Vec::new();
        let mut targets = Vec::new();

        for (num, part) in self.partitions.iter().enumerate() {
            if name.is_some_and(|n| n != part.name()) {
                continue;
            }

            let data_offset = part.data_offset();
            for offset in patch.scan(part.data()) {
                sites.push(MatchSite {
                    partition: part.name().to_string(),
                    offset,
                    image_offset: data_offset + offset,
                });
                targets.push((num, offset));
            }
        }

        let selected = patch::select_match(&sites, index)?;
        let (num, offset) = targets[selected];
        patch.write_at(self.partitions[num].data_mut(), offset);

        Ok(sites.swap_remove(selected))
    }

    /// Serializes the image back to a flat byte buffer.
    ///
    /// Headers are re-encoded and each partition's current payload follows,
    /// in original offset order, with all preamble, alignment, and trailing
    /// padding reproduced verbatim. Without an applied patch the output
    /// equals the parsed input exactly.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_size);
        out.extend_from_slice(&self.preamble);
        for part in &self.partitions {
            part.write_to(&mut out);
        }
        out.extend_from_slice(&self.trailing);
        out
    }

    /// Writes the serialized image to `path`.
    ///
    /// The file is synced before the handle closes, so a reported success
    /// means the bytes reached the disk; any failure on the way surfaces as
    /// a [`SaveError`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SaveError> {
        let path = path.as_ref();

        let mut file = File::create(path).context(CreateFileSnafu { path })?;
        file.write_all(&self.to_bytes())
            .context(WriteFileSnafu { path })?;
        file.sync_all().context(SyncFileSnafu { path })?;

        Ok(())
    }
}

/// Summary of one partition: name, payload size, and header offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfo<'a> {
    pub name: &'a str,
    pub size: usize,
    pub offset: usize,
}

/// Iterator over partition summaries, returned by [`LkImage::partitions()`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct LkPartitions<'a> {
    inner: std::slice::Iter<'a, LkPartition>,
}

impl std::fmt::Debug for LkPartitions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LkPartitions")
            .field("remaining", &self.inner.len())
            .finish()
    }
}

impl<'a> Iterator for LkPartitions<'a> {
    type Item = PartitionInfo<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let part = self.inner.next()?;
        Some(PartitionInfo {
            name: part.name(),
            size: part.data().len(),
            offset: part.offset(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for LkPartitions<'_> {}
