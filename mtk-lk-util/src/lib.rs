//! Library for working with MediaTek LK bootloader images on disk.
//!
//! This crate wraps [`mtk-lk`](mtk_lk) with the file-system boundary: opening
//! an image via a memory-mapped read and dumping partition payloads to
//! individual files.
//!
//! # Example
//!
//! ```no_run
//! let image = mtk_lk_util::open_image("lk.img".as_ref()).expect("failed to open image");
//! mtk_lk_util::dump_partitions(&image, "out/".as_ref(), false).expect("dump failed");
//! ```

use mtk_lk::LkImage;
use snafu::{ResultExt, Snafu};
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Errors that can occur when opening an LK image from disk.
#[derive(Debug, Snafu)]
pub enum OpenImageError {
    #[snafu(display("failed to open file"))]
    OpenFile { source: std::io::Error },

    #[snafu(display("failed to memory map file"))]
    MmapFile { source: std::io::Error },

    #[snafu(display("failed to parse LK image"))]
    ParseImage { source: mtk_lk::ParseError },
}

/// Opens an LK image from disk using a memory-mapped read.
///
/// The parsed [`LkImage`] owns its partition buffers, so the map is dropped
/// as soon as parsing finishes and the file is free to be overwritten (for
/// example by an in-place patch).
pub fn open_image(path: &Path) -> Result<LkImage, OpenImageError> {
    let file = File::open(path).context(OpenFileSnafu)?;
    // Safety: the map only lives for the duration of the parse, which copies
    // out of it; a concurrent truncation of the file is the caller's race.
    let raw = unsafe { memmap2::Mmap::map(&file).context(MmapFileSnafu)? };
    LkImage::parse(&raw).context(ParseImageSnafu)
}

/// Errors that can occur when dumping partitions to disk.
#[derive(Debug, Snafu)]
pub enum DumpError {
    #[snafu(display("cannot create directory {}", path.display()))]
    CreateDirectoryFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{} already exists (use overwrite to replace it)", path.display()))]
    AlreadyExists { path: PathBuf },

    #[snafu(display("cannot create file {}", path.display()))]
    CreateFileFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot write to {}", path.display()))]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Dumps every partition's payload to `<output>/<name>.bin`.
///
/// Headers and padding are not included; this writes the payload bytes
/// exactly as [`LkPartition::data()`](mtk_lk::LkPartition::data) exposes
/// them. Partitions sharing a name (several `cert1` regions, say) get an
/// index suffix to keep the files apart.
///
/// Returns the number of files written.
pub fn dump_partitions(
    image: &LkImage,
    output: &Path,
    overwrite: bool,
) -> Result<usize, DumpError> {
    create_dir_all(output).context(CreateDirectoryFailedSnafu { path: output })?;

    let mut written = 0usize;
    for (num, part) in image.iter().enumerate() {
        let seen_before = image
            .iter()
            .take(num)
            .any(|earlier| earlier.name() == part.name());
        let file_name = if seen_before {
            format!("{}.{}.bin", part.name(), num)
        } else {
            format!("{}.bin", part.name())
        };
        let path = output.join(file_name);

        if path.exists() && !overwrite {
            return AlreadyExistsSnafu { path }.fail();
        }

        let mut file = File::create(&path).context(CreateFileFailedSnafu { path: &path })?;
        file.write_all(part.data())
            .context(WriteFailedSnafu { path: &path })?;

        written += 1;
    }

    Ok(written)
}
