use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "mtk-lk-util")]
#[command(about = "MediaTek LK bootloader image utility", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display information about an LK image
    Info {
        /// Path to the LK image
        #[arg(value_name = "LK_IMAGE")]
        image_path: PathBuf,
    },

    /// List partitions in an LK image
    List {
        /// Path to the LK image
        #[arg(value_name = "LK_IMAGE")]
        image_path: PathBuf,
    },

    /// Dump partition payloads to a directory
    Extract {
        /// Path to the LK image
        #[arg(value_name = "LK_IMAGE")]
        image_path: PathBuf,

        /// Output directory (defaults to the image name without extension)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Apply a hex search/replace patch to an LK image
    Patch {
        /// Path to the LK image
        #[arg(value_name = "LK_IMAGE")]
        image_path: PathBuf,

        /// Byte pattern to search for, hex encoded (e.g. 30b583b002ab)
        #[arg(value_name = "SEARCH_HEX")]
        search: String,

        /// Replacement bytes, hex encoded, same length as the search pattern
        #[arg(value_name = "REPLACE_HEX")]
        replace: String,

        /// Only search within the named partition
        #[arg(short, long, value_name = "NAME")]
        partition: Option<String>,

        /// Pick the n-th occurrence (offset order) when the pattern
        /// matches more than once
        #[arg(short = 'n', long, value_name = "INDEX")]
        index: Option<usize>,

        /// Output path (defaults to patching the image in place)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}
