mod cli;

use clap::Parser;
use cli::{Cli, Command};
use mtk_lk::Patch;
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};

/// Top-level application errors for mtk-lk-util.
#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to open LK image '{}'", path.display()))]
    OpenImage {
        path: PathBuf,
        source: mtk_lk_util::OpenImageError,
    },

    #[snafu(display("failed to dump partitions"))]
    Dump { source: mtk_lk_util::DumpError },

    #[snafu(display("invalid patch arguments"))]
    BuildPatch { source: mtk_lk::PatchError },

    #[snafu(display("failed to apply patch"))]
    ApplyPatch { source: mtk_lk::PatchError },

    #[snafu(display("failed to save image to '{}'", path.display()))]
    SaveImage {
        path: PathBuf,
        source: mtk_lk::SaveError,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[snafu::report]
fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Info { image_path } => cmd_info(&image_path),
        Command::List { image_path } => cmd_list(&image_path),
        Command::Extract {
            image_path,
            output,
            force,
        } => cmd_extract(&image_path, output.as_deref(), force),
        Command::Patch {
            image_path,
            search,
            replace,
            partition,
            index,
            output,
        } => cmd_patch(
            &image_path,
            &search,
            &replace,
            partition.as_deref(),
            index,
            output.as_deref(),
        ),
    }
}

fn cmd_info(path: &Path) -> Result<()> {
    let image = mtk_lk_util::open_image(path).context(OpenImageSnafu { path })?;

    println!("LK image: {}", path.display());
    println!();
    println!("Version:        {}", image.version());
    println!("Partitions:     {}", image.partition_count());
    println!("Total Size:     {} bytes", image.total_size());

    for part in image.iter() {
        println!();
        println!("Offset          : 0x{:X}", part.offset());
        println!("{}", part.header());
        if !part.is_cert() {
            let certs = image.certs_for(part.name()).count();
            if certs > 0 {
                println!("Certificates    : {certs}");
            }
        }
    }

    Ok(())
}

fn cmd_list(path: &Path) -> Result<()> {
    let image = mtk_lk_util::open_image(path).context(OpenImageSnafu { path })?;

    println!("Partitions in {}:", path.display());
    println!("{:>6}  {:<20}  {:>10}  {:>10}", "Index", "Name", "Size", "Offset");
    println!("{:-<6}  {:-<20}  {:-<10}  {:-<10}", "", "", "", "");

    for (index, part) in image.partitions().enumerate() {
        println!(
            "{:>6}  {:<20}  {:>10}  0x{:08X}",
            index, part.name, part.size, part.offset
        );
    }

    Ok(())
}

fn cmd_extract(path: &Path, output: Option<&Path>, force: bool) -> Result<()> {
    let image = mtk_lk_util::open_image(path).context(OpenImageSnafu { path })?;

    // Use the image name without extension as the default output directory.
    let output_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => path.with_extension(""),
    };

    let written = mtk_lk_util::dump_partitions(&image, &output_dir, force).context(DumpSnafu)?;
    println!(
        "Dumped {} partitions to {}.",
        written,
        output_dir.display()
    );

    Ok(())
}

fn cmd_patch(
    path: &Path,
    search: &str,
    replace: &str,
    partition: Option<&str>,
    index: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let mut image = mtk_lk_util::open_image(path).context(OpenImageSnafu { path })?;

    let patch = Patch::from_hex(search, replace).context(BuildPatchSnafu)?;

    let site = match (partition, index) {
        (Some(name), Some(index)) => image.apply_patch_in_at(name, &patch, index),
        (Some(name), None) => image.apply_patch_in(name, &patch),
        (None, Some(index)) => image.apply_patch_at(&patch, index),
        (None, None) => image.apply_patch(&patch),
    }
    .context(ApplyPatchSnafu)?;

    let output = output.unwrap_or(path);
    image
        .save(output)
        .context(SaveImageSnafu { path: output })?;

    println!("Patched {} -> {}.", site, output.display());

    Ok(())
}
