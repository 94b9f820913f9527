// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    cli::{ConsoleLog, status},
    format::bootimage::BootHeader,
    patch::boot::{BootPatcher, PatchPolicy},
};

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to open for reading: {path:?}"))
}

fn write_image(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).with_context(|| format!("Failed to write image: {path:?}"))
}

fn write_header(path: &Path, header: &BootHeader) -> Result<()> {
    let data = toml_edit::ser::to_string_pretty(header)
        .with_context(|| format!("Failed to serialize header TOML: {path:?}"))?;
    fs::write(path, data).with_context(|| format!("Failed to write header TOML: {path:?}"))?;

    Ok(())
}

fn write_data_if_not_empty(path: &Path, data: &[u8]) -> Result<()> {
    if !data.is_empty() {
        fs::write(path, data).with_context(|| format!("Failed to write data: {path:?}"))?;
    }

    Ok(())
}

fn display_info(boot_cli: &BootCli, header: &BootHeader) {
    if !boot_cli.quiet {
        if boot_cli.debug {
            println!("{header:#?}");
        } else {
            println!("{header}");
        }
    }
}

fn info_subcommand(boot_cli: &BootCli, cli: &InfoCli) -> Result<()> {
    let data = read_image(&cli.input)?;
    let header = BootHeader::parse(&data)
        .with_context(|| format!("Failed to parse boot image: {:?}", cli.input))?;

    display_info(boot_cli, &header);

    if !boot_cli.quiet {
        let format = header
            .kernel_format(&data)
            .with_context(|| format!("Failed to read kernel blob: {:?}", cli.input))?;
        println!("- Kernel format:    {format}");
    }

    Ok(())
}

fn unpack_subcommand(boot_cli: &BootCli, cli: &UnpackCli) -> Result<()> {
    let data = read_image(&cli.input)?;
    let header = BootHeader::parse(&data)
        .with_context(|| format!("Failed to parse boot image: {:?}", cli.input))?;

    display_info(boot_cli, &header);

    write_header(&cli.output_header, &header)?;

    let kernel = header
        .kernel_data(&data)
        .with_context(|| format!("Failed to read kernel blob: {:?}", cli.input))?;
    write_data_if_not_empty(&cli.output_kernel, kernel)?;

    let ramdisk = header
        .ramdisk_data(&data)
        .with_context(|| format!("Failed to read ramdisk blob: {:?}", cli.input))?;
    write_data_if_not_empty(&cli.output_ramdisk, ramdisk)?;

    Ok(())
}

fn patch_subcommand(boot_cli: &BootCli, cli: &PatchCli) -> Result<()> {
    let data = read_image(&cli.input)?;

    let policy = PatchPolicy {
        keep_verity: cli.keep_verity,
        keep_force_encrypt: cli.keep_force_encrypt,
    };

    let mut patcher = BootPatcher::new(policy);
    if let Some(seed) = cli.random_seed {
        patcher = patcher.with_random_seed(seed);
    }

    let patched = patcher
        .patch(&data, &ConsoleLog)
        .with_context(|| format!("Failed to patch boot image: {:?}", cli.input))?;

    let header = BootHeader::parse(&patched)?;
    display_info(boot_cli, &header);

    write_image(&cli.output, &patched)?;

    status!("Patched boot image written to {:?}", cli.output);

    Ok(())
}

pub fn boot_main(cli: &BootCli) -> Result<()> {
    match &cli.command {
        BootCommand::Info(c) => info_subcommand(cli, c),
        BootCommand::Unpack(c) => unpack_subcommand(cli, c),
        BootCommand::Patch(c) => patch_subcommand(cli, c),
    }
}

/// Display boot image header information.
#[derive(Debug, Parser)]
struct InfoCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Unpack a boot image.
#[derive(Debug, Parser)]
struct UnpackCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output header TOML.
    #[arg(long, value_name = "FILE", value_parser, default_value = "header.toml")]
    output_header: PathBuf,

    /// Path to output kernel image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "kernel.img")]
    output_kernel: PathBuf,

    /// Path to output ramdisk image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "ramdisk.img")]
    output_ramdisk: PathBuf,
}

/// Apply the root-injection patch to a boot image.
#[derive(Debug, Parser)]
struct PatchCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Keep dm-verity enabled in the patched image.
    #[arg(long)]
    keep_verity: bool,

    /// Keep force-encryption enabled in the patched image.
    #[arg(long)]
    keep_force_encrypt: bool,

    /// Seed for the integrity region bytes (defaults to a fixed value for
    /// reproducible output).
    #[arg(long, value_name = "SEED")]
    random_seed: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum BootCommand {
    Info(InfoCli),
    Unpack(UnpackCli),
    Patch(PatchCli),
}

/// Inspect or patch boot images.
#[derive(Debug, Parser)]
pub struct BootCli {
    #[command(subcommand)]
    command: BootCommand,

    /// Don't print boot image header information.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print boot image header information in debug format.
    #[arg(short, long, global = true)]
    debug: bool,
}
