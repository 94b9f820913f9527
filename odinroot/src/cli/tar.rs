// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tempfile::TempDir;

use crate::{
    cli::{ConsoleLog, status},
    external::LocalFileFetcher,
    repack::{self, PatchedImages},
};

fn list_subcommand(cli: &ListCli) -> Result<()> {
    let entries = repack::list_entries(&cli.input)
        .with_context(|| format!("Failed to read archive: {:?}", cli.input))?;

    for (name, size) in entries {
        println!("{:>10.2} MiB  {name}", size as f64 / 1024.0 / 1024.0);
    }

    Ok(())
}

fn extract_subcommand(cli: &ExtractCli, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    fs::create_dir_all(&cli.directory)
        .with_context(|| format!("Failed to create directory: {:?}", cli.directory))?;

    let images = repack::extract_partitions(&cli.input, &cli.directory, &ConsoleLog, cancel_signal)
        .with_context(|| format!("Failed to extract archive: {:?}", cli.input))?;

    status!("Extracted {} partition image(s)", images.len());

    Ok(())
}

fn reduce_subcommand(cli: &ReduceCli, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    let temp_dir = TempDir::new().context("Failed to create temporary directory")?;

    let images =
        repack::extract_partitions(&cli.input, temp_dir.path(), &ConsoleLog, cancel_signal)
            .with_context(|| format!("Failed to extract archive: {:?}", cli.input))?;

    repack::reduced_package(&images, &cli.output, cli.mtime, &ConsoleLog, cancel_signal)
        .with_context(|| format!("Failed to write package: {:?}", cli.output))?;

    status!("Reduced package written to {:?}", cli.output);

    Ok(())
}

fn prepare_subcommand(cli: &PrepareCli, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    let prepared = repack::prepare_patch_package(
        &cli.input,
        &cli.directory,
        &cli.helper,
        &LocalFileFetcher,
        &ConsoleLog,
        cancel_signal,
    )
    .with_context(|| format!("Failed to prepare patch package: {:?}", cli.input))?;

    status!("Package: {:?}", prepared.package);
    status!("Helper:  {:?}", prepared.helper);

    Ok(())
}

fn repack_subcommand(cli: &RepackCli, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    let images = PatchedImages {
        boot: &cli.boot,
        recovery: cli.recovery.as_deref(),
        vbmeta: cli.vbmeta.as_deref(),
        dtbo: cli.dtbo.as_deref(),
    };

    repack::reassembled_package(&images, &cli.output, cli.mtime, &ConsoleLog, cancel_signal)
        .with_context(|| format!("Failed to write package: {:?}", cli.output))?;

    status!("Flashable package written to {:?}", cli.output);

    Ok(())
}

pub fn tar_main(cli: &TarCli, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    match &cli.command {
        TarCommand::List(c) => list_subcommand(c),
        TarCommand::Extract(c) => extract_subcommand(c, cancel_signal),
        TarCommand::Reduce(c) => reduce_subcommand(c, cancel_signal),
        TarCommand::Prepare(c) => prepare_subcommand(c, cancel_signal),
        TarCommand::Repack(c) => repack_subcommand(c, cancel_signal),
    }
}

/// List entries in a firmware archive.
#[derive(Debug, Parser)]
struct ListCli {
    /// Path to input firmware archive.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Extract partition images from a firmware archive.
#[derive(Debug, Parser)]
struct ExtractCli {
    /// Path to input firmware archive.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Directory to extract images into.
    #[arg(short, long, value_name = "DIR", value_parser, default_value = ".")]
    directory: PathBuf,
}

/// Build the reduced package for the external patch step.
#[derive(Debug, Parser)]
struct ReduceCli {
    /// Path to input firmware archive.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output package.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Modification timestamp for all entries (Unix seconds).
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    mtime: u64,
}

/// Build the reduced package and fetch the patch helper.
#[derive(Debug, Parser)]
struct PrepareCli {
    /// Path to input firmware archive.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Directory for the package and helper.
    #[arg(short, long, value_name = "DIR", value_parser)]
    directory: PathBuf,

    /// Source of the patch helper (local path or file:// URL).
    #[arg(long, value_name = "SOURCE")]
    helper: String,
}

/// Rebuild a flashable package from patched images.
#[derive(Debug, Parser)]
struct RepackCli {
    /// Path to patched boot image.
    #[arg(long, value_name = "FILE", value_parser)]
    boot: PathBuf,

    /// Path to patched recovery image.
    #[arg(long, value_name = "FILE", value_parser)]
    recovery: Option<PathBuf>,

    /// Path to patched vbmeta image.
    #[arg(long, value_name = "FILE", value_parser)]
    vbmeta: Option<PathBuf>,

    /// Path to patched dtbo image.
    #[arg(long, value_name = "FILE", value_parser)]
    dtbo: Option<PathBuf>,

    /// Path to output package.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Modification timestamp for all entries (Unix seconds).
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    mtime: u64,
}

#[derive(Debug, Subcommand)]
enum TarCommand {
    List(ListCli),
    Extract(ExtractCli),
    Reduce(ReduceCli),
    Prepare(PrepareCli),
    Repack(RepackCli),
}

/// Work with Odin firmware archives.
#[derive(Debug, Parser)]
pub struct TarCli {
    #[command(subcommand)]
    command: TarCommand,
}
