// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{cli::status, patch::vbmeta};

fn disable_subcommand(cli: &DisableCli) -> Result<()> {
    let mut data = fs::read(&cli.input)
        .with_context(|| format!("Failed to open for reading: {:?}", cli.input))?;

    vbmeta::disable_verification(&mut data)
        .with_context(|| format!("Failed to patch vbmeta image: {:?}", cli.input))?;

    fs::write(&cli.output, data)
        .with_context(|| format!("Failed to write image: {:?}", cli.output))?;

    status!("Patched vbmeta image written to {:?}", cli.output);

    Ok(())
}

pub fn vbmeta_main(cli: &VbmetaCli) -> Result<()> {
    match &cli.command {
        VbmetaCommand::Disable(c) => disable_subcommand(c),
    }
}

/// Disable verified boot in a vbmeta image.
#[derive(Debug, Parser)]
struct DisableCli {
    /// Path to input vbmeta image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output vbmeta image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,
}

#[derive(Debug, Subcommand)]
enum VbmetaCommand {
    Disable(DisableCli),
}

/// Patch vbmeta images.
#[derive(Debug, Parser)]
pub struct VbmetaCli {
    #[command(subcommand)]
    command: VbmetaCommand,
}
