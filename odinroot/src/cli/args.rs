// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::cli::{boot, completion, tar, vbmeta};

#[derive(Debug, Subcommand)]
pub enum Command {
    Boot(boot::BootCli),
    Completion(completion::CompletionCli),
    Tar(tar::TarCli),
    Vbmeta(vbmeta::VbmetaCli),
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

fn init_logging(cli: &Cli, logging_initialized: &AtomicBool) {
    let level = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    logging_initialized.store(true, Ordering::SeqCst);
}

pub fn main(logging_initialized: &AtomicBool, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli, logging_initialized);

    match cli.command {
        Command::Boot(c) => boot::boot_main(&c),
        Command::Completion(c) => completion::completion_main(&c),
        Command::Tar(c) => tar::tar_main(&c, cancel_signal),
        Command::Vbmeta(c) => vbmeta::vbmeta_main(&c),
    }
}
