// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Boundaries to things the codec itself never does: network downloads and
//! handing artifacts to a device transport. Callers inject implementations;
//! the built-in CLI only ships a filesystem-copy fetcher for local files.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to fetch {0:?}")]
    Fetch(String, #[source] io::Error),
    #[error("No usable asset found at {0:?}")]
    NoAsset(String),
}

/// Retrieves a remote helper artifact (eg. the patch helper APK) into a local
/// directory and returns the path it was stored at.
pub trait Fetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError>;
}

/// Fetcher for `file://`-style sources: copies a local file into the
/// destination directory. Useful for tests and air-gapped workflows where the
/// helper was downloaded out of band.
pub struct LocalFileFetcher;

impl Fetcher for LocalFileFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        let source = Path::new(url.strip_prefix("file://").unwrap_or(url));

        let Some(file_name) = source.file_name() else {
            return Err(DownloadError::NoAsset(url.to_owned()));
        };

        let dest = dest_dir.join(file_name);

        fs::copy(source, &dest).map_err(|e| DownloadError::Fetch(url.to_owned(), e))?;

        Ok(dest)
    }
}

#[derive(Debug, Error)]
pub enum FlashError {
    #[error("Device rejected partition {partition:?}: {reason}")]
    Rejected { partition: String, reason: String },
    #[error("Transport failure")]
    Transport(#[source] io::Error),
}

/// Hands finished artifacts to a device transport (Odin, fastboot, ADB).
/// Flashing is out of scope for this crate beyond this boundary.
pub trait DeviceFlasher {
    fn flash_package(&self, package: &Path) -> Result<(), FlashError>;

    fn flash_partition(&self, partition: &str, image: &Path) -> Result<(), FlashError>;
}

/// Flasher that just moves artifacts into a staging directory for an external
/// tool to pick up.
pub struct StagingFlasher {
    pub directory: PathBuf,
}

impl DeviceFlasher for StagingFlasher {
    fn flash_package(&self, package: &Path) -> Result<(), FlashError> {
        let Some(file_name) = package.file_name() else {
            return Err(FlashError::Transport(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Package path has no file name",
            )));
        };

        fs::copy(package, self.directory.join(file_name))
            .map_err(FlashError::Transport)?;

        Ok(())
    }

    fn flash_partition(&self, partition: &str, image: &Path) -> Result<(), FlashError> {
        fs::copy(image, self.directory.join(format!("{partition}.img")))
            .map_err(FlashError::Transport)?;

        Ok(())
    }
}
