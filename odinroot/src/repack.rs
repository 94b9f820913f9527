// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

//! High-level firmware package operations: scanning an AP archive for
//! partition images, extracting them (decompressing LZ4 payloads on the fly),
//! and rebuilding flashable packages from patched images.

use std::{
    ffi::OsStr,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Seek, Write},
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    external::{DownloadError, Fetcher},
    format::{
        compression,
        tar::{self, TarHeader, TarReader, TarWriter},
    },
    report::{LogLevel, LogSink},
    stream, util,
};

/// Partitions that the external patch step operates on, in the order they are
/// written to the reduced package.
pub const PATCH_SET: &[&str] = &["boot.img", "recovery.img", "vbmeta.img", "dtbo.img"];

/// Entry name of the reduced package given to the patch helper.
pub const REDUCED_PACKAGE_NAME: &str = "firmware_for_patch.tar";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Required partition not found: {0:?}")]
    MissingPartition(String),
    #[error("Failed to read archive")]
    Tar(#[from] tar::Error),
    #[error("Failed to decompress entry")]
    Compression(#[from] compression::Error),
    #[error("Failed to fetch helper")]
    Download(#[from] DownloadError),
    #[error("Failed to access file: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("I/O error")]
    Io(#[from] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// What a partition image is used for. Drives which images end up in the
/// reduced package.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PartitionRole {
    Kernel,
    Recovery,
    VBMeta,
    DeviceTreeOverlay,
    Other,
}

/// Disposition of one archive entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryClass {
    Image(PartitionRole),
    Skip,
}

static ROLES: phf::Map<&'static str, EntryClass> = phf::phf_map! {
    "boot.img" => EntryClass::Image(PartitionRole::Kernel),
    "recovery.img" => EntryClass::Image(PartitionRole::Recovery),
    "vbmeta.img" => EntryClass::Image(PartitionRole::VBMeta),
    "dtbo.img" => EntryClass::Image(PartitionRole::DeviceTreeOverlay),
    // Huge and never needed for patching.
    "userdata.img" => EntryClass::Skip,
};

/// Result of classifying one archive entry name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Classification {
    /// Canonical image name with any `.lz4` suffix stripped.
    pub image_name: String,
    pub compressed: bool,
    pub class: EntryClass,
}

/// Classify an archive entry by name. Unknown `.img` entries are kept as
/// [`PartitionRole::Other`]; everything else (scripts, checksum files,
/// userdata) is skipped.
pub fn classify(entry_name: &str) -> Classification {
    let base = entry_name.rsplit('/').next().unwrap_or(entry_name);

    let (image_name, compressed) = match base.strip_suffix(".lz4") {
        Some(stem) => (stem, true),
        None => (base, false),
    };

    // The userdata check covers the whole entry name, so even something like
    // userdata/system.img stays out of the extraction set.
    let class = ROLES.get(image_name).copied().unwrap_or_else(|| {
        if entry_name.contains("userdata") {
            EntryClass::Skip
        } else if image_name.ends_with(".img") {
            EntryClass::Image(PartitionRole::Other)
        } else {
            EntryClass::Skip
        }
    });

    Classification {
        image_name: image_name.to_owned(),
        compressed,
        class,
    }
}

/// A partition image materialized on disk, ready to be packaged.
#[derive(Clone, Debug)]
pub struct PartitionImage {
    /// Canonical name, eg. `boot.img`.
    pub name: String,
    pub role: PartitionRole,
    pub source_path: PathBuf,
    /// Decompressed size.
    pub size_bytes: u64,
    /// Whether the operator wants this image in the output.
    pub included: bool,
}

/// Enumerate entry names and payload sizes without extracting anything.
pub fn list_entries(archive: &Path) -> Result<Vec<(String, u64)>> {
    let file = File::open(archive).map_err(|e| Error::File(archive.to_owned(), e))?;
    let mut reader = TarReader::new(BufReader::new(file));

    let mut entries = vec![];

    while let Some(header) = reader.next_entry()? {
        entries.push((header.name, header.size));
    }

    Ok(entries)
}

/// Scan `archive` and materialize every partition image into `dest_dir`. LZ4
/// payloads are staged in a temporary file and decompressed; a corrupt LZ4
/// stream only skips that one partition with a warning. Cancellation is
/// checked between entries, so no partially extracted image is reported.
pub fn extract_partitions(
    archive: &Path,
    dest_dir: &Path,
    log: &dyn LogSink,
    cancel_signal: &AtomicBool,
) -> Result<Vec<PartitionImage>> {
    let file = File::open(archive).map_err(|e| Error::File(archive.to_owned(), e))?;
    let mut reader = TarReader::new(BufReader::new(file));

    let mut images = vec![];

    loop {
        stream::check_cancel(cancel_signal)?;

        let Some(header) = reader.next_entry()? else {
            break;
        };

        let c = classify(&header.name);

        let EntryClass::Image(role) = c.class else {
            log.log(LogLevel::Info, &format!("-- Skipping  : {}", header.name));
            debug!("Skipping entry: {:?}", header.name);
            continue;
        };

        log.log(LogLevel::Info, &format!("-- Extracting: {}", header.name));

        let out_path = dest_dir.join(&c.image_name);

        if c.compressed {
            match extract_lz4_entry(&mut reader, dest_dir, &out_path) {
                Ok(()) => {}
                Err(Error::Compression(e)) => {
                    warn!("Corrupt LZ4 payload in {:?}: {e}", header.name);
                    log.log(
                        LogLevel::Warning,
                        &format!("-- Skipping  : {} (corrupt LZ4 stream)", header.name),
                    );
                    let _ = fs::remove_file(&out_path);
                    continue;
                }
                Err(e) => return Err(e),
            }
        } else {
            let out = File::create(&out_path).map_err(|e| Error::File(out_path.clone(), e))?;
            let mut writer = BufWriter::new(out);
            reader.copy_data(&mut writer)?;
            writer.flush().map_err(|e| Error::File(out_path.clone(), e))?;
        }

        let size_bytes = fs::metadata(&out_path)
            .map_err(|e| Error::File(out_path.clone(), e))?
            .len();

        images.push(PartitionImage {
            name: c.image_name,
            role,
            source_path: out_path,
            size_bytes,
            included: true,
        });
    }

    Ok(images)
}

/// Stage the compressed payload in a temp file, then decompress it into
/// `out_path`. The temp file is removed when this returns, success or not.
fn extract_lz4_entry(
    reader: &mut TarReader<impl Read>,
    dest_dir: &Path,
    out_path: &Path,
) -> Result<()> {
    let staged = NamedTempFile::new_in(dest_dir)?;

    {
        let mut writer = BufWriter::new(staged.as_file());
        reader.copy_data(&mut writer)?;
        writer.flush()?;
    }

    let mut source = staged.as_file();
    source.rewind()?;

    let out = File::create(out_path).map_err(|e| Error::File(out_path.to_owned(), e))?;
    let mut writer = BufWriter::new(out);

    let n = compression::decompress(BufReader::new(source), &mut writer)?;
    writer.flush().map_err(|e| Error::File(out_path.to_owned(), e))?;

    debug!("Decompressed {:?}: {n} bytes", out_path);

    Ok(())
}

/// Serialize `(entry name, source path)` pairs into a single archive at
/// `output`. Sources that don't exist are skipped with a warning. The archive
/// is staged next to `output` and only persisted once complete, so a failed
/// or cancelled run never leaves a truncated package behind.
pub fn assemble_package(
    entries: &[(String, PathBuf)],
    output: &Path,
    mtime: u64,
    log: &dyn LogSink,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    let temp = NamedTempFile::with_prefix_in(
        output.file_name().unwrap_or_else(|| OsStr::new("package")),
        util::parent_path(output),
    )
    .map_err(|e| Error::File(output.to_owned(), e))?;

    let mut writer = TarWriter::new(BufWriter::new(temp.as_file()));

    for (name, source) in entries {
        stream::check_cancel(cancel_signal)?;

        let file = match File::open(source) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Package source missing: {:?}", source);
                log.log(
                    LogLevel::Warning,
                    &format!("-- Missing   : {name} ({})", source.display()),
                );
                continue;
            }
            Err(e) => return Err(Error::File(source.clone(), e)),
        };

        let size = file
            .metadata()
            .map_err(|e| Error::File(source.clone(), e))?
            .len();

        let header = TarHeader {
            name: name.clone(),
            size,
            mtime,
        };

        log.log(LogLevel::Info, &format!("-- Writing   : {name}"));

        writer.append(&header, BufReader::new(file))?;
    }

    let mut buffered = writer.finish()?;
    buffered
        .flush()
        .map_err(|e| Error::File(output.to_owned(), e))?;
    drop(buffered);

    temp.persist(output)
        .map_err(|e| Error::File(output.to_owned(), e.error))?;

    Ok(())
}

/// Build the minimal archive handed to the external patch step: whichever of
/// the patchable partitions were extracted and are still marked as included.
/// `boot.img` is mandatory; everything else is optional.
pub fn reduced_package(
    images: &[PartitionImage],
    output: &Path,
    mtime: u64,
    log: &dyn LogSink,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    let mut entries = vec![];

    for name in PATCH_SET {
        if let Some(image) = images.iter().find(|i| i.included && i.name == *name) {
            entries.push((image.name.clone(), image.source_path.clone()));
        }
    }

    if !entries.iter().any(|(name, _)| name == "boot.img") {
        return Err(Error::MissingPartition("boot.img".to_owned()));
    }

    assemble_package(&entries, output, mtime, log, cancel_signal)
}

/// Patched images to reassemble into a flashable package. The on-disk file
/// names are arbitrary (the patch helper emits names like
/// `magisk_patched-26100_AbCdE.img`); entries are written under their
/// canonical partition names.
#[derive(Clone, Debug)]
pub struct PatchedImages<'a> {
    pub boot: &'a Path,
    pub recovery: Option<&'a Path>,
    pub vbmeta: Option<&'a Path>,
    pub dtbo: Option<&'a Path>,
}

/// Rebuild a flashable archive from already-patched images.
pub fn reassembled_package(
    images: &PatchedImages,
    output: &Path,
    mtime: u64,
    log: &dyn LogSink,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    let mut entries = vec![("boot.img".to_owned(), images.boot.to_owned())];

    if let Some(path) = images.recovery {
        entries.push(("recovery.img".to_owned(), path.to_owned()));
    }
    if let Some(path) = images.vbmeta {
        entries.push(("vbmeta.img".to_owned(), path.to_owned()));
    }
    if let Some(path) = images.dtbo {
        entries.push(("dtbo.img".to_owned(), path.to_owned()));
    }

    assemble_package(&entries, output, mtime, log, cancel_signal)
}

/// Everything the operator needs for the external patch step.
#[derive(Clone, Debug)]
pub struct PreparedPackage {
    pub package: PathBuf,
    pub helper: PathBuf,
}

/// Produce the reduced package from `archive` plus the patch helper fetched
/// through `fetcher`, both placed in `output_dir`. Extraction happens in a
/// temp dir that's removed on success and failure alike.
pub fn prepare_patch_package(
    archive: &Path,
    output_dir: &Path,
    helper_url: &str,
    fetcher: &dyn Fetcher,
    log: &dyn LogSink,
    cancel_signal: &AtomicBool,
) -> Result<PreparedPackage> {
    log.log(LogLevel::Title, "=== FIRMWARE PATCH PREP ===");

    fs::create_dir_all(output_dir).map_err(|e| Error::File(output_dir.to_owned(), e))?;

    let temp_dir = TempDir::new()?;

    log.log(LogLevel::Info, "- Scanning firmware archive");
    let images = extract_partitions(archive, temp_dir.path(), log, cancel_signal)?;

    let package = output_dir.join(REDUCED_PACKAGE_NAME);

    log.log(LogLevel::Info, "- Creating reduced package");
    reduced_package(&images, &package, 0, log, cancel_signal)?;

    log.log(LogLevel::Info, "- Fetching patch helper");
    let helper = fetcher.fetch(helper_url, output_dir)?;

    log.log(LogLevel::Success, "- Patch package ready");
    log.log(LogLevel::Info, "Next steps:");
    log.log(
        LogLevel::Info,
        &format!("  1. Copy {REDUCED_PACKAGE_NAME} and the helper to the device"),
    );
    log.log(
        LogLevel::Info,
        "  2. Patch the package with the helper on the device",
    );
    log.log(
        LogLevel::Info,
        "  3. Pull the patched images back and run the repack command",
    );

    Ok(PreparedPackage { package, helper })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            classify("boot.img"),
            Classification {
                image_name: "boot.img".to_owned(),
                compressed: false,
                class: EntryClass::Image(PartitionRole::Kernel),
            },
        );
        assert_eq!(
            classify("recovery.img.lz4"),
            Classification {
                image_name: "recovery.img".to_owned(),
                compressed: true,
                class: EntryClass::Image(PartitionRole::Recovery),
            },
        );
        assert_eq!(
            classify("firmware/vbmeta.img.lz4").class,
            EntryClass::Image(PartitionRole::VBMeta),
        );
        assert_eq!(
            classify("super.img.lz4").class,
            EntryClass::Image(PartitionRole::Other),
        );

        assert_eq!(classify("userdata.img.lz4").class, EntryClass::Skip);
        assert_eq!(classify("my_userdata_gsi.img").class, EntryClass::Skip);
        assert_eq!(classify("userdata/system.img").class, EntryClass::Skip);
        assert_eq!(classify("meta-data/fota.zip").class, EntryClass::Skip);
        assert_eq!(classify("odin.flash.info").class, EntryClass::Skip);
    }
}
