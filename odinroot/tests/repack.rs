// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use assert_matches::assert_matches;
use odinroot::{
    external::{DownloadError, Fetcher},
    format::{
        compression::{CompressedFormat, CompressedWriter},
        tar::{TarHeader, TarWriter},
    },
    repack::{self, PartitionImage, PartitionRole, PatchedImages},
    report::{LogLevel, MemoryLog},
};
use tempfile::TempDir;

fn lz4_compress(data: &[u8]) -> Vec<u8> {
    let mut writer = CompressedWriter::new(Cursor::new(Vec::new()), CompressedFormat::Lz4Frame);
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = TarWriter::new(fs::File::create(path).unwrap());

    for (name, content) in entries {
        let header = TarHeader {
            name: (*name).to_owned(),
            size: content.len() as u64,
            mtime: 0,
        };
        writer.append(&header, *content).unwrap();
    }

    writer.finish().unwrap();
}

fn fixture_archive(dir: &Path) -> PathBuf {
    let boot_data = vec![0x11u8; 4096];
    let recovery_lz4 = lz4_compress(&[0x22u8; 8192]);
    let userdata_lz4 = lz4_compress(&[0x33u8; 1024]);

    let path = dir.join("AP_test.tar.md5");
    write_archive(
        &path,
        &[
            ("meta-data/fota.zip", b"fota".as_slice()),
            ("boot.img", &boot_data),
            ("recovery.img.lz4", &recovery_lz4),
            ("userdata.img.lz4", &userdata_lz4),
        ],
    );

    path
}

#[test]
fn extract_mixed_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive = fixture_archive(temp_dir.path());
    let out_dir = temp_dir.path().join("out");
    fs::create_dir(&out_dir).unwrap();

    let log = MemoryLog::new();
    let cancel_signal = AtomicBool::new(false);

    let images =
        repack::extract_partitions(&archive, &out_dir, &log, &cancel_signal).unwrap();

    assert_eq!(images.len(), 2);

    assert_eq!(images[0].name, "boot.img");
    assert_eq!(images[0].role, PartitionRole::Kernel);
    assert_eq!(images[0].size_bytes, 4096);
    assert_eq!(fs::read(&images[0].source_path).unwrap(), vec![0x11u8; 4096]);

    assert_eq!(images[1].name, "recovery.img");
    assert_eq!(images[1].role, PartitionRole::Recovery);
    assert_eq!(images[1].size_bytes, 8192);
    assert_eq!(
        fs::read(&images[1].source_path).unwrap(),
        vec![0x22u8; 8192],
    );

    // userdata is never extracted.
    assert!(!out_dir.join("userdata.img").exists());
    assert!(log.contains(LogLevel::Info, "userdata.img.lz4"));

    // No staging leftovers.
    let names: Vec<_> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
}

#[test]
fn corrupt_lz4_skips_partition_only() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("out");
    fs::create_dir(&out_dir).unwrap();

    let mut bad_lz4 = lz4_compress(&[0x44u8; 8192]);
    bad_lz4.truncate(bad_lz4.len() / 2);

    let archive = temp_dir.path().join("AP_bad.tar.md5");
    write_archive(
        &archive,
        &[
            ("dtbo.img.lz4", &bad_lz4),
            ("boot.img", vec![0x55u8; 2048].as_slice()),
        ],
    );

    let log = MemoryLog::new();
    let cancel_signal = AtomicBool::new(false);

    let images =
        repack::extract_partitions(&archive, &out_dir, &log, &cancel_signal).unwrap();

    // The corrupt entry is skipped with a warning; later entries still
    // extract.
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].name, "boot.img");
    assert!(!out_dir.join("dtbo.img").exists());
    assert!(log.contains(LogLevel::Warning, "dtbo.img.lz4"));
}

#[test]
fn list_entries() {
    let temp_dir = TempDir::new().unwrap();
    let archive = fixture_archive(temp_dir.path());

    let entries = repack::list_entries(&archive).unwrap();

    let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        [
            "meta-data/fota.zip",
            "boot.img",
            "recovery.img.lz4",
            "userdata.img.lz4",
        ],
    );
    assert_eq!(entries[1].1, 4096);
}

#[test]
fn assemble_skips_missing_sources() {
    let temp_dir = TempDir::new().unwrap();

    let boot = temp_dir.path().join("boot.img");
    fs::write(&boot, [0x66u8; 1000]).unwrap();

    let entries = vec![
        ("boot.img".to_owned(), boot),
        ("dtbo.img".to_owned(), temp_dir.path().join("no_such.img")),
    ];

    let output = temp_dir.path().join("output.tar");
    let log = MemoryLog::new();
    let cancel_signal = AtomicBool::new(false);

    repack::assemble_package(&entries, &output, 0, &log, &cancel_signal).unwrap();

    assert!(log.contains(LogLevel::Warning, "dtbo.img"));

    let listed = repack::list_entries(&output).unwrap();
    assert_eq!(listed, vec![("boot.img".to_owned(), 1000)]);
}

#[test]
fn reduced_package_requires_boot() {
    let temp_dir = TempDir::new().unwrap();

    let vbmeta = temp_dir.path().join("vbmeta.img");
    fs::write(&vbmeta, [0u8; 4096]).unwrap();

    let images = vec![PartitionImage {
        name: "vbmeta.img".to_owned(),
        role: PartitionRole::VBMeta,
        source_path: vbmeta,
        size_bytes: 4096,
        included: true,
    }];

    let output = temp_dir.path().join("output.tar");
    let log = MemoryLog::new();
    let cancel_signal = AtomicBool::new(false);

    assert_matches!(
        repack::reduced_package(&images, &output, 0, &log, &cancel_signal),
        Err(repack::Error::MissingPartition(name)) if name == "boot.img"
    );
    assert!(!output.exists());
}

#[test]
fn reduced_package_excludes_deselected() {
    let temp_dir = TempDir::new().unwrap();

    let boot = temp_dir.path().join("boot.img");
    let recovery = temp_dir.path().join("recovery.img");
    fs::write(&boot, [0x77u8; 100]).unwrap();
    fs::write(&recovery, [0x88u8; 100]).unwrap();

    let images = vec![
        PartitionImage {
            name: "boot.img".to_owned(),
            role: PartitionRole::Kernel,
            source_path: boot,
            size_bytes: 100,
            included: true,
        },
        PartitionImage {
            name: "recovery.img".to_owned(),
            role: PartitionRole::Recovery,
            source_path: recovery,
            size_bytes: 100,
            included: false,
        },
    ];

    let output = temp_dir.path().join("output.tar");
    let log = MemoryLog::new();
    let cancel_signal = AtomicBool::new(false);

    repack::reduced_package(&images, &output, 0, &log, &cancel_signal).unwrap();

    let listed = repack::list_entries(&output).unwrap();
    assert_eq!(listed, vec![("boot.img".to_owned(), 100)]);
}

#[test]
fn reassemble_remaps_names() {
    let temp_dir = TempDir::new().unwrap();

    let patched_boot = temp_dir.path().join("magisk_patched-26100_AbCdE.img");
    let patched_vbmeta = temp_dir.path().join("vbmeta_disabled.img");
    fs::write(&patched_boot, [0x99u8; 2048]).unwrap();
    fs::write(&patched_vbmeta, [0xaau8; 4096]).unwrap();

    let images = PatchedImages {
        boot: &patched_boot,
        recovery: None,
        vbmeta: Some(&patched_vbmeta),
        dtbo: None,
    };

    let output = temp_dir.path().join("flashable.tar");
    let log = MemoryLog::new();
    let cancel_signal = AtomicBool::new(false);

    repack::reassembled_package(&images, &output, 0, &log, &cancel_signal).unwrap();

    let listed = repack::list_entries(&output).unwrap();
    assert_eq!(
        listed,
        vec![
            ("boot.img".to_owned(), 2048),
            ("vbmeta.img".to_owned(), 4096),
        ],
    );
}

#[test]
fn cancelled_assemble_leaves_no_output() {
    let temp_dir = TempDir::new().unwrap();

    let boot = temp_dir.path().join("boot.img");
    fs::write(&boot, [0xbbu8; 100]).unwrap();

    let entries = vec![("boot.img".to_owned(), boot)];
    let output = temp_dir.path().join("output.tar");
    let log = MemoryLog::new();

    let cancel_signal = AtomicBool::new(false);
    cancel_signal.store(true, Ordering::SeqCst);

    assert_matches!(
        repack::assemble_package(&entries, &output, 0, &log, &cancel_signal),
        Err(repack::Error::Io(_))
    );
    assert!(!output.exists());
}

#[test]
fn prepare_patch_package_flow() {
    let temp_dir = TempDir::new().unwrap();
    let archive = fixture_archive(temp_dir.path());

    let helper_src = temp_dir.path().join("helper.apk");
    fs::write(&helper_src, b"apk bytes").unwrap();

    struct CopyFetcher;

    impl Fetcher for CopyFetcher {
        fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
            let source = Path::new(url);
            let dest = dest_dir.join(source.file_name().unwrap());
            fs::copy(source, &dest).map_err(|e| DownloadError::Fetch(url.to_owned(), e))?;
            Ok(dest)
        }
    }

    let out_dir = temp_dir.path().join("prepared");
    let log = MemoryLog::new();
    let cancel_signal = AtomicBool::new(false);

    let prepared = repack::prepare_patch_package(
        &archive,
        &out_dir,
        helper_src.to_str().unwrap(),
        &CopyFetcher,
        &log,
        &cancel_signal,
    )
    .unwrap();

    assert_eq!(fs::read(&prepared.helper).unwrap(), b"apk bytes");

    let listed = repack::list_entries(&prepared.package).unwrap();
    let names: Vec<_> = listed.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["boot.img", "recovery.img"]);
}

#[test]
fn prepare_patch_package_download_failure() {
    let temp_dir = TempDir::new().unwrap();
    let archive = fixture_archive(temp_dir.path());

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        fn fetch(&self, url: &str, _dest_dir: &Path) -> Result<PathBuf, DownloadError> {
            Err(DownloadError::NoAsset(url.to_owned()))
        }
    }

    let out_dir = temp_dir.path().join("prepared");
    let log = MemoryLog::new();
    let cancel_signal = AtomicBool::new(false);

    assert_matches!(
        repack::prepare_patch_package(
            &archive,
            &out_dir,
            "https://example.com/helper.apk",
            &FailingFetcher,
            &log,
            &cancel_signal,
        ),
        Err(repack::Error::Download(DownloadError::NoAsset(_)))
    );

    // The reduced package was already written; only the helper failed.
    assert!(out_dir.join("firmware_for_patch.tar").exists());
}
