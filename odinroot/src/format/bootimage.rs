// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Parser for the legacy Android boot image header as found in Samsung
//! firmware. Only the fields needed to locate the kernel and ramdisk and to
//! describe the image to the operator are decoded.

use std::{
    fmt,
    io::{self, Read},
    mem,
    str::{self, Utf8Error},
};

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zerocopy::{FromBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    format::padding::ZeroPadding,
    stream::{FromReader, ReadFixedSizeExt},
    util::NumBytes,
};

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;

/// Page size to assume when the header declares zero. Seen on very old
/// Exynos images.
pub const DEFAULT_PAGE_SIZE: u32 = 2048;

/// Total size of the decoded header region.
pub const HEADER_SIZE: usize = BOOT_MAGIC.len() + mem::size_of::<RawHeader>();

const GZIP_KERNEL_MAGIC: [u8; 2] = [0x1f, 0x8b];
const LZ4_KERNEL_MAGIC: [u8; 2] = [0x04, 0x22];

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown magic: {0:?}")]
    UnknownMagic([u8; 8]),
    #[error("{0:?} field is not UTF-8 encoded: {data:?}", data = .2.as_bstr())]
    StringNotUtf8(&'static str, #[source] Utf8Error, Vec<u8>),
    #[error("{0:?} region is out of bounds: {1:?} + {2:?}")]
    SectionOutOfBounds(&'static str, u64, NumBytes<u32>),
    #[error("Failed to read boot image data: {0}")]
    DataRead(&'static str, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout of the header fields following the magic.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawHeader {
    kernel_size: little_endian::U32,
    kernel_addr: little_endian::U32,
    ramdisk_size: little_endian::U32,
    ramdisk_addr: little_endian::U32,
    second_size: little_endian::U32,
    second_addr: little_endian::U32,
    tags_addr: little_endian::U32,
    page_size: little_endian::U32,
    header_version: little_endian::U32,
    os_version: little_endian::U32,
    os_patch_level: little_endian::U32,
    name: [u8; BOOT_NAME_SIZE],
    cmdline: [u8; BOOT_ARGS_SIZE],
}

/// Android OS version packed into the upper bits of a header word.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OsVersion {
    pub fn from_packed(value: u32) -> Self {
        Self {
            major: (value >> 25) & 0x7f,
            minor: (value >> 18) & 0x7f,
            patch: (value >> 11) & 0x7f,
        }
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Android security patch level packed into the lower bits of a header word.
/// The year is stored as an offset from 2000.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct OsPatchLevel {
    pub year: u32,
    pub month: u32,
}

impl OsPatchLevel {
    pub fn from_packed(value: u32) -> Self {
        Self {
            year: 2000 + ((value >> 4) & 0x7f),
            month: value & 0xf,
        }
    }
}

impl fmt::Display for OsPatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Compression format of the kernel blob, sniffed from its leading bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum KernelFormat {
    Gzip,
    Lz4,
    Unknown,
}

impl fmt::Display for KernelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gzip => "gzip",
            Self::Lz4 => "lz4",
            Self::Unknown => "unknown",
        };

        write!(f, "{s}")
    }
}

/// Decoded boot image header. `page_size` is already normalized, so it's
/// never zero.
#[derive(Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct BootHeader {
    pub kernel_size: u32,
    pub ramdisk_size: u32,
    pub second_size: u32,
    pub page_size: u32,
    pub header_version: u32,
    pub os_version: OsVersion,
    pub os_patch_level: OsPatchLevel,
    pub name: String,
    pub cmdline: String,
}

impl fmt::Debug for BootHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootHeader")
            .field("kernel_size", &NumBytes(self.kernel_size))
            .field("ramdisk_size", &NumBytes(self.ramdisk_size))
            .field("second_size", &NumBytes(self.second_size))
            .field("page_size", &self.page_size)
            .field("header_version", &self.header_version)
            .field("os_version", &self.os_version)
            .field("os_patch_level", &self.os_patch_level)
            .field("name", &self.name)
            .field("cmdline", &self.cmdline)
            .finish()
    }
}

impl fmt::Display for BootHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Boot image v{} header:", self.header_version)?;
        writeln!(f, "- Kernel size:      {}", self.kernel_size)?;
        writeln!(f, "- Ramdisk size:     {}", self.ramdisk_size)?;
        writeln!(f, "- Second stage size: {}", self.second_size)?;
        writeln!(f, "- Page size:        {}", self.page_size)?;
        writeln!(f, "- OS version:       {}", self.os_version)?;
        writeln!(f, "- OS patch level:   {}", self.os_patch_level)?;
        writeln!(f, "- Board name:       {:?}", self.name)?;
        write!(f, "- Kernel cmdline:   {:?}", self.cmdline)?;

        Ok(())
    }
}

fn parse_str(field: &'static str, data: &[u8]) -> Result<String> {
    let trimmed = data.trim_end_padding();

    let s = str::from_utf8(trimmed)
        .map_err(|e| Error::StringNotUtf8(field, e, trimmed.to_vec()))?;

    Ok(s.to_owned())
}

impl BootHeader {
    /// Parse the header from the start of a fully loaded image.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::from_reader(data)
    }

    /// Number of pages the kernel occupies, rounded up.
    pub fn kernel_pages(&self) -> u32 {
        self.kernel_size.div_ceil(self.page_size)
    }

    /// Offset of the kernel blob. The header always occupies exactly one
    /// page.
    pub fn kernel_offset(&self) -> u64 {
        u64::from(self.page_size)
    }

    /// Offset of the ramdisk blob, which follows the page-aligned kernel.
    pub fn ramdisk_offset(&self) -> u64 {
        u64::from(1 + self.kernel_pages()) * u64::from(self.page_size)
    }

    /// Borrow the kernel blob out of a fully loaded image.
    pub fn kernel_data<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        section(data, "kernel", self.kernel_offset(), self.kernel_size)
    }

    /// Borrow the ramdisk blob out of a fully loaded image.
    pub fn ramdisk_data<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        section(data, "ramdisk", self.ramdisk_offset(), self.ramdisk_size)
    }

    /// Sniff the compression format of the kernel blob.
    pub fn kernel_format(&self, data: &[u8]) -> Result<KernelFormat> {
        let kernel = self.kernel_data(data)?;

        let format = match kernel.get(0..2) {
            Some(m) if *m == GZIP_KERNEL_MAGIC => KernelFormat::Gzip,
            Some(m) if *m == LZ4_KERNEL_MAGIC => KernelFormat::Lz4,
            _ => KernelFormat::Unknown,
        };

        Ok(format)
    }
}

fn section<'a>(
    data: &'a [u8],
    name: &'static str,
    offset: u64,
    size: u32,
) -> Result<&'a [u8]> {
    let start = usize::try_from(offset)
        .map_err(|_| Error::SectionOutOfBounds(name, offset, NumBytes(size)))?;
    let end = start
        .checked_add(size as usize)
        .filter(|e| *e <= data.len())
        .ok_or(Error::SectionOutOfBounds(name, offset, NumBytes(size)))?;

    Ok(&data[start..end])
}

impl<R: Read> FromReader<R> for BootHeader {
    type Error = Error;

    fn from_reader(mut reader: R) -> Result<Self> {
        let magic = reader
            .read_array_exact::<8>()
            .map_err(|e| Error::DataRead("magic", e))?;

        if magic != BOOT_MAGIC {
            return Err(Error::UnknownMagic(magic));
        }

        let raw = RawHeader::read_from_io(&mut reader)
            .map_err(|e| Error::DataRead("header", e))?;

        let mut page_size = raw.page_size.get();
        if page_size == 0 {
            page_size = DEFAULT_PAGE_SIZE;
        }

        Ok(Self {
            kernel_size: raw.kernel_size.get(),
            ramdisk_size: raw.ramdisk_size.get(),
            second_size: raw.second_size.get(),
            page_size,
            header_version: raw.header_version.get(),
            os_version: OsVersion::from_packed(raw.os_version.get()),
            os_patch_level: OsPatchLevel::from_packed(raw.os_patch_level.get()),
            name: parse_str("name", &raw.name)?,
            cmdline: parse_str("cmdline", &raw.cmdline)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn packed_os_fields() {
        // 14.0.0, patch level 2024-07.
        let version = OsVersion::from_packed(14 << 25);
        assert_eq!(version.major, 14);
        assert_eq!(version.minor, 0);
        assert_eq!(version.patch, 0);
        assert_eq!(version.to_string(), "14.0.0");

        let patch = OsPatchLevel::from_packed((24 << 4) | 7);
        assert_eq!(patch.year, 2024);
        assert_eq!(patch.month, 7);
        assert_eq!(patch.to_string(), "2024-07");
    }

    #[test]
    fn bad_magic() {
        let data = vec![0x5au8; 2048];

        assert_matches!(BootHeader::parse(&data), Err(Error::UnknownMagic(_)));
    }
}
