// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Codec for the TAR-style container used by Odin firmware packages (eg. AP
//! files). Entries are always regular files owned by root. Only the header
//! fields the flashing tools actually look at are interpreted; the rest of
//! each 512-byte header block stays zero.

use std::{
    collections::HashSet,
    fmt,
    io::{self, Read, Write},
};

use bstr::ByteSlice;
use thiserror::Error;
use zerocopy::{FromZeros, IntoBytes};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    format::padding,
    stream::{self, CountingWriter, WriteZerosExt},
    util::NumBytes,
};

pub const BLOCK_SIZE: u64 = 512;
/// Two zero blocks mark the end of an archive.
pub const EOF_MARKER_SIZE: u64 = 2 * BLOCK_SIZE;
pub const NAME_SIZE: usize = 100;

const CHECKSUM_OFFSET: usize = 148;
const CHECKSUM_SIZE: usize = 8;

/// Regular file, rw-r--r--.
const MODE_REGULAR: &[u8; 8] = b"0000644 ";
/// Everything is owned by root.
const UID_GID_ROOT: &[u8; 8] = b"0000000 ";
const TYPEFLAG_REGULAR: u8 = b'0';

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0:?} field is not valid octal: {data:?}", data = .1.as_bstr())]
    InvalidOctal(&'static str, Vec<u8>),
    #[error("{0:?} field exceeds integer bounds: {1:?}")]
    IntegerTooLarge(&'static str, NumBytes<u64>),
    #[error("Entry {name:?} payload is truncated")]
    Truncated {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Duplicate entry name: {0:?}")]
    DuplicateName(String),
    #[error("Entry name is not UTF-8 encoded: {data:?}", data = .0.as_bstr())]
    NameNotUtf8(Vec<u8>),
    #[error("I/O error")]
    Io(#[from] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Parse a NUL/space-padded ASCII octal field. An empty field decodes as zero,
/// matching what old packing tools emit for unset values.
fn read_octal(field: &'static str, data: &[u8]) -> Result<u64> {
    let trimmed = data.trim_with(|c| c == ' ' || c == '\0');

    let mut value = 0u64;

    for &b in trimmed {
        let digit = (b as char)
            .to_digit(8)
            .ok_or_else(|| Error::InvalidOctal(field, data.to_vec()))?;

        value <<= 3;
        value |= u64::from(digit);
    }

    Ok(value)
}

/// Write a zero-padded ASCII octal field with a trailing space, the way Odin
/// packages encode size and mtime.
fn write_octal<const N: usize>(field: &'static str, value: u64) -> Result<[u8; N]> {
    let mut buf = [b'0'; N];
    buf[N - 1] = b' ';

    let mut remain = value;
    let mut index = N - 1;

    while remain != 0 {
        if index == 0 {
            return Err(Error::IntegerTooLarge(field, NumBytes(value)));
        }

        index -= 1;
        buf[index] = b'0' + (remain & 0o7) as u8;
        remain >>= 3;
    }

    Ok(buf)
}

/// Raw layout of one header block. This is the pre-POSIX layout; the ustar
/// fields after `typeflag` are left zeroed.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawHeader {
    name: [u8; NAME_SIZE],
    mode: [u8; 8],
    uid: [u8; 8],
    gid: [u8; 8],
    size: [u8; 12],
    mtime: [u8; 12],
    checksum: [u8; CHECKSUM_SIZE],
    typeflag: u8,
    remainder: [u8; 355],
}

/// Compute the header checksum: the byte sum of the block with the checksum
/// field treated as eight ASCII spaces.
pub fn header_checksum(block: &[u8; BLOCK_SIZE as usize]) -> u32 {
    let mut sum = 0u32;

    for (i, b) in block.iter().enumerate() {
        if (CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_SIZE).contains(&i) {
            sum += u32::from(b' ');
        } else {
            sum += u32::from(*b);
        }
    }

    sum
}

/// Metadata for one archive entry. The payload is streamed separately via
/// [`TarReader`] and [`TarWriter`].
#[derive(Clone, PartialEq, Eq)]
pub struct TarHeader {
    pub name: String,
    pub size: u64,
    pub mtime: u64,
}

impl fmt::Debug for TarHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarHeader")
            .field("name", &self.name)
            .field("size", &NumBytes(self.size))
            .field("mtime", &self.mtime)
            .finish()
    }
}

impl TarHeader {
    fn from_raw(raw: &RawHeader) -> Result<Self> {
        let name_raw = raw.name.trim_with(|c| c == ' ' || c == '\0');
        let name = name_raw
            .to_str()
            .map_err(|_| Error::NameNotUtf8(name_raw.to_vec()))?
            .to_owned();

        let size = read_octal("size", &raw.size)?;
        let mtime = read_octal("mtime", &raw.mtime)?;

        Ok(Self { name, size, mtime })
    }

    /// Serialize to a 512-byte header block with a valid checksum. The name is
    /// truncated to the 100-byte field if it's too long.
    pub fn to_block(&self) -> Result<[u8; BLOCK_SIZE as usize]> {
        let mut raw = RawHeader::new_zeroed();

        let name_bytes = self.name.as_bytes();
        let name_len = name_bytes.len().min(NAME_SIZE);
        raw.name[..name_len].copy_from_slice(&name_bytes[..name_len]);

        raw.mode = *MODE_REGULAR;
        raw.uid = *UID_GID_ROOT;
        raw.gid = *UID_GID_ROOT;
        raw.size = write_octal("size", self.size)?;
        raw.mtime = write_octal("mtime", self.mtime)?;
        raw.checksum = *b"        ";
        raw.typeflag = TYPEFLAG_REGULAR;

        let mut block = [0u8; BLOCK_SIZE as usize];
        block.copy_from_slice(raw.as_bytes());

        // Six octal digits, NUL, space.
        let sum = header_checksum(&block);
        let mut checksum = [b'0'; CHECKSUM_SIZE];
        let mut remain = sum;
        let mut index = 5;
        while remain != 0 {
            checksum[index] = b'0' + (remain & 0o7) as u8;
            remain >>= 3;
            index -= 1;
        }
        checksum[6] = b'\0';
        checksum[7] = b' ';

        block[CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_SIZE].copy_from_slice(&checksum);

        Ok(block)
    }
}

/// Streaming archive reader. Entries are visited in order and payloads are
/// never buffered in memory; an unconsumed payload is skipped when the next
/// entry is requested.
pub struct TarReader<R: Read> {
    inner: R,
    current: Option<TarHeader>,
    // Payload bytes plus block padding not yet consumed.
    data_remaining: u64,
    pad_remaining: u64,
    done: bool,
}

impl<R: Read> TarReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            current: None,
            data_remaining: 0,
            pad_remaining: 0,
            done: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Advance to the next entry, skipping any unread payload of the current
    /// one. Returns [`None`] once a terminator block or a clean EOF at a block
    /// boundary is reached.
    pub fn next_entry(&mut self) -> Result<Option<TarHeader>> {
        if self.done {
            return Ok(None);
        }

        self.skip_data()?;

        let mut block = [0u8; BLOCK_SIZE as usize];

        // The first read distinguishes a clean EOF at a block boundary from a
        // header torn mid-block. Archives from some packing tools end without
        // terminator blocks, so running out of headers entirely is fine.
        let n = self.inner.read(&mut block)?;
        if n == 0 {
            self.done = true;
            return Ok(None);
        }

        if let Err(e) = self.inner.read_exact(&mut block[n..]) {
            return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Archive ends partway through a header block",
                )
                .into()
            } else {
                e.into()
            });
        }

        let raw: RawHeader = zerocopy::transmute!(block);

        if raw.name[0] == 0 {
            self.done = true;
            return Ok(None);
        }

        let header = TarHeader::from_raw(&raw)?;

        self.data_remaining = header.size;
        self.pad_remaining = padding::calc(header.size, BLOCK_SIZE);
        self.current = Some(header.clone());

        Ok(Some(header))
    }

    /// Stream the current entry's payload into `writer`. Hitting EOF before
    /// the declared size is fully read fails with [`Error::Truncated`].
    pub fn copy_data(&mut self, mut writer: impl Write) -> Result<u64> {
        let size = self.data_remaining;

        if let Err(e) = stream::copy_n(&mut self.inner, &mut writer, size) {
            return Err(self.truncated(e));
        }
        if let Err(e) = stream::copy_n(&mut self.inner, io::sink(), self.pad_remaining) {
            return Err(self.truncated(e));
        }

        self.data_remaining = 0;
        self.pad_remaining = 0;

        Ok(size)
    }

    /// Discard the remainder of the current entry's payload and padding.
    pub fn skip_data(&mut self) -> Result<()> {
        let remaining = self.data_remaining + self.pad_remaining;

        if let Err(e) = stream::copy_n(&mut self.inner, io::sink(), remaining) {
            return Err(self.truncated(e));
        }

        self.data_remaining = 0;
        self.pad_remaining = 0;

        Ok(())
    }

    fn truncated(&self, e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated {
                name: self
                    .current
                    .as_ref()
                    .map(|h| h.name.clone())
                    .unwrap_or_default(),
                source: e,
            }
        } else {
            e.into()
        }
    }
}

/// Streaming archive writer. Every payload is padded to a block boundary and
/// [`TarWriter::finish`] appends the terminator blocks.
pub struct TarWriter<W: Write> {
    inner: CountingWriter<W>,
    seen: HashSet<String>,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: CountingWriter::new(inner),
            seen: HashSet::new(),
        }
    }

    /// Append one entry, copying exactly `header.size` bytes from `reader`.
    pub fn append(&mut self, header: &TarHeader, mut reader: impl Read) -> Result<()> {
        if !self.seen.insert(header.name.clone()) {
            return Err(Error::DuplicateName(header.name.clone()));
        }

        let block = header.to_block()?;
        self.inner.write_all(&block)?;

        stream::copy_n(&mut reader, &mut self.inner, header.size).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Truncated {
                    name: header.name.clone(),
                    source: e,
                }
            } else {
                e.into()
            }
        })?;

        padding::write_zeros(&mut self.inner, BLOCK_SIZE)?;

        Ok(())
    }

    /// Write the terminator blocks and return the underlying writer. The
    /// archive is not valid until this is called.
    pub fn finish(mut self) -> Result<W> {
        self.inner.write_zeros_exact(EOF_MARKER_SIZE)?;

        let (inner, _) = self.inner.finish();
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn octal_fields() {
        assert_eq!(read_octal("size", b"00000000644 ").unwrap(), 0o644);
        assert_eq!(read_octal("size", b"   644\0").unwrap(), 0o644);
        assert_eq!(read_octal("size", b"\0\0\0\0").unwrap(), 0);
        assert_matches!(
            read_octal("size", b"0000000qqq "),
            Err(Error::InvalidOctal("size", _))
        );

        assert_eq!(&write_octal::<12>("size", 0o644).unwrap(), b"00000000644 ");
        assert_eq!(&write_octal::<12>("size", 0).unwrap(), b"00000000000 ");

        // All eleven digit positions of the 12-byte field are usable.
        assert_eq!(
            &write_octal::<12>("mtime", 1_700_000_000).unwrap(),
            b"14524770400 "
        );
        assert_eq!(
            &write_octal::<12>("size", 0o77777777777).unwrap(),
            b"77777777777 "
        );
        assert_matches!(
            write_octal::<12>("size", 1 << 33),
            Err(Error::IntegerTooLarge("size", _))
        );
        assert_matches!(
            write_octal::<4>("size", 0o7777),
            Err(Error::IntegerTooLarge("size", _))
        );
    }

    #[test]
    fn checksum_encoding() {
        let header = TarHeader {
            name: "boot.img".to_owned(),
            size: 1024,
            mtime: 0,
        };

        let block = header.to_block().unwrap();
        let sum = header_checksum(&block);

        let mut expected = [b'0'; 6];
        let mut remain = sum;
        let mut index = 5;
        while remain != 0 {
            expected[index] = b'0' + (remain & 0o7) as u8;
            remain >>= 3;
            index -= 1;
        }

        assert_eq!(&block[148..154], &expected);
        assert_eq!(block[154], b'\0');
        assert_eq!(block[155], b' ');
    }

    #[test]
    fn fixed_fields() {
        let header = TarHeader {
            name: "boot.img".to_owned(),
            size: 123,
            mtime: 456,
        };

        let block = header.to_block().unwrap();

        assert_eq!(&block[0..8], b"boot.img");
        assert!(block[8..100].iter().all(|b| *b == 0));
        assert_eq!(&block[100..108], b"0000644 ");
        assert_eq!(&block[108..116], b"0000000 ");
        assert_eq!(&block[116..124], b"0000000 ");
        assert_eq!(&block[124..136], b"00000000173 ");
        assert_eq!(&block[136..148], b"00000000710 ");
        assert_eq!(block[156], b'0');
        assert!(block[157..].iter().all(|b| *b == 0));
    }

    #[test]
    fn duplicate_names() {
        let mut writer = TarWriter::new(Cursor::new(vec![]));
        let header = TarHeader {
            name: "boot.img".to_owned(),
            size: 0,
            mtime: 0,
        };

        writer.append(&header, io::empty()).unwrap();
        assert_matches!(
            writer.append(&header, io::empty()),
            Err(Error::DuplicateName(name)) if name == "boot.img"
        );
    }

    #[test]
    fn truncated_payload() {
        let header = TarHeader {
            name: "boot.img".to_owned(),
            size: 100,
            mtime: 0,
        };

        let mut data = header.to_block().unwrap().to_vec();
        data.extend_from_slice(&[0xaa; 10]);

        let mut reader = TarReader::new(Cursor::new(data));
        reader.next_entry().unwrap().unwrap();

        assert_matches!(
            reader.copy_data(io::sink()),
            Err(Error::Truncated { name, .. }) if name == "boot.img"
        );
    }

    #[test]
    fn name_padding_trimmed() {
        let header = TarHeader {
            name: "boot.img".to_owned(),
            size: 0,
            mtime: 0,
        };

        let mut block = header.to_block().unwrap();
        // Some tools pad names with spaces instead of NULs.
        block[8] = b' ';
        block[9] = b' ';

        let mut reader = TarReader::new(Cursor::new(block.to_vec()));
        let parsed = reader.next_entry().unwrap().unwrap();
        assert_eq!(parsed.name, "boot.img");
    }
}
