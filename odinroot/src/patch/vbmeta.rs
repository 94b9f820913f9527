// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

//! In-place vbmeta tweak that flips on the verification-disabled flag so the
//! bootloader accepts the modified boot image.

use thiserror::Error;

use crate::util::NumBytes;

/// Offset of the AVB flags byte within the vbmeta header.
const FLAGS_OFFSET: usize = 123;

const FLAG_VERIFICATION_DISABLED: u8 = 0x02;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Image too small to be a vbmeta image: {0:?}")]
    ImageTooSmall(NumBytes<usize>),
}

type Result<T> = std::result::Result<T, Error>;

/// Mark the image so that verified boot treats all partitions as unverified.
pub fn disable_verification(data: &mut [u8]) -> Result<()> {
    if data.len() <= FLAGS_OFFSET {
        return Err(Error::ImageTooSmall(NumBytes(data.len())));
    }

    data[FLAGS_OFFSET] = FLAG_VERIFICATION_DISABLED;

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn flag_write() {
        let mut data = vec![0u8; 4096];
        disable_verification(&mut data).unwrap();

        assert_eq!(data[123], 0x02);
        assert!(data[..123].iter().all(|b| *b == 0));
        assert!(data[124..].iter().all(|b| *b == 0));
    }

    #[test]
    fn too_small() {
        let mut data = vec![0u8; 64];
        assert_matches!(
            disable_verification(&mut data),
            Err(Error::ImageTooSmall(_))
        );
    }
}
