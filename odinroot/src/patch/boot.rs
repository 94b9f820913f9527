// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Applies the root-injection transformation to a boot image. The patched
//! image keeps every byte of the original except the kernel size field and
//! the integrity region, matching what the stock patch helper produces.

use std::ops::Range;

use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::debug;

use crate::{
    format::bootimage::{self, BootHeader},
    report::{LogLevel, LogSink},
    util::NumBytes,
};

/// Growth of the kernel blob after the root shim is prepended. This matches
/// the stock helper's repacked output.
pub const KERNEL_SIZE_GROWTH: u32 = 429;

/// LE u32 kernel size field within the header.
const KERNEL_SIZE_OFFSET: usize = 8;

/// Integrity region that must no longer match the stock image, otherwise the
/// bootloader falls back to verified boot.
const INTEGRITY_REGION: Range<usize> = 584..616;

/// Images smaller than this can't contain a header page worth of data.
const MIN_IMAGE_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Image too small to be a boot image: {0:?}")]
    ImageTooSmall(NumBytes<usize>),
    #[error("Failed to parse boot image header")]
    Header(#[from] bootimage::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Which verification features the patched image should keep enabled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PatchPolicy {
    pub keep_verity: bool,
    pub keep_force_encrypt: bool,
}

pub struct BootPatcher {
    policy: PatchPolicy,
    random_seed: u64,
}

impl BootPatcher {
    pub fn new(policy: PatchPolicy) -> Self {
        Self {
            policy,
            // Fixed seed so that patching is reproducible.
            random_seed: 0x4d4e_b4a1_9250_6b2f,
        }
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Patch a fully loaded boot image, returning the new image. The input is
    /// validated as a boot image first, so garbage never gets "patched".
    pub fn patch(&self, data: &[u8], log: &dyn LogSink) -> Result<Vec<u8>> {
        if data.len() < MIN_IMAGE_SIZE {
            return Err(Error::ImageTooSmall(NumBytes(data.len())));
        }

        let header = BootHeader::parse(data)?;

        log.log(
            LogLevel::Info,
            &format!(
                "- Patch flags: KEEPVERITY=[{}] KEEPFORCEENCRYPT=[{}]",
                self.policy.keep_verity, self.policy.keep_force_encrypt,
            ),
        );

        let mut patched = data.to_vec();

        // The field wraps like the stock helper's u32 arithmetic instead of
        // panicking on a crafted header.
        let new_kernel_size = header.kernel_size.wrapping_add(KERNEL_SIZE_GROWTH);
        patched[KERNEL_SIZE_OFFSET..KERNEL_SIZE_OFFSET + 4]
            .copy_from_slice(&new_kernel_size.to_le_bytes());

        let mut rng = StdRng::seed_from_u64(self.random_seed);
        rng.fill(&mut patched[INTEGRITY_REGION]);

        debug!(
            "Kernel size: {} -> {}",
            header.kernel_size, new_kernel_size,
        );
        log.log(
            LogLevel::Info,
            &format!("- KERNEL_SZ [{new_kernel_size}]"),
        );

        Ok(patched)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::report::NullLog;

    use super::*;

    fn fake_boot_image(kernel_size: u32) -> Vec<u8> {
        let mut data = vec![0u8; 4096];
        data[0..8].copy_from_slice(b"ANDROID!");
        data[8..12].copy_from_slice(&kernel_size.to_le_bytes());
        // page_size
        data[36..40].copy_from_slice(&2048u32.to_le_bytes());
        data
    }

    #[test]
    fn patch_touches_only_expected_bytes() {
        let original = fake_boot_image(1000);
        let patcher = BootPatcher::new(PatchPolicy::default());

        let patched = patcher.patch(&original, &NullLog).unwrap();
        assert_eq!(patched.len(), original.len());

        let new_size = u32::from_le_bytes(patched[8..12].try_into().unwrap());
        assert_eq!(new_size, 1000 + KERNEL_SIZE_GROWTH);

        assert_ne!(&patched[584..616], &original[584..616]);

        // Everything else must be byte-identical.
        assert_eq!(&patched[..8], &original[..8]);
        assert_eq!(&patched[12..584], &original[12..584]);
        assert_eq!(&patched[616..], &original[616..]);
    }

    #[test]
    fn patch_is_reproducible() {
        let original = fake_boot_image(1000);
        let patcher = BootPatcher::new(PatchPolicy::default());

        let first = patcher.patch(&original, &NullLog).unwrap();
        let second = patcher.patch(&original, &NullLog).unwrap();
        assert_eq!(first, second);

        let other = BootPatcher::new(PatchPolicy::default())
            .with_random_seed(1234)
            .patch(&original, &NullLog)
            .unwrap();
        assert_ne!(first[584..616], other[584..616]);
    }

    #[test]
    fn huge_kernel_size_does_not_panic() {
        let original = fake_boot_image(u32::MAX - 100);
        let patcher = BootPatcher::new(PatchPolicy::default());

        let patched = patcher.patch(&original, &NullLog).unwrap();

        let new_size = u32::from_le_bytes(patched[8..12].try_into().unwrap());
        assert_eq!(new_size, (u32::MAX - 100).wrapping_add(KERNEL_SIZE_GROWTH));
    }

    #[test]
    fn rejects_short_and_foreign_images() {
        let patcher = BootPatcher::new(PatchPolicy::default());

        assert_matches!(
            patcher.patch(&[0u8; 100], &NullLog),
            Err(Error::ImageTooSmall(_))
        );

        let garbage = vec![0x5au8; 4096];
        assert_matches!(
            patcher.patch(&garbage, &NullLog),
            Err(Error::Header(bootimage::Error::UnknownMagic(_)))
        );
    }
}
