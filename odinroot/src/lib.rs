// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Codec and patching toolkit for Samsung Odin firmware packages: streaming
//! TAR-style archive I/O, LZ4 payload decompression, legacy boot image
//! parsing, and reassembly of flashable packages from patched images.

pub mod cli;
pub mod external;
pub mod format;
pub mod patch;
pub mod repack;
pub mod report;
pub mod stream;
pub mod util;
