// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

pub mod bootimage;
pub mod compression;
pub mod padding;
pub mod tar;
