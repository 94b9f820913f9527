// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

pub mod args;
pub mod boot;
pub mod completion;
pub mod tar;
pub mod vbmeta;

use crate::report::{LogLevel, LogSink};

macro_rules! status {
    ($($arg:tt)*) => {
        println!("\x1b[1m[*] {}\x1b[0m", format!($($arg)*))
    }
}

macro_rules! warning {
    ($($arg:tt)*) => {
        println!("\x1b[1;31m[WARNING] {}\x1b[0m", format!($($arg)+))
    }
}

pub(crate) use status;

/// Console renderer for operation progress lines.
pub struct ConsoleLog;

impl LogSink for ConsoleLog {
    fn log(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Info => println!("{line}"),
            LogLevel::Success | LogLevel::Title => status!("{line}"),
            LogLevel::Warning => warning!("{line}"),
            LogLevel::Error => println!("\x1b[1;31m[ERROR] {line}\x1b[0m"),
        }
    }
}
