// SPDX-FileCopyrightText: 2026 odinroot contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Operator-facing progress reporting. Long-running operations take a
//! [`LogSink`] so the frontend decides how lines are rendered. This is
//! separate from the tracing events, which are for diagnostics.

use std::sync::Mutex;

/// Severity of one progress line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    /// Section banner.
    Title,
}

/// Receives ordered progress lines from long-running operations.
pub trait LogSink {
    fn log(&self, level: LogLevel, line: &str);
}

/// Sink that discards everything.
pub struct NullLog;

impl LogSink for NullLog {
    fn log(&self, _level: LogLevel, _line: &str) {}
}

/// Sink that collects lines in memory, preserving order.
#[derive(Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(l, s)| *l == level && s.contains(needle))
    }
}

impl LogSink for MemoryLog {
    fn log(&self, level: LogLevel, line: &str) {
        self.lines.lock().unwrap().push((level, line.to_owned()));
    }
}
