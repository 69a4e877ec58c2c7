//! One-line operator status messages.
//!
//! The terminal transcript is the operator's record, so every step prints a
//! line with a severity marker. Diagnostics go through `tracing` instead.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
}

impl Severity {
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Info => "[*]",
            Self::Success => "[+]",
            Self::Warning => "[!]",
        }
    }
}

pub fn line(severity: Severity, message: impl fmt::Display) -> String {
    format!("{} {message}", severity.marker())
}

#[allow(clippy::print_stdout)]
fn emit(severity: Severity, message: impl fmt::Display) {
    println!("{}", line(severity, message));
}

pub fn info(message: impl fmt::Display) {
    emit(Severity::Info, message);
}

pub fn success(message: impl fmt::Display) {
    emit(Severity::Success, message);
}

pub fn warn(message: impl fmt::Display) {
    emit(Severity::Warning, message);
}
