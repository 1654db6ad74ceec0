// gantry: Build task planning and ordering engine.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! Planning diagnostics.
//!
//! Diagnostics never abort planning. They are collected per target, merged
//! in build order at the end, and surface to the user as ordinary build
//! warnings and errors.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Name of the target the diagnostic is attached to, if any.
    pub target: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(target: Option<&str>, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            target: target.map(str::to_owned),
            message: message.into(),
        }
    }

    pub fn error(target: Option<&str>, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            target: target.map(str::to_owned),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(t) => write!(f, "{} ({}): {}", self.severity, t, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Collects diagnostics emitted by producers of one target.
///
/// Shared by reference between the producers of a target. Every pushed
/// diagnostic is also forwarded to the `log` facade.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    items: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diag: Diagnostic) {
        match diag.severity {
            Severity::Warning => log::warn!("{}", diag),
            Severity::Error => log::error!("{}", diag),
        }
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diag);
    }

    pub fn extend(&self, diags: impl IntoIterator<Item = Diagnostic>) {
        for d in diags {
            self.push(d);
        }
    }

    pub fn warning(&self, target: Option<&str>, message: impl Into<String>) {
        self.push(Diagnostic::warning(target, message));
    }

    pub fn error(&self, target: Option<&str>, message: impl Into<String>) {
        self.push(Diagnostic::error(target, message));
    }

    pub fn has_errors(&self) -> bool {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.items
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_keeps_order_and_tracks_errors() {
        let sink = DiagnosticSink::new();
        sink.warning(Some("A"), "first");
        assert!(!sink.has_errors());
        sink.error(None, "second");
        assert!(sink.has_errors());
        let items = sink.into_inner();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].to_string(), "warning (A): first");
        assert_eq!(items[1].to_string(), "error: second");
    }
}
