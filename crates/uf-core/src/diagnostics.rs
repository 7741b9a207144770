//! Explicit diagnostics collector.
//!
//! Simulation calls take a `&mut Diagnostics` instead of reporting through
//! process-wide state, so independent scenarios keep independent logs.

use std::fmt;

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// One message attributed to the model (or block) that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub source: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{tag}] {}: {}", self.source, self.message)
    }
}

/// Collector for diagnostics. Identical entries are recorded once, so a
/// model that fails on every time step does not flood the log.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, source: &str, message: impl Into<String>) {
        self.push(Severity::Warning, source, message.into());
    }

    pub fn error(&mut self, source: &str, message: impl Into<String>) {
        self.push(Severity::Error, source, message.into());
    }

    fn push(&mut self, severity: Severity, source: &str, message: String) {
        let entry = Diagnostic {
            severity,
            source: source.to_string(),
            message,
        };
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Entries raised by a single source.
    pub fn for_source<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.entries.iter().filter(move |d| d.source == source)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
