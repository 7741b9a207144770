//! Deduplicated, insertion-ordered warning lists.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ordered list that ignores repeated entries.
///
/// Warnings are informational and never fatal; cloning a parameter record
/// clones its list with it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct WarningList<W> {
    items: Vec<W>,
}

impl<W> Default for WarningList<W> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<W: PartialEq> WarningList<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a warning; returns `false` if it was already present.
    pub fn push(&mut self, warning: W) -> bool {
        if self.items.contains(&warning) {
            return false;
        }
        self.items.push(warning);
        true
    }

    pub fn contains(&self, warning: &W) -> bool {
        self.items.contains(warning)
    }

    pub fn extend<I: IntoIterator<Item = W>>(&mut self, warnings: I) {
        for w in warnings {
            self.push(w);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, W> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[W] {
        &self.items
    }
}

impl<W: PartialEq> FromIterator<W> for WarningList<W> {
    fn from_iter<I: IntoIterator<Item = W>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<'a, W> IntoIterator for &'a WarningList<W> {
    type Item = &'a W;
    type IntoIter = std::slice::Iter<'a, W>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
