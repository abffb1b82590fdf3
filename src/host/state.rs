//! Pending-test bookkeeping for one execution run.

use std::collections::BTreeSet;

/// Test names still awaiting a result.
///
/// The set only shrinks: names are supplied at construction and removed once
/// any record for them is observed. There is no way to re-insert a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTestSet {
    names: BTreeSet<String>,
}

impl PendingTestSet {
    /// Seed the set from the requested names. Duplicates collapse.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Remove `name`, returning whether it was pending.
    pub fn resolve(&mut self, name: &str) -> bool {
        self.names.remove(name)
    }

    /// Whether `name` still awaits a result.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of pending names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when every name has been resolved.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Pending names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
