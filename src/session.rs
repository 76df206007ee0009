//! # Merge Session State
//!
//! A [`MergeSession`] is created per target file and threaded explicitly
//! through every merge call for that file. It owns the short-lived decision
//! memo: when the user answers a conflict with "apply to all", the chosen
//! source is remembered for the rest of the file, but only while the exact
//! same set of conflicting sources keeps recurring. A conflict among any
//! other set of sources invalidates the memo, so a stale preference never
//! leaks into an unrelated conflict.
//!
//! Deletion conflicts and empty-vs-modified block conflicts are never
//! memoized; they are prompted every time.

use std::collections::BTreeSet;

/// File-scoped merge state: the target path and the conflict-set memo.
#[derive(Debug)]
pub struct MergeSession {
    file: String,
    memo: Option<(BTreeSet<String>, String)>,
}

impl MergeSession {
    /// Start a fresh session for one target file. The memo starts empty.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            memo: None,
        }
    }

    /// Path of the file this session covers.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Look up a remembered decision for this exact conflicting-source set.
    ///
    /// A non-matching set clears the memo and returns `None`: prompting
    /// resumes from that point.
    pub fn remembered(&mut self, sources: &BTreeSet<String>) -> Option<String> {
        match &self.memo {
            Some((set, preferred)) if set == sources => Some(preferred.clone()),
            Some(_) => {
                self.memo = None;
                None
            }
            None => None,
        }
    }

    /// Remember a preferred source for this exact conflicting-source set.
    pub fn remember(&mut self, sources: BTreeSet<String>, preferred: String) {
        self.memo = Some((sources, preferred));
    }

    /// Drop any remembered decision.
    pub fn clear(&mut self) {
        self.memo = None;
    }
}
