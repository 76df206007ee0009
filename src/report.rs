//! # Merge Reporting
//!
//! Every merge decision leaves a structured [`LogEntry`]. The
//! [`MergeReporter`] accumulates them in order across files and renders the
//! plain-text report that ships next to the merged output: one section per
//! file, headed by a fixed delimiter line and the list of contributing
//! mods, then one stanza per change, addition, deletion, or replacement.

use std::fmt::Write as _;

/// One structured report entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Starts a new per-file section.
    FileHeader { path: String, sources: Vec<String> },
    /// A unit's value was changed, with provenance.
    Change {
        signature: String,
        original: String,
        chosen: String,
        source: String,
    },
    /// A unit absent from the baseline was added.
    Addition { signature: String, source: String },
    /// A baseline unit was removed.
    Deletion { signature: String, source: String },
    /// A whole block was replaced as an indivisible unit.
    BlockReplacement { name: String, source: String },
    /// A whole file was taken from one contributor as-is.
    FileChoice { path: String, source: String },
}

const DELIMITER: &str =
    "==============================================================================";

/// Ordered accumulator of [`LogEntry`] values.
#[derive(Debug, Default)]
pub struct MergeReporter {
    entries: Vec<LogEntry>,
}

impl MergeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new per-file section naming the contributing mods.
    pub fn start_file(&mut self, path: impl Into<String>, sources: Vec<String>) {
        self.entries.push(LogEntry::FileHeader {
            path: path.into(),
            sources,
        });
    }

    pub fn log_change(
        &mut self,
        signature: impl Into<String>,
        original: impl Into<String>,
        chosen: impl Into<String>,
        source: impl Into<String>,
    ) {
        self.entries.push(LogEntry::Change {
            signature: signature.into(),
            original: original.into(),
            chosen: chosen.into(),
            source: source.into(),
        });
    }

    pub fn log_addition(&mut self, signature: impl Into<String>, source: impl Into<String>) {
        self.entries.push(LogEntry::Addition {
            signature: signature.into(),
            source: source.into(),
        });
    }

    pub fn log_deletion(&mut self, signature: impl Into<String>, source: impl Into<String>) {
        self.entries.push(LogEntry::Deletion {
            signature: signature.into(),
            source: source.into(),
        });
    }

    pub fn log_block_replacement(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.entries.push(LogEntry::BlockReplacement {
            name: name.into(),
            source: source.into(),
        });
    }

    pub fn log_file_choice(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.entries.push(LogEntry::FileChoice {
            path: path.into(),
            source: source.into(),
        });
    }

    /// Append an already-built entry, used when stitching per-file logs
    /// back into one combined report.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the reporter, returning the ordered entries.
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    /// Render the accumulated entries as the plain-text merge report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut first_file = true;
        for entry in &self.entries {
            match entry {
                LogEntry::FileHeader { path, sources } => {
                    if !first_file {
                        out.push('\n');
                    }
                    first_file = false;
                    let _ = writeln!(out, "{DELIMITER}");
                    let _ = writeln!(out, "MERGED FILE: {path}");
                    let _ = writeln!(out, "{DELIMITER}");
                    let _ = writeln!(out);
                    let _ = writeln!(out, "Contributing Mods:");
                    for source in sources {
                        let _ = writeln!(out, " - {source}");
                    }
                    let _ = writeln!(out);
                }
                LogEntry::Change {
                    signature,
                    original,
                    chosen,
                    source,
                } => {
                    let _ = writeln!(out, "-- CHANGE for '{signature}' --");
                    let _ = writeln!(out, " -> Original Value: {original}");
                    let _ = writeln!(out, " -> Change from '{source}': {chosen}");
                    let _ = writeln!(out);
                }
                LogEntry::Addition { signature, source } => {
                    let _ = writeln!(out, "-- ADDED '{signature}' from '{source}' --");
                    let _ = writeln!(out);
                }
                LogEntry::Deletion { signature, source } => {
                    let _ = writeln!(out, "-- DELETED '{signature}' (by '{source}') --");
                    let _ = writeln!(out);
                }
                LogEntry::BlockReplacement { name, source } => {
                    let _ = writeln!(out, "-- BLOCK REPLACED '{name}' from '{source}' --");
                    let _ = writeln!(out);
                }
                LogEntry::FileChoice { path, source } => {
                    let _ = writeln!(out, "-- FILE TAKEN WHOLE: '{path}' from '{source}' --");
                    let _ = writeln!(out);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_file_section() {
        let mut reporter = MergeReporter::new();
        reporter.start_file(
            "data/scripts/ai.scr",
            vec!["hardcore.pak".to_string(), "tweaks.pak".to_string()],
        );
        reporter.log_change("Param_max_speed", "Param(\"max_speed\", 5);", "Param(\"max_speed\", 6);", "tweaks.pak");
        reporter.log_addition("Param_new_thing", "hardcore.pak");
        reporter.log_deletion("Spawn();", "tweaks.pak");

        let text = reporter.render();
        assert!(text.starts_with(DELIMITER));
        assert!(text.contains("MERGED FILE: data/scripts/ai.scr"));
        assert!(text.contains(" - hardcore.pak"));
        assert!(text.contains(" - tweaks.pak"));
        assert!(text.contains("-- CHANGE for 'Param_max_speed' --"));
        assert!(text.contains(" -> Original Value: Param(\"max_speed\", 5);"));
        assert!(text.contains("-- ADDED 'Param_new_thing' from 'hardcore.pak' --"));
        assert!(text.contains("-- DELETED 'Spawn();' (by 'tweaks.pak') --"));
    }

    #[test]
    fn test_second_file_separated_by_blank_line() {
        let mut reporter = MergeReporter::new();
        reporter.start_file("a.scr", vec!["m.pak".to_string()]);
        reporter.start_file("b.scr", vec!["m.pak".to_string()]);
        let text = reporter.render();
        assert!(text.contains(&format!("\n\n{DELIMITER}\nMERGED FILE: b.scr")));
    }

    #[test]
    fn test_empty_reporter_renders_nothing() {
        assert!(MergeReporter::new().render().is_empty());
    }
}
