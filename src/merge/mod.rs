//! # Merge Strategies
//!
//! One shared baseline, N mod variants, one consolidated output per file.
//! Not every file class can take the same granularity, though: the
//! recursive tree merge (`tree`) is the default for script files, while a
//! handful of known file names need coarser atomic units to avoid either
//! spurious conflicts or unsafe partial edits of tightly coupled
//! declarations:
//!
//! - `line`: one logical line is the atomic unit, no recursion
//! - `keyed`: named-parameter declarations keyed by their name
//! - `block`: entire top-level named blocks, indivisible
//! - `definition`: `(Type, Name) -> Value` triples under a fixed grammar
//!
//! Every strategy shares the same contract: `(baseline, variants)` in,
//! merged text plus report entries out, conflicts settled through the same
//! [`crate::resolve::DecisionProvider`] and session memo.

pub mod block;
pub mod definition;
pub mod keyed;
pub mod line;
pub mod tree;

use crate::config::{MergeConfig, ANNOTATION_TAG, SCRIPT_EXTENSION};
use crate::error::Result;
use crate::report::MergeReporter;
use crate::resolve::DecisionProvider;
use crate::session::MergeSession;

/// Which merge strategy handles a given path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Recursive structural tree merge (default for script files).
    Tree,
    /// Flat line-granularity merge.
    LineBased,
    /// Named-parameter declarations keyed by name.
    KeyedParams,
    /// Indivisible top-level named blocks.
    NamedBlocks,
    /// Definition triples under a fixed grammar.
    Definitions,
    /// Not mergeable text; resolved as a whole-file choice.
    Opaque,
}

/// Classify a target path by file identity.
///
/// Matching is on the file name alone, case-insensitively; anything that is
/// not a script file is opaque.
pub fn classify(path: &str, config: &MergeConfig) -> FileClass {
    let lower = path.to_ascii_lowercase();
    if !lower.ends_with(SCRIPT_EXTENSION) {
        return FileClass::Opaque;
    }
    let name = lower.rsplit(['/', '\\']).next().unwrap_or(&lower);
    let hit = |table: &[String]| table.iter().any(|t| t.eq_ignore_ascii_case(name));

    if hit(&config.classes.line_based) {
        FileClass::LineBased
    } else if hit(&config.classes.keyed_params) {
        FileClass::KeyedParams
    } else if hit(&config.classes.named_blocks) {
        FileClass::NamedBlocks
    } else if hit(&config.classes.definitions) {
        FileClass::Definitions
    } else {
        FileClass::Tree
    }
}

/// Merge one script file with the strategy its path classifies to.
///
/// `variants` pairs each contributing mod's source id with its decoded text
/// for this file. The caller opens the reporter section and owns the
/// per-file session.
pub fn merge_script(
    path: &str,
    baseline: &str,
    variants: &[(String, String)],
    config: &MergeConfig,
    provider: &mut dyn DecisionProvider,
    session: &mut MergeSession,
    reporter: &mut MergeReporter,
) -> Result<String> {
    match classify(path, config) {
        FileClass::LineBased => line::merge_file(path, baseline, variants, config, provider, session, reporter),
        FileClass::KeyedParams => keyed::merge_file(path, baseline, variants, config, provider, session, reporter),
        FileClass::NamedBlocks => block::merge_file(path, baseline, variants, config, provider, session, reporter),
        FileClass::Definitions => definition::merge_file(path, baseline, variants, config, provider, session, reporter),
        FileClass::Tree | FileClass::Opaque => {
            tree::merge_file(path, baseline, variants, config, provider, session, reporter)
        }
    }
}

/// Append a provenance comment to a code line.
///
/// Lines already carrying a trailing comment get ` -- ` appended to it so
/// the line stays a single comment.
pub(crate) fn annotate_line(line: &str, comment: &str) -> String {
    let trimmed = line.trim_end();
    if trimmed.contains("//") {
        format!("{trimmed} -- {comment}")
    } else {
        format!("{trimmed}\t// {comment}")
    }
}

/// Inline annotation for a changed line.
pub(crate) fn updated_comment(source: &str, original: &str) -> String {
    format!("{ANNOTATION_TAG} updated from {source} (was: {original})")
}

/// Inline annotation for an added line.
pub(crate) fn added_comment(source: &str) -> String {
    format!("{ANNOTATION_TAG} added from {source}")
}

/// Standalone lead comment line for block-level provenance.
pub(crate) fn lead_comment(action: &str, source: &str) -> String {
    format!("// -- {ANNOTATION_TAG} {action} {source} --")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_stock_tables() {
        let config = MergeConfig::default();
        assert_eq!(classify("data/scripts/inputs_keyboard.scr", &config), FileClass::LineBased);
        assert_eq!(classify("data/scripts/player_variables.scr", &config), FileClass::KeyedParams);
        assert_eq!(classify("data/scripts/jump_parameters.scr", &config), FileClass::NamedBlocks);
        assert_eq!(classify("data/scripts/healthdefinitions.scr", &config), FileClass::Definitions);
        assert_eq!(classify("data/scripts/ai_behavior.scr", &config), FileClass::Tree);
        assert_eq!(classify("data/textures/icon.dds", &config), FileClass::Opaque);
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let config = MergeConfig::default();
        assert_eq!(classify("Data\\Scripts\\Player_Variables.SCR", &config), FileClass::KeyedParams);
    }

    #[test]
    fn test_annotate_line_plain() {
        let annotated = annotate_line("Param(\"a\", 1);", "[modmeld] added from x.pak");
        assert_eq!(annotated, "Param(\"a\", 1);\t// [modmeld] added from x.pak");
    }

    #[test]
    fn test_annotate_line_with_existing_comment() {
        let annotated = annotate_line("Param(\"a\", 1); // tuned", "[modmeld] added from x.pak");
        assert_eq!(annotated, "Param(\"a\", 1); // tuned -- [modmeld] added from x.pak");
    }
}
