//! # Signature Derivation
//!
//! A signature is the stable identity key that aligns corresponding content
//! units across the baseline and every mod's variant of a file. It is
//! derived purely from a unit's textual shape, in priority order:
//!
//! 1. Block headers shaped `Name("Literal")` become `Name_Literal`; headers
//!    without a leading quoted literal keep their normalized full text.
//! 2. Calls to a configured allow-list of "identity-only" functions are
//!    keyed by name plus first argument literal, regardless of the
//!    remaining arguments.
//! 3. Statements nested deeper than the configured threshold collapse to
//!    their leading identifier. This trades false-positive aliasing for
//!    robustness against deep, noisy statement bodies.
//! 4. Anything else is the pre-comment, pre-assignment code portion with
//!    whitespace collapsed.
//!
//! Blank lines and full-line comments get synthetic positional keys
//! (`BLANK_n`, `LITERAL_n`). They keep their place in ordering and
//! serialization but are never matched across versions and never deleted
//! by omission.
//!
//! Duplicate signatures among direct siblings are disambiguated by
//! [`InstanceCounter`]: the k-th occurrence of a base signature (k > 1)
//! gets an `_k` suffix in first-occurrence order.

use std::collections::HashMap;

use regex::Regex;

use crate::config::SignatureConfig;

/// Prefix of the synthetic key assigned to blank lines.
pub const BLANK_PREFIX: &str = "BLANK_";

/// Prefix of the synthetic key assigned to comment lines and comment spans.
pub const LITERAL_PREFIX: &str = "LITERAL_";

/// Returns true for the synthetic positional keys of blanks and comments.
///
/// Placeholder units participate in ordering and serialization only; they
/// are excluded from cross-version matching and from deletion logic.
pub fn is_placeholder(signature: &str) -> bool {
    signature.starts_with(BLANK_PREFIX) || signature.starts_with(LITERAL_PREFIX)
}

/// Strip a trailing `//` comment from a line and trim it.
///
/// A full-line comment yields the empty string. Used wherever two versions
/// of a line are compared for "actually changed": provenance comments
/// appended by a previous merge must not count as changes.
pub fn code_part(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.find("//") {
        Some(0) => String::new(),
        Some(pos) => trimmed[..pos].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Derives signatures for lines and block headers.
pub struct SignatureIndexer {
    keyed_functions: Vec<String>,
    name_only_functions: Vec<String>,
    name_only_depth: usize,
    call_shape: Regex,
    leading_ident: Regex,
    quoted_header: Regex,
}

impl SignatureIndexer {
    pub fn new(config: &SignatureConfig) -> Self {
        Self {
            keyed_functions: config.keyed_functions.clone(),
            name_only_functions: config.name_only_functions.clone(),
            name_only_depth: config.name_only_depth,
            call_shape: Regex::new(r"^(\w+)\s*\(").expect("static regex"),
            leading_ident: Regex::new(r"^\w+").expect("static regex"),
            quoted_header: Regex::new(r#"^(\w+)\s*\(\s*"([^"]*)""#).expect("static regex"),
        }
    }

    /// Signature for a block header line (rule 1).
    pub fn block_signature(&self, header: &str) -> String {
        let trimmed = header.trim().trim_end_matches('{').trim_end();
        if let Some(caps) = self.quoted_header.captures(trimmed) {
            return format!("{}_{}", &caps[1], &caps[2]);
        }
        collapse_whitespace(trimmed)
    }

    /// Signature for a leaf line at the given nesting depth (rules 2-4).
    ///
    /// `depth` counts enclosing blocks, root content being depth 0. `order`
    /// is the unit's global order index, consumed only by the synthetic
    /// placeholder keys.
    pub fn line_signature(&self, line: &str, depth: usize, order: usize) -> String {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return format!("{BLANK_PREFIX}{order}");
        }
        if trimmed.starts_with("//") || trimmed.starts_with("/*") {
            return format!("{LITERAL_PREFIX}{order}");
        }

        if let Some(caps) = self.call_shape.captures(trimmed) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if self.name_only_functions.iter().any(|f| f == name) {
                return name.to_string();
            }
            if self.keyed_functions.iter().any(|f| f == name) {
                let rest = &trimmed[caps.get(0).map(|m| m.end()).unwrap_or(0)..];
                let first = first_argument(rest);
                if first.is_empty() {
                    return name.to_string();
                }
                return format!("{name}_{first}");
            }
        }

        if depth >= self.name_only_depth {
            return self
                .leading_ident
                .find(trimmed)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| trimmed.to_string());
        }

        let code = code_part(line);
        let code = match code.find('=') {
            Some(pos) => code[..pos].trim_end().to_string(),
            None => code,
        };
        collapse_whitespace(&code)
    }

    /// True when the line is a call to one of the identity-keyed functions.
    pub fn is_keyed_declaration(&self, line: &str) -> bool {
        self.call_shape
            .captures(line.trim())
            .map(|caps| self.keyed_functions.iter().any(|f| f == &caps[1]))
            .unwrap_or(false)
    }

    /// Signature for a line in a flat (non-tree) file.
    ///
    /// Differs from [`Self::line_signature`] in three ways: a leading `//`
    /// is stripped first, so a commented-out entry shares identity with its
    /// live form and uncommenting reads as a change; any call with a quoted
    /// first argument is keyed `Name_Arg` without consulting the allow-list;
    /// and unmappable lines (blanks, `/*` spans) return `None` instead of a
    /// positional key.
    pub fn flat_signature(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        let code = trimmed.strip_prefix("//").map(str::trim_start).unwrap_or(trimmed);
        if code.is_empty() || trimmed.starts_with("/*") {
            return None;
        }

        if let Some(caps) = self.quoted_header.captures(code) {
            if !caps[2].is_empty() {
                return Some(format!("{}_{}", &caps[1], &caps[2]));
            }
        }

        let code = code_part(code);
        let code = match code.find('=') {
            Some(pos) => code[..pos].trim_end().to_string(),
            None => code,
        };
        let normalized = collapse_whitespace(&code);
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}

/// Extract the first argument of a call, given the text following the
/// opening parenthesis. Quotes are stripped; commas inside quotes do not
/// terminate the argument.
fn first_argument(rest: &str) -> String {
    let mut in_quotes = false;
    let mut arg = String::new();
    for ch in rest.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' | ')' if !in_quotes => break,
            _ => arg.push(ch),
        }
    }
    arg.trim().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Per-parent duplicate-signature disambiguation.
///
/// Each parent scope owns one counter; feeding it the base signatures of
/// the children in order yields sibling-unique keys.
#[derive(Default)]
pub struct InstanceCounter {
    counts: HashMap<String, usize>,
}

impl InstanceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the base signature for its first occurrence, `base_k` for
    /// the k-th (k > 1). Placeholder keys are already position-unique and
    /// pass through untouched.
    pub fn disambiguate(&mut self, base: &str) -> String {
        if is_placeholder(base) {
            return base.to_string();
        }
        let count = self.counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base.to_string()
        } else {
            format!("{base}_{count}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexer() -> SignatureIndexer {
        SignatureIndexer::new(&SignatureConfig::default())
    }

    #[test]
    fn test_block_signature_quoted_literal() {
        assert_eq!(indexer().block_signature(r#"Health("Zombie")"#), "Health_Zombie");
        assert_eq!(
            indexer().block_signature(r#"  Health("Zombie")  {"#),
            "Health_Zombie"
        );
    }

    #[test]
    fn test_block_signature_without_literal_normalizes() {
        assert_eq!(indexer().block_signature("sub   main()"), "sub main()");
        assert_eq!(indexer().block_signature("AdvancedParkour() {"), "AdvancedParkour()");
    }

    #[test]
    fn test_keyed_function_ignores_remaining_arguments() {
        let sig_a = indexer().line_signature(r#"Param("max_speed", 5);"#, 0, 0);
        let sig_b = indexer().line_signature(r#"Param("max_speed", 9);"#, 0, 7);
        assert_eq!(sig_a, "Param_max_speed");
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn test_keyed_function_applies_below_depth_threshold() {
        // Rule 2 outranks the depth collapse of rule 3.
        let sig = indexer().line_signature(r#"Param("stamina", 1.0);"#, 5, 0);
        assert_eq!(sig, "Param_stamina");
    }

    #[test]
    fn test_name_only_function() {
        let sig = indexer().line_signature(r#"MotionTrailFx("a", "b");"#, 0, 0);
        assert_eq!(sig, "MotionTrailFx");
    }

    #[test]
    fn test_deep_statement_collapses_to_leading_identifier() {
        let sig = indexer().line_signature(r#"AttackDamage(12, "heavy");"#, 2, 0);
        assert_eq!(sig, "AttackDamage");
    }

    #[test]
    fn test_shallow_statement_keeps_normalized_code() {
        let sig = indexer().line_signature(r#"AttackDamage(12,  "heavy");"#, 1, 0);
        assert_eq!(sig, r#"AttackDamage(12, "heavy");"#);
    }

    #[test]
    fn test_assignment_strips_right_hand_side() {
        let sig_a = indexer().line_signature("speed  = 5", 0, 0);
        let sig_b = indexer().line_signature("speed = 99", 0, 3);
        assert_eq!(sig_a, "speed");
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn test_trailing_comment_excluded_from_identity() {
        let sig_a = indexer().line_signature("UseLegacyDodge()", 0, 0);
        let sig_b = indexer().line_signature("UseLegacyDodge()\t// [modmeld] updated", 0, 0);
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn test_blank_and_comment_placeholders() {
        assert_eq!(indexer().line_signature("   ", 0, 12), "BLANK_12");
        assert_eq!(indexer().line_signature("// note", 0, 3), "LITERAL_3");
        assert_eq!(indexer().line_signature("/* span */", 1, 8), "LITERAL_8");
        assert!(is_placeholder("BLANK_12"));
        assert!(is_placeholder("LITERAL_3"));
        assert!(!is_placeholder("Param_max_speed"));
    }

    #[test]
    fn test_code_part() {
        assert_eq!(code_part("foo(1);\t// trailing"), "foo(1);");
        assert_eq!(code_part("// whole line"), "");
        assert_eq!(code_part("  bare  "), "bare");
    }

    #[test]
    fn test_flat_signature_keys_any_quoted_call() {
        let idx = indexer();
        assert_eq!(
            idx.flat_signature("Action(\"Jump\", \"SPACE\")").as_deref(),
            Some("Action_Jump")
        );
        // commented-out entries share identity with their live form
        assert_eq!(
            idx.flat_signature("// Action(\"Jump\", \"SPACE\")").as_deref(),
            Some("Action_Jump")
        );
        assert_eq!(
            idx.flat_signature("speed = 4.5").as_deref(),
            Some("speed")
        );
        assert_eq!(idx.flat_signature("   "), None);
        assert_eq!(idx.flat_signature("/* span */"), None);
        assert_eq!(idx.flat_signature("// "), None);
    }

    #[test]
    fn test_instance_counter_suffixes_repeats() {
        let mut counter = InstanceCounter::new();
        assert_eq!(counter.disambiguate("Jump"), "Jump");
        assert_eq!(counter.disambiguate("Jump"), "Jump_2");
        assert_eq!(counter.disambiguate("Jump"), "Jump_3");
        assert_eq!(counter.disambiguate("Roll"), "Roll");
    }

    #[test]
    fn test_instance_counter_passes_placeholders_through() {
        let mut counter = InstanceCounter::new();
        assert_eq!(counter.disambiguate("BLANK_1"), "BLANK_1");
        assert_eq!(counter.disambiguate("BLANK_1"), "BLANK_1");
    }
}
