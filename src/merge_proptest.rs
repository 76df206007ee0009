//! Property-based tests for the parse/serialize round trip and the merge
//! identity properties.
//!
//! These tests use proptest to generate random script-like inputs and
//! verify that invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::config::{MergeConfig, SignatureConfig};
    use crate::merge::tree::merge_file;
    use crate::report::MergeReporter;
    use crate::resolve::PriorityProvider;
    use crate::session::MergeSession;
    use crate::signature::SignatureIndexer;
    use crate::tree;
    use proptest::prelude::*;

    fn indexer() -> SignatureIndexer {
        SignatureIndexer::new(&SignatureConfig::default())
    }

    /// Script-like lines: calls, braces, comments, blanks, junk.
    fn script_line() -> impl Strategy<Value = String> {
        prop_oneof![
            r#"[A-Za-z]{1,8}\("[a-z0-9_]{0,10}"\);"#,
            r#"\t{0,3}[A-Za-z]{1,8}\("[a-z_]{1,8}", [0-9]{1,4}\);"#,
            Just("{".to_string()),
            Just("}".to_string()),
            r#"// [ -~]{0,20}"#,
            Just(String::new()),
            r#"[ -~]{0,30}"#,
        ]
    }

    fn script_text() -> impl Strategy<Value = String> {
        prop::collection::vec(script_line(), 0..40).prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        /// Property: serialize(parse(text)) == text, even for malformed
        /// nesting. The parser is lenient, never lossy.
        #[test]
        fn parse_serialize_round_trips_any_input(text in script_text()) {
            let root = tree::parse(&text, &indexer());
            prop_assert_eq!(tree::serialize(&root), text);
        }

        /// Property: merging a baseline against no variants returns the
        /// baseline byte-for-byte.
        #[test]
        fn merge_with_no_variants_is_identity(text in script_text()) {
            let config = MergeConfig::default();
            let mut provider = PriorityProvider::new(vec![]);
            let mut session = MergeSession::new("prop.scr");
            let mut reporter = MergeReporter::new();
            let merged = merge_file(
                "prop.scr",
                &text,
                &[],
                &config,
                &mut provider,
                &mut session,
                &mut reporter,
            )
            .unwrap();
            prop_assert_eq!(merged, text);
            prop_assert!(reporter.is_empty());
        }

        /// Property: a variant identical to the baseline changes nothing
        /// and logs nothing.
        #[test]
        fn identical_variant_is_a_no_op(text in script_text()) {
            let config = MergeConfig::default();
            let mut provider = PriorityProvider::new(vec![]);
            let mut session = MergeSession::new("prop.scr");
            let mut reporter = MergeReporter::new();
            let merged = merge_file(
                "prop.scr",
                &text,
                &[("noop.pak".to_string(), text.clone())],
                &config,
                &mut provider,
                &mut session,
                &mut reporter,
            )
            .unwrap();
            prop_assert_eq!(merged, text);
        }

        /// Property: merging the merge output again, with the same variant
        /// set, is a fixed point.
        #[test]
        fn merge_is_idempotent_on_its_output(
            baseline in script_text(),
            variant in script_text(),
        ) {
            let config = MergeConfig::default();
            let mut provider = PriorityProvider::new(vec![]);

            let mut session = MergeSession::new("prop.scr");
            let mut reporter = MergeReporter::new();
            let once = merge_file(
                "prop.scr",
                &baseline,
                &[("mod.pak".to_string(), variant)],
                &config,
                &mut provider,
                &mut session,
                &mut reporter,
            )
            .unwrap();

            let mut session = MergeSession::new("prop.scr");
            let mut reporter = MergeReporter::new();
            let twice = merge_file(
                "prop.scr",
                &once,
                &[("mod.pak".to_string(), once.clone())],
                &config,
                &mut provider,
                &mut session,
                &mut reporter,
            )
            .unwrap();
            prop_assert_eq!(twice, once);
        }
    }
}
