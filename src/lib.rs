//! # modmeld
//!
//! A structural multi-way merge engine for game script files. Given the
//! unmodified baseline of a file and the variants shipped by any number of
//! mods, it produces one consolidated file that keeps every non-conflicting
//! change from every mod, and forces an explicit decision wherever two mods
//! genuinely disagree. Nothing is ever dropped silently.
//!
//! ## Quick Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use modmeld::config::MergeConfig;
//! use modmeld::pipeline::{merge_all, Contribution};
//! use modmeld::resolve::PriorityProvider;
//!
//! let mut baselines = BTreeMap::new();
//! baselines.insert(
//!     "data/scripts/ai.scr".to_string(),
//!     b"Param(\"max_speed\", 5);\n".to_vec(),
//! );
//!
//! // one mod raises max_speed
//! let contributions = vec![Contribution::new(
//!     "speed_boost.pak",
//!     "data/scripts/ai.scr",
//!     b"Param(\"max_speed\", 9);\n".to_vec(),
//! )];
//!
//! // batch provider: conflicts resolve by priority order, no prompting
//! let mut provider = PriorityProvider::new(vec![]);
//! let output = merge_all(
//!     &baselines,
//!     &contributions,
//!     &MergeConfig::default(),
//!     &mut provider,
//! );
//!
//! assert!(output.failures.is_empty());
//! let merged = String::from_utf8(output.files[0].bytes.clone()).unwrap();
//! assert!(merged.contains("Param(\"max_speed\", 9);"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Signatures (`signature`)**: content-derived identity keys that align
//!   corresponding units across the baseline and every variant, with
//!   sibling-scoped instance counting for repeats.
//! - **Content Tree (`tree`)**: a lenient, byte-preserving parse of the
//!   brace-structured script grammar; serialization is the exact inverse of
//!   parsing, so an untouched file round-trips byte-for-byte.
//! - **Strategies (`merge`)**: the recursive tree merge plus the coarser
//!   line-based, keyed-parameter, whole-block, and definition-table
//!   strategies, selected per file by name classification.
//! - **Decisions (`resolve`, `session`)**: every conflict goes through a
//!   [`resolve::DecisionProvider`] (interactive console, fixed-priority
//!   batch, or scripted for tests), with a per-file memo that replays a
//!   choice across repeats of the exact same conflicting-source set.
//! - **Reporting (`report`)**: every change, addition, deletion, and block
//!   replacement is logged per file and rendered as a plain-text report.
//! - **Pipeline (`pipeline`)**: groups raw contributions by path, decodes,
//!   dispatches to a strategy, and isolates per-file failures; sequential
//!   or rayon-parallel for batch providers.

pub mod config;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod session;
pub mod signature;
pub mod tree;

#[cfg(test)]
mod merge_proptest;
