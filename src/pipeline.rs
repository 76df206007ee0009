//! # Merge Pipeline
//!
//! Groups raw per-file contributions by target path, selects a strategy per
//! path, and drives each file's merge to completion. Failures are
//! file-scoped: a file that cannot be processed is reported and passed
//! through as its baseline, and never aborts sibling files.
//!
//! Two entry points: [`merge_all`] runs files sequentially and accepts any
//! provider, including the interactive one (which blocks on the console);
//! [`merge_all_parallel`] fans files out across a rayon pool and therefore
//! requires a cloneable, non-interactive provider. The session memo is
//! per-file in both, so the two are semantically identical for batch
//! providers.

use std::collections::BTreeMap;

use crate::config::MergeConfig;
use crate::error::{Error, Result};
use crate::merge::{self, FileClass};
use crate::report::{LogEntry, MergeReporter};
use crate::resolve::{choose_with_memo, Candidate, ConflictContext, DecisionProvider};
use crate::session::MergeSession;

/// One mod's raw bytes for one target path.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub source_id: String,
    pub path: String,
    pub bytes: Vec<u8>,
}

impl Contribution {
    pub fn new(source_id: impl Into<String>, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
            bytes,
        }
    }
}

/// Merged output for one touched path.
#[derive(Debug)]
pub struct MergedFile {
    pub path: String,
    pub bytes: Vec<u8>,
    /// Ordered log of what happened to this file, header entry first.
    pub entries: Vec<LogEntry>,
}

/// Result of a whole batch. Failed files appear in both lists: their
/// baseline bytes (when one exists) in `files`, their error in `failures`.
#[derive(Debug, Default)]
pub struct MergeOutput {
    pub files: Vec<MergedFile>,
    pub failures: Vec<(String, Error)>,
}

impl MergeOutput {
    /// Render the combined merge log across all files.
    pub fn render_report(&self) -> String {
        let mut reporter = MergeReporter::new();
        for file in &self.files {
            for entry in &file.entries {
                reporter.push(entry.clone());
            }
        }
        reporter.render()
    }
}

/// Merge every touched path sequentially, in first-contribution order.
pub fn merge_all(
    baselines: &BTreeMap<String, Vec<u8>>,
    contributions: &[Contribution],
    config: &MergeConfig,
    provider: &mut dyn DecisionProvider,
) -> MergeOutput {
    let mut output = MergeOutput::default();
    for (path, group) in group_by_path(contributions) {
        let merged = merge_path(&path, baselines.get(&path), &group, config, provider);
        collect(&mut output, path, baselines, merged);
    }
    output
}

/// Merge touched paths across a rayon pool.
///
/// Interactive providers cannot be used here: each worker clones the
/// provider and owns a private per-file session, so decisions must be
/// deterministic.
pub fn merge_all_parallel<P>(
    baselines: &BTreeMap<String, Vec<u8>>,
    contributions: &[Contribution],
    config: &MergeConfig,
    provider: &P,
) -> MergeOutput
where
    P: DecisionProvider + Clone + Send + Sync,
{
    use rayon::prelude::*;

    let groups = group_by_path(contributions);
    let merged: Vec<(String, Result<MergedFile>)> = groups
        .into_par_iter()
        .map(|(path, group)| {
            let mut provider = provider.clone();
            let merged = merge_path(&path, baselines.get(&path), &group, config, &mut provider);
            (path, merged)
        })
        .collect();

    let mut output = MergeOutput::default();
    for (path, result) in merged {
        collect(&mut output, path, baselines, result);
    }
    output
}

fn collect(
    output: &mut MergeOutput,
    path: String,
    baselines: &BTreeMap<String, Vec<u8>>,
    merged: Result<MergedFile>,
) {
    match merged {
        Ok(file) => output.files.push(file),
        Err(error) => {
            log::warn!("merge of '{}' failed: {}", path, error);
            if let Some(baseline) = baselines.get(&path) {
                output.files.push(MergedFile {
                    path: path.clone(),
                    bytes: baseline.clone(),
                    entries: Vec::new(),
                });
            }
            output.failures.push((path, error));
        }
    }
}

/// Group contributions per target path, preserving first-seen order of both
/// paths and sources.
fn group_by_path(contributions: &[Contribution]) -> Vec<(String, Vec<&Contribution>)> {
    let mut groups: Vec<(String, Vec<&Contribution>)> = Vec::new();
    for contribution in contributions {
        match groups.iter_mut().find(|(path, _)| *path == contribution.path) {
            Some((_, list)) => list.push(contribution),
            None => groups.push((contribution.path.clone(), vec![contribution])),
        }
    }
    groups
}

fn merge_path(
    path: &str,
    baseline: Option<&Vec<u8>>,
    group: &[&Contribution],
    config: &MergeConfig,
    provider: &mut dyn DecisionProvider,
) -> Result<MergedFile> {
    let sources: Vec<String> = {
        let mut seen: Vec<String> = Vec::new();
        for contribution in group {
            if !seen.contains(&contribution.source_id) {
                seen.push(contribution.source_id.clone());
            }
        }
        seen
    };

    let mut reporter = MergeReporter::new();
    reporter.start_file(path, sources);

    // Paths without a baseline and non-script paths cannot be merged
    // structurally; they resolve as whole files.
    let class = merge::classify(path, config);
    let Some(baseline) = baseline else {
        return resolve_whole_file(path, group, provider, reporter);
    };
    if class == FileClass::Opaque {
        return resolve_whole_file(path, group, provider, reporter);
    }

    let baseline_text = decode(path, "baseline", baseline)?;
    let variants: Vec<(String, String)> = group
        .iter()
        .map(|c| Ok((c.source_id.clone(), decode(path, &c.source_id, &c.bytes)?)))
        .collect::<Result<_>>()?;

    let mut session = MergeSession::new(path);
    let merged = merge::merge_script(
        path,
        &baseline_text,
        &variants,
        config,
        provider,
        &mut session,
        &mut reporter,
    )?;

    Ok(MergedFile {
        path: path.to_string(),
        bytes: merged.into_bytes(),
        entries: reporter.into_entries(),
    })
}

fn decode(path: &str, source_id: &str, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::Encoding {
        path: path.to_string(),
        source_id: source_id.to_string(),
        message: e.to_string(),
    })
}

/// One contributor passes through; several with distinct bytes force a
/// whole-file choice, logged as a [`LogEntry::FileChoice`].
fn resolve_whole_file(
    path: &str,
    group: &[&Contribution],
    provider: &mut dyn DecisionProvider,
    mut reporter: MergeReporter,
) -> Result<MergedFile> {
    let mut distinct: Vec<(&Contribution, Vec<String>)> = Vec::new();
    for contribution in group.iter().copied() {
        match distinct
            .iter_mut()
            .find(|(other, _)| other.bytes == contribution.bytes)
        {
            Some((_, sources)) => {
                if !sources.contains(&contribution.source_id) {
                    sources.push(contribution.source_id.clone());
                }
            }
            None => distinct.push((contribution, vec![contribution.source_id.clone()])),
        }
    }

    let chosen = if distinct.len() == 1 {
        &distinct[0]
    } else {
        let candidates: Vec<Candidate> = distinct
            .iter()
            .map(|(contribution, sources)| {
                Candidate::new(sources.clone(), preview_bytes(&contribution.bytes))
            })
            .collect();
        let conflict = ConflictContext {
            file: path,
            subject: path,
            baseline: None,
        };
        let mut session = MergeSession::new(path);
        let idx = choose_with_memo(provider, &mut session, &conflict, &candidates)?;
        reporter.log_file_choice(path, distinct[idx].1[0].clone());
        &distinct[idx]
    };

    Ok(MergedFile {
        path: path.to_string(),
        bytes: chosen.0.bytes.clone(),
        entries: reporter.into_entries(),
    })
}

/// Short display form for whole-file candidates: text files show their
/// head, binaries show their size.
fn preview_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let head: Vec<&str> = text.lines().take(4).collect();
            let mut preview = head.join("\n");
            if text.lines().count() > 4 {
                preview.push_str("\n...");
            }
            preview
        }
        Err(_) => format!("<binary, {} bytes>", bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{PriorityProvider, ScriptedProvider};

    fn baselines(entries: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
        entries
            .iter()
            .map(|(path, text)| (path.to_string(), text.as_bytes().to_vec()))
            .collect()
    }

    fn text_contribution(source: &str, path: &str, text: &str) -> Contribution {
        Contribution::new(source, path, text.as_bytes().to_vec())
    }

    const AI: &str = "sub main()\n{\n\tHealth(\"Zombie\")\n\t{\n\t\tHealth(\"10\");\n\t}\n}\n";

    #[test]
    fn test_merge_all_merges_script_and_logs() {
        let baselines = baselines(&[("data/ai.scr", AI)]);
        let modded = AI.replace("Health(\"10\");", "Health(\"20\");");
        let contributions = vec![text_contribution("boost.pak", "data/ai.scr", &modded)];
        let mut provider = PriorityProvider::new(vec![]);

        let output = merge_all(&baselines, &contributions, &MergeConfig::default(), &mut provider);
        assert!(output.failures.is_empty());
        assert_eq!(output.files.len(), 1);
        let file = &output.files[0];
        assert_eq!(file.path, "data/ai.scr");
        let text = String::from_utf8(file.bytes.clone()).unwrap();
        assert!(text.contains("Health(\"20\");"));
        assert!(matches!(file.entries.first(), Some(LogEntry::FileHeader { .. })));
        assert!(file.entries.iter().any(|e| matches!(e, LogEntry::Change { .. })));
    }

    #[test]
    fn test_encoding_failure_is_isolated_and_baseline_passes_through() {
        let baselines = baselines(&[("data/ai.scr", AI), ("data/other.scr", "Param(\"x\", 1);\n")]);
        let contributions = vec![
            Contribution::new("broken.pak", "data/ai.scr", vec![0xff, 0xfe, 0x00]),
            text_contribution("fine.pak", "data/other.scr", "Param(\"x\", 2);\n"),
        ];
        let mut provider = PriorityProvider::new(vec![]);

        let output = merge_all(&baselines, &contributions, &MergeConfig::default(), &mut provider);

        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].0, "data/ai.scr");
        assert!(matches!(output.failures[0].1, Error::Encoding { .. }));

        // failed file passes its baseline through; sibling merges normally
        let failed = output.files.iter().find(|f| f.path == "data/ai.scr").unwrap();
        assert_eq!(failed.bytes, AI.as_bytes());
        let fine = output.files.iter().find(|f| f.path == "data/other.scr").unwrap();
        let text = String::from_utf8(fine.bytes.clone()).unwrap();
        assert!(text.contains("Param(\"x\", 2);"));
    }

    #[test]
    fn test_new_path_single_contributor_passes_through() {
        let baselines = BTreeMap::new();
        let contributions = vec![text_contribution("new.pak", "data/fresh.scr", "A(\"1\");\n")];
        let mut provider = PriorityProvider::new(vec![]);

        let output = merge_all(&baselines, &contributions, &MergeConfig::default(), &mut provider);
        assert_eq!(output.files[0].bytes, b"A(\"1\");\n");
        assert!(!output.files[0]
            .entries
            .iter()
            .any(|e| matches!(e, LogEntry::FileChoice { .. })));
    }

    #[test]
    fn test_new_path_conflict_prompts_once_for_whole_file() {
        let baselines = BTreeMap::new();
        let contributions = vec![
            text_contribution("a.pak", "data/fresh.scr", "A(\"1\");\n"),
            text_contribution("b.pak", "data/fresh.scr", "A(\"2\");\n"),
        ];
        let mut provider = ScriptedProvider::new();
        provider.push_choice(1, false);

        let output = merge_all(&baselines, &contributions, &MergeConfig::default(), &mut provider);
        assert_eq!(output.files[0].bytes, b"A(\"2\");\n");
        assert!(output.files[0]
            .entries
            .iter()
            .any(|e| matches!(e, LogEntry::FileChoice { path, source }
                if path == "data/fresh.scr" && source == "b.pak")));
        assert_eq!(provider.remaining(), 0);
    }

    #[test]
    fn test_opaque_asset_identical_bytes_no_prompt() {
        let baselines = baselines(&[("textures/icon.dds", "ignored")]);
        let contributions = vec![
            Contribution::new("a.pak", "textures/icon.dds", vec![1, 2, 3]),
            Contribution::new("b.pak", "textures/icon.dds", vec![1, 2, 3]),
        ];
        // no scripted answers: identical bytes must not prompt
        let mut provider = ScriptedProvider::new();
        let output = merge_all(&baselines, &contributions, &MergeConfig::default(), &mut provider);
        assert!(output.failures.is_empty());
        assert_eq!(output.files[0].bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_parallel_matches_sequential_for_batch_provider() {
        let baselines = baselines(&[("data/ai.scr", AI), ("data/vars.scr", "Param(\"s\", 1);\n")]);
        let modded_ai = AI.replace("Health(\"10\");", "Health(\"20\");");
        let contributions = vec![
            text_contribution("one.pak", "data/ai.scr", &modded_ai),
            text_contribution("two.pak", "data/vars.scr", "Param(\"s\", 2);\n"),
        ];
        let config = MergeConfig::default();

        let mut sequential_provider = PriorityProvider::new(vec!["one.pak".to_string()]);
        let sequential = merge_all(&baselines, &contributions, &config, &mut sequential_provider);

        let parallel_provider = PriorityProvider::new(vec!["one.pak".to_string()]);
        let parallel = merge_all_parallel(&baselines, &contributions, &config, &parallel_provider);

        let mut seq_files: Vec<(&str, &[u8])> = sequential
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.bytes.as_slice()))
            .collect();
        let mut par_files: Vec<(&str, &[u8])> = parallel
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.bytes.as_slice()))
            .collect();
        seq_files.sort();
        par_files.sort();
        assert_eq!(seq_files, par_files);
    }

    #[test]
    fn test_render_report_contains_file_sections() {
        let baselines = baselines(&[("data/ai.scr", AI)]);
        let modded = AI.replace("Health(\"10\");", "Health(\"20\");");
        let contributions = vec![text_contribution("boost.pak", "data/ai.scr", &modded)];
        let mut provider = PriorityProvider::new(vec![]);

        let output = merge_all(&baselines, &contributions, &MergeConfig::default(), &mut provider);
        let report = output.render_report();
        assert!(report.contains("data/ai.scr"));
        assert!(report.contains("boost.pak"));
    }
}
