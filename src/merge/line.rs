//! Flat line-based merge for files whose brace structure is irrelevant or
//! hostile to tree matching (input binding tables, logic/frame script
//! registries, render settings). Every physical line is its own unit, keyed
//! by its code part with per-file instance counting; deletion happens only
//! when every variant omits a line, so a single mod can never silently
//! shorten a shared table.

use std::collections::HashSet;

use crate::config::MergeConfig;
use crate::error::Result;
use crate::merge::{added_comment, annotate_line, updated_comment};
use crate::report::MergeReporter;
use crate::resolve::{choose_with_memo, Candidate, ConflictContext, DecisionProvider};
use crate::session::MergeSession;
use crate::signature::{
    code_part, is_placeholder, InstanceCounter, SignatureIndexer, BLANK_PREFIX, LITERAL_PREFIX,
};
use crate::tree::normalized_text;

/// A physical line with its instance-counted signature.
#[derive(Debug, Clone)]
struct MappedLine {
    signature: String,
    text: String,
}

fn map_lines(text: &str, indexer: &SignatureIndexer) -> Vec<MappedLine> {
    let mut counter = InstanceCounter::new();
    text.split('\n')
        .enumerate()
        .map(|(order, line)| {
            // Unmappable lines get positional keys so they keep their place
            // but never participate in matching.
            let signature = match indexer.flat_signature(line) {
                Some(base) => counter.disambiguate(&base),
                None if line.trim().is_empty() => format!("{BLANK_PREFIX}{order}"),
                None => format!("{LITERAL_PREFIX}{order}"),
            };
            MappedLine {
                signature,
                text: line.to_string(),
            }
        })
        .collect()
}

fn find<'m>(lines: &'m [MappedLine], signature: &str) -> Option<&'m MappedLine> {
    lines.iter().find(|l| l.signature == signature)
}

/// Merge one file line-by-line.
pub fn merge_file(
    path: &str,
    baseline: &str,
    variants: &[(String, String)],
    config: &MergeConfig,
    provider: &mut dyn DecisionProvider,
    session: &mut MergeSession,
    reporter: &mut MergeReporter,
) -> Result<String> {
    let indexer = SignatureIndexer::new(&config.signature);
    let baseline_lines = map_lines(baseline, &indexer);
    let variant_lines: Vec<(&str, Vec<MappedLine>)> = variants
        .iter()
        .map(|(source, text)| (source.as_str(), map_lines(text, &indexer)))
        .collect();

    let mut merged: Vec<MappedLine> = Vec::new();

    for base in &baseline_lines {
        if is_placeholder(&base.signature) {
            merged.push(base.clone());
            continue;
        }

        let mut present: Vec<(&str, &MappedLine)> = Vec::new();
        for (source, lines) in &variant_lines {
            if let Some(found) = find(lines, &base.signature) {
                present.push((*source, found));
            }
        }

        // A line disappears only when every variant dropped it.
        if present.is_empty() && !variant_lines.is_empty() {
            reporter.log_deletion(&base.signature, variant_lines[0].0);
            continue;
        }

        let base_code = code_part(&base.text);
        let changed: Vec<(&str, &MappedLine)> = present
            .iter()
            .filter(|(_, line)| code_part(&line.text) != base_code)
            .copied()
            .collect();
        if changed.is_empty() {
            merged.push(base.clone());
            continue;
        }

        let groups = group_by_code(&changed);
        let (chosen, source_label) = if groups.len() == 1 {
            (groups[0].0, groups[0].1.join(", "))
        } else {
            let candidates: Vec<Candidate> = groups
                .iter()
                .map(|(line, sources)| Candidate::new(sources.clone(), line.text.trim().to_string()))
                .collect();
            let baseline_display = base.text.trim().to_string();
            let conflict = ConflictContext {
                file: path,
                subject: &base.signature,
                baseline: Some(&baseline_display),
            };
            let idx = choose_with_memo(provider, session, &conflict, &candidates)?;
            (groups[idx].0, groups[idx].1[0].clone())
        };

        reporter.log_change(&base.signature, base.text.trim(), chosen.text.trim(), source_label.clone());
        let text = if config.annotate {
            annotate_line(&chosen.text, &updated_comment(&source_label, base.text.trim()))
        } else {
            chosen.text.clone()
        };
        merged.push(MappedLine {
            signature: base.signature.clone(),
            text,
        });
    }

    apply_additions(path, &baseline_lines, &variant_lines, &mut merged, config, provider, session, reporter)?;

    Ok(merged
        .into_iter()
        .map(|l| l.text)
        .collect::<Vec<_>>()
        .join("\n"))
}

fn group_by_code<'m>(changed: &[(&str, &'m MappedLine)]) -> Vec<(&'m MappedLine, Vec<String>)> {
    let mut groups: Vec<(String, &MappedLine, Vec<String>)> = Vec::new();
    for (source, line) in changed.iter().copied() {
        let key = normalized_text(&line.text);
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, sources)) => sources.push(source.to_string()),
            None => groups.push((key, line, vec![source.to_string()])),
        }
    }
    groups
        .into_iter()
        .map(|(_, line, sources)| (line, sources))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn apply_additions(
    path: &str,
    baseline_lines: &[MappedLine],
    variant_lines: &[(&str, Vec<MappedLine>)],
    merged: &mut Vec<MappedLine>,
    config: &MergeConfig,
    provider: &mut dyn DecisionProvider,
    session: &mut MergeSession,
    reporter: &mut MergeReporter,
) -> Result<()> {
    let baseline_signatures: HashSet<&str> =
        baseline_lines.iter().map(|l| l.signature.as_str()).collect();

    let mut added: Vec<(&str, Vec<(&str, &MappedLine)>)> = Vec::new();
    for (source, lines) in variant_lines {
        for line in lines {
            if is_placeholder(&line.signature) || baseline_signatures.contains(line.signature.as_str()) {
                continue;
            }
            match added.iter_mut().find(|(sig, _)| *sig == line.signature) {
                Some((_, list)) => list.push((*source, line)),
                None => added.push((&line.signature, vec![(*source, line)])),
            }
        }
    }

    for (signature, contributions) in added {
        let groups = group_by_code(&contributions);
        let (chosen, origin_source, source_label) = if groups.len() == 1 {
            (groups[0].0, groups[0].1[0].clone(), groups[0].1.join(", "))
        } else {
            let candidates: Vec<Candidate> = groups
                .iter()
                .map(|(line, sources)| Candidate::new(sources.clone(), line.text.trim().to_string()))
                .collect();
            let conflict = ConflictContext {
                file: path,
                subject: signature,
                baseline: None,
            };
            let idx = choose_with_memo(provider, session, &conflict, &candidates)?;
            (groups[idx].0, groups[idx].1[0].clone(), groups[idx].1[0].clone())
        };

        reporter.log_addition(signature, source_label.clone());

        let text = if config.annotate {
            annotate_line(&chosen.text, &added_comment(&source_label))
        } else {
            chosen.text.clone()
        };
        let unit = MappedLine {
            signature: signature.to_string(),
            text,
        };

        // Anchor after the nearest preceding origin-variant line already in
        // the output, matching the tree strategy's placement rule.
        let origin = variant_lines
            .iter()
            .find(|(source, _)| *source == origin_source)
            .map(|(_, lines)| lines);

        let mut insert_at: Option<usize> = None;
        if let Some(origin) = origin {
            if let Some(own_pos) = origin.iter().position(|l| l.signature == signature) {
                for preceding in origin[..own_pos].iter().rev() {
                    if is_placeholder(&preceding.signature) {
                        continue;
                    }
                    if let Some(pos) = merged.iter().position(|l| l.signature == preceding.signature) {
                        insert_at = Some(pos + 1);
                        break;
                    }
                }
            }
        }
        match insert_at {
            Some(pos) => merged.insert(pos, unit),
            None => merged.push(unit),
        }
    }
    Ok(())
}
