//! # Recursive Tree Merge Engine
//!
//! The central merge algorithm. Baseline and variant texts are parsed into
//! content trees; at each block level the engine:
//!
//! 0. checks whether some variant emptied the block while another modified
//!    it (an indivisible keep-or-empty decision),
//! 1. reconciles every baseline unit in baseline order: kept, deleted,
//!    changed (automatically when all changers agree, via the decision
//!    provider when they do not), or recursed into for nested blocks,
//! 2. inserts units new to the baseline next to the nearest preceding
//!    sibling of their origin variant that survived into the merged output.
//!
//! Retained units keep baseline ordering. Placeholder units (blank lines,
//! comments) are matched by position only: they always survive, no matter
//! which variants omit them. Addition placement is best-effort when several
//! mods contribute out-of-order additions; the anchor search deliberately
//! walks only the chosen content's own origin variant.

use std::collections::{HashMap, HashSet};

use crate::config::MergeConfig;
use crate::error::Result;
use crate::merge::{added_comment, annotate_line, lead_comment, updated_comment};
use crate::report::MergeReporter;
use crate::resolve::{choose_with_memo, Candidate, ConflictContext, DecisionProvider, DeletionChoice, EmptiedChoice};
use crate::session::MergeSession;
use crate::signature::{is_placeholder, SignatureIndexer};
use crate::tree::{self, ContentUnit, Leaf, ScriptNode};

/// Merge one script file with the recursive tree strategy.
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
    let baseline_root = tree::parse(baseline, &indexer);
    let variant_roots: Vec<(String, ScriptNode)> = variants
        .iter()
        .map(|(source, text)| {
            let mut root = tree::parse(text, &indexer);
            dedup_keyed_repeats(&mut root, Some(&baseline_root), &indexer);
            (source.clone(), root)
        })
        .collect();
    let variant_refs: Vec<(&str, &ScriptNode)> = variant_roots
        .iter()
        .map(|(source, node)| (source.as_str(), node))
        .collect();

    let mut ctx = MergeCtx {
        file: path,
        config,
        provider,
        session,
        reporter,
    };
    let merged = merge_node(&baseline_root, &variant_refs, &mut ctx)?;
    Ok(tree::serialize(&merged))
}

/// Drop accidentally repeated keyed declarations within a single variant.
///
/// Per sibling scope: a keyed signature may occur as often as it does in
/// the corresponding baseline scope (genuine repeats are aligned by the
/// instance-counting suffix), or once if the baseline has no occurrence;
/// anything beyond that cap is a mod shipping the same `Param(...)` twice
/// by accident and is dropped, keeping the first occurrences.
fn dedup_keyed_repeats(
    variant: &mut ScriptNode,
    baseline: Option<&ScriptNode>,
    indexer: &SignatureIndexer,
) {
    let mut allowed: HashMap<String, usize> = HashMap::new();
    if let Some(baseline) = baseline {
        for child in &baseline.children {
            if let ContentUnit::Leaf(leaf) = child {
                if indexer.is_keyed_declaration(&leaf.text) {
                    *allowed
                        .entry(indexer.line_signature(&leaf.text, 0, 0))
                        .or_insert(0) += 1;
                }
            }
        }
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    variant.children.retain(|child| {
        let ContentUnit::Leaf(leaf) = child else {
            return true;
        };
        if !indexer.is_keyed_declaration(&leaf.text) {
            return true;
        }
        let base = indexer.line_signature(&leaf.text, 0, 0);
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        let cap = allowed.get(&base).copied().unwrap_or(0).max(1);
        if *count > cap {
            log::debug!("dropping repeated declaration '{}'", base);
            false
        } else {
            true
        }
    });

    for child in &mut variant.children {
        if let ContentUnit::Block(block) = child {
            let counterpart = baseline
                .and_then(|b| b.child(&block.signature))
                .and_then(|c| match c {
                    ContentUnit::Block(node) => Some(node),
                    ContentUnit::Leaf(_) => None,
                });
            dedup_keyed_repeats(block, counterpart, indexer);
        }
    }
}

struct MergeCtx<'a> {
    file: &'a str,
    config: &'a MergeConfig,
    provider: &'a mut dyn DecisionProvider,
    session: &'a mut MergeSession,
    reporter: &'a mut MergeReporter,
}

fn block_display_name(node: &ScriptNode) -> &str {
    if node.signature.is_empty() {
        "ROOT"
    } else {
        &node.signature
    }
}

/// Merge one block level. `variants` are the corresponding blocks supplied
/// by each mod still under consideration.
fn merge_node(
    baseline: &ScriptNode,
    variants: &[(&str, &ScriptNode)],
    ctx: &mut MergeCtx<'_>,
) -> Result<ScriptNode> {
    // Step 0: whole-block emptied check.
    let emptying: Vec<&str> = variants
        .iter()
        .filter(|(_, node)| node.children.is_empty())
        .map(|(source, _)| *source)
        .collect();
    let mut variants: Vec<(&str, &ScriptNode)> = variants.to_vec();
    if !emptying.is_empty() && !baseline.children.is_empty() {
        let baseline_body = tree::serialize(baseline);
        let modifying: Vec<&str> = variants
            .iter()
            .filter(|&&(_, node)| !node.children.is_empty() && tree::serialize(node) != baseline_body)
            .map(|(source, _)| *source)
            .collect();

        let empty_it = if modifying.is_empty() {
            true
        } else {
            let conflict = ConflictContext {
                file: ctx.file,
                subject: block_display_name(baseline),
                baseline: None,
            };
            let emptying_owned: Vec<String> = emptying.iter().map(|s| s.to_string()).collect();
            let modifying_owned: Vec<String> = modifying.iter().map(|s| s.to_string()).collect();
            match ctx
                .provider
                .resolve_emptied_block(&conflict, &emptying_owned, &modifying_owned)?
            {
                EmptiedChoice::Empty => true,
                EmptiedChoice::KeepModified => false,
            }
        };

        if empty_it {
            ctx.reporter.log_deletion(
                format!("Entire content of block '{}'", block_display_name(baseline)),
                emptying[0],
            );
            return Ok(baseline.emptied());
        }
        variants.retain(|(_, node)| !node.children.is_empty());
    }

    let mut merged = ScriptNode {
        signature: baseline.signature.clone(),
        header_lines: baseline.header_lines.clone(),
        lead_comments: baseline.lead_comments.clone(),
        children: Vec::new(),
        closing_line: baseline.closing_line.clone(),
        order: baseline.order,
    };

    // Step 1: reconcile every baseline unit in baseline order.
    for unit in &baseline.children {
        let signature = unit.signature();

        // Placeholders are matched by position only; they always survive.
        if is_placeholder(signature) {
            merged.children.push(unit.clone());
            continue;
        }

        let mut present: Vec<(&str, &ContentUnit)> = Vec::new();
        let mut omitting: Vec<String> = Vec::new();
        for (source, node) in &variants {
            match node.child(signature) {
                Some(found) => present.push((*source, found)),
                None => omitting.push(source.to_string()),
            }
        }

        let baseline_norm = tree::normalized_unit(unit);
        let changed: Vec<(&str, &ContentUnit)> = present
            .iter()
            .filter(|&&(_, found)| tree::normalized_unit(found) != baseline_norm)
            .copied()
            .collect();

        if !omitting.is_empty() {
            if changed.is_empty() {
                ctx.reporter.log_deletion(signature, omitting[0].clone());
                continue;
            }
            let conflict = ConflictContext {
                file: ctx.file,
                subject: signature,
                baseline: Some(&baseline_norm),
            };
            let modifying: Vec<String> = changed.iter().map(|(s, _)| s.to_string()).collect();
            match ctx
                .provider
                .resolve_deletion(&conflict, &omitting, &modifying)?
            {
                DeletionChoice::Delete => {
                    ctx.reporter.log_deletion(signature, omitting[0].clone());
                    continue;
                }
                // The unchanged keepers drop out; only the changed subset
                // carries forward.
                DeletionChoice::KeepModified => present = changed.clone(),
            }
        }

        match unit {
            ContentUnit::Leaf(base_leaf) => {
                let leaf_changes: Vec<(&str, &Leaf)> = present
                    .iter()
                    .filter_map(|(source, found)| match found {
                        ContentUnit::Leaf(leaf)
                            if tree::normalized_text(&leaf.text) != tree::normalized_text(&base_leaf.text) =>
                        {
                            Some((*source, leaf))
                        }
                        _ => None,
                    })
                    .collect();

                if leaf_changes.is_empty() {
                    merged.children.push(unit.clone());
                    continue;
                }

                let groups = group_leaf_changes(&leaf_changes);
                let (chosen, source_label) = if groups.len() == 1 {
                    (groups[0].0, groups[0].1.join(", "))
                } else {
                    let candidates: Vec<Candidate> = groups
                        .iter()
                        .map(|(leaf, sources)| {
                            Candidate::new(sources.clone(), leaf.text.trim().to_string())
                        })
                        .collect();
                    let baseline_display = base_leaf.text.trim().to_string();
                    let conflict = ConflictContext {
                        file: ctx.file,
                        subject: signature,
                        baseline: Some(&baseline_display),
                    };
                    let idx = choose_with_memo(ctx.provider, ctx.session, &conflict, &candidates)?;
                    (groups[idx].0, groups[idx].1[0].clone())
                };

                ctx.reporter.log_change(
                    signature,
                    base_leaf.text.trim(),
                    chosen.text.trim(),
                    source_label.clone(),
                );
                merged.children.push(ContentUnit::Leaf(Leaf {
                    text: apply_change_annotation(ctx.config, &chosen.text, &source_label, base_leaf.text.trim()),
                    signature: signature.to_string(),
                    order: base_leaf.order,
                }));
            }
            ContentUnit::Block(base_block) => {
                let sub_variants: Vec<(&str, &ScriptNode)> = present
                    .iter()
                    .filter_map(|(source, found)| match found {
                        ContentUnit::Block(node) => Some((*source, node)),
                        _ => None,
                    })
                    .collect();
                if sub_variants.is_empty() {
                    merged.children.push(unit.clone());
                    continue;
                }

                let sub_sources: Vec<String> =
                    sub_variants.iter().map(|(s, _)| s.to_string()).collect();
                let merged_child = merge_node(base_block, &sub_variants, ctx)?;
                let merged_unit = ContentUnit::Block(merged_child);
                if tree::serialize_unit(&merged_unit) != tree::serialize_unit(unit) {
                    ctx.reporter
                        .log_block_replacement(signature, sub_sources.join(", "));
                    merged.children.push(merged_unit);
                } else {
                    merged.children.push(unit.clone());
                }
            }
        }
    }

    // Step 2: units new to the baseline.
    apply_additions(baseline, &variants, &mut merged, ctx)?;

    Ok(merged)
}

/// Group changed leaves by normalized value, first-occurrence order.
fn group_leaf_changes<'u>(changes: &[(&str, &'u Leaf)]) -> Vec<(&'u Leaf, Vec<String>)> {
    let mut groups: Vec<(String, &Leaf, Vec<String>)> = Vec::new();
    for (source, leaf) in changes.iter().copied() {
        let norm = tree::normalized_text(&leaf.text);
        match groups.iter_mut().find(|(key, _, _)| *key == norm) {
            Some((_, _, sources)) => sources.push(source.to_string()),
            None => groups.push((norm, leaf, vec![source.to_string()])),
        }
    }
    groups
        .into_iter()
        .map(|(_, leaf, sources)| (leaf, sources))
        .collect()
}

fn apply_change_annotation(config: &MergeConfig, text: &str, source: &str, original: &str) -> String {
    if !config.annotate {
        return text.to_string();
    }
    if is_comment_span(text) {
        let lead = format!("// -- {} --", updated_comment(source, "comment block"));
        return format!("{lead}\n{text}");
    }
    annotate_line(text, &updated_comment(source, original))
}

/// True for a multi-line `/* ... */` span, which cannot carry a trailing
/// line comment without corrupting it.
fn is_comment_span(text: &str) -> bool {
    text.trim_start().starts_with("/*") && text.contains('\n')
}

fn apply_additions(
    baseline: &ScriptNode,
    variants: &[(&str, &ScriptNode)],
    merged: &mut ScriptNode,
    ctx: &mut MergeCtx<'_>,
) -> Result<()> {
    let baseline_signatures: HashSet<&str> =
        baseline.children.iter().map(|c| c.signature()).collect();

    // signature -> contributions, keyed in first-contribution order.
    let mut added: Vec<(&str, Vec<(&str, &ContentUnit)>)> = Vec::new();
    for (source, node) in variants.iter().copied() {
        for child in &node.children {
            let signature = child.signature();
            if baseline_signatures.contains(signature) {
                continue;
            }
            match added.iter_mut().find(|(sig, _)| *sig == signature) {
                Some((_, list)) => list.push((source, child)),
                None => added.push((signature, vec![(source, child)])),
            }
        }
    }
    added.sort_by_key(|(_, list)| list.iter().map(|(_, unit)| unit.order()).min().unwrap_or(0));

    for (signature, contributions) in added {
        // Group distinct values, first-occurrence order.
        let mut groups: Vec<(String, &ContentUnit, Vec<String>)> = Vec::new();
        for (source, unit) in contributions.iter().copied() {
            let norm = tree::normalized_unit(unit);
            match groups.iter_mut().find(|(key, _, _)| *key == norm) {
                Some((_, _, sources)) => sources.push(source.to_string()),
                None => groups.push((norm, unit, vec![source.to_string()])),
            }
        }

        let (chosen, origin_source, source_label) = if groups.len() == 1 {
            (groups[0].1, groups[0].2[0].clone(), groups[0].2.join(", "))
        } else {
            let candidates: Vec<Candidate> = groups
                .iter()
                .map(|(_, unit, sources)| {
                    Candidate::new(sources.clone(), tree::serialize_unit(unit).trim().to_string())
                })
                .collect();
            let conflict = ConflictContext {
                file: ctx.file,
                subject: signature,
                baseline: None,
            };
            let idx = choose_with_memo(ctx.provider, ctx.session, &conflict, &candidates)?;
            (groups[idx].1, groups[idx].2[0].clone(), groups[idx].2[0].clone())
        };

        ctx.reporter.log_addition(signature, source_label.clone());

        let annotated = annotate_addition(ctx.config, chosen, &source_label);

        // Anchor: nearest preceding sibling in the chosen content's own
        // origin variant whose signature already made it into the output.
        let origin = variants
            .iter()
            .find(|(source, _)| *source == origin_source)
            .map(|(_, node)| *node);

        let mut insert_at: Option<usize> = None;
        if let Some(origin) = origin {
            if let Some(own_pos) = origin.position_of(signature) {
                for preceding in origin.children[..own_pos].iter().rev() {
                    if let Some(pos) = merged.position_of(preceding.signature()) {
                        insert_at = Some(pos + 1);
                        break;
                    }
                }
            }
        }

        match insert_at {
            Some(pos) => merged.children.insert(pos, annotated),
            None => {
                if is_header_statement(chosen) {
                    merged.children.insert(0, annotated);
                } else {
                    merged.children.push(annotated);
                }
            }
        }
    }
    Ok(())
}

fn annotate_addition(config: &MergeConfig, chosen: &ContentUnit, source: &str) -> ContentUnit {
    match chosen {
        ContentUnit::Leaf(leaf) => {
            if !config.annotate || is_placeholder(&leaf.signature) || leaf.text.trim_start().starts_with("//") {
                return chosen.clone();
            }
            let text = if is_comment_span(&leaf.text) || leaf.text.trim_start().starts_with("/*") {
                format!("{}\n{}", lead_comment("content added from", source), leaf.text)
            } else {
                annotate_line(&leaf.text, &added_comment(source))
            };
            ContentUnit::Leaf(Leaf {
                text,
                signature: leaf.signature.clone(),
                order: leaf.order,
            })
        }
        ContentUnit::Block(node) => {
            let mut node = node.clone();
            if config.annotate {
                node.lead_comments
                    .insert(0, lead_comment("block added from", source));
            }
            ContentUnit::Block(node)
        }
    }
}

/// Anchorless additions that look like file-header statements are put
/// first rather than appended.
fn is_header_statement(unit: &ContentUnit) -> bool {
    match unit {
        ContentUnit::Leaf(leaf) => {
            let trimmed = leaf.text.trim_start();
            trimmed.starts_with("import") || trimmed.starts_with("export")
        }
        ContentUnit::Block(_) => false,
    }
}
