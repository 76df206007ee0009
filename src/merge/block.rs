//! Whole-block merge for files whose named blocks are too tightly coupled
//! for line-level mixing (jump parameter tables). Partial merging inside a
//! block is deliberately not offered: mixing individual parameters from
//! different mods produces combinations no author ever tested. A conflicted
//! block is an indivisible choice among the baseline version and each
//! distinct mod version.

use crate::config::MergeConfig;
use crate::error::Result;
use crate::merge::lead_comment;
use crate::report::MergeReporter;
use crate::resolve::{choose_with_memo, Candidate, ConflictContext, DecisionProvider};
use crate::session::MergeSession;
use crate::signature::SignatureIndexer;
use crate::tree::{self, ContentUnit, ScriptNode};

/// Merge one file at whole-named-block granularity.
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
    let mut root = tree::parse(baseline, &indexer);
    let variant_roots: Vec<(String, ScriptNode)> = variants
        .iter()
        .map(|(source, text)| (source.clone(), tree::parse(text, &indexer)))
        .collect();

    let container_sig = container_signature(&root);

    // block signature -> versions shipped by mods, one slot per source
    let mut shipped: Vec<(String, Vec<(String, ScriptNode)>)> = Vec::new();
    for (source, variant_root) in &variant_roots {
        for child in &container_of(variant_root, container_sig.as_deref()).children {
            if let ContentUnit::Block(block) = child {
                match shipped.iter_mut().find(|(sig, _)| sig == &block.signature) {
                    Some((_, list)) => list.push((source.clone(), block.clone())),
                    None => shipped.push((block.signature.clone(), vec![(source.clone(), block.clone())])),
                }
            }
        }
    }

    for (signature, versions) in shipped {
        let baseline_block = container_of(&root, container_sig.as_deref())
            .children
            .iter()
            .find_map(|c| match c {
                ContentUnit::Block(b) if b.signature == signature => Some(b.clone()),
                _ => None,
            });
        let baseline_body = baseline_block.as_ref().map(block_body);

        // Only versions whose body actually differs from the baseline count.
        let changed: Vec<&(String, ScriptNode)> = versions
            .iter()
            .filter(|(_, block)| Some(block_body(block)) != baseline_body)
            .collect();
        if changed.is_empty() {
            continue;
        }

        let mut groups: Vec<(String, &ScriptNode, Vec<String>)> = Vec::new();
        for (source, block) in changed.iter().map(|v| (&v.0, &v.1)) {
            let body = block_body(block);
            match groups.iter_mut().find(|(b, _, _)| *b == body) {
                Some((_, _, sources)) => sources.push(source.clone()),
                None => groups.push((body, block, vec![source.clone()])),
            }
        }

        let (chosen, chosen_source) = if groups.len() == 1 {
            (Some(groups[0].1), groups[0].2.join(", "))
        } else {
            let mut candidates: Vec<Candidate> = Vec::new();
            if let Some(block) = &baseline_block {
                candidates.push(Candidate::baseline(preview_of(block)));
            }
            for (_, block, sources) in &groups {
                candidates.push(Candidate::new(sources.clone(), preview_of(block)));
            }
            let conflict = ConflictContext {
                file: path,
                subject: &signature,
                baseline: None,
            };
            let idx = choose_with_memo(provider, session, &conflict, &candidates)?;
            if candidates[idx].is_baseline {
                (None, String::new())
            } else {
                let group = &groups[idx - usize::from(baseline_block.is_some())];
                (Some(group.1), group.2[0].clone())
            }
        };

        let Some(chosen) = chosen else {
            continue; // baseline retained, nothing to log
        };

        let mut replacement = chosen.clone();
        let container = container_mut(&mut root, container_sig.as_deref());
        match container
            .children
            .iter()
            .position(|c| c.signature() == signature && c.is_block())
        {
            Some(pos) => {
                if config.annotate {
                    replacement
                        .lead_comments
                        .insert(0, lead_comment("block updated from", &chosen_source));
                }
                reporter.log_block_replacement(&signature, chosen_source);
                container.children[pos] = ContentUnit::Block(replacement);
            }
            None => {
                if config.annotate {
                    replacement
                        .lead_comments
                        .insert(0, lead_comment("block added from", &chosen_source));
                }
                reporter.log_addition(&signature, chosen_source);
                container.children.push(ContentUnit::Block(replacement));
            }
        }
    }

    Ok(tree::serialize(&root))
}

/// Files of this class usually wrap their blocks in a single `sub main()`
/// shell; when the root holds exactly one block, that block is the
/// container the named blocks live in.
fn container_signature(root: &ScriptNode) -> Option<String> {
    let mut blocks = root.children.iter().filter_map(|c| match c {
        ContentUnit::Block(b) => Some(b),
        _ => None,
    });
    match (blocks.next(), blocks.next()) {
        (Some(only), None) => Some(only.signature.clone()),
        _ => None,
    }
}

fn container_of<'n>(root: &'n ScriptNode, signature: Option<&str>) -> &'n ScriptNode {
    if let Some(signature) = signature {
        for child in &root.children {
            if let ContentUnit::Block(block) = child {
                if block.signature == signature {
                    return block;
                }
            }
        }
    }
    root
}

fn container_mut<'n>(root: &'n mut ScriptNode, signature: Option<&str>) -> &'n mut ScriptNode {
    let pos = signature.and_then(|signature| {
        root.children
            .iter()
            .position(|c| c.is_block() && c.signature() == signature)
    });
    match pos {
        Some(pos) => match &mut root.children[pos] {
            ContentUnit::Block(block) => block,
            ContentUnit::Leaf(_) => unreachable!("position matched a block"),
        },
        None => root,
    }
}

/// Normalized body used for change detection and distinct grouping.
fn block_body(block: &ScriptNode) -> String {
    tree::normalized_text(&tree::serialize(block))
}

fn preview_of(block: &ScriptNode) -> String {
    tree::serialize_unit(&ContentUnit::Block(block.clone()))
        .trim()
        .to_string()
}
