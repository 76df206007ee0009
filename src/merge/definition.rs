//! Definition-table merge. Extracts `(BlockType, Name) -> Value` triples
//! with a fixed grammar, merges by value equality per name, and rebuilds
//! the file in canonical form. Formatting of the incoming files is
//! irrelevant by design: two mods that write the same value differently do
//! not conflict.

use regex::Regex;

use crate::config::MergeConfig;
use crate::error::Result;
use crate::merge::{added_comment, updated_comment};
use crate::report::MergeReporter;
use crate::resolve::{choose_with_memo, Candidate, ConflictContext, DecisionProvider};
use crate::session::MergeSession;

#[derive(Debug, Clone)]
struct Definition {
    block_type: String,
    name: String,
    value: String,
    annotation: Option<String>,
}

/// Column the provenance comment is aligned to in rebuilt output.
const ANNOTATION_COLUMN: usize = 80;

fn grammar() -> Result<(Regex, Regex)> {
    let outer = Regex::new(r#"(Health|HealthMul|HealthTotalMul)\s*\("([^"]+)"\)\s*\{([^}]+)\}"#)?;
    let inner = Regex::new(r#"Health\s*\("([^"]+)"\)"#)?;
    Ok((outer, inner))
}

fn parse_definitions(text: &str, outer: &Regex, inner: &Regex) -> Vec<Definition> {
    outer
        .captures_iter(text)
        .filter_map(|caps| {
            let value = inner.captures(caps[3].trim())?;
            Some(Definition {
                block_type: caps[1].to_string(),
                name: caps[2].to_string(),
                value: value[1].to_string(),
                annotation: None,
            })
        })
        .collect()
}

/// Merge one definition-table file.
pub fn merge_file(
    path: &str,
    baseline: &str,
    variants: &[(String, String)],
    config: &MergeConfig,
    provider: &mut dyn DecisionProvider,
    session: &mut MergeSession,
    reporter: &mut MergeReporter,
) -> Result<String> {
    let (outer, inner) = grammar()?;

    let mut order: Vec<String> = Vec::new();
    let mut merged: Vec<Definition> = Vec::new();
    for definition in parse_definitions(baseline, &outer, &inner) {
        if !merged.iter().any(|d| d.name == definition.name) {
            order.push(definition.name.clone());
            merged.push(definition);
        }
    }

    // name -> versions shipped by mods
    let mut shipped: Vec<(String, Vec<(String, Definition)>)> = Vec::new();
    for (source, text) in variants {
        for definition in parse_definitions(text, &outer, &inner) {
            match shipped.iter_mut().find(|(name, _)| *name == definition.name) {
                Some((_, list)) => list.push((source.clone(), definition)),
                None => shipped.push((definition.name.clone(), vec![(source.clone(), definition)])),
            }
        }
    }

    for (name, versions) in shipped {
        let original = merged.iter().find(|d| d.name == name).cloned();

        let changed: Vec<&(String, Definition)> = versions
            .iter()
            .filter(|(_, def)| original.as_ref().map(|o| o.value != def.value).unwrap_or(true))
            .collect();
        if changed.is_empty() {
            continue;
        }

        let mut groups: Vec<(&Definition, Vec<String>)> = Vec::new();
        for (source, def) in changed.iter().map(|v| (&v.0, &v.1)) {
            match groups.iter_mut().find(|(g, _)| g.value == def.value) {
                Some((_, sources)) => sources.push(source.clone()),
                None => groups.push((def, vec![source.clone()])),
            }
        }

        let (chosen, source_label) = if groups.len() == 1 {
            (groups[0].0, groups[0].1.join(", "))
        } else {
            let candidates: Vec<Candidate> = groups
                .iter()
                .map(|(def, sources)| Candidate::new(sources.clone(), def.value.clone()))
                .collect();
            let baseline_value = original.as_ref().map(|o| o.value.as_str());
            let conflict = ConflictContext {
                file: path,
                subject: &name,
                baseline: baseline_value,
            };
            let idx = choose_with_memo(provider, session, &conflict, &candidates)?;
            (groups[idx].0, groups[idx].1[0].clone())
        };

        let mut replacement = chosen.clone();
        match original {
            Some(original) => {
                if config.annotate {
                    replacement.annotation = Some(updated_comment(&source_label, &original.value));
                }
                reporter.log_change(&name, &original.value, &chosen.value, source_label);
                if let Some(slot) = merged.iter_mut().find(|d| d.name == name) {
                    *slot = replacement;
                }
            }
            None => {
                if config.annotate {
                    replacement.annotation = Some(added_comment(&source_label));
                }
                reporter.log_addition(&name, source_label);
                order.push(name.clone());
                merged.push(replacement);
            }
        }
    }

    Ok(rebuild(&order, &merged))
}

fn rebuild(order: &[String], definitions: &[Definition]) -> String {
    let mut out = String::from("sub main()\n{\n");
    for name in order {
        let Some(def) = definitions.iter().find(|d| &d.name == name) else {
            continue;
        };
        out.push_str(&format!("\t{}(\"{}\")\n\t{{\n", def.block_type, def.name));
        let mut line = format!("\t\tHealth(\"{}\");", def.value);
        if let Some(annotation) = &def.annotation {
            while line.len() < ANNOTATION_COLUMN {
                line.push(' ');
            }
            line.push_str(&format!("// {annotation}"));
        }
        out.push_str(&line);
        out.push_str("\n\t}\n\n");
    }
    out.push_str("}\n");
    out
}
