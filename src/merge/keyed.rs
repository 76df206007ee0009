//! Keyed-parameter merge for flat declaration tables such as the player
//! variable file. The atomic unit is one named declaration, keyed by its
//! quoted name; everything else (comments, braces, blanks) is carried
//! through verbatim in place. A mod repeating a key keeps only its last
//! declaration. Omission never deletes here: a mod that ships a trimmed
//! parameter file must not strip variables other mods rely on.

use regex::Regex;

use crate::config::MergeConfig;
use crate::error::Result;
use crate::merge::{added_comment, annotate_line, updated_comment};
use crate::report::MergeReporter;
use crate::resolve::{choose_with_memo, Candidate, ConflictContext, DecisionProvider};
use crate::session::MergeSession;
use crate::signature::code_part;

struct KeyedFile {
    /// Declaration key, or a positional key for pass-through lines.
    order: Vec<String>,
    lines: Vec<(String, String)>,
    /// Closing line of the surrounding block, when one exists. Everything
    /// after it is dropped, matching how the game reads the file.
    closing_line: Option<String>,
}

impl KeyedFile {
    fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, line)| line.as_str())
    }

    fn set(&mut self, key: &str, line: String) {
        match self.lines.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = line,
            None => {
                self.lines.push((key.to_string(), line));
                self.order.push(key.to_string());
            }
        }
    }
}

fn parse_keyed(text: &str, key_shape: &Regex) -> KeyedFile {
    let mut file = KeyedFile {
        order: Vec::new(),
        lines: Vec::new(),
        closing_line: None,
    };
    for line in text.split('\n') {
        if file.closing_line.is_none() && line.trim() == "}" {
            file.closing_line = Some(line.to_string());
            break;
        }
        let key = match key_shape.captures(line.trim()) {
            Some(caps) => caps[1].to_string(),
            None => format!("NON_PARAM_{}", file.order.len()),
        };
        if file.get(&key).is_none() {
            file.order.push(key.clone());
            file.lines.push((key, line.to_string()));
        }
    }
    file
}

/// Within one mod, collect the last declaration per key.
fn collect_declarations(text: &str, key_shape: &Regex) -> Vec<(String, String)> {
    let mut declarations: Vec<(String, String)> = Vec::new();
    for line in text.split('\n') {
        if line.trim() == "}" {
            break;
        }
        if let Some(caps) = key_shape.captures(line.trim()) {
            let key = caps[1].to_string();
            match declarations.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing = line.to_string(),
                None => declarations.push((key, line.to_string())),
            }
        }
    }
    declarations
}

/// Merge one keyed declaration file.
pub fn merge_file(
    path: &str,
    baseline: &str,
    variants: &[(String, String)],
    config: &MergeConfig,
    provider: &mut dyn DecisionProvider,
    session: &mut MergeSession,
    reporter: &mut MergeReporter,
) -> Result<String> {
    let names = config
        .signature
        .keyed_functions
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");
    let key_shape = Regex::new(&format!(r#"^(?:{names})\s*\(\s*"([^"]+)""#))?;

    let mut merged = parse_keyed(baseline, &key_shape);

    // key -> last declaration per contributing mod
    let mut changes: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for (source, text) in variants {
        for (key, line) in collect_declarations(text, &key_shape) {
            match changes.iter_mut().find(|(k, _)| *k == key) {
                Some((_, list)) => list.push((source.clone(), line)),
                None => changes.push((key, vec![(source.clone(), line)])),
            }
        }
    }

    for (key, versions) in changes {
        let original_line = merged.get(&key).map(str::to_string);
        let original_code = original_line.as_deref().map(code_part).unwrap_or_default();

        let actual: Vec<&(String, String)> = versions
            .iter()
            .filter(|(_, line)| original_line.is_none() || code_part(line) != original_code)
            .collect();
        if actual.is_empty() {
            continue;
        }

        // distinct by code part, first occurrence wins the label slot
        let mut groups: Vec<(String, &(String, String), Vec<String>)> = Vec::new();
        for version in actual.iter().copied() {
            let code = code_part(&version.1);
            match groups.iter_mut().find(|(c, _, _)| *c == code) {
                Some((_, _, sources)) => sources.push(version.0.clone()),
                None => groups.push((code, version, vec![version.0.clone()])),
            }
        }

        let (chosen, source_label) = if groups.len() == 1 {
            (groups[0].1, groups[0].2.join(", "))
        } else {
            let candidates: Vec<Candidate> = groups
                .iter()
                .map(|(_, version, sources)| {
                    Candidate::new(sources.clone(), version.1.trim().to_string())
                })
                .collect();
            let baseline_display = original_line.as_deref().map(str::trim);
            let conflict = ConflictContext {
                file: path,
                subject: &key,
                baseline: baseline_display,
            };
            let idx = choose_with_memo(provider, session, &conflict, &candidates)?;
            (groups[idx].1, groups[idx].2[0].clone())
        };

        match original_line {
            Some(original) => {
                reporter.log_change(&key, original.trim(), chosen.1.trim(), source_label.clone());
                let line = if config.annotate {
                    annotate_line(&chosen.1, &updated_comment(&source_label, original.trim()))
                } else {
                    chosen.1.clone()
                };
                merged.set(&key, line);
            }
            None => {
                reporter.log_addition(&key, source_label.clone());
                let line = if config.annotate {
                    annotate_line(&chosen.1, &added_comment(&source_label))
                } else {
                    chosen.1.clone()
                };
                merged.set(&key, line);
            }
        }
    }

    let mut out: Vec<String> = Vec::new();
    for key in &merged.order {
        if let Some(line) = merged.get(key) {
            out.push(line.to_string());
        }
    }
    if let Some(closing) = merged.closing_line {
        out.push(closing);
    }
    out.push(String::new());
    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LogEntry;
    use crate::resolve::{PriorityProvider, ScriptedProvider};

    fn run(
        baseline: &str,
        variants: &[(&str, &str)],
        provider: &mut dyn DecisionProvider,
    ) -> (String, Vec<LogEntry>) {
        let config = MergeConfig::default();
        let owned: Vec<(String, String)> = variants
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        let mut session = MergeSession::new("player_variables.scr");
        let mut reporter = MergeReporter::new();
        let merged = merge_file(
            "player_variables.scr",
            baseline,
            &owned,
            &config,
            provider,
            &mut session,
            &mut reporter,
        )
        .expect("merge succeeds");
        (merged, reporter.into_entries())
    }

    const VARIABLES: &str = "Params()\n{\n\tParam(\"max_speed\", \"5.0\");\n\tParam(\"jump_height\", \"1.2\");\n}\n";

    #[test]
    fn test_agreeing_change_applied() {
        let modded = VARIABLES.replace("\"5.0\"", "\"9.0\"");
        let mut provider = PriorityProvider::new(vec![]);
        let (merged, entries) = run(VARIABLES, &[("speed.pak", &modded)], &mut provider);
        assert!(merged.contains("\"9.0\""));
        assert!(merged.contains("updated from speed.pak"));
        assert!(entries
            .iter()
            .any(|e| matches!(e, LogEntry::Change { signature, .. } if signature == "max_speed")));
    }

    #[test]
    fn test_omission_never_deletes() {
        let trimmed = "Params()\n{\n\tParam(\"max_speed\", \"9.0\");\n}\n";
        let mut provider = PriorityProvider::new(vec![]);
        let (merged, _) = run(VARIABLES, &[("lean.pak", trimmed)], &mut provider);
        assert!(merged.contains("jump_height"));
        assert!(merged.contains("\"9.0\""));
    }

    #[test]
    fn test_repeated_key_keeps_last_declaration() {
        let noisy = "Params()\n{\n\tParam(\"max_speed\", \"6.0\");\n\tParam(\"max_speed\", \"9.0\");\n}\n";
        let mut provider = PriorityProvider::new(vec![]);
        let (merged, entries) = run(VARIABLES, &[("noisy.pak", noisy)], &mut provider);
        assert!(merged.contains("\"9.0\""));
        assert!(!merged.contains("\"6.0\""));
        assert_eq!(
            entries
                .iter()
                .filter(|e| matches!(e, LogEntry::Change { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_conflicting_values_prompt_with_baseline_shown() {
        let mod_a = VARIABLES.replace("\"5.0\"", "\"7.0\"");
        let mod_b = VARIABLES.replace("\"5.0\"", "\"8.0\"");
        let mut provider = ScriptedProvider::new();
        provider.push_choice(1, false);
        let (merged, _) = run(
            VARIABLES,
            &[("a.pak", &mod_a), ("b.pak", &mod_b)],
            &mut provider,
        );
        assert!(merged.contains("\"8.0\""));
        assert!(!merged.contains("\"7.0\""));
        assert_eq!(provider.remaining(), 0);
    }

    #[test]
    fn test_new_parameter_appended_inside_block() {
        let extended = VARIABLES.replace(
            "}\n",
            "\tParam(\"stamina_regen\", \"0.4\");\n}\n",
        );
        let mut provider = PriorityProvider::new(vec![]);
        let (merged, entries) = run(VARIABLES, &[("stamina.pak", &extended)], &mut provider);
        let stamina = merged.find("stamina_regen").unwrap();
        let brace = merged.rfind('}').unwrap();
        assert!(stamina < brace);
        assert!(merged.contains("added from stamina.pak"));
        assert!(entries
            .iter()
            .any(|e| matches!(e, LogEntry::Addition { signature, .. } if signature == "stamina_regen")));
    }

    #[test]
    fn test_provenance_comment_does_not_count_as_change() {
        let annotated = VARIABLES.replace(
            "Param(\"max_speed\", \"5.0\");",
            "Param(\"max_speed\", \"5.0\");\t// [modmeld] updated from old.pak (was: x)",
        );
        let mut provider = PriorityProvider::new(vec![]);
        let (_, entries) = run(VARIABLES, &[("old.pak", &annotated)], &mut provider);
        assert!(entries.is_empty());
    }
}
