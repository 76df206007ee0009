//! # Conflict Decision Providers
//!
//! When a conflict has more than one surviving candidate, something has to
//! pick one; merging never guesses. The [`DecisionProvider`] trait is that
//! seam: the production implementation blocks on the console, the batch
//! implementation applies a fixed priority order, and the scripted
//! implementation replays canned answers for tests.
//!
//! Resolution is strictly sequential per file, so the trait is synchronous;
//! no async machinery is needed.
//!
//! [`choose_with_memo`] wraps a provider with the session memo: an exact
//! recurrence of a conflicting-source set reuses the remembered choice
//! without prompting, anything else falls through to the provider.

use std::collections::BTreeSet;
use std::collections::VecDeque;

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};

use crate::error::{Error, Result};
use crate::session::MergeSession;

/// One selectable version of conflicted content.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Sources contributing exactly this value (distinct values are grouped
    /// before prompting, so several mods may stand behind one candidate).
    pub sources: Vec<String>,
    /// Display text of the value.
    pub preview: String,
    /// True when this candidate is the untouched baseline, offered as an
    /// explicit option. Choosing it is never memoized.
    pub is_baseline: bool,
}

impl Candidate {
    pub fn new(sources: Vec<String>, preview: impl Into<String>) -> Self {
        Self {
            sources,
            preview: preview.into(),
            is_baseline: false,
        }
    }

    pub fn baseline(preview: impl Into<String>) -> Self {
        Self {
            sources: vec![BASELINE_SOURCE.to_string()],
            preview: preview.into(),
            is_baseline: true,
        }
    }

    /// Joined source list for provenance annotations and log entries.
    pub fn source_label(&self) -> String {
        self.sources.join(", ")
    }
}

/// Display name used when the baseline itself is offered as a candidate.
pub const BASELINE_SOURCE: &str = "Original Game File";

/// What a conflict is about, for display and error reporting.
#[derive(Debug, Clone, Copy)]
pub struct ConflictContext<'a> {
    /// Target file path.
    pub file: &'a str,
    /// Signature, block name, or path the conflict concerns.
    pub subject: &'a str,
    /// Baseline value, when one exists. `None` marks a conflict on newly
    /// added content.
    pub baseline: Option<&'a str>,
}

/// A provider's answer to a candidate conflict.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    /// Index into the candidate slice.
    pub choice: usize,
    /// Remember this choice for the rest of the file, as long as the same
    /// conflicting-source set keeps recurring.
    pub apply_to_set: bool,
}

/// Answer to a deletion conflict (some mods delete, others modify).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionChoice {
    KeepModified,
    Delete,
}

/// Answer to an empty-vs-modified block conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptiedChoice {
    KeepModified,
    Empty,
}

/// Synchronous conflict resolution capability.
///
/// A provider must return a valid answer or an error; it must never guess
/// silently. An out-of-range choice is treated as an unresolved conflict.
pub trait DecisionProvider {
    /// Pick one of at least two distinct candidates.
    fn choose_candidate(
        &mut self,
        ctx: &ConflictContext<'_>,
        candidates: &[Candidate],
    ) -> Result<Resolution>;

    /// Decide a deletion conflict: `deleting` sources omit the unit,
    /// `modifying` sources changed it.
    fn resolve_deletion(
        &mut self,
        ctx: &ConflictContext<'_>,
        deleting: &[String],
        modifying: &[String],
    ) -> Result<DeletionChoice>;

    /// Decide an empty-vs-modified block conflict: `emptying` sources
    /// supply the block with no content, `modifying` sources changed it.
    fn resolve_emptied_block(
        &mut self,
        ctx: &ConflictContext<'_>,
        emptying: &[String],
        modifying: &[String],
    ) -> Result<EmptiedChoice>;
}

/// Memo-aware candidate choice.
///
/// The conflicting-source set is the union of all non-baseline candidates'
/// sources. An exact memo hit short-circuits the provider; otherwise the
/// provider is consulted, and its choice is remembered when it asked for
/// that (baseline picks are never remembered).
pub fn choose_with_memo<P: DecisionProvider + ?Sized>(
    provider: &mut P,
    session: &mut MergeSession,
    ctx: &ConflictContext<'_>,
    candidates: &[Candidate],
) -> Result<usize> {
    let conflict_set: BTreeSet<String> = candidates
        .iter()
        .filter(|c| !c.is_baseline)
        .flat_map(|c| c.sources.iter().cloned())
        .collect();

    if let Some(preferred) = session.remembered(&conflict_set) {
        if let Some(idx) = candidates
            .iter()
            .position(|c| !c.is_baseline && c.sources.iter().any(|s| *s == preferred))
        {
            log::debug!(
                "memoized decision '{}' reused for '{}' in '{}'",
                preferred,
                ctx.subject,
                ctx.file
            );
            return Ok(idx);
        }
    }

    let resolution = provider.choose_candidate(ctx, candidates)?;
    let chosen = candidates
        .get(resolution.choice)
        .ok_or_else(|| Error::UnresolvedConflict {
            file: ctx.file.to_string(),
            subject: ctx.subject.to_string(),
            message: format!(
                "provider chose option {} of {}",
                resolution.choice + 1,
                candidates.len()
            ),
        })?;

    if resolution.apply_to_set && !chosen.is_baseline {
        if let Some(source) = chosen.sources.first() {
            session.remember(conflict_set, source.clone());
        }
    }
    Ok(resolution.choice)
}

/// Interactive console provider.
///
/// Enumerates candidates, blocks for a discrete choice, and offers to apply
/// the choice to all further conflicts in the file among the same mods.
pub struct InteractiveProvider {
    theme: ColorfulTheme,
}

impl InteractiveProvider {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    fn announce(&self, ctx: &ConflictContext<'_>, description: &str) {
        println!();
        println!(
            "{} In file '{}', {} for '{}'",
            style("[CHOICE REQUIRED]").red().bold(),
            ctx.file,
            description,
            ctx.subject
        );
        if let Some(baseline) = ctx.baseline {
            println!("  Original: {}", style(baseline.trim()).dim());
        }
    }
}

impl Default for InteractiveProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionProvider for InteractiveProvider {
    fn choose_candidate(
        &mut self,
        ctx: &ConflictContext<'_>,
        candidates: &[Candidate],
    ) -> Result<Resolution> {
        self.announce(ctx, "conflict");
        for (i, candidate) in candidates.iter().enumerate() {
            println!("    {}. ({}):", i + 1, style(candidate.source_label()).yellow());
            for line in candidate.preview.trim_end().split('\n') {
                println!("       {}", style(line).cyan());
            }
        }

        let labels: Vec<String> = candidates.iter().map(|c| c.source_label()).collect();
        let choice = Select::with_theme(&self.theme)
            .with_prompt("Select the version to use")
            .items(&labels)
            .default(0)
            .interact()?;

        let apply_to_set = if candidates[choice].is_baseline {
            false
        } else {
            Confirm::with_theme(&self.theme)
                .with_prompt("Apply this choice to all further conflicts between these mods in this file?")
                .default(false)
                .interact()?
        };

        Ok(Resolution { choice, apply_to_set })
    }

    fn resolve_deletion(
        &mut self,
        ctx: &ConflictContext<'_>,
        deleting: &[String],
        modifying: &[String],
    ) -> Result<DeletionChoice> {
        self.announce(ctx, "deletion conflict");
        println!(
            " -> These mods want to DELETE it: {}",
            style(deleting.join(", ")).yellow()
        );
        println!(
            " -> These mods want to CHANGE it: {}",
            style(modifying.join(", ")).yellow()
        );

        let choice = Select::with_theme(&self.theme)
            .with_prompt("What would you like to do?")
            .items(&[
                "Keep the modified versions (you may be asked to choose between them)",
                "Delete the content",
            ])
            .default(0)
            .interact()?;

        Ok(if choice == 1 {
            DeletionChoice::Delete
        } else {
            DeletionChoice::KeepModified
        })
    }

    fn resolve_emptied_block(
        &mut self,
        ctx: &ConflictContext<'_>,
        emptying: &[String],
        modifying: &[String],
    ) -> Result<EmptiedChoice> {
        self.announce(ctx, "empty vs. modified block conflict");
        println!(
            " -> These mods want to EMPTY the block: {}",
            style(emptying.join(", ")).yellow()
        );
        println!(
            " -> These mods want to MODIFY the block: {}",
            style(modifying.join(", ")).yellow()
        );

        let choice = Select::with_theme(&self.theme)
            .with_prompt("What would you like to do?")
            .items(&[
                "Keep the modified versions (merging continues with them)",
                "Empty the block's content",
            ])
            .default(0)
            .interact()?;

        Ok(if choice == 1 {
            EmptiedChoice::Empty
        } else {
            EmptiedChoice::KeepModified
        })
    }
}

/// Deterministic batch provider: a fixed source priority order decides
/// every conflict. Required for non-interactive runs and for parallel
/// merging; never memoizes (it does not need to).
#[derive(Debug, Clone)]
pub struct PriorityProvider {
    /// Source ids in preference order, most preferred first. Sources not
    /// listed rank behind all listed ones, ties broken by candidate order.
    priority: Vec<String>,
    /// Fixed answer for deletion conflicts.
    pub on_deletion: DeletionChoice,
    /// Fixed answer for empty-vs-modified conflicts.
    pub on_emptied: EmptiedChoice,
}

impl PriorityProvider {
    pub fn new(priority: Vec<String>) -> Self {
        Self {
            priority,
            on_deletion: DeletionChoice::KeepModified,
            on_emptied: EmptiedChoice::KeepModified,
        }
    }

    fn rank(&self, candidate: &Candidate) -> usize {
        candidate
            .sources
            .iter()
            .filter_map(|s| self.priority.iter().position(|p| p == s))
            .min()
            .unwrap_or(usize::MAX)
    }
}

impl DecisionProvider for PriorityProvider {
    fn choose_candidate(
        &mut self,
        ctx: &ConflictContext<'_>,
        candidates: &[Candidate],
    ) -> Result<Resolution> {
        let choice = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_baseline)
            .min_by_key(|(i, c)| (self.rank(c), *i))
            .map(|(i, _)| i)
            .or_else(|| (!candidates.is_empty()).then_some(0))
            .ok_or_else(|| Error::UnresolvedConflict {
                file: ctx.file.to_string(),
                subject: ctx.subject.to_string(),
                message: "no candidates to choose from".to_string(),
            })?;
        Ok(Resolution {
            choice,
            apply_to_set: false,
        })
    }

    fn resolve_deletion(
        &mut self,
        _ctx: &ConflictContext<'_>,
        _deleting: &[String],
        _modifying: &[String],
    ) -> Result<DeletionChoice> {
        Ok(self.on_deletion)
    }

    fn resolve_emptied_block(
        &mut self,
        _ctx: &ConflictContext<'_>,
        _emptying: &[String],
        _modifying: &[String],
    ) -> Result<EmptiedChoice> {
        Ok(self.on_emptied)
    }
}

/// Test provider replaying canned answers in order.
///
/// Running out of answers is an [`Error::UnresolvedConflict`]: a conflict
/// the test did not anticipate must fail loudly, not be guessed away.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    choices: VecDeque<Resolution>,
    deletions: VecDeque<DeletionChoice>,
    emptied: VecDeque<EmptiedChoice>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next candidate conflict.
    pub fn push_choice(&mut self, choice: usize, apply_to_set: bool) -> &mut Self {
        self.choices.push_back(Resolution { choice, apply_to_set });
        self
    }

    /// Queue an answer for the next deletion conflict.
    pub fn push_deletion(&mut self, answer: DeletionChoice) -> &mut Self {
        self.deletions.push_back(answer);
        self
    }

    /// Queue an answer for the next empty-vs-modified conflict.
    pub fn push_emptied(&mut self, answer: EmptiedChoice) -> &mut Self {
        self.emptied.push_back(answer);
        self
    }

    /// Number of queued answers left unconsumed.
    pub fn remaining(&self) -> usize {
        self.choices.len() + self.deletions.len() + self.emptied.len()
    }

    fn exhausted(ctx: &ConflictContext<'_>, kind: &str) -> Error {
        Error::UnresolvedConflict {
            file: ctx.file.to_string(),
            subject: ctx.subject.to_string(),
            message: format!("scripted provider ran out of {kind} answers"),
        }
    }
}

impl DecisionProvider for ScriptedProvider {
    fn choose_candidate(
        &mut self,
        ctx: &ConflictContext<'_>,
        _candidates: &[Candidate],
    ) -> Result<Resolution> {
        self.choices
            .pop_front()
            .ok_or_else(|| Self::exhausted(ctx, "candidate"))
    }

    fn resolve_deletion(
        &mut self,
        ctx: &ConflictContext<'_>,
        _deleting: &[String],
        _modifying: &[String],
    ) -> Result<DeletionChoice> {
        self.deletions
            .pop_front()
            .ok_or_else(|| Self::exhausted(ctx, "deletion"))
    }

    fn resolve_emptied_block(
        &mut self,
        ctx: &ConflictContext<'_>,
        _emptying: &[String],
        _modifying: &[String],
    ) -> Result<EmptiedChoice> {
        self.emptied
            .pop_front()
            .ok_or_else(|| Self::exhausted(ctx, "emptied-block"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> ConflictContext<'a> {
        ConflictContext {
            file: "ai.scr",
            subject: "Param_max_speed",
            baseline: None,
        }
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate::new(vec!["a.pak".to_string()], "Param(\"max_speed\", 6);"),
            Candidate::new(vec!["b.pak".to_string()], "Param(\"max_speed\", 7);"),
        ]
    }

    #[test]
    fn test_priority_provider_prefers_listed_source() {
        let mut provider = PriorityProvider::new(vec!["b.pak".to_string(), "a.pak".to_string()]);
        let resolution = provider.choose_candidate(&ctx(), &candidates()).unwrap();
        assert_eq!(resolution.choice, 1);
        assert!(!resolution.apply_to_set);
    }

    #[test]
    fn test_priority_provider_falls_back_to_first() {
        let mut provider = PriorityProvider::new(vec![]);
        let resolution = provider.choose_candidate(&ctx(), &candidates()).unwrap();
        assert_eq!(resolution.choice, 0);
    }

    #[test]
    fn test_priority_provider_skips_baseline_candidate() {
        let mut provider = PriorityProvider::new(vec![]);
        let mut cands = vec![Candidate::baseline("original block")];
        cands.extend(candidates());
        let resolution = provider.choose_candidate(&ctx(), &cands).unwrap();
        assert_eq!(resolution.choice, 1);
    }

    #[test]
    fn test_scripted_provider_replays_then_fails_loudly() {
        let mut provider = ScriptedProvider::new();
        provider.push_choice(1, false);
        let resolution = provider.choose_candidate(&ctx(), &candidates()).unwrap();
        assert_eq!(resolution.choice, 1);
        let err = provider.choose_candidate(&ctx(), &candidates()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedConflict { .. }));
    }

    #[test]
    fn test_choose_with_memo_reuses_exact_set() {
        let mut provider = ScriptedProvider::new();
        provider.push_choice(0, true);
        let mut session = MergeSession::new("ai.scr");

        let first = choose_with_memo(&mut provider, &mut session, &ctx(), &candidates()).unwrap();
        assert_eq!(first, 0);
        // same conflicting set again: no provider consultation needed
        let second = choose_with_memo(&mut provider, &mut session, &ctx(), &candidates()).unwrap();
        assert_eq!(second, 0);
        assert_eq!(provider.remaining(), 0);
    }

    #[test]
    fn test_choose_with_memo_different_set_prompts_again() {
        let mut provider = ScriptedProvider::new();
        provider.push_choice(0, true);
        provider.push_choice(1, false);
        let mut session = MergeSession::new("ai.scr");

        choose_with_memo(&mut provider, &mut session, &ctx(), &candidates()).unwrap();

        let other = vec![
            Candidate::new(vec!["a.pak".to_string()], "x"),
            Candidate::new(vec!["c.pak".to_string()], "y"),
        ];
        let picked = choose_with_memo(&mut provider, &mut session, &ctx(), &other).unwrap();
        assert_eq!(picked, 1);
        assert_eq!(provider.remaining(), 0);
    }

    #[test]
    fn test_choose_with_memo_never_remembers_baseline() {
        let mut provider = ScriptedProvider::new();
        provider.push_choice(0, true); // baseline, apply requested anyway
        provider.push_choice(2, false);
        let mut session = MergeSession::new("ai.scr");

        let mut cands = vec![Candidate::baseline("original")];
        cands.extend(candidates());

        let first = choose_with_memo(&mut provider, &mut session, &ctx(), &cands).unwrap();
        assert_eq!(first, 0);
        // nothing memoized: the follow-up consults the provider again
        let second = choose_with_memo(&mut provider, &mut session, &ctx(), &cands).unwrap();
        assert_eq!(second, 2);
    }

    #[test]
    fn test_out_of_range_choice_is_unresolved() {
        let mut provider = ScriptedProvider::new();
        provider.push_choice(9, false);
        let mut session = MergeSession::new("ai.scr");
        let err = choose_with_memo(&mut provider, &mut session, &ctx(), &candidates()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedConflict { .. }));
    }
}
