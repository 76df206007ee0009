//! # Merge Configuration
//!
//! This module defines the data structures that control how target files are
//! classified and how content signatures are derived, as well as the logic
//! for loading that configuration from YAML.
//!
//! ## Key Components
//!
//! - **`MergeConfig`**: Top-level configuration: file classification tables,
//!   signature derivation settings, and output annotation behavior.
//!
//! - **`FileClasses`**: File-name tables routing a path to one of the
//!   coarser-granularity merge strategies. Any script file not named in a
//!   table is merged with the recursive tree strategy.
//!
//! - **`SignatureConfig`**: The identity-only function allow-list, the
//!   value-identity exception list, and the nesting depth beyond which a
//!   statement's signature collapses to its leading identifier.
//!
//! All tables default to the sets the merger was originally tuned for, so a
//! caller that never touches configuration gets the stock behavior. The
//! `parse` function is the entry point for loading overrides from a YAML
//! document.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File extension recognized as mergeable script text.
pub const SCRIPT_EXTENSION: &str = ".scr";

/// Marker tag embedded in provenance annotations and report lines.
pub const ANNOTATION_TAG: &str = "[modmeld]";

/// File-name tables that select a coarser-granularity merge strategy.
///
/// Matching is by file name only (directories ignored) and case-insensitive,
/// mirroring how mod archives reference these files inconsistently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileClasses {
    /// Files merged one logical line at a time, no recursion.
    #[serde(default)]
    pub line_based: Vec<String>,
    /// Files merged as named-parameter declarations keyed by name.
    #[serde(default)]
    pub keyed_params: Vec<String>,
    /// Files whose top-level named blocks are indivisible merge units.
    #[serde(default)]
    pub named_blocks: Vec<String>,
    /// Files merged as `(Type, Name) -> Value` definition triples.
    #[serde(default)]
    pub definitions: Vec<String>,
}

impl Default for FileClasses {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            line_based: names(&[
                "inputs_keyboard.scr",
                "logic_script.scr",
                "logic_script_game.scr",
                "logic_script_game_overlay.scr",
                "frame_script.scr",
                "frame_script_game.scr",
                "render_script.scr",
            ]),
            keyed_params: names(&["player_variables.scr"]),
            named_blocks: names(&["jump_parameters.scr", "jump_parameters_new.scr"]),
            definitions: names(&["healthdefinitions.scr", "healingdefinitions.scr"]),
        }
    }
}

/// Settings controlling signature derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureConfig {
    /// Function names identified by their first argument alone, regardless
    /// of remaining arguments (`Param("max_speed", 5)` -> `Param_max_speed`).
    #[serde(default)]
    pub keyed_functions: Vec<String>,
    /// Function names whose calls are identified by name only, even when
    /// they carry arguments.
    #[serde(default)]
    pub name_only_functions: Vec<String>,
    /// Number of enclosing blocks beyond which a statement's signature
    /// collapses to its leading identifier. A deliberate approximation:
    /// deep statement bodies are noisy, and aliasing there is preferred
    /// over spurious mismatches.
    #[serde(default = "default_name_only_depth")]
    pub name_only_depth: usize,
}

fn default_name_only_depth() -> usize {
    2
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            keyed_functions: [
                "Param",
                "VarFloat",
                "VarVec3",
                "VarString",
                "LockpickDifficulty",
                "SafeDifficulty",
                "FrequncyDifficulty",
                "Preset",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            name_only_functions: vec!["MotionTrailFx".to_string()],
            name_only_depth: default_name_only_depth(),
        }
    }
}

/// Top-level merge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// File classification tables.
    #[serde(default)]
    pub classes: FileClasses,
    /// Signature derivation settings.
    #[serde(default)]
    pub signature: SignatureConfig,
    /// When true (the default), merged lines and blocks carry inline
    /// provenance comments naming the contributing mod and original value.
    #[serde(default = "default_annotate")]
    pub annotate: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            classes: FileClasses::default(),
            signature: SignatureConfig::default(),
            annotate: default_annotate(),
        }
    }
}

fn default_annotate() -> bool {
    true
}

/// Parse a YAML document into a [`MergeConfig`].
///
/// Missing fields fall back to their defaults, so a partial override like
/// `annotate: false` is a valid document.
pub fn parse(yaml_content: &str) -> Result<MergeConfig> {
    let config: MergeConfig = serde_yaml::from_str(yaml_content)?;
    Ok(config)
}
