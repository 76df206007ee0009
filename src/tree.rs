//! # Script Tree Model, Parser, and Serializer
//!
//! Domain script text is an ad hoc grammar of call-shaped statements and
//! brace-delimited blocks. This module converts raw text into an ordered
//! tree of content units and re-emits it deterministically.
//!
//! Every physical line is stored verbatim (including any trailing `\r`),
//! and serialization is a pure concatenation of those lines with `\n`.
//! Parsing followed by serialization therefore reproduces the input
//! byte-for-byte, which is what lets an untouched baseline pass through a
//! merge unchanged.
//!
//! ## Leniency
//!
//! Malformed input degrades gracefully instead of erroring: an unmatched
//! closing delimiter at the top level is kept as an ordinary leaf, and
//! blocks still open at end-of-input are closed implicitly (their closing
//! line is simply absent). A comment span missing its terminator runs to
//! end-of-input.

use crate::signature::{code_part, InstanceCounter, SignatureIndexer, LITERAL_PREFIX};

/// A single line (or one multi-line comment span) of script content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    /// Verbatim text. Multi-line comment spans hold all enclosed lines
    /// joined with `\n`.
    pub text: String,
    /// Sibling-unique identity key.
    pub signature: String,
    /// Globally monotonic position index, used only for serialization and
    /// anchor tie-breaks, never for cross-version identity.
    pub order: usize,
}

/// A brace-delimited block of script content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptNode {
    /// Sibling-unique identity key. Empty for the synthetic root.
    pub signature: String,
    /// Verbatim header line(s): the call line, any blank lines before a
    /// following-line delimiter, and the delimiter line itself when it is
    /// on its own line. Empty for the root.
    pub header_lines: Vec<String>,
    /// Provenance comment lines emitted before the header. The parser
    /// never fills these; merging does.
    pub lead_comments: Vec<String>,
    /// Ordered children.
    pub children: Vec<ContentUnit>,
    /// Verbatim closing delimiter line. `None` for the root and for blocks
    /// implicitly closed at end-of-input.
    pub closing_line: Option<String>,
    /// Globally monotonic position index of the block itself.
    pub order: usize,
}

/// One unit of content: a leaf line or a nested block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentUnit {
    Leaf(Leaf),
    Block(ScriptNode),
}

impl ContentUnit {
    pub fn signature(&self) -> &str {
        match self {
            ContentUnit::Leaf(leaf) => &leaf.signature,
            ContentUnit::Block(node) => &node.signature,
        }
    }

    pub fn order(&self) -> usize {
        match self {
            ContentUnit::Leaf(leaf) => leaf.order,
            ContentUnit::Block(node) => node.order,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, ContentUnit::Block(_))
    }
}

impl ScriptNode {
    /// An empty clone of this block: same identity and delimiters, no
    /// content. Used when a merge decision empties a block wholesale.
    pub fn emptied(&self) -> ScriptNode {
        ScriptNode {
            signature: self.signature.clone(),
            header_lines: self.header_lines.clone(),
            lead_comments: self.lead_comments.clone(),
            children: Vec::new(),
            closing_line: self.closing_line.clone(),
            order: self.order,
        }
    }

    /// Position of the child with the given signature, if present.
    pub fn position_of(&self, signature: &str) -> Option<usize> {
        self.children.iter().position(|c| c.signature() == signature)
    }

    /// The child with the given signature, if present.
    pub fn child(&self, signature: &str) -> Option<&ContentUnit> {
        self.children.iter().find(|c| c.signature() == signature)
    }
}

/// Parse raw script text into a tree rooted at a synthetic signature-less
/// block.
pub fn parse(text: &str, indexer: &SignatureIndexer) -> ScriptNode {
    let lines: Vec<&str> = text.split('\n').collect();

    // Stack of open blocks, root at the bottom. Each entry carries the
    // per-parent instance counter for its direct children.
    let mut stack: Vec<(ScriptNode, InstanceCounter)> = vec![(ScriptNode::default(), InstanceCounter::new())];
    let mut order: usize = 0;

    let mut comment_span: Option<Vec<String>> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if let Some(span) = comment_span.as_mut() {
            span.push(line.to_string());
            if trimmed.ends_with("*/") {
                let span = comment_span.take().expect("span is open");
                push_leaf(&mut stack, span.join("\n"), format!("{LITERAL_PREFIX}{order}"), &mut order);
            }
            i += 1;
            continue;
        }

        if trimmed == "}" {
            if stack.len() > 1 {
                let (mut done, _) = stack.pop().expect("stack is never empty");
                done.closing_line = Some(line.to_string());
                let parent = &mut stack.last_mut().expect("root never pops").0;
                parent.children.push(ContentUnit::Block(done));
            } else {
                // Unmatched closing delimiter: tolerated, kept verbatim.
                let signature = format!("{LITERAL_PREFIX}{order}");
                push_leaf(&mut stack, line.to_string(), signature, &mut order);
            }
            i += 1;
            continue;
        }

        if trimmed.is_empty() {
            let depth = stack.len() - 1;
            let signature = indexer.line_signature(line, depth, order);
            push_leaf(&mut stack, line.to_string(), signature, &mut order);
            i += 1;
            continue;
        }

        if trimmed.starts_with("//") {
            push_leaf(&mut stack, line.to_string(), format!("{LITERAL_PREFIX}{order}"), &mut order);
            i += 1;
            continue;
        }

        if trimmed.starts_with("/*") {
            if trimmed.contains("*/") {
                push_leaf(&mut stack, line.to_string(), format!("{LITERAL_PREFIX}{order}"), &mut order);
            } else {
                comment_span = Some(vec![line.to_string()]);
            }
            i += 1;
            continue;
        }

        let same_line_delim = trimmed.ends_with('{');
        let next_line_delim = !same_line_delim
            && is_call_shaped(trimmed)
            && next_non_blank(&lines, i + 1).is_some_and(|j| lines[j].trim() == "{");

        if same_line_delim || next_line_delim {
            let mut header_lines = vec![line.to_string()];
            if next_line_delim {
                let delim = next_non_blank(&lines, i + 1).expect("checked above");
                for skipped in &lines[i + 1..=delim] {
                    header_lines.push(skipped.to_string());
                }
                i = delim;
            }

            let base = indexer.block_signature(trimmed);
            let counter = &mut stack.last_mut().expect("stack is never empty").1;
            let signature = counter.disambiguate(&base);

            let node = ScriptNode {
                signature,
                header_lines,
                lead_comments: Vec::new(),
                children: Vec::new(),
                closing_line: None,
                order,
            };
            order += 1;
            stack.push((node, InstanceCounter::new()));
            i += 1;
            continue;
        }

        let depth = stack.len() - 1;
        let base = indexer.line_signature(line, depth, order);
        let counter = &mut stack.last_mut().expect("stack is never empty").1;
        let signature = counter.disambiguate(&base);
        push_leaf(&mut stack, line.to_string(), signature, &mut order);
        i += 1;
    }

    // Unterminated comment span runs to end-of-input.
    if let Some(span) = comment_span.take() {
        push_leaf(&mut stack, span.join("\n"), format!("{LITERAL_PREFIX}{order}"), &mut order);
    }

    // Implicitly close any blocks still open.
    while stack.len() > 1 {
        let (done, _) = stack.pop().expect("stack is never empty");
        let parent = &mut stack.last_mut().expect("root never pops").0;
        parent.children.push(ContentUnit::Block(done));
    }

    stack.pop().expect("root remains").0
}

fn push_leaf(stack: &mut [(ScriptNode, InstanceCounter)], text: String, signature: String, order: &mut usize) {
    let parent = &mut stack.last_mut().expect("stack is never empty").0;
    parent.children.push(ContentUnit::Leaf(Leaf {
        text,
        signature,
        order: *order,
    }));
    *order += 1;
}

fn is_call_shaped(trimmed: &str) -> bool {
    (trimmed.contains('(') && trimmed.contains(')')) || trimmed.starts_with("sub ")
}

fn next_non_blank(lines: &[&str], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&j| !lines[j].trim().is_empty())
}

/// Serialize a tree back to text. The inverse of [`parse`] for any input.
pub fn serialize(root: &ScriptNode) -> String {
    let mut out: Vec<String> = Vec::new();
    for child in &root.children {
        collect_unit(child, &mut out);
    }
    out.join("\n")
}

/// Serialize a single unit (a leaf's text, or a block with its delimiters).
pub fn serialize_unit(unit: &ContentUnit) -> String {
    match unit {
        ContentUnit::Leaf(leaf) => leaf.text.clone(),
        ContentUnit::Block(_) => {
            let mut out = Vec::new();
            collect_unit(unit, &mut out);
            out.join("\n")
        }
    }
}

fn collect_unit(unit: &ContentUnit, out: &mut Vec<String>) {
    match unit {
        ContentUnit::Leaf(leaf) => out.push(leaf.text.clone()),
        ContentUnit::Block(node) => {
            out.extend(node.lead_comments.iter().cloned());
            out.extend(node.header_lines.iter().cloned());
            for child in &node.children {
                collect_unit(child, out);
            }
            if let Some(closing) = &node.closing_line {
                out.push(closing.clone());
            }
        }
    }
}

/// Comment-stripped, blank-insensitive text of a unit, used when deciding
/// whether a variant actually changed anything. Provenance comments left by
/// an earlier merge never count as a change.
pub fn normalized_unit(unit: &ContentUnit) -> String {
    normalized_text(&serialize_unit(unit))
}

/// Comment-stripped, blank-insensitive form of a text fragment.
pub fn normalized_text(text: &str) -> String {
    text.split('\n')
        .map(code_part)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
