//! Locating JSON inside model replies.
//!
//! Models wrap JSON in prose and markdown fences. The scanner below finds every
//! balanced object/array (ignoring brackets inside string literals) so callers
//! can try to deserialize each candidate in order.

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Array,
}

/// A balanced JSON structure found in a larger text. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonSpan {
    pub start: usize,
    pub end: usize,
    pub kind: NodeKind,
    pub children: Vec<JsonSpan>,
}

impl JsonSpan {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Find all root JSON objects/arrays in `text`, with nested structures as children.
#[instrument(target = "reg_quiz::extract", skip(text), fields(text_len = text.len()))]
pub fn find_json_structures(text: &str) -> Vec<JsonSpan> {
    let mut roots = Vec::new();
    let mut stack: Vec<JsonSpan> = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match (escape, b) {
                (true, _) => escape = false,
                (false, b'\\') => escape = true,
                (false, b'"') => in_string = false,
                _ => {}
            }
            continue;
        }

        let closing = match b {
            b'"' => {
                in_string = true;
                continue;
            }
            b'{' | b'[' => {
                let kind = if b == b'{' { NodeKind::Object } else { NodeKind::Array };
                stack.push(JsonSpan { start: i, end: i, kind, children: Vec::new() });
                continue;
            }
            b'}' => NodeKind::Object,
            b']' => NodeKind::Array,
            _ => continue,
        };

        // Mismatched closers drop the open frame
        let Some(mut node) = stack.pop() else { continue };
        if node.kind != closing {
            continue;
        }
        node.end = i + 1;
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    debug!(target: "reg_quiz::extract", count = roots.len(), "found root structures");
    roots
}

/// Deserialize the first structure in `text` that parses as `T`.
///
/// Roots are tried in order, each before its children. If nothing matches the
/// error from the last candidate tried is returned, or the error from parsing
/// the whole text when it contains no JSON at all.
pub fn extract_first<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    fn visit<T: DeserializeOwned>(text: &str, node: &JsonSpan, last: &mut Option<serde_json::Error>) -> Option<T> {
        match serde_json::from_str::<T>(node.slice(text)) {
            Ok(v) => return Some(v),
            Err(e) => *last = Some(e),
        }
        node.children.iter().find_map(|child| visit(text, child, last))
    }

    let mut last = None;
    for root in find_json_structures(text) {
        if let Some(v) = visit::<T>(text, &root, &mut last) {
            return Ok(v);
        }
    }
    match last {
        Some(e) => Err(e),
        None => serde_json::from_str::<T>(text.trim()),
    }
}
