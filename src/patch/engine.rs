//! Replacement sanitizing and block rewriting.

use tracing::debug;

use super::locator::{leading_indent, BlockLocator, MarkerSyntax};
use crate::error::{BenchError, Result};
use crate::protocol::ProtocolSyntax;

const FENCE: &str = "```";

/// Rewrites the content of marked blocks while keeping marker lines and
/// indentation context intact.
#[derive(Debug, Clone)]
pub struct BlockPatchEngine {
    locator: BlockLocator,
    fill_header: String,
}

impl Default for BlockPatchEngine {
    fn default() -> Self {
        Self::new(MarkerSyntax::default(), &ProtocolSyntax::default())
    }
}

impl BlockPatchEngine {
    #[must_use]
    pub fn new(markers: MarkerSyntax, protocol: &ProtocolSyntax) -> Self {
        Self {
            locator: BlockLocator::new(markers),
            fill_header: format!("{}fill:", protocol.prefix),
        }
    }

    #[must_use]
    pub fn locator(&self) -> &BlockLocator {
        &self.locator
    }

    /// Strip transport artifacts from generated text.
    ///
    /// Removes an enclosing code fence and a leading `fill` header line,
    /// collapses blank-line runs, trims blank edges and removes the common
    /// indentation. The result carries no indentation of its own.
    #[must_use]
    pub fn sanitize(&self, raw: &str) -> String {
        let normalized = raw.replace("\r\n", "\n");
        let lines: Vec<&str> = normalized.split('\n').collect();
        let lines = strip_fence(lines);
        let lines = self.strip_header(lines);

        let mut collapsed: Vec<&str> = Vec::with_capacity(lines.len());
        for line in lines {
            if line.trim().is_empty() {
                if collapsed.last().is_some_and(|l| l.is_empty()) {
                    continue;
                }
                collapsed.push("");
            } else {
                collapsed.push(line.trim_end());
            }
        }

        while collapsed.first().is_some_and(|l| l.is_empty()) {
            collapsed.remove(0);
        }
        while collapsed.last().is_some_and(|l| l.is_empty()) {
            collapsed.pop();
        }

        dedent(&collapsed)
    }

    fn strip_header<'a>(&self, mut lines: Vec<&'a str>) -> Vec<&'a str> {
        if let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) {
            if lines[first].trim_start().starts_with(&self.fill_header) {
                lines.remove(first);
            }
        }
        lines
    }

    /// Replace the content of `block_id` in `buffer` with `raw`.
    ///
    /// The replacement is sanitized, then every non-blank line is prefixed
    /// with the start marker's indent. The end marker is rewritten with the
    /// same indent. Everything outside the marker pair is left untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use benchwright::patch::{BlockPatchEngine, MarkerSyntax};
    /// use benchwright::protocol::ProtocolSyntax;
    ///
    /// let engine = BlockPatchEngine::new(MarkerSyntax::new("START", "END"), &ProtocolSyntax::default());
    /// let out = engine
    ///     .patch("class X:\n    # START: A\n    # END: A\n", "A", "x = 1")
    ///     .unwrap();
    /// assert_eq!(out, "class X:\n    # START: A\n    x = 1\n    # END: A\n");
    /// ```
    pub fn patch(&self, buffer: &str, block_id: &str, raw: &str) -> Result<String> {
        let span = self.locator.locate(buffer, block_id)?;

        let replacement = self.sanitize(raw);
        if replacement.trim().is_empty() {
            return Err(BenchError::EmptyReplacement {
                block_id: block_id.to_string(),
            });
        }
        if self.locator.syntax().mentions(&replacement, block_id) {
            return Err(BenchError::MarkerInReplacement {
                block_id: block_id.to_string(),
            });
        }

        let lines: Vec<&str> = buffer.split('\n').collect();
        let start_raw = lines[span.start_line];
        let end_raw = lines[span.end_line];
        let crlf = start_raw.ends_with('\r');
        let newline = if crlf { "\r\n" } else { "\n" };

        let mut out = String::with_capacity(buffer.len() + replacement.len());
        for line in &lines[..span.start_line] {
            out.push_str(line);
            out.push('\n');
        }

        out.push_str(start_raw.strip_suffix('\r').unwrap_or(start_raw));
        out.push_str(newline);
        for line in replacement.split('\n') {
            if !line.is_empty() {
                out.push_str(&span.indent);
                out.push_str(line);
            }
            out.push_str(newline);
        }

        let end_text = end_raw.strip_suffix('\r').unwrap_or(end_raw);
        out.push_str(&span.indent);
        out.push_str(end_text.trim_start_matches([' ', '\t']));
        if end_raw.ends_with('\r') {
            out.push('\r');
        }

        for line in &lines[span.end_line + 1..] {
            out.push('\n');
            out.push_str(line);
        }

        debug!(
            "Patched block {} ({} lines)",
            block_id,
            replacement.split('\n').count()
        );
        Ok(out)
    }

    /// Current content of a block with its canonical indent removed.
    pub fn extract(&self, buffer: &str, block_id: &str) -> Result<String> {
        self.locator.extract(buffer, block_id)
    }
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// Keep only the content of the first fenced block, or drop a lone fence
/// that opens or closes the text.
fn strip_fence(lines: Vec<&str>) -> Vec<&str> {
    let fences: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_fence(l))
        .map(|(i, _)| i)
        .take(2)
        .collect();

    match fences.as_slice() {
        [open, close, ..] => lines[open + 1..*close].to_vec(),
        [only] => {
            let first = lines.iter().position(|l| !l.trim().is_empty());
            let last = lines.iter().rposition(|l| !l.trim().is_empty());
            if Some(*only) == first || Some(*only) == last {
                let mut lines = lines;
                lines.remove(*only);
                lines
            } else {
                lines
            }
        }
        [] => lines,
    }
}

fn dedent(lines: &[&str]) -> String {
    let mut common: Option<&str> = None;
    for line in lines.iter().filter(|l| !l.is_empty()) {
        let indent = leading_indent(line);
        common = Some(match common {
            None => indent,
            Some(current) => {
                let shared = current
                    .char_indices()
                    .zip(indent.chars())
                    .find(|((_, a), b)| a != b)
                    .map_or(current.len().min(indent.len()), |((i, _), _)| i);
                &current[..shared]
            }
        });
    }
    let width = common.map_or(0, str::len);

    lines
        .iter()
        .map(|line| if line.is_empty() { *line } else { &line[width..] })
        .collect::<Vec<_>>()
        .join("\n")
}
