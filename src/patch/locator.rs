//! Marker-line detection and block location.
//!
//! A marked block is delimited by two comment lines carrying the same id:
//!
//! ```text
//!     # LLM_GENERATED_START: DRIVER_BFM_CALL
//!     ...generated content...
//!     # LLM_GENERATED_END: DRIVER_BFM_CALL
//! ```
//!
//! A line is a marker when it contains `<tag>:` followed by optional
//! whitespace, exactly the block id, and nothing but whitespace after it.
//! Only the first `<tag>:` on a line is examined, so the comment leader in
//! front of the tag can be anything (`#`, `//`, `--`).
//!
//! Location is a single forward scan with three states: looking for the
//! start marker, looking for the end marker, done. The indentation of the
//! start marker line is the block's canonical indent.

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Tags that introduce start and end marker lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkerSyntax {
    pub start: String,
    pub end: String,
}

impl Default for MarkerSyntax {
    fn default() -> Self {
        Self::new("LLM_GENERATED_START", "LLM_GENERATED_END")
    }
}

/// Which side of a block a marker line delimits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
}

impl MarkerSyntax {
    #[must_use]
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Classify a line as a marker for `block_id`, if it is one.
    ///
    /// # Example
    ///
    /// ```
    /// use benchwright::patch::{MarkerKind, MarkerSyntax};
    ///
    /// let syntax = MarkerSyntax::new("START", "END");
    /// assert_eq!(syntax.classify("    # START: A", "A"), Some(MarkerKind::Start));
    /// assert_eq!(syntax.classify("# END:A  ", "A"), Some(MarkerKind::End));
    /// assert_eq!(syntax.classify("# START: AB", "A"), None);
    /// ```
    #[must_use]
    pub fn classify(&self, line: &str, block_id: &str) -> Option<MarkerKind> {
        if tag_matches(line, &self.start, block_id) {
            Some(MarkerKind::Start)
        } else if tag_matches(line, &self.end, block_id) {
            Some(MarkerKind::End)
        } else {
            None
        }
    }

    /// Whether any line of `text` is a marker for `block_id`.
    #[must_use]
    pub fn mentions(&self, text: &str, block_id: &str) -> bool {
        text.lines().any(|line| self.classify(line, block_id).is_some())
    }
}

/// The first `<tag>:` on the line that does not continue an identifier
/// decides; `# RESTART: A` is not a `START` marker.
fn tag_matches(line: &str, tag: &str, block_id: &str) -> bool {
    let needle = format!("{}:", tag.trim());
    let found = line.match_indices(&needle).find(|(pos, _)| {
        line[..*pos]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
    });
    match found {
        Some((pos, _)) => line[pos + needle.len()..].trim() == block_id,
        None => false,
    }
}

/// Leading spaces and tabs of a line.
#[must_use]
pub fn leading_indent(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|(_, c)| *c != ' ' && *c != '\t')
        .map_or(line.len(), |(i, _)| i);
    &line[..end]
}

/// Boundaries of a located block, as line indices into the buffer.
///
/// Lines are the pieces of the buffer split on `'\n'`; a trailing `'\r'`
/// stays attached to its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpan {
    pub block_id: String,
    /// Index of the start marker line.
    pub start_line: usize,
    /// Index of the end marker line.
    pub end_line: usize,
    /// Whitespace prefix of the start marker line.
    pub indent: String,
}

impl BlockSpan {
    /// Lines strictly between the two markers.
    #[must_use]
    pub fn content_lines<'a>(&self, buffer: &'a str) -> Vec<&'a str> {
        buffer
            .split('\n')
            .skip(self.start_line + 1)
            .take(self.end_line - self.start_line - 1)
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect()
    }

    /// Content between the markers with the canonical indent removed.
    #[must_use]
    pub fn dedented_content(&self, buffer: &str) -> String {
        self.content_lines(buffer)
            .iter()
            .map(|line| line.strip_prefix(self.indent.as_str()).unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

enum ScanState {
    SeekingStart,
    SeekingEnd { start_line: usize, indent: String },
}

/// Finds marked blocks in text buffers.
#[derive(Debug, Clone, Default)]
pub struct BlockLocator {
    syntax: MarkerSyntax,
}

impl BlockLocator {
    #[must_use]
    pub fn new(syntax: MarkerSyntax) -> Self {
        Self { syntax }
    }

    #[must_use]
    pub fn syntax(&self) -> &MarkerSyntax {
        &self.syntax
    }

    /// Locate the first `start`/`end` marker pair for `block_id`.
    ///
    /// End markers seen before any start marker are ignored; an unterminated
    /// start marker counts as not found.
    pub fn locate(&self, buffer: &str, block_id: &str) -> Result<BlockSpan> {
        let mut state = ScanState::SeekingStart;

        for (index, line) in buffer.split('\n').enumerate() {
            let kind = self.syntax.classify(line, block_id);
            state = match (state, kind) {
                (ScanState::SeekingStart, Some(MarkerKind::Start)) => ScanState::SeekingEnd {
                    start_line: index,
                    indent: leading_indent(line).to_string(),
                },
                (ScanState::SeekingEnd { start_line, indent }, Some(MarkerKind::End)) => {
                    return Ok(BlockSpan {
                        block_id: block_id.to_string(),
                        start_line,
                        end_line: index,
                        indent,
                    });
                }
                (state, _) => state,
            };
        }

        Err(BenchError::BlockNotFound {
            block_id: block_id.to_string(),
        })
    }

    /// Content of a block with its canonical indent removed.
    pub fn extract(&self, buffer: &str, block_id: &str) -> Result<String> {
        let span = self.locate(buffer, block_id)?;
        Ok(span.dedented_content(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator() -> BlockLocator {
        BlockLocator::new(MarkerSyntax::new("START", "END"))
    }

    #[test]
    fn test_locate_reports_start_indent() {
        let buffer = "class X:\n    # START: A\n    old()\n    # END: A\n";
        let span = locator().locate(buffer, "A").unwrap();
        assert_eq!(span.start_line, 1);
        assert_eq!(span.end_line, 3);
        assert_eq!(span.indent, "    ");
    }

    #[test]
    fn test_locate_tab_indent() {
        let buffer = "\t\t// START: B\n\t\t// END: B";
        let span = locator().locate(buffer, "B").unwrap();
        assert_eq!(span.indent, "\t\t");
    }

    #[test]
    fn test_indent_comes_from_start_marker() {
        let buffer = "  # START: A\nbody\n        # END: A\n";
        let span = locator().locate(buffer, "A").unwrap();
        assert_eq!(span.indent, "  ");
    }

    #[test]
    fn test_locate_missing_block() {
        let err = locator().locate("nothing here\n", "A").unwrap_err();
        assert!(matches!(err, BenchError::BlockNotFound { block_id } if block_id == "A"));
    }

    #[test]
    fn test_unterminated_block_not_found() {
        let buffer = "# START: A\nbody\n";
        assert!(locator().locate(buffer, "A").is_err());
    }

    #[test]
    fn test_end_before_start_is_ignored() {
        let buffer = "# END: A\n# START: A\nx\n# END: A\n";
        let span = locator().locate(buffer, "A").unwrap();
        assert_eq!(span.start_line, 1);
        assert_eq!(span.end_line, 3);
    }

    #[test]
    fn test_prefix_ids_do_not_collide() {
        let buffer = "# START: AB\n# END: AB\n# START: A\nx\n# END: A\n";
        let span = locator().locate(buffer, "A").unwrap();
        assert_eq!(span.start_line, 2);
        let span = locator().locate(buffer, "AB").unwrap();
        assert_eq!((span.start_line, span.end_line), (0, 1));
    }

    #[test]
    fn test_tag_inside_word_is_not_a_marker() {
        let syntax = MarkerSyntax::new("START", "END");
        assert_eq!(syntax.classify("# RESTART: A", "A"), None);
        assert_eq!(syntax.classify("# BLEND: A", "A"), None);
        assert_eq!(syntax.classify("# MY_START: A", "A"), None);
        assert_eq!(syntax.classify("#START: A", "A"), Some(MarkerKind::Start));
        assert_eq!(syntax.classify("START: A", "A"), Some(MarkerKind::Start));

        let buffer = "# RESTART: A\nold = 1\n# START: A\nx = 1\n# BLEND: A\n# END: A\n";
        let span = BlockLocator::new(syntax).locate(buffer, "A").unwrap();
        assert_eq!((span.start_line, span.end_line), (2, 5));
    }

    #[test]
    fn test_first_pair_wins() {
        let buffer = "# START: A\none\n# END: A\n# START: A\ntwo\n# END: A\n";
        assert_eq!(locator().extract(buffer, "A").unwrap(), "one");
    }

    #[test]
    fn test_long_tags_in_default_syntax() {
        let locator = BlockLocator::default();
        let buffer = "    # LLM_GENERATED_START: DRIVER_BFM_CALL\n    # old\n    # LLM_GENERATED_END: DRIVER_BFM_CALL\n";
        let span = locator.locate(buffer, "DRIVER_BFM_CALL").unwrap();
        assert_eq!(span.indent, "    ");
        assert_eq!(locator.extract(buffer, "DRIVER_BFM_CALL").unwrap(), "# old");
    }

    #[test]
    fn test_extract_strips_only_canonical_indent() {
        let buffer = "  # START: A\n  if x:\n      y()\n  # END: A";
        assert_eq!(locator().extract(buffer, "A").unwrap(), "if x:\n    y()");
    }

    #[test]
    fn test_crlf_lines() {
        let buffer = "a\r\n    # START: A\r\n    v\r\n    # END: A\r\n";
        let span = locator().locate(buffer, "A").unwrap();
        assert_eq!(span.indent, "    ");
        assert_eq!(span.content_lines(buffer), vec!["    v"]);
    }

    #[test]
    fn test_locate_is_stable_between_patches() {
        let buffer = "x\n  # START: A\n  # END: A\ny\n";
        let first = locator().locate(buffer, "A").unwrap();
        let second = locator().locate(buffer, "A").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_leading_indent() {
        assert_eq!(leading_indent("  \tx"), "  \t");
        assert_eq!(leading_indent("x"), "");
        assert_eq!(leading_indent("   "), "   ");
    }
}
