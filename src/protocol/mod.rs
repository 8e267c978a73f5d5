//! Tagged-segment reply protocol.
//!
//! A reply packs independent edits into segments. Each segment starts at the
//! beginning of a line with the prefix token:
//!
//! ```text
//! benchwright:fill:tb/driver.py:DRIVER_BFM_CALL
//! await self.bfm.send_op(item.a, item.b)
//! benchwright:context:bfm_methods:[send_op, get_result]
//! ```
//!
//! `fill` segments carry a body up to the next segment; `context` segments
//! carry a scalar or `[a, b, c]` list value in the header. Malformed
//! segments are collected as [`SegmentError`] values and logged; they never
//! abort the parse.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Width of the segment excerpt included in warnings.
const EXCERPT_CHARS: usize = 100;

/// Segment prefix token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolSyntax {
    pub prefix: String,
}

impl Default for ProtocolSyntax {
    fn default() -> Self {
        Self::new("benchwright:")
    }
}

impl ProtocolSyntax {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Header line for a `fill` segment.
    #[must_use]
    pub fn fill_header(&self, file: &str, block_id: &str) -> String {
        format!("{}fill:{}:{}", self.prefix, file, block_id)
    }

    /// Header line for a `context` segment.
    #[must_use]
    pub fn context_header(&self, key: &str, value: &ContextValue) -> String {
        format!("{}context:{}:{}", self.prefix, key, value)
    }
}

/// Replacement text for one marked block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub file: String,
    pub block_id: String,
    pub text: String,
}

/// Value of a context entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Scalar(String),
    List(Vec<String>),
}

impl ContextValue {
    /// Parse a header value: `[a, 'b', "c"]` becomes a list, anything else
    /// a trimmed scalar.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            Some(inner) => ContextValue::List(
                inner
                    .split(',')
                    .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').trim())
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            None => ContextValue::Scalar(raw.to_string()),
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Scalar(value) => write!(f, "{value}"),
            ContextValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Scalar(value.to_string())
    }
}

impl From<Vec<String>> for ContextValue {
    fn from(items: Vec<String>) -> Self {
        ContextValue::List(items)
    }
}

/// Why a segment was skipped or only partly applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SegmentErrorKind {
    /// Non-blank text before the first segment.
    StrayText,
    /// Header did not have the expected fields.
    MalformedHeader(String),
    /// `fill` segment without replacement text.
    EmptyBody,
    /// Command word other than `fill` or `context`.
    UnknownCommand(String),
    /// `context` key outside the allowed key syntax.
    InvalidKey(String),
    /// `context` segment carried a body; the entry itself was applied.
    IgnoredBody,
}

impl fmt::Display for SegmentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrayText => write!(f, "text outside any segment"),
            Self::MalformedHeader(reason) => write!(f, "malformed header: {reason}"),
            Self::EmptyBody => write!(f, "fill segment has an empty body"),
            Self::UnknownCommand(cmd) => write!(f, "unknown command '{cmd}'"),
            Self::InvalidKey(key) => write!(f, "invalid context key '{key}'"),
            Self::IgnoredBody => write!(f, "context segment body ignored"),
        }
    }
}

/// A recoverable problem with one segment of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentError {
    /// Zero-based segment index; `None` for text before the first segment.
    pub segment: Option<usize>,
    pub kind: SegmentErrorKind,
    pub excerpt: String,
}

impl SegmentError {
    /// Whether the segment's effect was still applied.
    #[must_use]
    pub fn is_warning_only(&self) -> bool {
        matches!(
            self.kind,
            SegmentErrorKind::IgnoredBody | SegmentErrorKind::StrayText
        )
    }
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.segment {
            Some(index) => write!(f, "segment {index}: {}", self.kind),
            None => write!(f, "preamble: {}", self.kind),
        }
    }
}

/// Everything extracted from one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    /// Patches in reply order.
    pub patches: Vec<Patch>,
    /// Context entries; a later segment overwrites an earlier one.
    pub context: BTreeMap<String, ContextValue>,
    pub errors: Vec<SegmentError>,
}

impl ParsedReply {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.context.is_empty()
    }
}

fn context_key_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").ok())
        .as_ref()
}

/// Whether `key` is a valid context key.
#[must_use]
pub fn is_valid_context_key(key: &str) -> bool {
    context_key_regex().is_some_and(|re| re.is_match(key))
}

/// Splits replies into patches and context entries.
#[derive(Debug, Clone, Default)]
pub struct ReplyParser {
    syntax: ProtocolSyntax,
}

impl ReplyParser {
    #[must_use]
    pub fn new(syntax: ProtocolSyntax) -> Self {
        Self { syntax }
    }

    #[must_use]
    pub fn syntax(&self) -> &ProtocolSyntax {
        &self.syntax
    }

    /// Parse a reply. Never fails; problems are returned in
    /// [`ParsedReply::errors`].
    ///
    /// # Example
    ///
    /// ```
    /// use benchwright::protocol::{ContextValue, ProtocolSyntax, ReplyParser};
    ///
    /// let parser = ReplyParser::new(ProtocolSyntax::new("TAG:"));
    /// let reply = parser.parse("TAG:fill:f.py:A\nfoo()\nTAG:context:names:[a, b, c]");
    /// assert_eq!(reply.patches[0].text, "foo()");
    /// assert_eq!(
    ///     reply.context["names"],
    ///     ContextValue::List(vec!["a".into(), "b".into(), "c".into()])
    /// );
    /// ```
    #[must_use]
    pub fn parse(&self, reply: &str) -> ParsedReply {
        let normalized = reply.replace("\r\n", "\n");
        let mut parsed = ParsedReply::default();
        let (preamble, segments) = self.split_segments(&normalized);

        if !preamble.trim().is_empty() {
            record(&mut parsed, None, SegmentErrorKind::StrayText, &preamble);
        }

        for (index, (header, body)) in segments.iter().enumerate() {
            self.parse_segment(&mut parsed, index, header, body);
        }
        parsed
    }

    /// Split into the preamble and `(header, body)` pairs. The header has
    /// the prefix removed.
    fn split_segments(&self, text: &str) -> (String, Vec<(String, String)>) {
        let mut preamble = Vec::new();
        let mut segments: Vec<(String, Vec<&str>)> = Vec::new();

        for line in text.split('\n') {
            let trimmed = line.trim_start();
            match trimmed.strip_prefix(self.syntax.prefix.as_str()) {
                Some(header) => segments.push((header.trim_end().to_string(), Vec::new())),
                None => match segments.last_mut() {
                    Some((_, body)) => body.push(line),
                    None => preamble.push(line),
                },
            }
        }

        let segments = segments
            .into_iter()
            .map(|(header, mut body)| {
                while body.last().is_some_and(|l| l.trim().is_empty()) {
                    body.pop();
                }
                (header, body.join("\n"))
            })
            .collect();
        (preamble.join("\n"), segments)
    }

    fn parse_segment(&self, parsed: &mut ParsedReply, index: usize, header: &str, body: &str) {
        let excerpt = format!("{}{header}\n{body}", self.syntax.prefix);
        let command = header.split(':').next().unwrap_or_default().trim();

        if command.eq_ignore_ascii_case("fill") {
            let fields: Vec<&str> = header.split(':').collect();
            if fields.len() != 3 {
                let reason = format!("expected fill:<file>:<block>, got {} fields", fields.len());
                record(parsed, Some(index), SegmentErrorKind::MalformedHeader(reason), &excerpt);
                return;
            }
            let (file, block_id) = (fields[1].trim(), fields[2].trim());
            if file.is_empty() || block_id.is_empty() {
                let reason = "file and block id must be non-empty".to_string();
                record(parsed, Some(index), SegmentErrorKind::MalformedHeader(reason), &excerpt);
                return;
            }
            if body.trim().is_empty() {
                record(parsed, Some(index), SegmentErrorKind::EmptyBody, &excerpt);
                return;
            }
            parsed.patches.push(Patch {
                file: file.to_string(),
                block_id: block_id.to_string(),
                text: body.to_string(),
            });
        } else if command.eq_ignore_ascii_case("context") {
            let fields: Vec<&str> = header.splitn(3, ':').collect();
            if fields.len() != 3 || fields[2].trim().is_empty() {
                let reason = "expected context:<key>:<value>".to_string();
                record(parsed, Some(index), SegmentErrorKind::MalformedHeader(reason), &excerpt);
                return;
            }
            let key = fields[1].trim();
            if !is_valid_context_key(key) {
                record(parsed, Some(index), SegmentErrorKind::InvalidKey(key.to_string()), &excerpt);
                return;
            }
            if !body.trim().is_empty() {
                record(parsed, Some(index), SegmentErrorKind::IgnoredBody, &excerpt);
            }
            parsed
                .context
                .insert(key.to_string(), ContextValue::parse(fields[2]));
        } else {
            record(
                parsed,
                Some(index),
                SegmentErrorKind::UnknownCommand(command.to_string()),
                &excerpt,
            );
        }
    }
}

fn record(parsed: &mut ParsedReply, segment: Option<usize>, kind: SegmentErrorKind, text: &str) {
    let excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
    let error = SegmentError {
        segment,
        kind,
        excerpt,
    };
    warn!("Skipping reply {}: {:?}", error, error.excerpt);
    parsed.errors.push(error);
}
