//! `{{key}}` placeholder rendering for task prompts.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::warn;

use super::context::BuildContext;

/// Placeholder bound to the protocol prefix token.
pub const PROTOCOL_KEY: &str = "protocol";

/// Text substituted for keys missing from the context.
pub const MISSING_VALUE: &str = "(none)";

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").ok())
        .as_ref()
}

/// Render a prompt template.
///
/// `{{protocol}}` becomes `prefix`; other keys come from `context`, lists
/// rendered as `[a, b, c]`. A key with no value renders as `(none)`.
///
/// # Example
///
/// ```
/// use benchwright::orchestrator::{render_template, BuildContext};
/// use benchwright::protocol::ContextValue;
///
/// let mut context = BuildContext::new();
/// context
///     .insert("bfm_methods", ContextValue::List(vec!["reset".into(), "drive".into()]))
///     .unwrap();
/// let text = render_template("{{protocol}}fill uses {{ bfm_methods }}", &context, "bw:");
/// assert_eq!(text, "bw:fill uses [reset, drive]");
/// ```
#[must_use]
pub fn render_template(template: &str, context: &BuildContext, prefix: &str) -> String {
    let Some(re) = placeholder_regex() else {
        return template.to_string();
    };

    re.replace_all(template, |caps: &Captures<'_>| {
        let key = &caps[1];
        if key == PROTOCOL_KEY {
            return prefix.to_string();
        }
        match context.get(key) {
            Some(value) => value.to_string(),
            None => {
                warn!("Prompt placeholder {{{{{}}}}} has no value", key);
                MISSING_VALUE.to_string()
            }
        }
    })
    .into_owned()
}

/// Keys referenced by a template, excluding `protocol`.
#[must_use]
pub fn placeholders(template: &str) -> Vec<String> {
    let Some(re) = placeholder_regex() else {
        return Vec::new();
    };
    let mut keys: Vec<String> = re
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .filter(|key| key != PROTOCOL_KEY)
        .collect();
    keys.sort();
    keys.dedup();
    keys
}
