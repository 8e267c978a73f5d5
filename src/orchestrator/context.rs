//! Key/value state threaded between tasks of one run.

use std::collections::BTreeMap;

use serde_yaml::Value;
use tracing::debug;

use crate::error::{BenchError, Result};
use crate::protocol::{is_valid_context_key, ContextValue};

/// Seed key: design module name.
pub const MODULE_NAME: &str = "module_name";
/// Seed key: names of the design's ports.
pub const PORTS: &str = "ports";
/// Seed key: the plan's test-bench topology as YAML text.
pub const TOPOLOGY: &str = "topology";

/// Context accumulated over one orchestration run.
///
/// Keys follow the same syntax as `context` segment keys. Entries are only
/// ever added or overwritten; the map is dropped when the run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildContext {
    entries: BTreeMap<String, ContextValue>,
}

impl BuildContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context from the approved specification and plan documents.
    ///
    /// Fields that are absent are skipped; the pipeline works without them.
    #[must_use]
    pub fn seeded(spec: Option<&Value>, plan: Option<&Value>) -> Self {
        let mut context = Self::new();

        if let Some(spec) = spec {
            if let Some(name) = spec.get(MODULE_NAME).and_then(Value::as_str) {
                context.set_unchecked(MODULE_NAME, ContextValue::Scalar(name.to_string()));
            }
            let ports = port_names(spec.get("ports"));
            if !ports.is_empty() {
                context.set_unchecked(PORTS, ContextValue::List(ports));
            }
        }

        if let Some(topology) = plan.and_then(|p| p.get("uvm_topology")) {
            if let Ok(text) = serde_yaml::to_string(topology) {
                context.set_unchecked(TOPOLOGY, ContextValue::Scalar(text.trim_end().to_string()));
            }
        }

        debug!("Seeded build context with {} keys", context.len());
        context
    }

    /// Set one entry, validating the key.
    pub fn insert(&mut self, key: &str, value: ContextValue) -> Result<Option<ContextValue>> {
        if !is_valid_context_key(key) {
            return Err(BenchError::invalid_config(
                "context",
                format!("'{key}' is not a valid context key"),
            ));
        }
        Ok(self.entries.insert(key.to_string(), value))
    }

    fn set_unchecked(&mut self, key: &str, value: ContextValue) {
        self.entries.insert(key.to_string(), value);
    }

    /// Fold entries from a reply into the context; later values win.
    ///
    /// Returns the keys that were written.
    pub fn merge(&mut self, entries: &BTreeMap<String, ContextValue>) -> Vec<String> {
        let mut written = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            if !is_valid_context_key(key) {
                continue;
            }
            if let Some(previous) = self.entries.insert(key.clone(), value.clone()) {
                if previous != *value {
                    debug!("Context key {} overwritten", key);
                }
            }
            written.push(key.clone());
        }
        written
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Port names from a `ports` field: a list of names, a list of mappings
/// with a `name` field, or a mapping keyed by port name.
fn port_names(ports: Option<&Value>) -> Vec<String> {
    match ports {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name.clone()),
                Value::Mapping(_) => item.get("name").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect(),
        Some(Value::Mapping(map)) => map
            .keys()
            .filter_map(|k| k.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut context = BuildContext::new();
        let mut first = BTreeMap::new();
        first.insert("k".to_string(), ContextValue::from("one"));
        context.merge(&first);

        let mut second = BTreeMap::new();
        second.insert("k".to_string(), ContextValue::from("two"));
        second.insert("other".to_string(), ContextValue::from("x"));
        let written = context.merge(&second);

        assert_eq!(written, vec!["k".to_string(), "other".to_string()]);
        assert_eq!(context.get("k"), Some(&ContextValue::from("two")));
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn test_insert_validates_key() {
        let mut context = BuildContext::new();
        assert!(context.insert("bfm_methods", ContextValue::from("x")).is_ok());
        assert!(context.insert("has space", ContextValue::from("x")).is_err());
        assert!(context.insert("", ContextValue::from("x")).is_err());
    }

    #[test]
    fn test_seed_from_documents() {
        let spec = yaml(
            "module_name: fifo\nports:\n  - name: clk\n    direction: input\n  - name: din\n    direction: input\n",
        );
        let plan = yaml("uvm_topology:\n  agents:\n    - input_agent\n");

        let context = BuildContext::seeded(Some(&spec), Some(&plan));
        assert_eq!(context.get(MODULE_NAME), Some(&ContextValue::from("fifo")));
        assert_eq!(
            context.get(PORTS),
            Some(&ContextValue::List(vec!["clk".into(), "din".into()]))
        );
        let topology = context.get(TOPOLOGY).unwrap().to_string();
        assert!(topology.contains("input_agent"));
    }

    #[test]
    fn test_seed_port_shapes() {
        let names = yaml("ports: [a, b]");
        assert_eq!(port_names(names.get("ports")), vec!["a", "b"]);

        let keyed = yaml("ports:\n  clk: input\n  dout: output\n");
        assert_eq!(port_names(keyed.get("ports")), vec!["clk", "dout"]);

        assert!(port_names(None).is_empty());
    }

    #[test]
    fn test_seed_without_documents() {
        let context = BuildContext::seeded(None, None);
        assert!(context.is_empty());

        let spec = yaml("description: no name here");
        assert!(BuildContext::seeded(Some(&spec), None).is_empty());
    }
}
