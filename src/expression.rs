//! Expression bank — reusable phrase material referenced by phases.
//!
//! A persona definition may carry a bank of authored phrases, grouped
//! either flat (`"battle_cries": [...]`) or by category and key
//! (`"talk": {"intro": [...]}`). Phases point into the bank through
//! their `expression_refs`, in two forms:
//!
//! - `"cat.key"` — one keyed list inside a category,
//! - `"battle_cries"` — a whole flat group (or an entire category,
//!   flattened).
//!
//! Unresolvable references are ignored everywhere; the bank is
//! advisory material for prompt construction, never a hard dependency.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::phase::scheduler::NoiseSource;

static REF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)").unwrap());

/// One named group of phrases.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExpressionGroup {
    /// A flat phrase list.
    Phrases(Vec<String>),
    /// Keyed phrase lists under one category.
    Keyed(BTreeMap<String, Vec<String>>),
}

/// The full phrase bank of one persona.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExpressionBank {
    groups: BTreeMap<String, ExpressionGroup>,
}

impl ExpressionBank {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Phrases behind one reference, or empty for anything that does
    /// not resolve.
    pub fn pool(&self, reference: &str) -> Vec<&str> {
        if let Some((category, key)) = reference.split_once('.') {
            return match self.groups.get(category) {
                Some(ExpressionGroup::Keyed(keys)) => keys
                    .get(key)
                    .map(|phrases| phrases.iter().map(String::as_str).collect())
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
        }
        match self.groups.get(reference) {
            Some(ExpressionGroup::Phrases(phrases)) => {
                phrases.iter().map(String::as_str).collect()
            }
            Some(ExpressionGroup::Keyed(keys)) => keys
                .values()
                .flat_map(|phrases| phrases.iter().map(String::as_str))
                .collect(),
            None => Vec::new(),
        }
    }

    /// `cat.key` tokens mentioned in free text that resolve in this
    /// bank, in order of first appearance.
    pub fn scan_description(&self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for capture in REF_PATTERN.captures_iter(text) {
            let reference = capture[0].to_string();
            if !found.contains(&reference) && !self.pool(&reference).is_empty() {
                found.push(reference);
            }
        }
        found
    }

    /// Merge a phase's explicit references with the ones its
    /// description mentions, dropping anything unresolvable.
    pub fn collect_refs(&self, explicit: &[String], description: &str) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        for reference in explicit {
            if !refs.contains(reference) && !self.pool(reference).is_empty() {
                refs.push(reference.clone());
            }
        }
        for reference in self.scan_description(description) {
            if !refs.contains(&reference) {
                refs.push(reference);
            }
        }
        refs
    }

    /// Draw up to `max_samples` distinct phrases from the pools behind
    /// the given (already ranked) references.
    ///
    /// Selection goes through the engine's noise seam so tests get
    /// deterministic samples.
    pub fn sample_weighted(
        &self,
        refs: &[String],
        max_samples: usize,
        noise: &mut dyn NoiseSource,
    ) -> Vec<String> {
        let mut pool: Vec<&str> = Vec::new();
        for reference in refs {
            for phrase in self.pool(reference) {
                if !pool.contains(&phrase) {
                    pool.push(phrase);
                }
            }
        }

        let mut samples = Vec::new();
        while samples.len() < max_samples && !pool.is_empty() {
            let index = (noise.unit() * pool.len() as f64) as usize;
            let index = index.min(pool.len() - 1);
            samples.push(pool.swap_remove(index).to_string());
        }
        samples
    }
}

// Hand-rolled so junk shapes degrade instead of failing the whole
// persona definition: non-string phrases and unrecognized group shapes
// are dropped.
impl<'de> Deserialize<'de> for ExpressionBank {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let mut groups = BTreeMap::new();

        if let Value::Object(entries) = value {
            for (name, group) in entries {
                match group {
                    Value::Array(items) => {
                        groups.insert(name, ExpressionGroup::Phrases(string_list(items)));
                    }
                    Value::Object(keyed) => {
                        let mut lists = BTreeMap::new();
                        for (key, item) in keyed {
                            if let Value::Array(items) = item {
                                lists.insert(key, string_list(items));
                            }
                        }
                        groups.insert(name, ExpressionGroup::Keyed(lists));
                    }
                    _ => {}
                }
            }
        }

        Ok(Self { groups })
    }
}

fn string_list(items: Vec<Value>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
