//! Configured descriptor rewrites.
//!
//! Overrides let a run pin or redirect what callers ask for without touching pipeline
//! code, e.g. "whenever anyone reads `census`, give them version `latest`":
//!
//! ```yaml
//! read:
//!   - where: {data_product: census}
//!     use: {version: latest}
//! write:
//!   - where: {data_product: model_output}
//!     use: {namespace: scratch}
//! ```
//!
//! For each query the first rule whose `where` is a superset of the query (same
//! partial-match rule as catalog lookup, with the rule's `where` standing in for the
//! catalog entry) is applied by overlaying its `use` fields onto the query. Later rules
//! are not consulted. Read and write lists are independent.
//!
//! A rule therefore fires for any query that asks for no more than its `where` states:
//! `where: {data_product: census, namespace: ons}` matches a query for `census` alone,
//! but not one that also pins `version`.

use crate::descriptor::Descriptor;
use serde::{Deserialize, Serialize};

/// A single `where` → `use` rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideRule {
    #[serde(rename = "where", default)]
    pub predicate: Descriptor,
    #[serde(rename = "use", default)]
    pub replacement: Descriptor,
}

impl OverrideRule {
    pub fn new(predicate: Descriptor, replacement: Descriptor) -> Self {
        Self {
            predicate,
            replacement,
        }
    }

    /// True when the predicate satisfies every constraint `query` states.
    pub fn applies_to(&self, query: &Descriptor) -> bool {
        self.predicate.is_superset_of(query)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideEngine {
    read: Vec<OverrideRule>,
    write: Vec<OverrideRule>,
}

impl OverrideEngine {
    pub fn new(read: Vec<OverrideRule>, write: Vec<OverrideRule>) -> Self {
        Self { read, write }
    }

    pub fn read_rules(&self) -> &[OverrideRule] {
        &self.read
    }

    pub fn write_rules(&self) -> &[OverrideRule] {
        &self.write
    }

    pub fn apply_read_overrides(&self, query: &Descriptor) -> Descriptor {
        apply(&self.read, query, "read")
    }

    pub fn apply_write_overrides(&self, query: &Descriptor) -> Descriptor {
        apply(&self.write, query, "write")
    }
}

fn apply(rules: &[OverrideRule], query: &Descriptor, direction: &str) -> Descriptor {
    match rules.iter().position(|rule| rule.applies_to(query)) {
        Some(index) => {
            let rewritten = query.merged_with(&rules[index].replacement);
            tracing::debug!(
                direction,
                rule = index,
                from = %query,
                to = %rewritten,
                "applied override"
            );
            rewritten
        }
        None => query.clone(),
    }
}
