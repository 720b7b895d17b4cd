//! Descriptor → catalog entry resolution.
//!
//! The selector scans the whole catalog in order, collects every entry that is a
//! superset of the query, and only then decides: exactly one match resolves, zero is
//! `NotFound`, more than one is `AmbiguousMatch`. Scanning to the end (rather than
//! stopping at the first hit) is what makes ambiguity detectable, so a catalog that
//! grows a second matching entry turns silent drift into a hard error.

use crate::catalog::{Catalog, CatalogEntry};
use crate::descriptor::Descriptor;
use crate::error::{ProvenanceError, ProvenanceResult};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Selector {
    catalog: Arc<Catalog>,
}

impl Selector {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Every entry satisfying `query`, in catalog order.
    pub fn candidates(&self, query: &Descriptor) -> Vec<&CatalogEntry> {
        self.catalog
            .entries()
            .iter()
            .filter(|entry| entry.descriptor().is_superset_of(query))
            .collect()
    }

    /// Resolves `query` to its unique catalog entry.
    ///
    /// # Errors
    ///
    /// - `ProvenanceError::NotFound` if no entry satisfies the query
    /// - `ProvenanceError::AmbiguousMatch` if more than one does
    pub fn find(&self, query: &Descriptor) -> ProvenanceResult<&CatalogEntry> {
        let matches = self.candidates(query);

        match matches.as_slice() {
            [entry] => {
                tracing::debug!(
                    query = %query,
                    path = %entry.normalised_filename().display(),
                    "resolved catalog entry"
                );
                Ok(*entry)
            }
            [] => Err(ProvenanceError::NotFound {
                query: query.to_string(),
            }),
            _ => Err(ProvenanceError::AmbiguousMatch {
                query: query.to_string(),
                matches: matches
                    .iter()
                    .map(|entry| entry.normalised_filename().display().to_string())
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::IssueItem;

    fn census(version: &str) -> Descriptor {
        Descriptor::new()
            .with_data_product("census")
            .with_version(version)
            .with_extension("csv")
    }

    fn selector(descriptors: Vec<Descriptor>) -> Selector {
        Selector::new(Arc::new(Catalog::new("/data", descriptors).unwrap()))
    }

    #[test]
    fn test_unset_version_is_ambiguous() {
        let selector = selector(vec![census("1"), census("2")]);

        let err = selector
            .find(&Descriptor::new().with_data_product("census"))
            .expect_err("two versions match");

        match err {
            ProvenanceError::AmbiguousMatch { matches, .. } => {
                assert_eq!(matches, vec!["/data/census/1.csv", "/data/census/2.csv"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_version_selects_entry() {
        let selector = selector(vec![census("1"), census("2")]);

        let entry = selector
            .find(&Descriptor::new().with_data_product("census").with_version("2"))
            .unwrap();

        assert_eq!(entry.descriptor().version.as_deref(), Some("2"));
        assert_eq!(entry.normalised_filename().to_str(), Some("/data/census/2.csv"));
    }

    #[test]
    fn test_no_match_is_not_found() {
        let selector = selector(vec![census("1")]);

        let err = selector
            .find(&Descriptor::new().with_data_product("deaths"))
            .expect_err("nothing matches");

        assert!(matches!(err, ProvenanceError::NotFound { .. }));
    }

    #[test]
    fn test_empty_query() {
        let err = selector(vec![census("1"), census("2")])
            .find(&Descriptor::new())
            .expect_err("wildcard matches both");
        assert!(matches!(err, ProvenanceError::AmbiguousMatch { .. }));

        let single = selector(vec![census("1")]);
        assert!(single.find(&Descriptor::new()).is_ok());

        let err = selector(vec![]).find(&Descriptor::new()).expect_err("empty catalog");
        assert!(matches!(err, ProvenanceError::NotFound { .. }));
    }

    #[test]
    fn test_issue_query_narrows_candidates() {
        let flagged = census("1").with_issue(IssueItem::new(2, "duplicated rows"));
        let selector = selector(vec![flagged, census("2")]);

        let entry = selector
            .find(&Descriptor::new().with_issue(IssueItem::new(2, "duplicated rows")))
            .unwrap();
        assert_eq!(entry.descriptor().version.as_deref(), Some("1"));
    }

    #[test]
    fn test_find_is_deterministic() {
        let selector = selector(vec![census("1"), census("2"), census("3")]);
        let queries = [
            Descriptor::new().with_version("3"),
            Descriptor::new().with_data_product("census"),
            Descriptor::new().with_version("9"),
        ];

        let outcome = |q: &Descriptor| {
            selector
                .find(q)
                .map(|e| e.normalised_filename().to_path_buf())
                .map_err(|e| e.to_string())
        };

        let first: Vec<_> = queries.iter().map(outcome).collect();
        let mut second: Vec<_> = queries.iter().rev().map(outcome).collect();
        second.reverse();

        assert_eq!(first, second);
    }
}
