//! Logical file descriptors and the partial-match rule.
//!
//! A [`Descriptor`] names a file by what it *is* (data product, version, extension,
//! namespace, ...) rather than where it lives. Every field is optional: a query sets only
//! the fields it cares about, while catalog entries are fully populated.
//!
//! ## Superset matching
//!
//! `a.is_superset_of(b)` holds when `a` satisfies every constraint `b` states:
//!
//! - each scalar field set in `b` must be set to the same value in `a`
//! - each issue listed in `b` must also be listed in `a` (order and extra issues ignored)
//! - fields unset in `b` are wildcards
//!
//! The descriptor with every field unset is therefore the universal wildcard. Everything
//! is a superset of it, and it is a superset only of itself.

use prov_types::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A known data-quality problem attached to a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueItem {
    pub severity: i64,
    pub description: String,
}

impl IssueItem {
    pub fn new(severity: i64, description: impl Into<String>) -> Self {
        Self {
            severity,
            description: description.into(),
        }
    }
}

/// Partially-specified identifier for a file.
///
/// Used both as a query ("give me the census data, any version") and as the full
/// description of a catalog entry or of the file a query resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Descriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_product: Option<String>,

    /// Path relative to the data directory. When set it takes precedence over the
    /// `data_product`/`version`/`extension` naming convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_version"
    )]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<String>,

    /// Digest recorded in the manifest, the value a read is verified against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_hash: Option<ContentHash>,

    /// Digest computed during this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_hash: Option<ContentHash>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<IssueItem>,
}

/// Accepts any scalar (`version: 2`, `version: 1.0`, `version: "2"`) as text; manifests
/// are hand-written.
fn deserialize_version<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        other => Err(D::Error::custom(format!(
            "version must be a string or number, got {other:?}"
        ))),
    }
}

/// Replacement value wins when set.
fn pick<T: Clone>(replacement: &Option<T>, base: &Option<T>) -> Option<T> {
    replacement.clone().or_else(|| base.clone())
}

impl Descriptor {
    /// The universal wildcard.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_product(mut self, value: impl Into<String>) -> Self {
        self.data_product = Some(value.into());
        self
    }

    pub fn with_filename(mut self, value: impl Into<String>) -> Self {
        self.filename = Some(value.into());
        self
    }

    pub fn with_version(mut self, value: impl Into<String>) -> Self {
        self.version = Some(value.into());
        self
    }

    pub fn with_extension(mut self, value: impl Into<String>) -> Self {
        self.extension = Some(value.into());
        self
    }

    pub fn with_namespace(mut self, value: impl Into<String>) -> Self {
        self.namespace = Some(value.into());
        self
    }

    pub fn with_description(mut self, value: impl Into<String>) -> Self {
        self.description = Some(value.into());
        self
    }

    pub fn with_data_directory(mut self, value: impl Into<String>) -> Self {
        self.data_directory = Some(value.into());
        self
    }

    pub fn with_verified_hash(mut self, hash: ContentHash) -> Self {
        self.verified_hash = Some(hash);
        self
    }

    pub fn with_issue(mut self, issue: IssueItem) -> Self {
        self.issues.push(issue);
        self
    }

    /// Scalar fields in a fixed order, paired with their names.
    fn scalars(&self) -> [(&'static str, Option<&str>); 9] {
        [
            ("data_product", self.data_product.as_deref()),
            ("filename", self.filename.as_deref()),
            ("version", self.version.as_deref()),
            ("extension", self.extension.as_deref()),
            ("namespace", self.namespace.as_deref()),
            ("description", self.description.as_deref()),
            ("data_directory", self.data_directory.as_deref()),
            ("verified_hash", self.verified_hash.as_ref().map(ContentHash::as_str)),
            (
                "calculated_hash",
                self.calculated_hash.as_ref().map(ContentHash::as_str),
            ),
        ]
    }

    /// True when no field is set.
    pub fn is_wildcard(&self) -> bool {
        self.issues.is_empty() && self.scalars().iter().all(|(_, value)| value.is_none())
    }

    /// True when `self` satisfies every constraint stated by `other`.
    pub fn is_superset_of(&self, other: &Descriptor) -> bool {
        let scalars_match = self
            .scalars()
            .iter()
            .zip(other.scalars().iter())
            .all(|((_, mine), (_, theirs))| theirs.is_none() || mine == theirs);

        scalars_match && other.issues.iter().all(|issue| self.issues.contains(issue))
    }

    /// Overlays the set fields of `replacement` onto a copy of `self`.
    ///
    /// A non-empty issue list in `replacement` replaces the issue list wholesale.
    pub fn merged_with(&self, replacement: &Descriptor) -> Descriptor {
        Descriptor {
            data_product: pick(&replacement.data_product, &self.data_product),
            filename: pick(&replacement.filename, &self.filename),
            version: pick(&replacement.version, &self.version),
            extension: pick(&replacement.extension, &self.extension),
            namespace: pick(&replacement.namespace, &self.namespace),
            description: pick(&replacement.description, &self.description),
            data_directory: pick(&replacement.data_directory, &self.data_directory),
            verified_hash: pick(&replacement.verified_hash, &self.verified_hash),
            calculated_hash: pick(&replacement.calculated_hash, &self.calculated_hash),
            issues: if replacement.issues.is_empty() {
                self.issues.clone()
            } else {
                replacement.issues.clone()
            },
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            return f.write_str("{*}");
        }

        f.write_str("{")?;
        let mut first = true;
        for (name, value) in self.scalars() {
            if let Some(value) = value {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{name}={value}")?;
                first = false;
            }
        }
        if !self.issues.is_empty() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "issues={}", self.issues.len())?;
        }
        f.write_str("}")
    }
}
