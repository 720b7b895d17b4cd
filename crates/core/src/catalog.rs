//! The metadata catalog.
//!
//! A [`Catalog`] is the ordered, read-only list of every file a run may read. It is
//! built once from a YAML manifest and then shared (`Arc<Catalog>`) by every lookup
//! in the session.
//!
//! # Manifest format
//!
//! ```yaml
//! data_directory: .            # optional, relative to the manifest file
//! entries:
//!   - data_product: census
//!     version: 2
//!     extension: csv
//!     namespace: ons
//!     verified_hash: 5e8a...    # optional recorded digest
//!     issues:
//!       - severity: 1
//!         description: typo in header
//!   - filename: lookup/regions.json
//!     data_product: regions
//! ```
//!
//! # Naming convention
//!
//! Each entry's location is derived from its descriptor (see [`relative_path`]):
//!
//! - `filename` set: `<data_directory>/<filename>`
//! - otherwise: `<data_directory>/[<namespace>/]<data_product>/<version>.<extension>`
//!
//! The same rule places write targets, so a written file can be catalogued later and
//! read back from the same path.

use crate::descriptor::Descriptor;
use crate::error::{ProvenanceError, ProvenanceResult};
use prov_files::safe_join;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<PathBuf>,
    #[serde(default)]
    pub entries: Vec<Descriptor>,
}

impl Manifest {
    pub fn from_yaml_str(contents: &str) -> ProvenanceResult<Self> {
        serde_yaml::from_str(contents).map_err(ProvenanceError::YamlDeserialization)
    }
}

/// A catalogued file: its full descriptor plus the canonical path derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    descriptor: Descriptor,
    normalised_filename: PathBuf,
}

impl CatalogEntry {
    /// Builds an entry rooted at `data_directory`.
    ///
    /// If the descriptor names its own `data_directory`, that directory is used instead
    /// (resolved against `data_directory` when relative). Otherwise the descriptor is
    /// stamped with `data_directory` so resolved records say where the file came from.
    ///
    /// # Errors
    ///
    /// Returns `ProvenanceError::InvalidInput` if the descriptor cannot name a file, and
    /// `ProvenanceError::Files` if the derived path would escape its directory.
    pub fn new(data_directory: &Path, mut descriptor: Descriptor) -> ProvenanceResult<Self> {
        let directory = entry_directory(data_directory, &descriptor);
        if descriptor.data_directory.is_none() {
            descriptor.data_directory = Some(directory.to_string_lossy().into_owned());
        }
        let normalised_filename = normalised_path(&directory, &descriptor)?;

        Ok(Self {
            descriptor,
            normalised_filename,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn normalised_filename(&self) -> &Path {
        &self.normalised_filename
    }
}

/// Directory a descriptor lives in: its own `data_directory` if set, else `base`.
pub fn entry_directory(base: &Path, descriptor: &Descriptor) -> PathBuf {
    match descriptor.data_directory.as_deref() {
        Some(own) => base.join(own),
        None => base.to_path_buf(),
    }
}

/// Path of a descriptor relative to its data directory.
///
/// # Errors
///
/// Returns `ProvenanceError::InvalidInput` when `filename` is unset and any of
/// `data_product`, `version`, or `extension` is missing.
pub fn relative_path(descriptor: &Descriptor) -> ProvenanceResult<PathBuf> {
    if let Some(filename) = descriptor.filename.as_deref() {
        return Ok(PathBuf::from(filename));
    }

    let missing = |field: &str| {
        ProvenanceError::InvalidInput(format!(
            "{descriptor} has no filename and no {field} to derive one from"
        ))
    };
    let data_product = descriptor
        .data_product
        .as_deref()
        .ok_or_else(|| missing("data_product"))?;
    let version = descriptor
        .version
        .as_deref()
        .ok_or_else(|| missing("version"))?;
    let extension = descriptor
        .extension
        .as_deref()
        .ok_or_else(|| missing("extension"))?;

    let mut path = PathBuf::new();
    if let Some(namespace) = descriptor.namespace.as_deref() {
        path.push(namespace);
    }
    path.push(data_product);
    path.push(format!("{version}.{extension}"));
    Ok(path)
}

/// Canonical location of `descriptor` under `directory`.
pub fn normalised_path(directory: &Path, descriptor: &Descriptor) -> ProvenanceResult<PathBuf> {
    let relative = relative_path(descriptor)?;
    Ok(safe_join(directory, &relative)?)
}

/// Ordered, immutable collection of catalog entries.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    data_directory: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from descriptors, preserving their order.
    pub fn new(
        data_directory: impl Into<PathBuf>,
        descriptors: impl IntoIterator<Item = Descriptor>,
    ) -> ProvenanceResult<Self> {
        let data_directory = data_directory.into();
        let entries = descriptors
            .into_iter()
            .map(|descriptor| CatalogEntry::new(&data_directory, descriptor))
            .collect::<ProvenanceResult<Vec<_>>>()?;

        Ok(Self {
            data_directory,
            entries,
        })
    }

    /// Builds a catalog from a parsed manifest.
    ///
    /// The manifest's own `data_directory` is resolved against `manifest_dir`; when it
    /// is absent, `default_data_directory` is used.
    pub fn from_manifest(
        manifest: Manifest,
        manifest_dir: &Path,
        default_data_directory: &Path,
    ) -> ProvenanceResult<Self> {
        let data_directory = match manifest.data_directory {
            Some(dir) => manifest_dir.join(dir),
            None => default_data_directory.to_path_buf(),
        };
        Self::new(data_directory, manifest.entries)
    }

    /// Loads a manifest file.
    ///
    /// # Errors
    ///
    /// Returns `ProvenanceError::FileRead` if the manifest cannot be read,
    /// `ProvenanceError::YamlDeserialization` if it is malformed, and any error from
    /// [`CatalogEntry::new`] for entries that cannot name a file.
    pub fn load(manifest_path: &Path, default_data_directory: &Path) -> ProvenanceResult<Self> {
        let contents =
            fs::read_to_string(manifest_path).map_err(|source| ProvenanceError::FileRead {
                path: manifest_path.to_path_buf(),
                source,
            })?;
        let manifest = Manifest::from_yaml_str(&contents)?;
        let manifest_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

        let catalog = Self::from_manifest(manifest, manifest_dir, default_data_directory)?;
        tracing::info!(
            manifest = %manifest_path.display(),
            entries = catalog.len(),
            "loaded catalog"
        );
        Ok(catalog)
    }

    pub fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn census(version: &str) -> Descriptor {
        Descriptor::new()
            .with_data_product("census")
            .with_version(version)
            .with_extension("csv")
    }

    #[test]
    fn test_relative_path_from_naming_convention() {
        assert_eq!(
            relative_path(&census("2")).unwrap(),
            PathBuf::from("census/2.csv")
        );
        assert_eq!(
            relative_path(&census("2").with_namespace("ons")).unwrap(),
            PathBuf::from("ons/census/2.csv")
        );
    }

    #[test]
    fn test_relative_path_prefers_filename() {
        let descriptor = census("2").with_filename("raw/census.csv");
        assert_eq!(
            relative_path(&descriptor).unwrap(),
            PathBuf::from("raw/census.csv")
        );
    }

    #[test]
    fn test_relative_path_requires_naming_fields() {
        let err = relative_path(&Descriptor::new().with_data_product("census"))
            .expect_err("version is missing");
        assert!(matches!(err, ProvenanceError::InvalidInput(_)));
    }

    #[test]
    fn test_entry_rejects_traversal() {
        let err = CatalogEntry::new(
            Path::new("/data"),
            Descriptor::new().with_filename("../secret.txt"),
        )
        .expect_err("traversal must be rejected");
        assert!(matches!(err, ProvenanceError::Files(_)));
    }

    #[test]
    fn test_entry_stamps_data_directory() {
        let entry = CatalogEntry::new(Path::new("/data"), census("1")).unwrap();
        assert_eq!(entry.descriptor().data_directory.as_deref(), Some("/data"));
        assert_eq!(entry.normalised_filename(), Path::new("/data/census/1.csv"));
    }

    #[test]
    fn test_entry_uses_own_data_directory() {
        let entry =
            CatalogEntry::new(Path::new("/data"), census("1").with_data_directory("archive"))
                .unwrap();
        assert_eq!(
            entry.normalised_filename(),
            Path::new("/data/archive/census/1.csv")
        );
        assert_eq!(entry.descriptor().data_directory.as_deref(), Some("archive"));
    }

    #[test]
    fn test_catalog_preserves_order() {
        let catalog = Catalog::new("/data", vec![census("2"), census("1")]).unwrap();
        let versions: Vec<_> = catalog
            .entries()
            .iter()
            .map(|e| e.descriptor().version.clone().unwrap())
            .collect();
        assert_eq!(versions, vec!["2", "1"]);
    }

    #[test]
    fn test_load_manifest_with_relative_data_directory() {
        let temp = TempDir::new().unwrap();
        let manifest_path = temp.path().join("metadata.yaml");
        fs::write(
            &manifest_path,
            "data_directory: store\n\
             entries:\n\
             \x20 - data_product: census\n\
             \x20   version: 1\n\
             \x20   extension: csv\n\
             \x20 - filename: lookup/regions.json\n\
             \x20   issues:\n\
             \x20     - severity: 2\n\
             \x20       description: stale\n",
        )
        .unwrap();

        let catalog = Catalog::load(&manifest_path, Path::new("/unused")).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.data_directory(), temp.path().join("store"));
        assert_eq!(
            catalog.entries()[0].normalised_filename(),
            temp.path().join("store").join("census").join("1.csv")
        );
        assert_eq!(catalog.entries()[1].descriptor().issues.len(), 1);
    }

    #[test]
    fn test_load_manifest_falls_back_to_default_directory() {
        let temp = TempDir::new().unwrap();
        let manifest_path = temp.path().join("metadata.yaml");
        fs::write(&manifest_path, "entries: []\n").unwrap();

        let catalog = Catalog::load(&manifest_path, Path::new("/data")).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.data_directory(), Path::new("/data"));
    }

    #[test]
    fn test_load_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let err = Catalog::load(&temp.path().join("missing.yaml"), temp.path())
            .expect_err("missing manifest should fail");
        assert!(matches!(err, ProvenanceError::FileRead { .. }));
    }

    #[test]
    fn test_load_malformed_manifest() {
        let temp = TempDir::new().unwrap();
        let manifest_path = temp.path().join("metadata.yaml");
        fs::write(&manifest_path, "entries: {not: a list}\n").unwrap();

        let err = Catalog::load(&manifest_path, temp.path()).expect_err("malformed manifest");
        assert!(matches!(err, ProvenanceError::YamlDeserialization(_)));
    }
}
