//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the session as an
//! `Arc<CoreConfig>`. Nothing below reads process-wide environment variables; the binary does
//! that before constructing the config.
//!
//! # File format
//!
//! ```yaml
//! data_directory: data               # relative to this file
//! metadata: data/metadata.yaml       # default: <data_directory>/metadata.yaml
//! access_log: logs/{run_id}.yaml     # or `true` (default location) or `false` (disabled)
//! fail_on_hash_mismatch: true
//! run_id: nightly-2024-01-01         # default: a fresh UUID
//! read:
//!   - where: {data_product: census}
//!     use: {version: latest}
//! write: []
//! ```

use crate::constants::{
    DEFAULT_ACCESS_LOG_FILENAME, DEFAULT_FAIL_ON_HASH_MISMATCH, DEFAULT_METADATA_FILENAME,
    RUN_ID_PLACEHOLDER,
};
use crate::overrides::{OverrideEngine, OverrideRule};
use crate::{ProvenanceError, ProvenanceResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_directory: PathBuf,
    metadata_path: PathBuf,
    access_log_template: Option<PathBuf>,
    fail_on_hash_mismatch: bool,
    run_id: String,
    overrides: OverrideEngine,
}

impl CoreConfig {
    /// Create a `CoreConfig` with default settings rooted at `data_directory`.
    ///
    /// When `run_id` is `None` a fresh id is generated.
    ///
    /// # Errors
    ///
    /// Returns `ProvenanceError::InvalidInput` if `run_id` is not a valid run id.
    pub fn new(data_directory: PathBuf, run_id: Option<String>) -> ProvenanceResult<Self> {
        let run_id = match run_id {
            Some(run_id) => validate_run_id(run_id)?,
            None => generate_run_id(),
        };

        Ok(Self {
            metadata_path: data_directory.join(DEFAULT_METADATA_FILENAME),
            access_log_template: Some(data_directory.join(DEFAULT_ACCESS_LOG_FILENAME)),
            fail_on_hash_mismatch: DEFAULT_FAIL_ON_HASH_MISMATCH,
            data_directory,
            run_id,
            overrides: OverrideEngine::default(),
        })
    }

    /// Parse a YAML config document. Relative paths are resolved against `base_dir`.
    pub fn from_yaml_str(contents: &str, base_dir: &Path) -> ProvenanceResult<Self> {
        let raw: RawConfig =
            serde_yaml::from_str(contents).map_err(ProvenanceError::YamlDeserialization)?;
        raw.resolve(base_dir)
    }

    /// Load a YAML config file.
    ///
    /// # Errors
    ///
    /// Returns `ProvenanceError::FileRead` if the file cannot be read, plus any error from
    /// [`Self::from_yaml_str`].
    pub fn load(path: &Path) -> ProvenanceResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ProvenanceError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml_str(&contents, base_dir)
    }

    pub fn with_metadata_path(mut self, metadata_path: PathBuf) -> Self {
        self.metadata_path = metadata_path;
        self
    }

    /// Set the access log destination. `{run_id}` in the path is substituted when the path
    /// is read back; `None` disables the log.
    pub fn with_access_log(mut self, template: Option<PathBuf>) -> Self {
        self.access_log_template = template;
        self
    }

    pub fn with_fail_on_hash_mismatch(mut self, fail: bool) -> Self {
        self.fail_on_hash_mismatch = fail;
        self
    }

    pub fn with_run_id(mut self, run_id: String) -> ProvenanceResult<Self> {
        self.run_id = validate_run_id(run_id)?;
        Ok(self)
    }

    pub fn with_overrides(mut self, overrides: OverrideEngine) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Where the access log will be written for this run, if anywhere.
    pub fn access_log_path(&self) -> Option<PathBuf> {
        self.access_log_template
            .as_deref()
            .map(|template| substitute_run_id(template, &self.run_id))
    }

    pub fn fail_on_hash_mismatch(&self) -> bool {
        self.fail_on_hash_mismatch
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn overrides(&self) -> &OverrideEngine {
        &self.overrides
    }
}

/// A fresh run id: a v4 UUID in 32-character lowercase hex form.
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Run ids end up in file names, so they are limited to ASCII letters, digits, `-` and `_`.
fn validate_run_id(run_id: String) -> ProvenanceResult<String> {
    let trimmed = run_id.trim();
    if trimmed.is_empty() {
        return Err(ProvenanceError::InvalidInput("run_id cannot be empty".into()));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ProvenanceError::InvalidInput(format!(
            "run_id {trimmed:?} may only contain ASCII letters, digits, '-' and '_'"
        )));
    }
    Ok(trimmed.to_string())
}

fn substitute_run_id(template: &Path, run_id: &str) -> PathBuf {
    match template.to_str() {
        Some(text) => PathBuf::from(text.replace(RUN_ID_PLACEHOLDER, run_id)),
        None => template.to_path_buf(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccessLogSetting {
    Enabled(bool),
    Path(PathBuf),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    data_directory: PathBuf,
    #[serde(default)]
    metadata: Option<PathBuf>,
    #[serde(default)]
    access_log: Option<AccessLogSetting>,
    #[serde(default)]
    fail_on_hash_mismatch: Option<bool>,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    read: Vec<OverrideRule>,
    #[serde(default)]
    write: Vec<OverrideRule>,
}

impl RawConfig {
    fn resolve(self, base_dir: &Path) -> ProvenanceResult<CoreConfig> {
        let data_directory = base_dir.join(self.data_directory);
        let mut config = CoreConfig::new(data_directory, self.run_id)?
            .with_overrides(OverrideEngine::new(self.read, self.write));

        if let Some(metadata) = self.metadata {
            config = config.with_metadata_path(base_dir.join(metadata));
        }
        match self.access_log {
            None | Some(AccessLogSetting::Enabled(true)) => {}
            Some(AccessLogSetting::Enabled(false)) => config = config.with_access_log(None),
            Some(AccessLogSetting::Path(path)) => {
                config = config.with_access_log(Some(base_dir.join(path)));
            }
        }
        if let Some(fail) = self.fail_on_hash_mismatch {
            config = config.with_fail_on_hash_mismatch(fail);
        }

        Ok(config)
    }
}
