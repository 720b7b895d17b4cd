//! Constants used throughout the provenance core crate.
//!
//! This module contains all default filenames and placeholders to ensure
//! consistency across configuration, catalog loading, and log output.

/// Default manifest filename, looked up inside the data directory.
pub const DEFAULT_METADATA_FILENAME: &str = "metadata.yaml";

/// Placeholder substituted with the run id in configured paths.
pub const RUN_ID_PLACEHOLDER: &str = "{run_id}";

/// Default access log filename when `access_log` is absent or `true`.
pub const DEFAULT_ACCESS_LOG_FILENAME: &str = "access-{run_id}.yaml";

/// Default for `fail_on_hash_mismatch`.
pub const DEFAULT_FAIL_ON_HASH_MISMATCH: bool = true;
