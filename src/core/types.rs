//! Core identifier types for the controller.
//!
//! A [`JobId`] names the monitored `run-parallel.sh` job on the cluster. It is
//! resolved once at startup from the operator's job-spec, which is either the
//! path to the job's `psub_cmd` file or a literal job ID.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

/// Directory naming convention of run-parallel.sh work directories,
/// e.g. `run-p.1355859.balza.096/psub_cmd`.
static PSUB_CMD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*run-p.(\d+).balza.\d+/psub_cmd").expect("psub_cmd pattern is valid")
});

/// Errors that can occur when resolving a job-spec into a job ID.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobSpecError {
    /// No job-spec was provided.
    #[error("no job provided")]
    Empty,

    /// The path exists but does not follow the run-parallel.sh naming convention.
    #[error("'{0}' does not look like <dir>/run-p.<id>.balza.<n>/psub_cmd")]
    UnrecognizedPath(String),

    /// The value is neither an existing path nor a job ID.
    #[error("unrecognized job id format '{0}'")]
    UnrecognizedId(String),
}

/// Identifier of the monitored cluster job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Create a new JobId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve a job-spec given on the command line.
    ///
    /// If `spec` names an existing file it must be a `psub_cmd` inside a
    /// `run-p.<id>.balza.<n>` directory, and `<id>` is returned. Otherwise the
    /// spec must start with a digit and is used as the job ID verbatim, so
    /// qualified IDs such as `1355859.balza` are accepted.
    pub fn from_spec(spec: &str) -> Result<Self, JobSpecError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(JobSpecError::Empty);
        }

        if Path::new(spec).is_file() {
            return Self::from_psub_cmd_path(spec);
        }

        if spec.starts_with(|c: char| c.is_ascii_digit()) {
            Ok(Self::new(spec))
        } else {
            Err(JobSpecError::UnrecognizedId(spec.to_string()))
        }
    }

    /// Extract the job ID from a `psub_cmd` path without touching the filesystem.
    pub fn from_psub_cmd_path(path: &str) -> Result<Self, JobSpecError> {
        PSUB_CMD_PATTERN
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| Self::new(m.as_str()))
            .ok_or_else(|| JobSpecError::UnrecognizedPath(path.to_string()))
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_job_id_creation() {
        let job_id = JobId::new("1355859");
        assert_eq!(job_id.as_str(), "1355859");
        assert_eq!(format!("{}", job_id), "1355859");
    }

    #[test]
    fn test_job_id_from_str() {
        let id1: JobId = "42".into();
        let id2 = JobId::new("42");
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_literal_numeric_spec() {
        assert_eq!(JobId::from_spec("1355859").unwrap(), JobId::new("1355859"));
    }

    #[test]
    fn test_qualified_id_is_kept_verbatim() {
        assert_eq!(
            JobId::from_spec("1355859.balza").unwrap(),
            JobId::new("1355859.balza")
        );
    }

    #[test]
    fn test_empty_spec_is_rejected() {
        assert_eq!(JobId::from_spec("  "), Err(JobSpecError::Empty));
    }

    #[test]
    fn test_non_numeric_spec_is_rejected() {
        assert!(matches!(
            JobId::from_spec("not-a-job"),
            Err(JobSpecError::UnrecognizedId(_))
        ));
    }

    #[test]
    fn test_psub_cmd_path_pattern() {
        let id = JobId::from_psub_cmd_path("/home/me/work/run-p.1355859.balza.096/psub_cmd").unwrap();
        assert_eq!(id.as_str(), "1355859");
    }

    #[test]
    fn test_psub_cmd_path_without_convention() {
        assert!(matches!(
            JobId::from_psub_cmd_path("/tmp/somewhere/psub_cmd"),
            Err(JobSpecError::UnrecognizedPath(_))
        ));
    }

    #[test]
    fn test_existing_psub_cmd_file_is_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("run-p.777.balza.001");
        fs::create_dir(&work).unwrap();
        let psub = work.join("psub_cmd");
        fs::write(&psub, "run-parallel.sh ...\n").unwrap();

        let id = JobId::from_spec(psub.to_str().unwrap()).unwrap();
        assert_eq!(id.as_str(), "777");
    }

    #[test]
    fn test_existing_file_with_wrong_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("123");
        fs::write(&other, "").unwrap();

        // A file that happens to be named like an ID is still a path.
        let result = JobId::from_spec(other.to_str().unwrap());
        assert!(matches!(result, Err(JobSpecError::UnrecognizedPath(_))));
    }
}
