//! Cluster and worker-pool probes.
//!
//! Both probes are thin wrappers over a [`CommandRunner`](crate::execution::CommandRunner):
//! run one external command, parse its stdout, and hand back an immutable
//! reading.

mod cluster;
mod pool;

pub use cluster::{ResourceProbe, parse_cluster_summary};
pub use pool::{WorkerPoolProbe, parse_worker_counts};

use thiserror::Error;

use crate::execution::CommandError;

/// Errors that can occur while probing the cluster or the worker pool.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe command could not be run or exited non-zero.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The probe command succeeded but its output could not be parsed.
    #[error("malformed {what}: {output:?}")]
    Malformed { what: &'static str, output: String },
}

impl ProbeError {
    pub(crate) fn malformed(what: &'static str, output: &str) -> Self {
        ProbeError::Malformed {
            what,
            output: output.trim().to_string(),
        }
    }
}
