//! Cluster-wide resource probe.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::ProbeError;
use crate::core::snapshot::ClusterSnapshot;
use crate::execution::{CommandRunner, CommandSpec};

// e.g. "||| 320 CPUs: 16 down or offline, 304 busy, 0 free"
static CPU_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) CPUs: .*, (\d+) free").expect("cpu line pattern is valid")
});

// e.g. "||| 265 jobs pending"
static PENDING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) jobs pending").expect("pending line pattern is valid"));

const WHAT: &str = "cluster summary";

/// Parse the output of the cluster summary command.
///
/// The last CPU line and the last pending line win. A missing pending line
/// means nothing is queued. The reported free count is reduced by the
/// pending count, saturating at zero.
pub fn parse_cluster_summary(output: &str) -> Result<ClusterSnapshot, ProbeError> {
    let mut units = None;
    let mut pending = 0;

    for line in output.lines() {
        if let Some(caps) = CPU_LINE.captures(line) {
            let total = caps[1].parse::<u64>();
            let free = caps[2].parse::<u64>();
            match (total, free) {
                (Ok(total), Ok(free)) => units = Some((total, free)),
                _ => return Err(ProbeError::malformed(WHAT, line)),
            }
        } else if let Some(caps) = PENDING_LINE.captures(line) {
            pending = caps[1]
                .parse::<u64>()
                .map_err(|_| ProbeError::malformed(WHAT, line))?;
        }
    }

    let (total, free) = units.ok_or_else(|| ProbeError::malformed(WHAT, output))?;
    if total == 0 {
        return Err(ProbeError::malformed(WHAT, output));
    }

    Ok(ClusterSnapshot::from_raw(total, free, pending))
}

/// Queries the cluster for total and free compute units.
#[derive(Clone)]
pub struct ResourceProbe {
    runner: Arc<dyn CommandRunner>,
    command: CommandSpec,
}

impl ResourceProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, command: CommandSpec) -> Self {
        Self { runner, command }
    }

    /// Take a fresh snapshot of cluster capacity.
    pub async fn snapshot(&self) -> Result<ClusterSnapshot, ProbeError> {
        let output = self
            .runner
            .run(&self.command)
            .await?
            .into_success(&self.command.program)?;

        let snapshot = parse_cluster_summary(&output.stdout)?;
        debug!(%snapshot, "cluster snapshot");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::CommandOutput;
    use crate::testing::ScriptedRunner;

    const SAMPLE: &str = "\
some banner
||| 265 jobs pending
||| 320 CPUs: 16 down or offline, 304 busy, 0 free
";

    #[test]
    fn test_parse_with_pending() {
        let output = "||| 5 jobs pending\n||| 320 CPUs: 0 down, 280 busy, 40 free\n";
        let snapshot = parse_cluster_summary(output).unwrap();
        assert_eq!(snapshot, ClusterSnapshot::from_raw(320, 40, 5));
        assert_eq!(snapshot.free_units, 35);
    }

    #[test]
    fn test_pending_saturates_free_units() {
        let snapshot = parse_cluster_summary(SAMPLE).unwrap();
        assert_eq!(snapshot.total_units, 320);
        assert_eq!(snapshot.free_units, 0);
        assert_eq!(snapshot.pending_jobs, 265);
    }

    #[test]
    fn test_missing_pending_line_means_zero() {
        let output = "|||\n||| 320 CPUs: 0 down, 280 busy, 40 free\n";
        let snapshot = parse_cluster_summary(output).unwrap();
        assert_eq!(snapshot.pending_jobs, 0);
        assert_eq!(snapshot.free_units, 40);
    }

    #[test]
    fn test_last_cpu_line_wins() {
        let output = "10 CPUs: x, 1 free\n20 CPUs: y, 2 free\n";
        let snapshot = parse_cluster_summary(output).unwrap();
        assert_eq!(snapshot.total_units, 20);
        assert_eq!(snapshot.free_units, 2);
    }

    #[test]
    fn test_missing_cpu_line_is_malformed() {
        let err = parse_cluster_summary("||| 3 jobs pending\n").unwrap_err();
        assert!(matches!(err, ProbeError::Malformed { .. }));
    }

    #[test]
    fn test_zero_total_is_malformed() {
        let err = parse_cluster_summary("0 CPUs: all down, 0 free\n").unwrap_err();
        assert!(matches!(err, ProbeError::Malformed { .. }));
    }

    #[test]
    fn test_overflowing_number_is_malformed() {
        let err =
            parse_cluster_summary("99999999999999999999999 CPUs: x, 1 free\n").unwrap_err();
        assert!(matches!(err, ProbeError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_runs_configured_command() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_stdout(SAMPLE);
        let probe = ResourceProbe::new(runner.clone(), CommandSpec::new("analyze"));

        let snapshot = probe.snapshot().await.unwrap();
        assert_eq!(snapshot.total_units, 320);
        assert_eq!(runner.invocations(), vec!["analyze".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_non_zero_exit_is_command_error() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(CommandOutput {
            code: 1,
            stdout: String::new(),
            stderr: "server down".into(),
        });
        let probe = ResourceProbe::new(runner, CommandSpec::new("analyze"));

        let err = probe.snapshot().await.unwrap_err();
        assert!(matches!(err, ProbeError::Command(_)));
    }
}
