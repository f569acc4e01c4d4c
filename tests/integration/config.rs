//! Configuration file integration tests.

use rscheduler::testing::{Reply, ScriptedRunner};
use rscheduler::{ConfigError, ControllerBuilder, JobId, ShutdownReason, YamlLoader};
use std::fs;
use std::sync::Arc;

use crate::common::{cluster, workers};

const SITE_CONFIG: &str = r#"
burst_interval_minutes: 2
minimum_workers: 12
free_fraction: 0.2
timezone: Europe/Paris
dry_run: true
add:
  - "0.05:0 0 18 * * * mon-fri"
quench:
  - "0.3:0 0 8 * * * mon-fri"
  - "0.5:0 0 9 * * 2030 sat"
commands:
  cluster_summary:
    program: /opt/sge/bin/analyze
  queue_lookup:
    program: qstat
    args: ["-j", "{job}"]
"#;

#[test]
fn test_site_config_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r-scheduler.yaml");
    fs::write(&path, SITE_CONFIG).unwrap();

    let config = YamlLoader::load_config(&path).unwrap();
    assert_eq!(config.minimum_workers, 12);
    assert_eq!(config.timezone, "Europe/Paris");
    assert_eq!(config.quench.len(), 2);
    assert_eq!(config.commands.cluster_summary.program, "/opt/sge/bin/analyze");
    // Unset commands keep their defaults.
    assert_eq!(config.commands.worker_pool.program, "run-parallel.sh");
    assert_eq!(config.liveness_interval_secs, 60);
}

#[test]
fn test_missing_file_is_reported_with_path() {
    let result = YamlLoader::load_config("/nonexistent/r-scheduler.yaml");
    match result {
        Err(ConfigError::FileReadError { path, .. }) => {
            assert!(path.ends_with("r-scheduler.yaml"));
        }
        other => panic!("expected FileReadError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_malformed_rule_in_file_fails_the_build() {
    let config = YamlLoader::parse_config("quench:\n  - \"0.3 0 0 8 * * * *\"\n").unwrap();
    let result = ControllerBuilder::new(config)
        .with_runner(Arc::new(ScriptedRunner::new()))
        .build(JobId::new("42"));
    assert!(matches!(result, Err(ConfigError::InvalidRule(_))));
}

#[tokio::test(start_paused = true)]
async fn test_site_config_drives_the_controller() {
    let config = YamlLoader::parse_config(SITE_CONFIG).unwrap();

    let runner = Arc::new(ScriptedRunner::new());
    runner.always("/opt/sge/bin/analyze", cluster(100, 50));
    runner.always("run-parallel.sh", workers(20, 0, 0));
    runner.always("qstat", Reply::failure(1, ""));

    let controller = ControllerBuilder::new(config)
        .with_runner(runner.clone())
        .build(JobId::new("42"))
        .unwrap();
    assert_eq!(controller.rule_count(), 3);
    assert_eq!(controller.state().target_free_fraction().await, 0.2);

    let reason = controller.run().await.unwrap();
    assert_eq!(reason, ShutdownReason::JobGone);
    assert_eq!(
        runner.invocations(),
        vec![
            "/opt/sge/bin/analyze",
            "run-parallel.sh num_worker 42",
            "qstat -j 42",
        ]
    );
}
