use std::fs;
use std::time::Duration;

use tempfile::TempDir;
use varmon::core::process_monitor::metric_names;
use varmon::MonitorOptions;

#[test]
fn test_config_default() {
    let options = MonitorOptions::default();
    assert_eq!(options.report_lapse, 1.0);
    assert_eq!(options.check_lapse, 0.0);
    assert!(options.hs06_factor_command.is_none());
}

#[test]
fn test_config_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("varmon.toml");
    fs::write(
        &config_path,
        r#"
[monitor]
metrics = ["max_vms", "max_rss", "total_io_read", "total_io_write", "total_cpu_time"]
report_lapse = 2.5
check_lapse = 0.1
reap_timeout = 3
"#,
    )
    .unwrap();

    let options = MonitorOptions::load(&config_path).unwrap();
    let timing = options.timing().unwrap();

    assert_eq!(options.metrics.len(), 5);
    assert_eq!(timing.report_lapse, Duration::from_millis(2500));
    assert_eq!(timing.check_lapse, Duration::from_millis(100));
    assert_eq!(timing.reap_timeout, Duration::from_secs(3));
}

#[test]
fn test_config_unknown_key_is_ignored() {
    let options = MonitorOptions::from_toml_str(
        r#"
[monitor]
report_lapse = 3.0
colour = "blue"
"#,
    )
    .unwrap();

    assert_eq!(options.report_lapse, 3.0);
}

#[test]
fn test_config_wrong_type() {
    let err = MonitorOptions::from_toml_str("[monitor]\nreport_lapse = \"soon\"\n").unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_every_registered_metric_builds_without_helper() {
    let temp_dir = TempDir::new().unwrap();

    for (i, name) in metric_names().filter(|n| *n != "total_HS06").enumerate() {
        let options = MonitorOptions {
            metrics: vec![name.to_string()],
            log_file: Some(temp_dir.path().join(format!("usage-{}.log", i))),
            ..Default::default()
        };
        let setup = options.prepare().unwrap();
        assert_eq!(setup.metrics[0].name(), name);
    }
}

#[cfg(unix)]
#[test]
fn test_hs06_metric_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let options = MonitorOptions {
        metrics: vec!["total_cpu_time".to_string(), "total_HS06".to_string()],
        hs06_factor_command: Some("echo HS06_factor=10".to_string()),
        log_file: Some(temp_dir.path().join("usage.log")),
        ..Default::default()
    };

    let setup = options.prepare().unwrap();
    assert_eq!(setup.metrics[1].name(), "total_HS06");
}

#[cfg(unix)]
#[test]
fn test_hs06_helper_without_marker_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("usage.log");
    let options = MonitorOptions {
        metrics: vec!["total_HS06".to_string()],
        hs06_factor_command: Some("echo nothing useful".to_string()),
        log_file: Some(log_path.clone()),
        ..Default::default()
    };

    assert!(options.prepare().unwrap_err().is_configuration());
    assert!(!log_path.exists());
}
