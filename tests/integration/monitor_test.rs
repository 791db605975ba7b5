use std::fs;

use tempfile::TempDir;
use varmon::core::process_monitor::{
    build_metrics, LogSink, MetricContext, MonitorState, MonitorTiming, ProcessTreeMonitor,
    SharedBuffer, SystemProbe, SUMMARY_PREFIX,
};
use varmon::{MonitorOptions, VarmonError};

fn summary_field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.split(',')
        .filter_map(|field| field.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[cfg(unix)]
#[test]
fn test_short_lived_tree_end_to_end() {
    use std::process::Command;

    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("usage.log");

    let options = MonitorOptions {
        metrics: vec!["max_rss".to_string(), "total_cpu_time".to_string()],
        report_lapse: 1.0,
        check_lapse: 0.0,
        log_file: Some(log_path.clone()),
        ..Default::default()
    };
    let setup = options.prepare().unwrap();

    let child = Command::new("sh")
        .arg("-c")
        .arg("sleep 2 & i=0; while [ $i -lt 20000 ]; do i=$((i+1)); done; wait")
        .spawn()
        .unwrap();

    let mut monitor = setup.into_monitor(SystemProbe::from_child(child)).unwrap();
    let summary = monitor.run().unwrap();
    assert_eq!(monitor.state(), MonitorState::Closed);

    let contents = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();

    assert_eq!(
        lines.iter().filter(|l| l.starts_with("timestamp,")).count(),
        1
    );
    assert_eq!(lines[0], "timestamp,max_rss,total_cpu_time");

    assert_eq!(
        lines.iter().filter(|l| l.starts_with(SUMMARY_PREFIX)).count(),
        1
    );
    let summary_line = *lines.last().unwrap();
    assert!(summary_line.starts_with(SUMMARY_PREFIX));
    assert_eq!(summary_line, summary.line);

    let rows = &lines[1..lines.len() - 1];
    assert!(!rows.is_empty());
    assert_eq!(rows.len(), summary.rows_written);

    let summary_cpu: f64 = summary_field(summary_line, "total_cpu_time")
        .unwrap()
        .parse()
        .unwrap();
    for row in rows {
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 3);
        let row_cpu: f64 = fields[2].parse().unwrap();
        assert!(summary_cpu >= row_cpu);
    }
}

#[test]
fn test_existing_destination_fails_before_sampling() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("usage.log");
    fs::write(&log_path, "previous run\n").unwrap();

    let options = MonitorOptions {
        log_file: Some(log_path.clone()),
        ..Default::default()
    };

    let err = options.prepare().unwrap_err();
    assert!(matches!(err, VarmonError::DestinationExists(_)));
    assert!(err.is_configuration());
    assert_eq!(fs::read_to_string(&log_path).unwrap(), "previous run\n");
}

#[cfg(unix)]
#[test]
fn test_attached_tree_is_drained() {
    use std::process::Command;

    let mut child = Command::new("sleep").arg("1").spawn().unwrap();
    let probe = SystemProbe::attach(child.id()).unwrap();

    let metrics = build_metrics(&["max_vms", "total_io_write"], &MetricContext::default()).unwrap();
    let buffer = SharedBuffer::new();
    let timing = MonitorTiming {
        report_lapse: std::time::Duration::from_millis(200),
        check_lapse: std::time::Duration::from_millis(20),
        ..Default::default()
    };
    let mut monitor =
        ProcessTreeMonitor::new(probe, metrics, LogSink::from_writer(buffer.clone()), timing)
            .unwrap();

    let summary = monitor.run().unwrap();
    child.wait().unwrap();

    assert!(summary.passes > 0);
    let max_vms = summary_field(&summary.line, "max_vms").unwrap();
    assert!(max_vms.ends_with(|c| matches!(c, 'K' | 'M' | 'G')));
    assert!(buffer.contents().starts_with("timestamp,max_vms,total_io_write\n"));
}

#[cfg(target_os = "linux")]
fn parse_byte_value(value: &str) -> f64 {
    let (number, unit) = value.split_at(value.len() - 1);
    let exponent = "BKMGTPEZY".find(unit).unwrap();
    number.parse::<f64>().unwrap() * 1024f64.powi(exponent as i32)
}

#[cfg(target_os = "linux")]
#[test]
fn test_io_read_counts_reads_served_from_cache() {
    use std::process::Command;
    use std::time::Duration;

    const LEN: usize = 256 * 1024;

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.txt");
    fs::write(&input, "xxxxxxx\n".repeat(LEN / 8)).unwrap();

    // The shell reads the file itself and stays alive long enough to be sampled
    let child = Command::new("sh")
        .arg("-c")
        .arg("while read -r line; do :; done < \"$0\"; sleep 1")
        .arg(&input)
        .spawn()
        .unwrap();

    let metrics = build_metrics(&["total_io_read"], &MetricContext::default()).unwrap();
    let timing = MonitorTiming {
        check_lapse: Duration::from_millis(5),
        ..Default::default()
    };
    let mut monitor = ProcessTreeMonitor::new(
        SystemProbe::from_child(child),
        metrics,
        LogSink::from_writer(SharedBuffer::new()),
        timing,
    )
    .unwrap();

    let summary = monitor.run().unwrap();
    let read = parse_byte_value(summary.value("total_io_read").unwrap());
    assert!(read >= LEN as f64, "read only {}", read);
}
