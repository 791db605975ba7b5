use std::time::{Duration, Instant};

use varmon::core::process_monitor::{Counter, Liveness, ProcessProbe, SystemProbe};

#[cfg(unix)]
#[test]
fn test_tree_lists_parent_first_then_descendants() {
    use std::process::Command;

    let child = Command::new("sh")
        .arg("-c")
        .arg("sleep 2 & sleep 2; wait")
        .spawn()
        .unwrap();
    let parent = child.id();
    let mut probe = SystemProbe::from_child(child);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut tree = Vec::new();
    while Instant::now() < deadline {
        probe.refresh();
        tree = probe.tree();
        if tree.len() >= 3 {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(tree[0], parent);
    assert!(tree.len() >= 3, "descendants missing: {:?}", tree);

    let counters = [Counter::ResidentMemory, Counter::CpuSeconds];
    for pid in &tree {
        // Children may exit between enumeration and read; only the shape matters here
        if let Ok(observation) = probe.observe(*pid, &counters) {
            assert_eq!(observation.pid, *pid);
        }
    }

    probe.reap(Duration::from_secs(10)).unwrap();
    probe.refresh();
    assert_eq!(probe.liveness(), Liveness::Gone);
}

#[cfg(target_os = "linux")]
#[test]
fn test_memory_detail_of_own_process() {
    let mut probe = SystemProbe::attach(std::process::id()).unwrap();
    probe.refresh();

    let observation = probe
        .observe(
            std::process::id(),
            &[Counter::UniqueMemory, Counter::ProportionalMemory],
        )
        .unwrap();

    assert!(observation.pss > 0);
    assert!(observation.uss > 0);
}

#[test]
fn test_attach_to_missing_pid() {
    let err = SystemProbe::attach(u32::MAX - 7).err().unwrap();
    assert!(err.is_configuration());
}
