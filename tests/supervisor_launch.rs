//! Supervisor launch test against a stub executable standing in for a DCC.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;

use dcc_hotload::config::EndpointConfig;
use dcc_hotload::hooks::DccKind;
use dcc_hotload::supervisor::Supervisor;

#[tokio::test]
async fn launch_spawns_resolved_executable_with_bootstrap_args() {
    let root = tempfile::tempdir().unwrap();
    let capture = root.path().join("argv.txt");

    // Stub "mayapy" that records its arguments and environment, then exits.
    let script = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{0}'\nprintf '%s\\n' \"$DCC_HOTLOAD_BIN\" >> '{0}'\nexit 0\n",
        capture.display()
    );
    let exe = root.path().join("mayapy");
    fs::write(&exe, script).unwrap();
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = EndpointConfig::new(DccKind::Mayapy, "2024");
    config.custom_root = Some(root.path().to_path_buf());

    let status = Supervisor::new(config.clone()).launch().await.unwrap();
    assert!(status.success());

    // The child saw: -c, the inline bootstrap, the snapshot, and the env var
    // pointing at this binary.
    let recorded = fs::read_to_string(&capture).unwrap();
    let lines: Vec<&str> = recorded.lines().collect();
    assert_eq!(lines[0], "-c");
    assert!(lines.iter().any(|l| l.contains("os.execv")));

    let snapshot = config.encode_snapshot().unwrap();
    assert!(recorded.contains(&snapshot));
    assert!(!lines.last().unwrap().is_empty(), "DCC_HOTLOAD_BIN not set");
}

#[tokio::test]
async fn launch_propagates_child_exit_status() {
    let root = tempfile::tempdir().unwrap();
    let exe = root.path().join("hython");
    fs::write(&exe, "#!/bin/sh\nexit 7\n").unwrap();
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = EndpointConfig::new(DccKind::Hython, "20.5.445");
    config.custom_root = Some(root.path().to_path_buf());

    let status = Supervisor::new(config).launch().await.unwrap();
    assert_eq!(status.code(), Some(7));
}
