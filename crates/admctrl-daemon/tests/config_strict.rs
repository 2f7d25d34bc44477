#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::path::Path;

use admctrl_daemon::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
daemon:
  socket: "/tmp/x.sock"
resource_control:
  enabeld: true # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INTERNAL_ERROR");
    assert!(err.to_string().contains("enabeld"), "{err}");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.daemon.socket, Path::new("/tmp/.authd.sock"));
    assert_eq!(cfg.daemon.policy_file, Path::new("/etc/authd/policy"));
    assert_eq!(cfg.daemon.read_timeout_ms, 5000);
    assert!(!cfg.daemon.verbose);
    assert!(!cfg.resource_control.enabled);
    assert_eq!(
        cfg.resource_control.store,
        Path::new("/etc/authd/resourcectrl/resource.db")
    );
}

#[test]
fn rejects_out_of_range_values() {
    for bad in [
        "version: 2\n",
        "version: 1\ndaemon:\n  read_timeout_ms: 50\n",
        "version: 1\ndaemon:\n  read_timeout_ms: 700000\n",
        "version: 1\nresource_control:\n  allocate_on_grant: true\n",
    ] {
        assert!(config::load_from_str(bad).is_err(), "{bad}");
    }
}

#[test]
fn full_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authd.yaml");
    std::fs::write(
        &path,
        r#"
version: 1
daemon:
  socket: /run/authd.sock
  policy_file: /etc/authd/policy
  read_timeout_ms: 250
  verbose: true
resource_control:
  enabled: true
  store: /var/lib/authd/resource.db
  allocate_on_grant: true
"#,
    )
    .unwrap();

    let cfg = config::load_from_file(&path).expect("must parse");
    assert_eq!(cfg.daemon.read_timeout_ms, 250);
    assert!(cfg.daemon.verbose);
    assert!(cfg.resource_control.allocate_on_grant);
    assert!(config::load_from_file(dir.path().join("missing.yaml")).is_err());
}

#[test]
fn errors_name_their_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authd.yaml");
    std::fs::write(&path, "version: 1
daemon:
  read_timeout_ms: 1
").unwrap();

    let err = config::load_from_file(&path).expect_err("must fail");
    let msg = err.to_string();
    assert!(msg.contains("authd.yaml"), "{msg}");
    assert!(msg.contains("read_timeout_ms"), "{msg}");

    let err = config::load_from_str("version: 1
extra: 2
").expect_err("must fail");
    assert!(err.to_string().contains("inline config"), "{err}");
}
