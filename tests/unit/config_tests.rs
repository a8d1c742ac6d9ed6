//! Unit tests for configuration parsing, defaults, and name derivation.

use std::path::PathBuf;

use procwarden::config::GlobalConfig;

fn minimal_toml(root: &str) -> String {
    format!(
        r#"
project_root = '{root}'

[worker]
command = "echo"
"#
    )
}

#[test]
fn defaults_applied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&minimal_toml(&dir.path().display().to_string())).expect("valid config");

    assert_eq!(config.listen, "http://127.0.0.1:8008");
    assert_eq!(config.workers, 1);
    assert!(config.watch.enabled);
    assert!(config.watch.entries.is_empty());
    assert_eq!(config.timeouts.stop_grace_ms, 100);
    assert_eq!(config.timeouts.stop_wait_ms, 1000);
    assert_eq!(config.timeouts.kill_grace_ms, 5000);
    assert_eq!(config.timeouts.reload_settle_ms, 2000);
    assert_eq!(config.timeouts.poll_interval_ms, 1000);
    assert!(config.ipc_name.is_none());
}

#[test]
fn project_root_is_canonicalized() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&minimal_toml(&dir.path().display().to_string())).expect("valid config");
    assert!(config.project_root.is_absolute());
}

#[test]
fn empty_worker_command_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
project_root = '{}'

[worker]
command = "  "
"#,
        dir.path().display()
    );
    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn missing_project_root_rejected() {
    let toml = r#"
project_root = '/nonexistent/procwarden/project'

[worker]
command = "echo"
"#;
    assert!(GlobalConfig::from_toml_str(toml).is_err());
}

#[test]
fn invalid_toml_rejected() {
    assert!(GlobalConfig::from_toml_str("worker = notatable").is_err());
}

#[test]
fn channel_name_is_deterministic_per_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = minimal_toml(&dir.path().display().to_string());
    let a = GlobalConfig::from_toml_str(&raw).expect("valid config");
    let b = GlobalConfig::from_toml_str(&raw).expect("valid config");

    assert_eq!(a.channel_name(), b.channel_name());
    assert!(a.channel_name().starts_with("procwarden-"));

    let other_dir = tempfile::tempdir().expect("tempdir");
    let other = GlobalConfig::from_toml_str(&minimal_toml(&other_dir.path().display().to_string()))
        .expect("valid config");
    assert_ne!(a.channel_name(), other.channel_name());
}

#[test]
fn explicit_ipc_name_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
project_root = '{}'
ipc_name = "custom-channel"

[worker]
command = "echo"
"#,
        dir.path().display()
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");
    assert_eq!(config.channel_name(), "custom-channel");
}

#[test]
fn session_channel_name_embeds_session_id() {
    assert_eq!(
        GlobalConfig::session_channel_name("abc123"),
        "procwarden-s-abc123"
    );
}

#[test]
fn watch_entries_resolve_against_project_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
project_root = '{root}'

[worker]
command = "echo"

[watch]
enabled = true
entries = [
    {{ path = "src", ext = "rs" }},
    {{ path = '{root}/absolute' }},
]
"#,
        root = dir.path().display()
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");

    let relative = config.resolve_watch_path(&config.watch.entries[0]);
    assert_eq!(relative, config.project_root.join("src"));
    assert_eq!(config.watch.entries[0].ext.as_deref(), Some("rs"));

    let absolute = config.resolve_watch_path(&config.watch.entries[1]);
    assert_eq!(absolute, PathBuf::from(format!("{}/absolute", dir.path().display())));
}

#[test]
fn lock_and_log_paths_live_under_project_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&minimal_toml(&dir.path().display().to_string())).expect("valid config");

    assert_eq!(config.lock_path(), config.project_root.join(".procwarden.lock"));
    assert_eq!(
        config.daemon_log_path(),
        config.project_root.join("procwarden.log")
    );
}
