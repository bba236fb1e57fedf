use std::process::{Command, Output};

fn run(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vision-describe"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn missing_config_file_is_reported_on_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");

    let out = run(
        dir.path(),
        &["--config", missing.to_str().unwrap(), "config-show"],
    );

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("config file not found"), "stderr: {stderr}");
    assert!(out.stdout.is_empty());
}

#[test]
fn malformed_config_is_reported_on_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    std::fs::write(&cfg, "server = 5\n").unwrap();

    let out = run(dir.path(), &["--config", cfg.to_str().unwrap(), "config-show"]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(stderr.contains("parsing TOML"), "stderr: {stderr}");
}

#[test]
fn valid_config_is_printed_on_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("ok.toml");
    std::fs::write(&cfg, "[server]\nmodel = \"llava:13b\"\n").unwrap();

    let out = run(dir.path(), &["--config", cfg.to_str().unwrap(), "config-show"]);

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[server]"));
    assert!(stdout.contains("llava:13b"));
}
