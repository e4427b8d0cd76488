use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

fn run_help(home: &TempDir, args: &[&str]) {
    let mut cmd = cargo_bin_cmd!("pipeguard");
    cmd.env("HOME", home.path())
        .args(args)
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn every_cli_command_has_help_path() {
    let home = TempDir::new().expect("temp home");

    // top-level
    run_help(&home, &[]);

    // baseline store
    run_help(&home, &["capture-baseline"]);
    run_help(&home, &["compare-baseline"]);
    run_help(&home, &["baselines"]);

    // checks
    run_help(&home, &["contract-check"]);
    run_help(&home, &["preflight"]);
    run_help(&home, &["audit"]);
}

#[test]
fn invalid_enum_values_are_rejected() {
    let home = TempDir::new().expect("temp home");
    cargo_bin_cmd!("pipeguard")
        .env("HOME", home.path())
        .args(["contract-check", "--mode", "maybe"])
        .assert()
        .failure();
    cargo_bin_cmd!("pipeguard")
        .env("HOME", home.path())
        .args(["audit", "--strictness", "never"])
        .assert()
        .failure();
}
