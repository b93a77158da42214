use assert_cmd::Command;
use predicates::prelude::*;

fn resolver() -> Command {
    let mut cmd = Command::cargo_bin("resolver").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_normalize_short_link() {
    resolver()
        .args(["normalize", "https://youtu.be/dQw4w9WgXcQ?si=share"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dQw4w9WgXcQ"))
        .stdout(predicate::str::contains("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
}

#[test]
fn test_normalize_json() {
    let output = resolver()
        .args(["normalize", "--format", "json", "https://www.youtube.com/watch?v=abc&list=RD"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["canonical_id"], "abc");
    assert_eq!(json["raw_input"], "https://www.youtube.com/watch?v=abc&list=RD");
}

#[test]
fn test_normalize_free_text() {
    resolver()
        .args(["normalize", "--format", "json", "lofi hip hop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"canonical_url\": null"));
}

#[test]
fn test_unknown_subcommand_fails() {
    resolver().arg("enqueue").assert().failure();
}

#[test]
fn test_help_lists_commands() {
    resolver()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("acquire"))
        .stdout(predicate::str::contains("details"));
}
