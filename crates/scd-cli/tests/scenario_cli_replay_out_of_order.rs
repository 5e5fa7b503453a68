use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;

const TABLE_YAML: &str = r#"
table:
  name: securities
  keys: [id]
  values: [attr]
"#;

fn write(dir: &Path, name: &str, body: &str) -> String {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p.to_string_lossy().to_string()
}

fn scd() -> Command {
    let mut cmd = Command::cargo_bin("scd").unwrap();
    cmd.env_remove("SCD_DATABASE_URL").env("RUST_LOG", "warn");
    cmd
}

/// Absence learned out of order splits the record and reopens it.
#[test]
fn replay_prints_final_intervals() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "table.yaml", TABLE_YAML);
    let present = write(dir.path(), "present.csv", "ID,Attr\nX,A\n");
    let absent = write(dir.path(), "absent.csv", "id,attr\n");

    scd()
        .args(["replay", "--config", &cfg])
        .args(["--sync", &format!("2025-12-17={present}")])
        .args(["--sync", &format!("2025-12-01={present}")])
        .args(["--sync", &format!("2025-12-05={present}")])
        .args(["--sync", &format!("2025-12-03={absent}")])
        .args(["--get", "2025-12-05"])
        .assert()
        .success()
        .stdout(predicate::str::contains("records=2"))
        .stdout(predicate::str::contains(
            "record key=X valid_from=2025-12-01 valid_to=2025-12-03 attrs=A",
        ))
        .stdout(predicate::str::contains(
            "record key=X valid_from=2025-12-05 valid_to=open attrs=A",
        ))
        .stdout(predicate::str::contains("synced date=2025-12-03 rows_total=0"))
        .stdout(predicate::str::contains("id,attr\nX,A\n"));
}

#[test]
fn replay_accepts_json_records() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "table.yaml", TABLE_YAML);
    let a = write(dir.path(), "a.json", r#"[{"id": "AAPL", "attr": "A"}]"#);
    let b = write(dir.path(), "b.json", r#"[{"id": "AAPL", "attr": "B"}]"#);

    scd()
        .args(["replay", "--config", &cfg])
        .args(["--sync", &format!("2025-12-05={a}")])
        .args(["--sync", &format!("2025-12-01={a}")])
        .args(["--sync", &format!("2025-12-03={b}")])
        .assert()
        .success()
        .stdout(predicate::str::contains("records=3"))
        .stdout(predicate::str::contains(
            "record key=AAPL valid_from=2025-12-03 valid_to=2025-12-05 attrs=B",
        ));
}

#[test]
fn duplicate_keys_fail_the_replay() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "table.yaml", TABLE_YAML);
    let dup = write(dir.path(), "dup.csv", "id,attr\nX,A\nX,B\n");

    scd()
        .args(["replay", "--config", &cfg])
        .args(["--sync", &format!("2025-12-01={dup}")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate key"));
}

#[test]
fn missing_columns_fail_the_replay() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "table.yaml", TABLE_YAML);
    let bad = write(dir.path(), "bad.csv", "id,other\nX,A\n");

    scd()
        .args(["replay", "--config", &cfg])
        .args(["--sync", &format!("2025-12-01={bad}")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("attr"));
}

#[test]
fn replay_requires_sync_argument() {
    scd()
        .args(["replay", "--config", "table.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--sync"));
}
