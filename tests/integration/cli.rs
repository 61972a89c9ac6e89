use assert_cmd::Command;
use legal_md::test_utils::{DocumentFixture, DocumentSet};
use predicates::prelude::*;
use serde_json::Value;

fn lmd() -> Command {
    let mut cmd = Command::cargo_bin("lmd").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_processes_file_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DocumentSet::service_agreement().write_to(dir.path()).unwrap();

    lmd()
        .arg(&paths[0])
        .arg("--today")
        .arg("2024-03-01")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Article 1. Services\nSection 1. Scope\n"))
        .stdout(predicate::str::contains("confidential under France law"))
        .stderr(predicate::str::contains("warning [imports]"));
}

#[test]
fn test_reads_stdin() {
    lmd()
        .arg("-")
        .write_stdin("---\nname: Acme\n---\nHello {{name}}")
        .assert()
        .success()
        .stdout("Hello Acme\n");
}

#[test]
fn test_json_report() {
    let output = lmd()
        .args(["-", "--format", "json", "--quiet"])
        .write_stdin("---\nname: Acme\n---\n{{name}} {{missing}}")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["resolvedText"], "Acme {{missing}}");
    assert_eq!(json["fieldReport"]["total"], 2);
    assert_eq!(json["fieldReport"]["empty"], 1);
    assert_eq!(json["stageMetrics"][0]["name"], "imports");
    assert!(json["metadata"]["_cross_references"].is_array());
}

#[test]
fn test_field_tracking_flag() {
    lmd()
        .args(["-", "--field-tracking"])
        .write_stdin("---\nname: Acme\n---\n{{name}}")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "<span class=\"legal-field imported-value\" data-field=\"name\">Acme</span>",
        ));
}

#[test]
fn test_config_file_and_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = DocumentFixture::new("doc.md", "---\nok: true\n---\nl. Title\n[kept]{ok}")
        .write_to(dir.path())
        .unwrap();
    let config = dir.path().join("lmd.toml");
    std::fs::write(&config, "disabled-stages = [\"headers\"]\n").unwrap();
    let output = dir.path().join("out.md");

    lmd().arg(&input).arg("--config").arg(&config).arg("-o").arg(&output).assert().success();
    assert_eq!(std::fs::read_to_string(output).unwrap(), "l. Title\nkept");
}

#[test]
fn test_metadata_export() {
    let dir = tempfile::tempdir().unwrap();
    let input = DocumentFixture::new(
        "doc.md",
        "---\nparty: Acme\nmeta-output-path: meta\nmeta-json-output: doc.json\n---\nBody",
    )
    .write_to(dir.path())
    .unwrap();

    lmd().arg(&input).assert().success().stderr(predicate::str::contains("Exported"));
    let exported: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("meta/doc.json")).unwrap())
            .unwrap();
    assert_eq!(exported["party"], "Acme");
}

#[test]
fn test_missing_input_fails() {
    lmd()
        .arg("does-not-exist.md")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("read document"));
}

#[test]
fn test_unknown_stage_is_a_configuration_error() {
    lmd()
        .args(["-", "--disable", "typography"])
        .write_stdin("text")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown stage 'typography'"));
}

#[test]
fn test_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "field-tracking = \"maybe\"\n").unwrap();

    lmd()
        .arg("-")
        .arg("--config")
        .arg(&config)
        .write_stdin("text")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid options file"));
}
