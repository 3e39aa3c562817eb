use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sources:\n  languages: [en]\ntopics:\n  aliases:\n    tesla bot: humanoid robot").unwrap();
    file
}

fn tubescribe(config: &NamedTempFile) -> Command {
    let mut cmd = Command::cargo_bin("tubescribe").unwrap();
    cmd.arg("--config").arg(config.path()).arg("--quiet");
    cmd
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("tubescribe")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("strategies"))
        .stdout(predicate::str::contains("topics"));
}

#[test]
fn test_topics_ranks_imported_items() {
    let config = config_file();
    let mut corpus = NamedTempFile::new().unwrap();
    write!(
        corpus,
        r#"{{"items": [
            {{"id": "a", "imported": true, "analysis": {{"topicTags": [{{"name": "Robotaxis"}}, {{"name": "Tesla Bot"}}]}}}},
            {{"id": "b", "imported": true, "analysis": {{"topicTags": [{{"name": "Robotaxi"}}, {{"name": "Humanoid Robots"}}]}}}},
            {{"id": "c", "imported": true, "analysis": {{"topicTags": [{{"name": "AI"}}]}}}},
            {{"id": "d", "imported": false, "analysis": {{"topicTags": [{{"name": "AI"}}]}}}}
        ]}}"#
    )
    .unwrap();

    let output = tubescribe(&config)
        .args(["topics", "--format", "json"])
        .arg(corpus.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let topics: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let topics = topics.as_array().unwrap();
    assert_eq!(topics.len(), 3);
    assert_eq!(topics[0]["normalizedKey"], "humanoid robot");
    assert_eq!(topics[0]["count"], 2);
    assert_eq!(topics[1]["normalizedKey"], "robotaxi");
    assert_eq!(topics[2]["normalizedKey"], "artificial intelligence");
    assert_eq!(topics[2]["count"], 1);
}

#[test]
fn test_topics_limit_and_table() {
    let config = config_file();
    let mut corpus = NamedTempFile::new().unwrap();
    write!(
        corpus,
        r#"[{{"id": "a", "imported": true, "analysis": {{"topics": ["EVs", "AI"]}}}},
            {{"id": "b", "imported": true, "analysis": {{"topics": ["electric vehicle"]}}}}]"#
    )
    .unwrap();

    tubescribe(&config)
        .args(["topics", "--limit", "1"])
        .arg(corpus.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("electric vehicle"))
        .stdout(predicate::str::contains("artificial intelligence").not());
}

#[test]
fn test_config_show_redacts_secrets() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "analysis:\n  api_key: sk-very-secret").unwrap();

    tubescribe(&config)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current Configuration"))
        .stdout(predicate::str::contains("sk-very-secret").not());
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "segmenter:\n  min_words: 500").unwrap();

    tubescribe(&config)
        .args(["config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_words"));
}

#[test]
fn test_ingest_rejects_invalid_id() {
    let config = config_file();

    tubescribe(&config)
        .args(["ingest", "https://example.com/not-a-video"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not a valid content id"));
}

#[test]
fn test_config_writes_defaults_to_new_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tubescribe.yaml");

    Command::cargo_bin("tubescribe")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Default configuration written"));

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("hard_max_words: 150"));
}
