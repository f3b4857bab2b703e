use std::f32::consts::PI;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_tone(path: &Path, secs: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(secs * 16_000.0) as usize {
        let s = 0.4 * (2.0 * PI * 250.0 * i as f32 / 16_000.0).sin();
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn features_command_prints_record_and_logs_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clip.wav");
    let metadata = dir.path().join("data/metadata.csv");
    write_tone(&input, 1.0);

    let output = Command::cargo_bin("speakscore")
        .unwrap()
        .arg("features")
        .arg(&input)
        .args(["--transcript", "um well actually"])
        .arg("--metadata")
        .arg(&metadata)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["features"]["filler_count"], 2);
    assert!(json["sample_id"].as_str().unwrap().starts_with("sp_"));
    let csv = std::fs::read_to_string(&metadata).unwrap();
    assert_eq!(csv.lines().count(), 2);
}

#[test]
fn window_command_writes_normalized_wav() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clip.wav");
    let output = dir.path().join("window.wav");
    write_tone(&input, 0.5);

    Command::cargo_bin("speakscore")
        .unwrap()
        .arg("window")
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"samples\": 80000"));

    let reader = hound::WavReader::open(&output).unwrap();
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.len(), 80_000);
}

#[test]
fn score_without_checkpoint_fails_with_context() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clip.wav");
    write_tone(&input, 0.5);

    Command::cargo_bin("speakscore")
        .unwrap()
        .arg("score")
        .arg(&input)
        .arg("--models-dir")
        .arg(dir.path().join("models"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("regression checkpoint"));
}

#[test]
fn domain_training_requires_emotion_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    write_tone(&corpus.join("a.wav"), 0.2);

    Command::cargo_bin("speakscore")
        .unwrap()
        .args(["train", "domain", "--data"])
        .arg(&corpus)
        .arg("--models-dir")
        .arg(dir.path().join("models"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("emotion_pretrain.safetensors"));
}
