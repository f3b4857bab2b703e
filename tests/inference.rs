use std::f32::consts::PI;
use std::io::Cursor;
use std::thread;

use candle_core::Device;
use speakscore::config::ModelConfig;
use speakscore::{AcousticModel, HeadSpec, InferenceAdapter, ScoreResponse, ScoringError};

fn wav_bytes(secs: f32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..(secs * sample_rate as f32) as usize {
            let s = 0.3 * (2.0 * PI * 180.0 * i as f32 / sample_rate as f32).sin();
            let v = (s * i16::MAX as f32) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn saved_adapter(dir: &std::path::Path) -> InferenceAdapter {
    let path = dir.join("regression.safetensors");
    AcousticModel::new(ModelConfig::default(), HeadSpec::Regression, &Device::Cpu)
        .unwrap()
        .save(&path)
        .unwrap();
    InferenceAdapter::load(&path, &Device::Cpu).expect("strict load of a regression checkpoint")
}

#[test]
fn scores_stereo_wav_on_rating_scale() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = saved_adapter(dir.path());

    let response = adapter.score_bytes(wav_bytes(2.0, 44_100), Some("wav"));
    let scores = response.scores().expect("clip should be scored");
    for value in [scores.confidence, scores.clarity] {
        assert!((1.0..=5.0).contains(&value), "score {value} out of range");
    }
}

#[test]
fn undecodable_bytes_become_error_payload() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = saved_adapter(dir.path());

    let response = adapter.score_bytes(b"definitely not audio".to_vec(), Some("webm"));
    assert!(matches!(response, ScoreResponse::Failure { .. }));
    let json = serde_json::to_value(&response).unwrap();
    assert!(json["error"].as_str().unwrap().contains("decode"));

    let empty = adapter.score_bytes(Vec::new(), None);
    assert!(empty.scores().is_none());
}

#[test]
fn adapter_is_shared_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = saved_adapter(dir.path());
    let bytes = wav_bytes(1.0, 16_000);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let adapter = adapter.clone();
            let bytes = bytes.clone();
            thread::spawn(move || adapter.score_bytes(bytes, Some("wav")))
        })
        .collect();
    let results: Vec<ScoreResponse> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results[0], results[1]);
    assert!(results[0].scores().is_some());
}

#[test]
fn loads_checkpoint_trained_with_custom_widths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("regression.safetensors");
    let config = ModelConfig {
        lstm_hidden: 64,
        ..ModelConfig::default()
    };
    AcousticModel::new(config.clone(), HeadSpec::Regression, &Device::Cpu)
        .unwrap()
        .save(&path)
        .unwrap();

    let adapter = InferenceAdapter::load(&path, &Device::Cpu).expect("widths come from the sidecar");
    assert_eq!(adapter.model().config(), &config);
    let response = adapter.score_bytes(wav_bytes(1.0, 16_000), Some("wav"));
    assert!(response.scores().is_some());

    let err = InferenceAdapter::load_with_config(&path, ModelConfig::default(), &Device::Cpu)
        .err()
        .unwrap();
    assert!(matches!(err, ScoringError::ShapeMismatch { .. }));
}
