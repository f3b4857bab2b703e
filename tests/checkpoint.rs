use anyhow::Result;
use candle_core::{Device, Tensor};
use speakscore::config::ModelConfig;
use speakscore::{AcousticModel, HeadSpec, LoadPolicy, ScoringError};

fn small_config() -> ModelConfig {
    ModelConfig {
        n_mels: 16,
        time_steps: 10,
        conv_channels: [4, 6, 8],
        pool_factors: [2, 2, 1],
        lstm_hidden: 5,
        regression_hidden: 7,
        dropout: 0.3,
    }
}

fn model(head: HeadSpec) -> AcousticModel {
    AcousticModel::new(small_config(), head, &Device::Cpu).expect("model builds")
}

fn batch(size: usize) -> Tensor {
    Tensor::randn(0f32, 1.0, (size, 1, 16, 10), &Device::Cpu).unwrap()
}

#[test]
fn partial_load_copies_backbone_and_keeps_mismatched_head() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("emotion.safetensors");
    let source = model(HeadSpec::Classification { num_classes: 8 });
    source.save(&path)?;

    let target = model(HeadSpec::Classification { num_classes: 2 });
    let head_before = target.head_parameters()?;
    let report = target.load(&path, LoadPolicy::Partial)?;

    assert_eq!(target.backbone_parameters()?, source.backbone_parameters()?);
    assert_eq!(target.head_parameters()?, head_before);
    assert_eq!(
        report.mismatched,
        vec!["head.fc.bias".to_string(), "head.fc.weight".to_string()]
    );
    assert!(report.missing.is_empty());
    assert!(!report.is_exact());
    Ok(())
}

#[test]
fn strict_load_rejects_mismatched_head_width() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("emotion.safetensors");
    model(HeadSpec::Classification { num_classes: 8 }).save(&path)?;

    let target = model(HeadSpec::Classification { num_classes: 2 });
    let before = target.backbone_parameters()?;
    let err = target.load(&path, LoadPolicy::Strict).unwrap_err();
    match err {
        ScoringError::ShapeMismatch { key, expected, found } => {
            assert!(key.starts_with("head.fc."));
            assert_eq!(expected[0], 2);
            assert_eq!(found[0], 8);
        }
        other => panic!("expected shape mismatch, got {other}"),
    }
    // A rejected strict load assigns nothing.
    assert_eq!(target.backbone_parameters()?, before);
    Ok(())
}

#[test]
fn strict_load_rejects_foreign_head_keys() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("domain.safetensors");
    model(HeadSpec::Classification { num_classes: 2 }).save(&path)?;

    let target = model(HeadSpec::Regression);
    assert!(matches!(
        target.load(&path, LoadPolicy::Strict),
        Err(ScoringError::IncompatibleCheckpoint { .. })
    ));
    Ok(())
}

#[test]
fn strict_round_trip_reproduces_outputs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("regression.safetensors");
    let original = model(HeadSpec::Regression);
    original.save(&path)?;
    assert!(!dir.path().join("regression.safetensors.partial").exists());

    let restored = model(HeadSpec::Regression);
    let report = restored.load(&path, LoadPolicy::Strict)?;
    assert!(report.is_exact());

    let xs = batch(2);
    let a = original.forward_t(&xs, false)?.flatten_all()?.to_vec1::<f32>()?;
    let b = restored.forward_t(&xs, false)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn head_swap_keeps_backbone_and_changes_output_width() -> Result<()> {
    let mut model = model(HeadSpec::Classification { num_classes: 2 });
    let xs = batch(3);
    model.forward_t(&xs, false)?;
    let backbone = model.backbone_parameters()?;

    model.swap_head(HeadSpec::Regression)?;
    assert_eq!(model.head_spec(), HeadSpec::Regression);
    assert_eq!(model.backbone_parameters()?, backbone);
    assert_eq!(model.forward_t(&xs, false)?.dims(), &[3, 2]);
    Ok(())
}

#[test]
fn frozen_forward_produces_no_backbone_gradients() -> Result<()> {
    let model = model(HeadSpec::Regression);
    let out = model.forward_frozen_backbone(&batch(2), true)?;
    let grads = out.sum_all()?.backward()?;
    for var in model.backbone_vars() {
        assert!(grads.get(var.as_tensor()).is_none());
    }
    assert!(model
        .head_vars()
        .iter()
        .any(|var| grads.get(var.as_tensor()).is_some()));
    Ok(())
}

#[test]
fn missing_checkpoint_is_reported_as_persistence_failure() {
    let dir = tempfile::tempdir().unwrap();
    let target = model(HeadSpec::Regression);
    assert!(matches!(
        target.load(&dir.path().join("nope.safetensors"), LoadPolicy::Partial),
        Err(ScoringError::Persistence { .. })
    ));
}
