use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use speakscore::audio::{decoder, encoder, window};
use speakscore::cli::{
    AnalyzeArgs, Cli, Command, FeaturesArgs, ModelArgs, ScoreArgs, TrainArgs, WindowArgs,
};
use speakscore::config::{ArtifactConfig, TrainingConfig};
use speakscore::dataset::{generate_sample_id, MetadataLog, MetadataRow};
use speakscore::pipeline::{AnalysisResponse, ClipAnalyzer, FixedTranscript};
use speakscore::training::datasets::{DomainCorpus, EmotionCorpus, ExampleSource, RatedCorpus};
use speakscore::training::{select_device, Stage, Trainer};
use speakscore::{FeatureExtractor, InferenceAdapter, ScoreResponse};

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Features(args) => run_features(args),
        Command::Score(args) => run_score(args),
        Command::Analyze(args) => run_analyze(args),
        Command::Window(args) => run_window(args),
        Command::Train(args) => run_train(args),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

fn load_adapter(args: &ModelArgs) -> Result<InferenceAdapter> {
    let checkpoint = match &args.checkpoint {
        Some(path) => path.clone(),
        None => ArtifactConfig::from_override(args.models_dir.clone())?
            .checkpoint_path(Stage::FrozenRegression.checkpoint_name()),
    };
    let device = select_device(&args.device)?;
    InferenceAdapter::load(&checkpoint, &device)
        .with_context(|| format!("Failed to load regression checkpoint {:?}", checkpoint))
}

fn run_features(args: FeaturesArgs) -> Result<ExitCode> {
    let waveform = decoder::decode_file(&args.input)
        .with_context(|| format!("Failed to decode {:?}", args.input))?;
    let transcript = args.transcript.transcript.unwrap_or_default();
    let features = FeatureExtractor::new().extract(&waveform, Some(&transcript))?;
    let sample_id = generate_sample_id();
    if let Some(path) = args.transcript.metadata {
        MetadataLog::new(path)
            .append(&MetadataRow::new(&sample_id, &transcript, &features))
            .context("Failed to append metadata row")?;
    }
    print_json(&json!({ "sample_id": sample_id, "features": features }))?;
    Ok(ExitCode::SUCCESS)
}

fn run_score(args: ScoreArgs) -> Result<ExitCode> {
    let adapter = load_adapter(&args.model)?;
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {:?}", args.input))?;
    let response = adapter.score_bytes(bytes, extension(&args.input));
    print_json(&response)?;
    Ok(match response {
        ScoreResponse::Scores(_) => ExitCode::SUCCESS,
        ScoreResponse::Failure { .. } => ExitCode::FAILURE,
    })
}

fn run_analyze(args: AnalyzeArgs) -> Result<ExitCode> {
    let adapter = load_adapter(&args.model)?;
    let transcriber = FixedTranscript(args.transcript.transcript.unwrap_or_default());
    let mut analyzer = ClipAnalyzer::new(adapter, Box::new(transcriber));
    if let Some(path) = args.transcript.metadata {
        analyzer = analyzer.with_metadata(MetadataLog::new(path));
    }
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {:?}", args.input))?;
    let response = analyzer.analyze(bytes, extension(&args.input));
    print_json(&response)?;
    Ok(match response {
        AnalysisResponse::Complete(_) => ExitCode::SUCCESS,
        AnalysisResponse::Failure { .. } => ExitCode::FAILURE,
    })
}

fn run_window(args: WindowArgs) -> Result<ExitCode> {
    let waveform = decoder::decode_file(&args.input)
        .with_context(|| format!("Failed to decode {:?}", args.input))?;
    let clip = window::fix_window(&waveform)?;
    encoder::write_window_wav(&clip, &args.output)
        .with_context(|| format!("Failed to write {:?}", args.output))?;
    print_json(&json!({
        "output": args.output,
        "samples": clip.len(),
        "sample_rate": clip.sample_rate(),
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn run_train(args: TrainArgs) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::load(path).context("Failed to load training config")?,
        None => TrainingConfig::default(),
    };
    if let Some(device) = args.device {
        config.device = device;
    }
    let artifacts = ArtifactConfig::from_override(args.models_dir)?;
    let stage = Stage::from(args.stage);
    info!(?stage, data = %args.data.display(), "preparing training corpus");

    let source: Box<dyn ExampleSource> = match stage {
        Stage::EmotionPretrain => Box::new(EmotionCorpus::discover(&args.data)?),
        Stage::DomainAdapt => Box::new(DomainCorpus::discover(
            &args.data,
            config.domain_max_samples,
            config.domain_noise_std,
            config.seed,
        )?),
        Stage::FrozenRegression => Box::new(RatedCorpus::from_csv(&args.data)?),
    };
    let trainer = Trainer::new(config, artifacts)?;
    let summary = trainer
        .run(stage, source.as_ref())
        .with_context(|| format!("Training stage {:?} failed", stage))?;
    print_json(&summary)?;
    Ok(ExitCode::SUCCESS)
}
