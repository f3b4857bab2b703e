use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::training::Stage;

#[derive(Parser, Debug)]
#[command(
    name = "speakscore",
    version,
    about = "Speech confidence and clarity scoring from short audio clips"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print acoustic, prosodic and transcript features as JSON.
    Features(FeaturesArgs),
    /// Score a clip with a trained regression checkpoint.
    Score(ScoreArgs),
    /// Features, transcript and scores in one response.
    Analyze(AnalyzeArgs),
    /// Write the normalized 16 kHz, 5 s analysis window as WAV.
    Window(WindowArgs),
    /// Run one transfer-learning stage.
    Train(TrainArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TranscriptArgs {
    /// Transcript of the clip, used for speaking rate and filler counts.
    #[arg(long)]
    pub transcript: Option<String>,
    /// Append a metadata row for the clip to this CSV file.
    #[arg(long, value_name = "CSV")]
    pub metadata: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Regression checkpoint; defaults to `regression.safetensors` in the
    /// models directory.
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,
    /// Models directory (overrides SPEAKSCORE_MODELS_DIR).
    #[arg(long = "models-dir", value_name = "DIR")]
    pub models_dir: Option<PathBuf>,
    /// Compute device: cpu, cuda or metal.
    #[arg(long, default_value = "cpu")]
    pub device: String,
}

#[derive(Args, Debug, Clone)]
pub struct FeaturesArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    #[command(flatten)]
    pub transcript: TranscriptArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    #[command(flatten)]
    pub model: ModelArgs,
    #[command(flatten)]
    pub transcript: TranscriptArgs,
}

#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Emotion,
    Domain,
    Regression,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Emotion => Stage::EmotionPretrain,
            StageArg::Domain => Stage::DomainAdapt,
            StageArg::Regression => Stage::FrozenRegression,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    #[arg(value_enum)]
    pub stage: StageArg,
    /// Corpus root (emotion, domain) or rating CSV (regression).
    #[arg(long, value_name = "PATH")]
    pub data: PathBuf,
    /// JSON training configuration; omitted fields keep their defaults.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,
    #[arg(long = "models-dir", value_name = "DIR")]
    pub models_dir: Option<PathBuf>,
    /// Overrides the device named in the training configuration.
    #[arg(long)]
    pub device: Option<String>,
}
