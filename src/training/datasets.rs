//! Labelled spectrogram sources for the three training stages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::info;
use walkdir::WalkDir;

use crate::audio::{decoder, window};
use crate::error::{Result, ScoringError};
use crate::features::{MelSpectrogram, SpectralTransform};
use crate::types::{normalize_rating, FixedWindow};

pub const EMOTION_CLASSES: usize = 8;
pub const DOMAIN_CLASSES: usize = 2;

/// Training target attached to one spectrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Class(u32),
    /// Ratings already normalized to [0, 1].
    Rating { confidence: f32, clarity: f32 },
}

#[derive(Debug, Clone)]
pub struct Example {
    pub mel: MelSpectrogram,
    pub target: Target,
}

/// Random-access collection of examples. Implementations may load lazily.
pub trait ExampleSource {
    fn len(&self) -> usize;

    fn example(&self, index: usize) -> Result<Example>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExampleSource for Vec<Example> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn example(&self, index: usize) -> Result<Example> {
        self.get(index)
            .cloned()
            .ok_or_else(|| ScoringError::dataset(format!("example index {index} out of range")))
    }
}

fn clip_window(path: &Path) -> Result<FixedWindow> {
    let waveform = decoder::decode_file(path)?;
    window::fix_window(&waveform)
}

fn walk_error(root: &Path, err: walkdir::Error) -> ScoringError {
    ScoringError::dataset(format!("walking {}: {err}", root.display()))
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

/// Emotion id from a RAVDESS-style name such as `03-01-05-01-02-01-12.wav`,
/// mapped from `01..08` to `0..7`.
pub fn emotion_label(file_name: &str) -> Option<u32> {
    let code = file_name.split('-').nth(2)?;
    match code.parse::<u32>() {
        Ok(id @ 1..=8) if code.len() == 2 => Some(id - 1),
        _ => None,
    }
}

/// Acted emotional speech laid out as `root/Actor_*/*.wav`.
#[derive(Debug, Clone)]
pub struct EmotionCorpus {
    entries: Vec<(PathBuf, u32)>,
    transform: SpectralTransform,
}

impl EmotionCorpus {
    pub fn discover(root: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(root).min_depth(2).max_depth(2).sort_by_file_name() {
            let entry = entry.map_err(|err| walk_error(root, err))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !has_extension(path, &["wav"]) {
                continue;
            }
            let in_actor_dir = path
                .parent()
                .and_then(|dir| dir.file_name())
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("Actor_"))
                .unwrap_or(false);
            if !in_actor_dir {
                continue;
            }
            let label = entry.file_name().to_str().and_then(emotion_label);
            if let Some(label) = label {
                entries.push((path.to_path_buf(), label));
            }
        }
        if entries.is_empty() {
            return Err(ScoringError::dataset(format!(
                "no labelled Actor_*/*.wav clips under {}",
                root.display()
            )));
        }
        info!(root = %root.display(), clips = entries.len(), "emotion corpus discovered");
        Ok(Self {
            entries,
            transform: SpectralTransform::new(),
        })
    }
}

impl ExampleSource for EmotionCorpus {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn example(&self, index: usize) -> Result<Example> {
        let (path, label) = self
            .entries
            .get(index)
            .ok_or_else(|| ScoringError::dataset(format!("example index {index} out of range")))?;
        let mel = self.transform.transform(&clip_window(path)?)?;
        Ok(Example {
            mel,
            target: Target::Class(*label),
        })
    }
}

/// Clean (`0`) versus noise-degraded (`1`) speech built from any directory of
/// `.flac`/`.wav` files. Labels and noise are fixed by the seed.
#[derive(Debug, Clone)]
pub struct DomainCorpus {
    entries: Vec<(PathBuf, bool)>,
    noise_std: f32,
    seed: u64,
    transform: SpectralTransform,
}

impl DomainCorpus {
    pub fn discover(root: &Path, max_samples: usize, noise_std: f32, seed: u64) -> Result<Self> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|err| walk_error(root, err))?;
            if entry.file_type().is_file() && has_extension(entry.path(), &["flac", "wav"]) {
                files.push(entry.into_path());
            }
        }
        if files.is_empty() {
            return Err(ScoringError::dataset(format!(
                "no .flac or .wav files under {}",
                root.display()
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        files.shuffle(&mut rng);
        files.truncate(max_samples);
        let entries: Vec<(PathBuf, bool)> = files
            .into_iter()
            .map(|path| (path, rng.gen_bool(0.5)))
            .collect();
        let degraded = entries.iter().filter(|(_, d)| *d).count();
        info!(
            root = %root.display(),
            clips = entries.len(),
            degraded,
            "domain corpus discovered"
        );
        Ok(Self {
            entries,
            noise_std,
            seed,
            transform: SpectralTransform::new(),
        })
    }
}

impl ExampleSource for DomainCorpus {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn example(&self, index: usize) -> Result<Example> {
        let (path, degraded) = self
            .entries
            .get(index)
            .ok_or_else(|| ScoringError::dataset(format!("example index {index} out of range")))?;
        let mut clip = clip_window(path)?;
        if *degraded {
            clip = add_gaussian_noise(&clip, self.noise_std, self.seed ^ index as u64);
        }
        Ok(Example {
            mel: self.transform.transform(&clip)?,
            target: Target::Class(u32::from(*degraded)),
        })
    }
}

/// Add zero-mean Gaussian noise (Box-Muller) to every sample.
pub fn add_gaussian_noise(window: &FixedWindow, std: f32, seed: u64) -> FixedWindow {
    let mut rng = StdRng::seed_from_u64(seed);
    let samples: Vec<f32> = window
        .samples()
        .iter()
        .map(|&s| {
            let u1: f32 = rng.gen_range(0.0001_f32..1.0_f32);
            let u2: f32 = rng.gen_range(0.0_f32..1.0_f32);
            let z = (-2.0_f32 * u1.ln()).sqrt() * (2.0_f32 * std::f32::consts::PI * u2).cos();
            s + std * z
        })
        .collect();
    FixedWindow {
        samples: Arc::from(samples),
        sample_rate: window.sample_rate(),
    }
}

#[derive(Debug, Deserialize)]
struct RatingRow {
    audio_path: PathBuf,
    confidence_label: f32,
    clarity_label: f32,
}

/// Human-rated clips listed in a CSV with `audio_path, confidence_label,
/// clarity_label` columns. Ratings are on the 1-5 scale; relative paths are
/// resolved against the CSV's directory.
#[derive(Debug, Clone)]
pub struct RatedCorpus {
    entries: Vec<(PathBuf, Target)>,
    transform: SpectralTransform,
}

impl RatedCorpus {
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|err| csv_error(path, err))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let mut entries = Vec::new();
        for (line, row) in reader.deserialize::<RatingRow>().enumerate() {
            let row = row.map_err(|err| csv_error(path, err))?;
            for (column, rating) in [
                ("confidence_label", row.confidence_label),
                ("clarity_label", row.clarity_label),
            ] {
                if !(1.0..=5.0).contains(&rating) {
                    return Err(ScoringError::dataset(format!(
                        "{}: row {} has {column} {rating} outside 1-5",
                        path.display(),
                        line + 1
                    )));
                }
            }
            let audio = if row.audio_path.is_absolute() {
                row.audio_path
            } else {
                base.join(row.audio_path)
            };
            entries.push((
                audio,
                Target::Rating {
                    confidence: normalize_rating(row.confidence_label),
                    clarity: normalize_rating(row.clarity_label),
                },
            ));
        }
        if entries.is_empty() {
            return Err(ScoringError::dataset(format!(
                "{} contains no rated clips",
                path.display()
            )));
        }
        info!(csv = %path.display(), clips = entries.len(), "rated corpus loaded");
        Ok(Self {
            entries,
            transform: SpectralTransform::new(),
        })
    }
}

impl ExampleSource for RatedCorpus {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn example(&self, index: usize) -> Result<Example> {
        let (path, target) = self
            .entries
            .get(index)
            .ok_or_else(|| ScoringError::dataset(format!("example index {index} out of range")))?;
        Ok(Example {
            mel: self.transform.transform(&clip_window(path)?)?,
            target: *target,
        })
    }
}

fn csv_error(path: &Path, err: csv::Error) -> ScoringError {
    if !err.is_io_error() {
        return ScoringError::dataset(format!("{}: {err}", path.display()));
    }
    match err.into_kind() {
        csv::ErrorKind::Io(io) => ScoringError::persistence("reading rating csv", path, io),
        _ => ScoringError::dataset(format!("{}: unreadable csv", path.display())),
    }
}
