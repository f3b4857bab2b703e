//! Append-only CSV log of analyzed clips, used to grow the rating dataset.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::DATASET_VERSION;
use crate::error::{Result, ScoringError};
use crate::features::FeatureRecord;

/// `sp_` followed by 12 lowercase hex characters.
pub fn generate_sample_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("sp_{}", &hex[..12])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub sample_id: String,
    pub transcript: String,
    pub duration: f64,
    pub rms_mean: f64,
    pub rms_variance: f64,
    pub zero_crossing_rate: f64,
    pub spectral_centroid: f64,
    pub speaking_rate: f64,
    pub pause_ratio: f64,
    pub pitch_mean: f64,
    pub pitch_variance: f64,
    pub filler_count: u32,
    pub dataset_version: String,
    pub created_at: String,
}

impl MetadataRow {
    /// Row stamped with the current UTC time and the default dataset version.
    pub fn new(
        sample_id: impl Into<String>,
        transcript: impl Into<String>,
        features: &FeatureRecord,
    ) -> Self {
        Self {
            sample_id: sample_id.into(),
            transcript: transcript.into(),
            duration: features.duration,
            rms_mean: features.rms_mean,
            rms_variance: features.rms_variance,
            zero_crossing_rate: features.zero_crossing_rate,
            spectral_centroid: features.spectral_centroid,
            speaking_rate: features.speaking_rate,
            pause_ratio: features.pause_ratio,
            pitch_mean: features.pitch_mean,
            pitch_variance: features.pitch_variance,
            filler_count: features.filler_count,
            dataset_version: DATASET_VERSION.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataLog {
    path: PathBuf,
}

impl MetadataLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first when the file is new.
    pub fn append(&self, row: &MetadataRow) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                ScoringError::persistence("creating metadata directory", parent, err)
            })?;
        }
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| ScoringError::persistence("opening metadata log", &self.path, err))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(row).map_err(|err| self.csv_error(err))?;
        writer
            .flush()
            .map_err(|err| ScoringError::persistence("writing metadata log", &self.path, err))?;
        debug!(path = %self.path.display(), sample_id = %row.sample_id, "metadata row appended");
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<MetadataRow>> {
        let mut reader = csv::Reader::from_path(&self.path).map_err(|err| self.csv_error(err))?;
        reader
            .deserialize()
            .map(|row| {
                row.map_err(|err| ScoringError::dataset(format!("{}: {err}", self.path.display())))
            })
            .collect()
    }

    fn csv_error(&self, err: csv::Error) -> ScoringError {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => {
                ScoringError::persistence("accessing metadata log", &self.path, io)
            }
            other => ScoringError::dataset(format!("{}: {other:?}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> FeatureRecord {
        FeatureRecord {
            duration: 5.0,
            rms_mean: 0.1,
            rms_variance: 0.01,
            zero_crossing_rate: 0.05,
            spectral_centroid: 900.0,
            speaking_rate: 2.0,
            pause_ratio: 0.3,
            pitch_mean: 180.0,
            pitch_variance: 40.0,
            filler_count: 2,
            mfcc_means: [0.0; crate::config::MFCC_COUNT],
        }
    }

    #[test]
    fn sample_ids_have_fixed_shape() {
        let id = generate_sample_id();
        assert_eq!(id.len(), 15);
        assert!(id.starts_with("sp_"));
        assert!(id[3..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, generate_sample_id());
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = MetadataLog::new(dir.path().join("smartprep/metadata.csv"));
        log.append(&MetadataRow::new("sp_a", "um hello", &features()))
            .unwrap();
        log.append(&MetadataRow::new("sp_b", "hello again", &features()))
            .unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.matches("sample_id").count(), 1);
        assert!(text.starts_with("sample_id,transcript,duration"));

        let rows = log.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].sample_id, "sp_b");
        assert_eq!(rows[0].dataset_version, DATASET_VERSION);
        assert!(rows[0].created_at.ends_with('Z'));
    }
}
