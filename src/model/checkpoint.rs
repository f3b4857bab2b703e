use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use tracing::{info, warn};

use crate::error::{Result, ScoringError};

/// How a checkpoint's keys must relate to the target model's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Every parameter present with the same shape, and nothing extra.
    Strict,
    /// Load every key whose name and shape match; leave the rest untouched.
    Partial,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub missing: Vec<String>,
    pub mismatched: Vec<String>,
    pub unexpected: Vec<String>,
}

impl LoadReport {
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty() && self.unexpected.is_empty()
    }
}

/// A named parameter store, e.g. `("backbone", &vars)`.
pub(crate) type ParameterGroup<'a> = (&'a str, &'a VarMap);

fn qualified(group: &str, name: &str) -> String {
    format!("{group}.{name}")
}

/// Write all groups to a safetensors file, atomically replacing any previous
/// file at `path`.
pub(crate) fn save(groups: &[ParameterGroup<'_>], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|err| ScoringError::persistence("creating checkpoint directory", parent, err))?;
    }
    let mut tensors: HashMap<String, Tensor> = HashMap::new();
    for (group, vars) in groups {
        let data = vars
            .data()
            .lock()
            .map_err(|_| ScoringError::parameter_store("saving a checkpoint"))?;
        for (name, var) in data.iter() {
            tensors.insert(qualified(group, name), var.as_tensor().clone());
        }
    }

    let staging = path.with_extension("safetensors.partial");
    candle_core::safetensors::save(&tensors, &staging)?;
    std::fs::rename(&staging, path)
        .map_err(|err| ScoringError::persistence("finalizing checkpoint", path, err))?;
    info!(path = %path.display(), tensors = tensors.len(), "checkpoint saved");
    Ok(())
}

pub(crate) fn load(
    groups: &[ParameterGroup<'_>],
    path: &Path,
    policy: LoadPolicy,
    device: &Device,
) -> Result<LoadReport> {
    if !path.is_file() {
        return Err(ScoringError::persistence(
            "opening checkpoint",
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "checkpoint file not found"),
        ));
    }
    let mut stored = candle_core::safetensors::load(path, device)?;

    let mut report = LoadReport::default();
    let mut assignments = Vec::new();
    let mut first_mismatch = None;
    for (group, vars) in groups {
        let data = vars
            .data()
            .lock()
            .map_err(|_| ScoringError::parameter_store("loading a checkpoint"))?;
        for (name, var) in data.iter() {
            let key = qualified(group, name);
            match stored.remove(&key) {
                Some(tensor) if tensor.dims() == var.dims() => {
                    assignments.push((var.clone(), tensor));
                    report.loaded.push(key);
                }
                Some(tensor) => {
                    if first_mismatch.is_none() {
                        first_mismatch = Some(ScoringError::shape_mismatch(
                            &key,
                            var.dims(),
                            tensor.dims(),
                        ));
                    }
                    report.mismatched.push(key);
                }
                None => report.missing.push(key),
            }
        }
    }
    report.unexpected = stored.into_keys().collect();
    report.loaded.sort();
    report.missing.sort();
    report.mismatched.sort();
    report.unexpected.sort();

    if policy == LoadPolicy::Strict && !report.is_exact() {
        if let Some(err) = first_mismatch {
            return Err(err);
        }
        return Err(ScoringError::IncompatibleCheckpoint {
            path: path.to_path_buf(),
            reason: format!(
                "missing keys {:?}, unexpected keys {:?}",
                report.missing, report.unexpected
            ),
        });
    }

    for (var, tensor) in assignments {
        var.set(&tensor)?;
    }

    if !report.is_exact() {
        warn!(
            path = %path.display(),
            missing = report.missing.len(),
            mismatched = report.mismatched.len(),
            unexpected = report.unexpected.len(),
            "partial checkpoint load skipped incompatible parameters"
        );
    }
    info!(
        path = %path.display(),
        loaded = report.loaded.len(),
        ?policy,
        "checkpoint loaded"
    );
    Ok(report)
}
