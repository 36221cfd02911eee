//! k-nearest-neighbour digit classifier.
//!
//! The model is the reference set itself: labelled feature vectors plus the
//! canonical size they were encoded at. It is immutable once built or loaded
//! and can be shared across threads behind an `Arc`.
//!
//! On disk a model is a zstd-compressed tar archive holding two JSON entries:
//! `model.json` (header) and `samples.json` (labels and feature vectors).

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, Header};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

use crate::error::{OcrError, Result};
use crate::recognition::features::FeatureSize;

pub const MODEL_SCHEMA_V1: &str = "statread.knn.v1";
pub const DEFAULT_K: usize = 5;

const HEADER_ENTRY: &str = "model.json";
const SAMPLES_ENTRY: &str = "samples.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelHeader {
    schema_version: String,
    k: usize,
    feature_width: u32,
    feature_height: u32,
    sample_count: usize,
    created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SampleSet {
    labels: Vec<u8>,
    features: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnModel {
    k: usize,
    feature_size: FeatureSize,
    labels: Vec<u8>,
    samples: Vec<Vec<f32>>,
}

impl KnnModel {
    /// Build a model from labelled feature vectors.
    pub fn fit(samples: Vec<(u8, Vec<f32>)>, feature_size: FeatureSize, k: usize) -> Result<Self> {
        if samples.is_empty() {
            return Err(OcrError::Training("no training samples".into()));
        }
        if k == 0 {
            return Err(OcrError::Training("k must be at least 1".into()));
        }

        let (labels, samples): (Vec<u8>, Vec<Vec<f32>>) = samples.into_iter().unzip();
        let model = Self {
            k,
            feature_size,
            labels,
            samples,
        };
        model.check_consistency().map_err(OcrError::Training)?;
        Ok(model)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn feature_size(&self) -> FeatureSize {
        self.feature_size
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Classify one feature vector by majority vote of its `k` nearest
    /// reference samples (squared Euclidean distance). Ties go to the lowest
    /// digit.
    pub fn predict(&self, features: &[f32]) -> Result<u8> {
        if self.samples.is_empty() {
            return Err(OcrError::Classification("model has no reference samples".into()));
        }
        if features.len() != self.feature_size.len() {
            return Err(OcrError::Classification(format!(
                "feature vector has {} values, model expects {} ({})",
                features.len(),
                self.feature_size.len(),
                self.feature_size
            )));
        }

        let mut neighbours: Vec<(f32, u8)> = self
            .samples
            .iter()
            .zip(&self.labels)
            .map(|(sample, &label)| (squared_distance(sample, features), label))
            .collect();

        if neighbours.iter().any(|(d, _)| !d.is_finite()) {
            return Err(OcrError::Classification("non-finite distance".into()));
        }
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut votes = [0usize; 10];
        for &(_, label) in neighbours.iter().take(self.k) {
            let slot = votes.get_mut(label as usize).ok_or_else(|| {
                OcrError::Classification(format!("reference label {} is not a digit", label))
            })?;
            *slot += 1;
        }

        let (digit, _) = votes
            .iter()
            .enumerate()
            .fold((0usize, 0usize), |best, (digit, &count)| {
                if count > best.1 { (digit, count) } else { best }
            });
        Ok(digit as u8)
    }

    /// Write the model archive, creating parent directories as needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let header = ModelHeader {
            schema_version: MODEL_SCHEMA_V1.to_string(),
            k: self.k,
            feature_width: self.feature_size.width,
            feature_height: self.feature_size.height,
            sample_count: self.labels.len(),
            created_at,
        };
        let samples = SampleSet {
            labels: self.labels.clone(),
            features: self.samples.clone(),
        };

        let out = File::create(path)?;
        let encoder = ZstdEncoder::new(out, 3)?;
        let mut tar = Builder::new(encoder);
        append_json(&mut tar, HEADER_ENTRY, &header)?;
        append_json(&mut tar, SAMPLES_ENTRY, &samples)?;
        let encoder = tar.into_inner()?;
        encoder.finish()?;

        info!(path = %path.display(), samples = self.labels.len(), k = self.k, "saved model");
        Ok(())
    }

    /// Load a model archive and check it was built for `expected` features.
    pub fn load<P: AsRef<Path>>(path: P, expected: FeatureSize) -> Result<Self> {
        let path = path.as_ref();
        let (header, samples) =
            read_archive(path).map_err(|e| OcrError::model_load(path, format!("{:#}", e)))?;

        if header.schema_version != MODEL_SCHEMA_V1 {
            return Err(OcrError::model_load(
                path,
                format!("unsupported schema '{}'", header.schema_version),
            ));
        }
        if header.sample_count != samples.labels.len() {
            return Err(OcrError::model_load(
                path,
                format!(
                    "header declares {} samples, archive holds {}",
                    header.sample_count,
                    samples.labels.len()
                ),
            ));
        }

        let feature_size = FeatureSize::new(header.feature_width, header.feature_height);
        if feature_size != expected {
            return Err(OcrError::model_load(
                path,
                format!(
                    "model was trained on {} features, pipeline uses {}",
                    feature_size, expected
                ),
            ));
        }

        let model = Self {
            k: header.k,
            feature_size,
            labels: samples.labels,
            samples: samples.features,
        };
        model
            .check_consistency()
            .map_err(|reason| OcrError::model_load(path, reason))?;

        debug!(path = %path.display(), samples = model.len(), k = model.k, "loaded model");
        Ok(model)
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        if self.k == 0 {
            return Err("k must be at least 1".into());
        }
        if self.labels.is_empty() {
            return Err("model has no samples".into());
        }
        if self.labels.len() != self.samples.len() {
            return Err(format!(
                "{} labels for {} samples",
                self.labels.len(),
                self.samples.len()
            ));
        }
        if let Some(label) = self.labels.iter().find(|&&l| l > 9) {
            return Err(format!("label {} is not a digit", label));
        }
        let expected = self.feature_size.len();
        if let Some((i, s)) = self
            .samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != expected)
        {
            return Err(format!(
                "sample {} has {} values, expected {}",
                i,
                s.len(),
                expected
            ));
        }
        Ok(())
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn append_json<W: std::io::Write, T: Serialize>(
    tar: &mut Builder<W>,
    name: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append_data(&mut header, name, bytes.as_slice())?;
    Ok(())
}

fn read_archive(path: &Path) -> anyhow::Result<(ModelHeader, SampleSet)> {
    let file = File::open(path).context("cannot open model file")?;
    if file.metadata()?.len() == 0 {
        bail!("model file is empty");
    }

    let decoder = ZstdDecoder::new(file).context("not a zstd stream")?;
    let mut archive = Archive::new(decoder);

    let mut header: Option<ModelHeader> = None;
    let mut samples: Option<SampleSet> = None;

    for entry in archive.entries().context("not a tar archive")? {
        let mut entry = entry.context("corrupt archive entry")?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .with_context(|| format!("failed to read {}", name))?;

        match name.as_str() {
            HEADER_ENTRY => {
                header = Some(serde_json::from_str(&text).context("malformed model header")?)
            }
            SAMPLES_ENTRY => {
                samples = Some(serde_json::from_str(&text).context("malformed sample set")?)
            }
            _ => {}
        }
    }

    match (header, samples) {
        (Some(h), Some(s)) => Ok((h, s)),
        (None, _) => bail!("archive has no {}", HEADER_ENTRY),
        (_, None) => bail!("archive has no {}", SAMPLES_ENTRY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: FeatureSize = FeatureSize::new(2, 2);

    fn clustered() -> Vec<(u8, Vec<f32>)> {
        let mut samples = Vec::new();
        for digit in 0..10u8 {
            let base = digit as f32 * 20.0;
            for jitter in 0..5 {
                let j = jitter as f32;
                samples.push((digit, vec![base + j, base, base + 1.0, base - j * 0.5]));
            }
        }
        samples
    }

    #[test]
    fn predicts_nearest_cluster() {
        let model = KnnModel::fit(clustered(), SIZE, DEFAULT_K).unwrap();
        assert_eq!(model.len(), 50);
        assert_eq!(model.predict(&[61.0, 60.0, 61.0, 59.0]).unwrap(), 3);
        assert_eq!(model.predict(&[178.0, 180.0, 181.0, 180.0]).unwrap(), 9);
    }

    #[test]
    fn training_samples_classify_as_their_own_label() {
        let samples = clustered();
        let model = KnnModel::fit(samples.clone(), SIZE, DEFAULT_K).unwrap();
        for (label, features) in &samples {
            assert_eq!(model.predict(features).unwrap(), *label);
        }
    }

    #[test]
    fn ties_go_to_lowest_digit() {
        let samples = vec![
            (7, vec![0.0, 0.0, 0.0, 0.0]),
            (2, vec![10.0, 0.0, 0.0, 0.0]),
        ];
        let model = KnnModel::fit(samples, SIZE, 2).unwrap();
        assert_eq!(model.predict(&[5.0, 0.0, 0.0, 0.0]).unwrap(), 2);
    }

    #[test]
    fn invalid_inputs_are_classification_errors() {
        let model = KnnModel::fit(clustered(), SIZE, DEFAULT_K).unwrap();
        assert!(matches!(
            model.predict(&[1.0, 2.0]),
            Err(OcrError::Classification(_))
        ));
        assert!(matches!(
            model.predict(&[f32::NAN, 0.0, 0.0, 0.0]),
            Err(OcrError::Classification(_))
        ));
    }

    #[test]
    fn fit_rejects_bad_training_sets() {
        assert!(KnnModel::fit(vec![], SIZE, 5).is_err());
        assert!(KnnModel::fit(vec![(1, vec![0.0; 3])], SIZE, 5).is_err());
        assert!(KnnModel::fit(vec![(12, vec![0.0; 4])], SIZE, 5).is_err());
        assert!(KnnModel::fit(vec![(1, vec![0.0; 4])], SIZE, 0).is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("models").join("digits.knn");

        let model = KnnModel::fit(clustered(), SIZE, DEFAULT_K).unwrap();
        model.save(&path).unwrap();
        let loaded = KnnModel::load(&path, SIZE).unwrap();

        assert_eq!(loaded, model);
        for probe in [[3.0, 1.0, 2.0, 0.0], [95.0, 99.0, 101.0, 100.0]] {
            assert_eq!(loaded.predict(&probe).unwrap(), model.predict(&probe).unwrap());
        }
    }

    #[test]
    fn load_rejects_missing_empty_corrupt_and_mismatched() {
        let dir = tempfile::TempDir::new().unwrap();

        let missing = dir.path().join("missing.knn");
        assert!(matches!(
            KnnModel::load(&missing, SIZE),
            Err(OcrError::ModelLoad { .. })
        ));

        let empty = dir.path().join("empty.knn");
        fs::write(&empty, b"").unwrap();
        assert!(matches!(
            KnnModel::load(&empty, SIZE),
            Err(OcrError::ModelLoad { .. })
        ));

        let corrupt = dir.path().join("corrupt.knn");
        fs::write(&corrupt, b"definitely not a model").unwrap();
        assert!(matches!(
            KnnModel::load(&corrupt, SIZE),
            Err(OcrError::ModelLoad { .. })
        ));

        let valid = dir.path().join("valid.knn");
        KnnModel::fit(clustered(), SIZE, DEFAULT_K)
            .unwrap()
            .save(&valid)
            .unwrap();
        let err = KnnModel::load(&valid, FeatureSize::default()).unwrap_err();
        assert!(err.to_string().contains("2x2"), "got: {}", err);
    }

    #[test]
    fn model_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KnnModel>();
    }
}
