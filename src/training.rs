//! Offline training: labelled sample folders in, model archive out.
//!
//! Corpus layout on disk is one sub-directory per digit (`0` .. `9`), each
//! holding PNG crops of that digit as segmented by the recognizer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::GrayImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::classifier::{DEFAULT_K, KnnModel};
use crate::error::{OcrError, Result};
use crate::recognition::features::{self, FeatureSize};

/// Labelled digit samples, keyed by digit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    samples: BTreeMap<u8, Vec<GrayImage>>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: u8, image: GrayImage) -> Result<()> {
        if label > 9 {
            return Err(OcrError::Training(format!("label {} is not a digit", label)));
        }
        self.samples.entry(label).or_default().push(image);
        Ok(())
    }

    pub fn samples(&self, label: u8) -> &[GrayImage] {
        self.samples.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn labels(&self) -> impl Iterator<Item = u8> + '_ {
        self.samples.keys().copied()
    }

    pub fn counts(&self) -> BTreeMap<u8, usize> {
        self.samples.iter().map(|(&l, s)| (l, s.len())).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest per-label sample count, `None` for an empty corpus.
    pub fn min_count(&self) -> Option<usize> {
        self.samples.values().map(Vec::len).min()
    }

    /// Read `<dir>/<digit>/*.png`. Directories that are not a single digit are
    /// ignored; unreadable images are skipped with a warning.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut corpus = Corpus::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(label) = path.file_name().and_then(|n| n.to_str()).and_then(digit_label)
            else {
                continue;
            };

            let mut files: Vec<PathBuf> = std::fs::read_dir(&path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("png"))
                .collect();
            // Directory order is platform dependent; sort so seeded runs repeat.
            files.sort();

            let samples = corpus.samples.entry(label).or_default();
            for file in files {
                match image::open(&file) {
                    Ok(img) => samples.push(img.to_luma8()),
                    Err(e) => warn!(path = %file.display(), error = %e, "skipping unreadable sample"),
                }
            }
        }

        if corpus.samples.is_empty() {
            return Err(OcrError::Training(format!(
                "no digit directories found in {}",
                dir.display()
            )));
        }

        for (label, count) in corpus.counts() {
            info!(label, count, "corpus samples");
        }
        Ok(corpus)
    }

    /// Write one labelled sample as `<dir>/<label>/<unix-ts>-<n>.png`.
    pub fn save_sample<P: AsRef<Path>>(dir: P, label: u8, image: &GrayImage) -> Result<PathBuf> {
        if label > 9 {
            return Err(OcrError::Training(format!("label {} is not a digit", label)));
        }
        let label_dir = dir.as_ref().join(label.to_string());
        std::fs::create_dir_all(&label_dir)?;

        let stamp = OffsetDateTime::now_utc().unix_timestamp();
        let path = (0u32..)
            .map(|n| label_dir.join(format!("{}-{:03}.png", stamp, n)))
            .find(|p| !p.exists())
            .ok_or_else(|| OcrError::Training("no free sample file name".into()))?;

        image.save(&path)?;
        Ok(path)
    }

    /// Randomly drop samples so every label keeps exactly the minority count.
    pub fn undersample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Corpus> {
        let target = self
            .min_count()
            .ok_or_else(|| OcrError::Training("corpus is empty".into()))?;
        if target == 0 {
            let empty: Vec<u8> = self
                .samples
                .iter()
                .filter(|(_, s)| s.is_empty())
                .map(|(&l, _)| l)
                .collect();
            return Err(OcrError::Training(format!("labels {:?} have no samples", empty)));
        }

        let samples: BTreeMap<u8, Vec<GrayImage>> = self
            .samples
            .iter()
            .map(|(&label, images)| {
                let kept: Vec<GrayImage> =
                    images.choose_multiple(&mut *rng, target).cloned().collect();
                (label, kept)
            })
            .collect();
        Ok(Corpus { samples })
    }
}

/// A label directory is named by exactly one ASCII digit.
fn digit_label(name: &str) -> Option<u8> {
    match name.as_bytes() {
        [b @ b'0'..=b'9'] => Some(b - b'0'),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub feature_size: FeatureSize,
    pub k: usize,
    /// Fixed RNG seed for reproducible undersampling
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            feature_size: FeatureSize::default(),
            k: DEFAULT_K,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_feature_size(mut self, size: FeatureSize) -> Self {
        self.feature_size = size;
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Encode every sample of an (already balanced) corpus.
pub fn encode_corpus(corpus: &Corpus, size: FeatureSize) -> Vec<(u8, Vec<f32>)> {
    corpus
        .samples
        .iter()
        .flat_map(|(&label, images)| {
            images
                .iter()
                .map(move |img| (label, features::encode(img, size)))
        })
        .collect()
}

/// Balance, encode and fit.
pub fn train(corpus: &Corpus, config: &TrainingConfig) -> Result<KnnModel> {
    let balanced = corpus.undersample(&mut config.rng())?;
    info!(
        per_label = balanced.min_count().unwrap_or(0),
        labels = balanced.samples.len(),
        total = balanced.len(),
        "balanced corpus"
    );

    let encoded = encode_corpus(&balanced, config.feature_size);
    KnnModel::fit(encoded, config.feature_size, config.k)
}

/// Train from a corpus directory and write the model archive to `model_path`.
pub fn train_from_dir<P: AsRef<Path>, Q: AsRef<Path>>(
    corpus_dir: P,
    model_path: Q,
    config: &TrainingConfig,
) -> Result<KnnModel> {
    let corpus = Corpus::load(corpus_dir)?;
    let model = train(&corpus, config)?;
    model.save(model_path)?;
    Ok(model)
}
