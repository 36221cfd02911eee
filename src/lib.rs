pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod recognition;
pub mod training;

pub use classifier::KnnModel;
pub use config::{DecimalAllowList, PreprocessParams, RecognizerConfig, RoiEntry, ScreenLayout};
pub use error::{OcrError, Result};
pub use models::{BoundingBox, Candidate, Contour, Roi};
pub use recognition::{
    DebugArtifacts, DigitRecognizer, FeatureSize, PreprocessResult, Recognition, StatReading,
    StatValue,
};
pub use training::{Corpus, TrainingConfig};
