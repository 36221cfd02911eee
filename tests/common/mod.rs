mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from statread for tests
pub use statread::{
    Corpus, DigitRecognizer, FeatureSize, KnnModel, OcrError, RecognizerConfig, Roi, StatValue,
    TrainingConfig,
};
