use thiserror::Error;

/// Errors raised anywhere in the tuning pipeline.
///
/// Out-of-vocabulary lookups during scoring are not errors, they surface as
/// `None` from [`crate::WordVectors::get`] and end up as NaN scores.
#[derive(Debug, Error)]
pub enum TunerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not read npy file: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("could not write npy file: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid hyper parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("no word in the corpus reaches min_count {min_count}")]
    EmptyVocabulary { min_count: usize },

    #[error("could not build training thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("no trial completed, cannot pick a best parameter set")]
    NoTrials,

    #[error("token '{0}' is not in the vocabulary")]
    UnknownWord(String),

    #[error("vectors and words disagree: {rows} rows for {words} words")]
    ShapeMismatch { rows: usize, words: usize },
}

impl TunerError {
    pub fn invalid_param(name: &str, reason: impl Into<String>) -> Self {
        TunerError::InvalidParam { name: name.to_string(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, TunerError>;
