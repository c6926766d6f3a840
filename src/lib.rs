mod error;
mod space;
mod stopwords;
mod corpus;
mod analogies;
mod similarity;
mod vocab;
mod train;
mod study;
mod objective;
mod config;
mod pipeline;

pub use error::{Result, TunerError};
pub use space::{default_search_space, format_params, Distribution, ParamValue, Params, SearchSpace};
pub use stopwords::Stopwords;
pub use corpus::{Corpus, Sentence};
pub use analogies::{EvaluationSet, ANALOGY_LEN};
pub use similarity::{analogy_accuracy, cosine_similarity, predicted_vector, Embeddings, SimilarityStats, WordVectors};
pub use vocab::Vocab;
pub use train::{EmbeddingTrainer, TrainParams, Word2Vec};
pub use study::{Objective, RandomSampler, Sampler, Study, Trial, TrialState};
pub use objective::{final_evaluation, merge_params, objective_value, TuningObjective};
pub use config::{default_workers, files_handling, Config};
pub use pipeline::{Pipeline, Report};
