// imports
use crate::analogies::EvaluationSet;
use crate::config::files_handling::{self, BEST_PARAMS_FILE, TRIALS_FILE};
use crate::config::Config;
use crate::corpus::Corpus;
use crate::error::{Result, TunerError};
use crate::objective::{final_evaluation, TuningObjective};
use crate::similarity::{Embeddings, SimilarityStats};
use crate::space::{format_params, Params};
use crate::stopwords::Stopwords;
use crate::study::{RandomSampler, Study, Trial};
use crate::train::{EmbeddingTrainer, Word2Vec};

use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::info;

/// What a run found: the chosen parameters and how they do on held out analogies.
#[derive(Clone, Debug)]
pub struct Report {
    pub best_params: Params,
    pub best_value: f64,
    pub test_stats: SimilarityStats,
    pub trials: Vec<Trial>,
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "best params after {} trials: [{}]
        tuning objective: {:.3}
        test similarity over {} analogies ({} unscorable): mean {:.3}, std {:.3}",
        self.trials.len(), format_params(&self.best_params), self.best_value,
        self.test_stats.scored, self.test_stats.excluded, self.test_stats.mean, self.test_stats.std)
    }
}

pub struct Pipeline {}

impl Pipeline {

    // runs the main procedure of 4 steps -
    // -> corpus loading and stopword removal
    // -> analogy loading and splitting
    // -> hyper parameter search on the tuning analogies
    // -> retraining with the best parameters and scoring the held out analogies

    pub fn run(config: &Config) -> Result<Report> {
        Pipeline::run_with(config, &Word2Vec::new())
    }

    pub fn run_with<T: EmbeddingTrainer<Model = Embeddings>>(config: &Config, trainer: &T) -> Result<Report> {

        info!("{}", config);

        let timer = Instant::now();
        let corpus = Corpus::load(&config.corpus_file, config.max_sentence_length)?;
        let stopwords = match &config.stopwords_file {
            Some(file_path) => Stopwords::from_file(file_path)?,
            None => Stopwords::english(),
        };
        let corpus = corpus.remove_stopwords(&stopwords);
        info!("removed {} stopwords, {} tokens left", stopwords.len(), corpus.n_tokens());

        let evaluation_set = EvaluationSet::from_file(&config.analogy_file, config.seed, config.train_percent)?;
        info!("finished loading inputs, took {} seconds ...", timer.elapsed().as_secs());

        // search
        let timer = Instant::now();
        let mut objective = TuningObjective {
            trainer,
            sentences: corpus.sentences(),
            analogies: &evaluation_set.train,
            fixed: &config.fixed_params,
            workers: config.workers,
            seed: config.seed,
        };
        let mut study = Study::new(RandomSampler::new(config.seed), config.search_space.clone())?;
        study.optimize(&mut objective, config.n_trials, Some(Duration::from_secs(config.timeout_secs)));

        // the history is kept even when nothing completed
        files_handling::save_output::<[Trial]>(&config.output_dir, TRIALS_FILE, study.trials())?;

        let best = study.best_trial().ok_or(TunerError::NoTrials)?;
        let best_params = best.params.clone();
        let best_value = best.value.unwrap_or(f64::NEG_INFINITY);
        info!(
            "finished search, {} trials took {} seconds, best is trial {}",
            study.trials().len(), timer.elapsed().as_secs(), best.number
        );
        files_handling::save_output::<Params>(&config.output_dir, BEST_PARAMS_FILE, &best_params)?;

        // final evaluation
        let timer = Instant::now();
        let (model, test_stats) = final_evaluation(
            trainer,
            corpus.sentences(),
            &evaluation_set.test,
            &best_params,
            &config.fixed_params,
            config.workers,
            config.seed,
        )?;
        files_handling::save_embeddings(&config.output_dir, &model)?;
        info!("finished final training, saved vecs. Took {} seconds ...", timer.elapsed().as_secs());

        Ok(Report { best_params, best_value, test_stats, trials: study.trials().to_vec() })
    }
}
