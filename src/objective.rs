use tracing::debug;

use crate::corpus::Sentence;
use crate::error::Result;
use crate::similarity::SimilarityStats;
use crate::space::Params;
use crate::study::Objective;
use crate::train::{EmbeddingTrainer, TrainParams};

/// `mean / std` of the similarity scores, `NEG_INFINITY` when that is not a finite number.
///
/// Covers the degenerate cases: nothing scorable (both moments NaN) and a
/// zero spread (division by zero). Either way the trial ranks last.
pub fn objective_value(stats: &SimilarityStats) -> f64 {
    let ratio = stats.ratio();
    if ratio.is_finite() {
        ratio
    } else {
        f64::NEG_INFINITY
    }
}

/// Fixed options overlaid by the candidate, the candidate wins on conflicts.
pub fn merge_params(fixed: &Params, candidate: &Params) -> Params {
    let mut merged = fixed.clone();
    merged.extend(candidate.iter().map(|(k, v)| (k.to_owned(), v.clone())));
    merged
}

/// Trains a model per candidate and scores it on the tuning analogies.
pub struct TuningObjective<'a, T: EmbeddingTrainer> {
    pub trainer: &'a T,
    pub sentences: &'a [Sentence],
    pub analogies: &'a [String],
    pub fixed: &'a Params,
    pub workers: usize,
    pub seed: u64,
}

impl<'a, T: EmbeddingTrainer> TuningObjective<'a, T> {

    pub fn stats(&self, candidate: &Params) -> Result<SimilarityStats> {
        let params = TrainParams::resolve(&merge_params(self.fixed, candidate), self.workers, self.seed)?;
        let model = self.trainer.train(self.sentences, &params)?;
        Ok(SimilarityStats::evaluate(&model, self.analogies))
    }
}

impl<'a, T: EmbeddingTrainer> Objective for TuningObjective<'a, T> {
    fn evaluate(&mut self, params: &Params) -> Result<f64> {
        let stats = self.stats(params)?;
        debug!(
            "scored {} analogies ({} unscorable), mean {}, std {}",
            stats.scored, stats.excluded, stats.mean, stats.std
        );
        Ok(objective_value(&stats))
    }
}

/// Retrains with the chosen parameters and scores the held out analogies.
pub fn final_evaluation<T: EmbeddingTrainer>(
    trainer: &T,
    sentences: &[Sentence],
    test: &[String],
    best: &Params,
    fixed: &Params,
    workers: usize,
    seed: u64,
) -> Result<(T::Model, SimilarityStats)> {

    let params = TrainParams::resolve(&merge_params(fixed, best), workers, seed)?;
    debug!("{}", params);
    let model = trainer.train(sentences, &params)?;
    let stats = SimilarityStats::evaluate(&model, test);
    Ok((model, stats))
}


#[cfg(test)]
mod tests {

    use std::collections::HashMap;
    use ndarray::{array, Array2};

    use super::*;
    use crate::error::TunerError;
    use crate::similarity::Embeddings;
    use crate::space::ParamValue;
    use crate::train::Word2Vec;

    /// Ignores the corpus and hands back fixed vectors, scaled by `vector_size`
    /// so that the parameters visibly reach the trainer.
    struct FixedTrainer {
        w: Array2<f32>,
        words: Vec<String>,
    }

    impl EmbeddingTrainer for FixedTrainer {
        type Model = Embeddings;
        fn train(&self, _sentences: &[Sentence], params: &TrainParams) -> Result<Embeddings> {
            Embeddings::from_words(&self.w * params.vector_size as f32, self.words.clone())
        }
    }

    fn fixed_trainer() -> FixedTrainer {
        FixedTrainer {
            w: array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [-1.0, 3.0]],
            words: ["a", "b", "c", "d", "e"].map(String::from).to_vec(),
        }
    }

    fn params_of(pairs: &[(&str, i64)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), ParamValue::Int(*v))).collect()
    }

    #[test]
    fn merge_prefers_candidate() {
        let fixed = params_of(&[("min_count", 1), ("window", 3)]);
        let candidate = params_of(&[("window", 7)]);
        let merged = merge_params(&fixed, &candidate);
        assert_eq!(merged, params_of(&[("min_count", 1), ("window", 7)]));
    }

    #[test]
    fn degenerate_values_become_worst() {
        let nothing = SimilarityStats::from_scores(&[f32::NAN]);
        assert_eq!(objective_value(&nothing), f64::NEG_INFINITY);
        let flat = SimilarityStats::from_scores(&[0.5, 0.5]);
        assert_eq!(objective_value(&flat), f64::NEG_INFINITY);
        let fine = SimilarityStats::from_scores(&[0.5, 1.0]);
        assert!((objective_value(&fine) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn objective_is_mean_over_std_of_scored_analogies() {
        let trainer = fixed_trainer();
        let sentences: Vec<Sentence> = Vec::new();
        let analogies: Vec<String> = ["a b c d", "c a b e", "a b c zzz", "a b c"].map(String::from).to_vec();
        let fixed = Params::new();
        let mut objective = TuningObjective {
            trainer: &trainer,
            sentences: &sentences,
            analogies: &analogies,
            fixed: &fixed,
            workers: 1,
            seed: 0,
        };

        let stats = objective.stats(&params_of(&[("vector_size", 1)])).unwrap();
        assert_eq!(stats.scored, 2);
        assert_eq!(stats.excluded, 2);

        // scaling every vector leaves cosine similarities unchanged
        let v1 = objective.evaluate(&params_of(&[("vector_size", 1)])).unwrap();
        let v3 = objective.evaluate(&params_of(&[("vector_size", 3)])).unwrap();
        assert!((v1 - stats.ratio()).abs() < 1e-12);
        assert!((v1 - v3).abs() < 1e-3 * v1.abs());
    }

    #[test]
    fn invalid_candidates_are_errors() {
        let trainer = fixed_trainer();
        let sentences: Vec<Sentence> = Vec::new();
        let analogies: Vec<String> = Vec::new();
        let fixed = Params::new();
        let mut objective = TuningObjective {
            trainer: &trainer,
            sentences: &sentences,
            analogies: &analogies,
            fixed: &fixed,
            workers: 1,
            seed: 0,
        };
        let err = objective.evaluate(&params_of(&[("depth", 3)]));
        assert!(matches!(err, Err(TunerError::InvalidParam { .. })));
    }

    #[test]
    fn final_evaluation_scores_test_split() {
        let trainer = fixed_trainer();
        let test: Vec<String> = ["a b a b", "a b c q"].map(String::from).to_vec();
        let (model, stats) = final_evaluation(&trainer, &[], &test, &params_of(&[("vector_size", 2)]), &Params::new(), 1, 0).unwrap();
        assert_eq!(model.weights()[[3, 0]], 4.0);
        assert_eq!(stats.scored, 1);
        assert_eq!(stats.excluded, 1);
        assert_eq!(stats.std, 0.0);
    }

    fn corpus() -> Vec<Sentence> {
        let lines = [
            "king rules kingdom queen rules kingdom",
            "man walks dog woman walks dog",
            "king man eat bread queen woman eat bread",
            "boy plays ball girl plays ball",
        ];
        lines
            .iter()
            .cycle()
            .take(80)
            .map(|l| l.split_whitespace().map(|w| w.to_string()).collect())
            .collect()
    }

    #[test]
    fn same_inputs_same_objective() {
        let sentences = corpus();
        let analogies: Vec<String> = ["king queen man woman", "boy girl king queen", "man woman boy girl", "dog ball bread kingdom"]
            .map(String::from)
            .to_vec();
        let fixed = params_of(&[("min_count", 1), ("epochs", 2)]);
        let trainer = Word2Vec::new();
        let candidate = params_of(&[("vector_size", 12), ("window", 2), ("sg", 1)]);

        let mut values = Vec::new();
        for _ in 0..2 {
            let mut objective = TuningObjective {
                trainer: &trainer,
                sentences: &sentences,
                analogies: &analogies,
                fixed: &fixed,
                workers: 2,
                seed: 11,
            };
            values.push(objective.evaluate(&candidate).unwrap());
        }
        assert!(values[0].is_finite());
        assert_eq!(values[0].to_bits(), values[1].to_bits());
    }

    #[test]
    fn missing_words_do_not_fail_the_batch() {
        let w = array![[1.0f32, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let mut t2i = HashMap::new();
        for (i, word) in ["king", "queen", "man"].iter().enumerate() {
            t2i.insert(word.to_string(), i);
        }
        let model = Embeddings::new(w, t2i).unwrap();
        let stats = SimilarityStats::evaluate(&model, &["king queen man woman".to_string()]);
        assert_eq!(stats.scored, 0);
        assert_eq!(objective_value(&stats), f64::NEG_INFINITY);
    }
}
