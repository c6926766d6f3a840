use ndarray::prelude::*;
use ndarray::{Array, Zip};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::fmt::Display;
use std::ops::Range;
use std::time::Instant;
use tracing::debug;

use crate::corpus::Sentence;
use crate::error::{Result, TunerError};
use crate::similarity::{Embeddings, WordVectors};
use crate::space::{ParamValue, Params};
use crate::vocab::{HuffmanCode, NegativeSampler, Vocab};

/// The capability of turning a sentence corpus into queryable word vectors.
pub trait EmbeddingTrainer {
    type Model: WordVectors;
    fn train(&self, sentences: &[Sentence], params: &TrainParams) -> Result<Self::Model>;
}

/// Everything a training run needs besides the sentences.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainParams {
    pub workers: usize,
    pub seed: u64,
    pub vector_size: usize,
    pub sg: bool,
    pub alpha: f32,
    pub window: usize,
    pub epochs: usize,
    pub hs: bool,
    pub min_count: usize,
    pub negative: usize,
    pub ns_exponent: f64,
    pub min_alpha: f32,
    pub sample: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            workers: 1,
            seed: 42,
            vector_size: 100,
            sg: false,
            alpha: 0.025,
            window: 5,
            epochs: 5,
            hs: false,
            min_count: 5,
            negative: 5,
            ns_exponent: 0.75,
            min_alpha: 0.0001,
            sample: 0.001,
        }
    }
}

impl Display for TrainParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "training hyper parameters:
        workers: {},
        seed: {},
        vector_size: {},
        sg: {},
        alpha: {},
        window: {},
        epochs: {},
        hs: {},
        min_count: {},
        negative: {},
        ns_exponent: {},
        min_alpha: {},
        sample: {}",
        self.workers, self.seed, self.vector_size, self.sg as u8, self.alpha, self.window, self.epochs,
        self.hs as u8, self.min_count, self.negative, self.ns_exponent, self.min_alpha, self.sample
        )
    }
}

fn as_usize(name: &str, value: &ParamValue) -> Result<usize> {
    match value.as_i64() {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(TunerError::invalid_param(name, format!("expected a non negative integer, got {}", value))),
    }
}

fn as_flag(name: &str, value: &ParamValue) -> Result<bool> {
    match value.as_i64() {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => Err(TunerError::invalid_param(name, format!("expected 0 or 1, got {}", value))),
    }
}

fn as_float(name: &str, value: &ParamValue) -> Result<f64> {
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(TunerError::invalid_param(name, format!("expected a number, got {}", value))),
    }
}

impl TrainParams {

    /// Overlays a named parameter set on the defaults.
    pub fn resolve(params: &Params, workers: usize, seed: u64) -> Result<TrainParams> {

        let mut resolved = TrainParams { workers, seed, ..TrainParams::default() };

        for (name, value) in params {
            match name.as_str() {
                "vector_size" => resolved.vector_size = as_usize(name, value)?,
                "sg" => resolved.sg = as_flag(name, value)?,
                "alpha" => resolved.alpha = as_float(name, value)? as f32,
                "window" => resolved.window = as_usize(name, value)?,
                "epochs" => resolved.epochs = as_usize(name, value)?,
                "hs" => resolved.hs = as_flag(name, value)?,
                "min_count" => resolved.min_count = as_usize(name, value)?,
                "negative" => resolved.negative = as_usize(name, value)?,
                "ns_exponent" => resolved.ns_exponent = as_float(name, value)?,
                "min_alpha" => resolved.min_alpha = as_float(name, value)? as f32,
                "sample" => resolved.sample = as_float(name, value)?,
                _ => return Err(TunerError::invalid_param(name, "unknown training option")),
            }
        }

        resolved.validate()?;
        Ok(resolved)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(TunerError::invalid_param("workers", "must be at least 1"));
        }
        if self.vector_size == 0 {
            return Err(TunerError::invalid_param("vector_size", "must be at least 1"));
        }
        if self.window == 0 {
            return Err(TunerError::invalid_param("window", "must be at least 1"));
        }
        if self.alpha <= 0.0 {
            return Err(TunerError::invalid_param("alpha", "must be positive"));
        }
        if self.min_alpha < 0.0 {
            return Err(TunerError::invalid_param("min_alpha", "must not be negative"));
        }
        if self.sample < 0.0 {
            return Err(TunerError::invalid_param("sample", "must not be negative"));
        }
        if !self.hs && self.negative == 0 {
            return Err(TunerError::invalid_param("negative", "0 with hs = 0 leaves nothing to train"));
        }
        Ok(())
    }
}

/// The weights of one model, cloned once per shard and merged back after every epoch.
#[derive(Clone)]
struct Weights {
    syn0: Array2<f32>,
    syn1: Array2<f32>,
    syn1neg: Array2<f32>,
}

impl Weights {

    fn new(vocab_size: usize, vector_size: usize, rng: &mut ChaCha8Rng) -> Weights {
        Self {
            syn0: Array::random_using((vocab_size, vector_size), Uniform::new(-0.5, 0.5), rng) / vector_size as f32,
            syn1: Array2::zeros((vocab_size.saturating_sub(1), vector_size)),
            syn1neg: Array2::zeros((vocab_size, vector_size)),
        }
    }

    // every shard starts from `base`, their changes are added up in shard order
    // so the result does not depend on thread timing
    fn combine(base: Weights, shards: Vec<Weights>) -> Weights {
        let mut acc = base.clone();
        for w in &shards {
            Zip::from(&mut acc.syn0).and(&w.syn0).and(&base.syn0).for_each(|a, &l, &b| *a += l - b);
            Zip::from(&mut acc.syn1).and(&w.syn1).and(&base.syn1).for_each(|a, &l, &b| *a += l - b);
            Zip::from(&mut acc.syn1neg).and(&w.syn1neg).and(&base.syn1neg).for_each(|a, &l, &b| *a += l - b);
        }
        acc
    }
}

/// Read only state shared by every shard of a run.
struct Context<'a> {
    params: &'a TrainParams,
    vocab: &'a Vocab,
    keep: Vec<f64>,
    codes: Vec<HuffmanCode>,
    sampler: NegativeSampler,
    total_words: f64,
}

impl<'a> Context<'a> {

    // linear decay from alpha down to min_alpha over the whole run
    fn alpha_at(&self, words_done: f64) -> f32 {
        let progress = (words_done / self.total_words).min(1.0) as f32;
        let alpha = self.params.alpha - (self.params.alpha - self.params.min_alpha) * progress;
        alpha.max(self.params.min_alpha)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// word2vec: skip-gram or CBOW, trained with negative sampling and/or hierarchical softmax.
#[derive(Clone, Copy, Debug, Default)]
pub struct Word2Vec {}

impl Word2Vec {

    pub fn new() -> Self {
        Self {}
    }

    // updates the output weights for predicting `word` from the hidden vector `l1`,
    // and returns the error to propagate back to the input vectors
    fn train_target(
        weights: &mut Weights,
        ctx: &Context,
        l1: &Array1<f32>,
        word: usize,
        alpha: f32,
        rng: &mut ChaCha8Rng,
    ) -> Array1<f32> {

        let mut neu1e: Array1<f32> = Array1::zeros(l1.len());

        if ctx.params.hs {
            let path = &ctx.codes[word];
            for (bit, point) in path.code.iter().zip(path.point.iter()) {
                let f = sigmoid(weights.syn1.row(*point).dot(l1));
                let g = (1.0 - *bit as f32 - f) * alpha;
                neu1e.scaled_add(g, &weights.syn1.row(*point));
                weights.syn1.row_mut(*point).scaled_add(g, l1);
            }
        }

        if ctx.params.negative == 0 {
            return neu1e;
        }

        // the true word first, then `negative` noise words
        for d in 0..=ctx.params.negative {
            let (target, label) = if d == 0 {
                (word, 1.0)
            } else {
                let target = ctx.sampler.sample(rng);
                if target == word {
                    continue;
                }
                (target, 0.0)
            };
            let f = sigmoid(weights.syn1neg.row(target).dot(l1));
            let g = (label - f) * alpha;
            neu1e.scaled_add(g, &weights.syn1neg.row(target));
            weights.syn1neg.row_mut(target).scaled_add(g, l1);
        }

        neu1e
    }

    fn train_sentence(
        weights: &mut Weights,
        ctx: &Context,
        sentence: &[usize],
        alpha: f32,
        rng: &mut ChaCha8Rng,
    ) {

        let window = ctx.params.window;
        let n = sentence.len();

        for pos in 0..n {

            // random reduced window, nearer words get sampled more often
            let reduced = window - rng.gen_range(0..window);
            let start = pos.saturating_sub(reduced);
            let end = (pos + reduced + 1).min(n);
            let word = sentence[pos];

            if ctx.params.sg {
                for c in start..end {
                    if c == pos {
                        continue;
                    }
                    let input = sentence[c];
                    let l1 = weights.syn0.row(input).to_owned();
                    let neu1e = Word2Vec::train_target(weights, ctx, &l1, word, alpha, rng);
                    weights.syn0.row_mut(input).scaled_add(1.0, &neu1e);
                }
            } else {
                let context: Vec<usize> = (start..end).filter(|c| *c != pos).map(|c| sentence[c]).collect();
                if context.is_empty() {
                    continue;
                }
                let l1 = weights.syn0.select(Axis(0), &context).mean_axis(Axis(0));
                let l1 = match l1 {
                    Some(l1) => l1,
                    None => continue,
                };
                let neu1e = Word2Vec::train_target(weights, ctx, &l1, word, alpha, rng);
                for c in context {
                    weights.syn0.row_mut(c).scaled_add(1.0, &neu1e);
                }
            }
        }
    }

    fn train_shard(
        weights: &mut Weights,
        ctx: &Context,
        sentences: &[Vec<usize>],
        words_before: f64,
        rng: &mut ChaCha8Rng,
    ) {

        let mut words_done = words_before;
        for sentence in sentences {
            let alpha = ctx.alpha_at(words_done);
            words_done += sentence.len() as f64;

            // frequent words are randomly dropped from each pass
            let kept: Vec<usize> = sentence
                .iter()
                .copied()
                .filter(|i| ctx.keep[*i] >= 1.0 || rng.gen::<f64>() < ctx.keep[*i])
                .collect();
            Word2Vec::train_sentence(weights, ctx, &kept, alpha, rng);
        }
    }

    // contiguous shards of about equal sentence counts, one per worker
    fn shard_ranges(n_sentences: usize, workers: usize) -> Vec<Range<usize>> {
        let size = ((n_sentences + workers - 1) / workers).max(1);
        (0..n_sentences).step_by(size).map(|i| i..(i + size).min(n_sentences)).collect()
    }

    fn shard_seed(seed: u64, epoch: usize, shard: usize, workers: usize) -> u64 {
        seed.wrapping_add(1 + (epoch * workers + shard) as u64)
    }
}

impl EmbeddingTrainer for Word2Vec {
    type Model = Embeddings;

    fn train(&self, sentences: &[Sentence], params: &TrainParams) -> Result<Embeddings> {

        params.validate()?;
        let vocab = Vocab::build(sentences, params.min_count)?;

        // sentences as vocabulary indices, unknown words dropped
        let encoded: Vec<Vec<usize>> = sentences
            .iter()
            .map(|s| s.iter().filter_map(|tok| vocab.index(tok)).collect())
            .collect();
        let words_per_epoch: usize = encoded.iter().map(|s| s.len()).sum();

        let ctx = Context {
            params,
            vocab: &vocab,
            keep: vocab.keep_probabilities(params.sample),
            codes: if params.hs { vocab.huffman_codes() } else { Vec::new() },
            sampler: NegativeSampler::new(&vocab, params.ns_exponent),
            total_words: (words_per_epoch * params.epochs).max(1) as f64,
        };
        debug!("vocabulary of {} words, {} training words per epoch", ctx.vocab.len(), words_per_epoch);

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut weights = Weights::new(vocab.len(), params.vector_size, &mut rng);

        let shards = Word2Vec::shard_ranges(encoded.len(), params.workers);
        let mut words_before_shard = Vec::with_capacity(shards.len());
        let mut acc = 0usize;
        for range in &shards {
            words_before_shard.push(acc);
            acc += encoded[range.clone()].iter().map(|s| s.len()).sum::<usize>();
        }

        let pool = ThreadPoolBuilder::new().num_threads(params.workers).build()?;

        for epoch in 0..params.epochs {

            let timer = Instant::now();
            let epoch_offset = (epoch * words_per_epoch) as f64;

            let trained: Vec<Weights> = pool.install(|| {
                shards
                    .par_iter()
                    .enumerate()
                    .map(|(shard, range)| {
                        let mut local = weights.clone();
                        let mut rng = ChaCha8Rng::seed_from_u64(Word2Vec::shard_seed(params.seed, epoch, shard, params.workers));
                        let words_before = epoch_offset + words_before_shard[shard] as f64;
                        Word2Vec::train_shard(&mut local, &ctx, &encoded[range.clone()], words_before, &mut rng);
                        local
                    })
                    .collect()
            });

            weights = Weights::combine(weights, trained);

            debug!("finished epoch {}, alpha now {}, took {} ms", epoch, ctx.alpha_at(epoch_offset + words_per_epoch as f64), timer.elapsed().as_millis());
        }

        Embeddings::from_words(weights.syn0, vocab.words().to_vec())
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::array;
    use crate::similarity::cosine_similarity;

    fn toy_corpus() -> Vec<Sentence> {
        let lines = [
            "king rules the kingdom with the queen",
            "queen rules the kingdom with the king",
            "man walks the dog with the woman",
            "woman walks the dog with the man",
            "the king and the man eat bread",
            "the queen and the woman eat bread",
        ];
        lines
            .iter()
            .cycle()
            .take(60)
            .map(|l| l.split_whitespace().map(|w| w.to_string()).collect())
            .collect()
    }

    fn small_params() -> TrainParams {
        TrainParams { vector_size: 16, min_count: 1, epochs: 3, window: 2, sample: 0.0, ..TrainParams::default() }
    }

    fn params_of(pairs: &[(&str, ParamValue)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn resolve_overlays_defaults() {
        let params = params_of(&[
            ("vector_size", ParamValue::Int(50)),
            ("sg", ParamValue::Int(1)),
            ("alpha", ParamValue::Float(0.05)),
            ("ns_exponent", ParamValue::Int(1)),
        ]);
        let resolved = TrainParams::resolve(&params, 3, 7).unwrap();
        assert_eq!(resolved.vector_size, 50);
        assert!(resolved.sg);
        assert_eq!(resolved.alpha, 0.05);
        assert_eq!(resolved.ns_exponent, 1.0);
        assert_eq!(resolved.workers, 3);
        assert_eq!(resolved.seed, 7);
        assert_eq!(resolved.window, TrainParams::default().window);
    }

    #[test]
    fn resolve_rejects_bad_values() {
        let bad = [
            params_of(&[("layers", ParamValue::Int(2))]),
            params_of(&[("sg", ParamValue::Int(2))]),
            params_of(&[("window", ParamValue::Int(-1))]),
            params_of(&[("window", ParamValue::Float(2.5))]),
            params_of(&[("vector_size", ParamValue::Int(0))]),
            params_of(&[("alpha", ParamValue::Text("fast".to_string()))]),
            params_of(&[("hs", ParamValue::Int(0)), ("negative", ParamValue::Int(0))]),
        ];
        for params in bad {
            assert!(matches!(TrainParams::resolve(&params, 1, 0), Err(TunerError::InvalidParam { .. })), "{:?}", params);
        }
        // hierarchical softmax alone is fine
        let hs_only = params_of(&[("hs", ParamValue::Int(1)), ("negative", ParamValue::Int(0))]);
        assert!(TrainParams::resolve(&hs_only, 1, 0).is_ok());
    }

    #[test]
    fn shards_cover_all_sentences() {
        assert_eq!(Word2Vec::shard_ranges(10, 3), vec![0..4, 4..8, 8..10]);
        assert_eq!(Word2Vec::shard_ranges(2, 4), vec![0..1, 1..2]);
        assert_eq!(Word2Vec::shard_ranges(5, 1), vec![0..5]);
        assert!(Word2Vec::shard_ranges(0, 2).is_empty());
    }

    #[test]
    fn alpha_decays_linearly() {
        let corpus = toy_corpus();
        let vocab = Vocab::build(&corpus, 1).unwrap();
        let params = TrainParams { alpha: 0.1, min_alpha: 0.0, ..small_params() };
        let ctx = Context {
            params: &params,
            vocab: &vocab,
            keep: vocab.keep_probabilities(0.0),
            codes: Vec::new(),
            sampler: NegativeSampler::new(&vocab, 0.75),
            total_words: 100.0,
        };
        assert!((ctx.alpha_at(0.0) - 0.1).abs() < 1e-7);
        assert!((ctx.alpha_at(50.0) - 0.05).abs() < 1e-7);
        assert_eq!(ctx.alpha_at(150.0), 0.0);
    }

    #[test]
    fn model_shape_and_vocab() {
        let corpus = toy_corpus();
        let model = Word2Vec::new().train(&corpus, &small_params()).unwrap();
        assert_eq!(model.dim(), 16);
        assert_eq!(model.len(), 13);
        assert!(model.get("kingdom").is_some());
        assert!(model.get("prince").is_none());
        assert!(model.weights().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn min_count_filters_vocab() {
        let mut corpus = toy_corpus();
        corpus.push(vec!["hapax".to_string()]);
        let model = Word2Vec::new().train(&corpus, &TrainParams { min_count: 2, ..small_params() }).unwrap();
        assert!(model.get("hapax").is_none());

        let err = Word2Vec::new().train(&corpus, &TrainParams { min_count: 1000, ..small_params() });
        assert!(matches!(err, Err(TunerError::EmptyVocabulary { .. })));
    }

    #[test]
    fn same_seed_same_vectors() {
        let corpus = toy_corpus();
        for (sg, hs, workers) in [(false, false, 1), (true, false, 2), (true, true, 3), (false, true, 2)] {
            let params = TrainParams { sg, hs, workers, ..small_params() };
            let first = Word2Vec::new().train(&corpus, &params).unwrap();
            let second = Word2Vec::new().train(&corpus, &params).unwrap();
            assert_eq!(first, second);
        }

        let params = small_params();
        let first = Word2Vec::new().train(&corpus, &params).unwrap();
        let other = Word2Vec::new().train(&corpus, &TrainParams { seed: params.seed + 1, ..params }).unwrap();
        assert_ne!(first.weights(), other.weights());
    }

    #[test]
    fn shard_changes_add_up() {
        let base = Weights {
            syn0: array![[1.0, 1.0], [0.0, 2.0]],
            syn1: array![[0.5, 0.5]],
            syn1neg: Array2::zeros((2, 2)),
        };
        let mut first = base.clone();
        first.syn0[[0, 0]] += 0.25;
        first.syn1neg[[1, 1]] -= 1.0;
        let mut second = base.clone();
        second.syn0[[0, 0]] += 0.5;
        second.syn1[[0, 1]] += 2.0;

        let merged = Weights::combine(base, vec![first, second]);
        assert_eq!(merged.syn0, array![[1.75, 1.0], [0.0, 2.0]]);
        assert_eq!(merged.syn1, array![[0.5, 2.5]]);
        assert_eq!(merged.syn1neg, array![[0.0, 0.0], [0.0, -1.0]]);
    }

    #[test]
    fn workers_keep_the_amount_of_learning() {
        let corpus: Vec<Sentence> = toy_corpus().into_iter().cycle().take(400).collect();
        let base = TrainParams { sg: true, epochs: 5, ..small_params() };
        let init = Word2Vec::new().train(&corpus, &TrainParams { epochs: 0, ..base.clone() }).unwrap();

        let moved = |workers: usize| -> f32 {
            let model = Word2Vec::new().train(&corpus, &TrainParams { workers, ..base.clone() }).unwrap();
            (model.weights() - init.weights()).mapv(|x| x * x).sum().sqrt()
        };
        let single = moved(1);
        let ratio = moved(4) / single;
        assert!(single > 0.0);
        assert!(ratio > 0.7 && ratio < 1.6, "4 workers moved {} times as far as 1", ratio);
    }

    #[test]
    fn training_moves_vectors() {
        // with zero epochs the vectors stay at their random initialisation
        let corpus = toy_corpus();
        let untrained = Word2Vec::new().train(&corpus, &TrainParams { epochs: 0, ..small_params() }).unwrap();
        let trained = Word2Vec::new().train(&corpus, &TrainParams { epochs: 5, sg: true, ..small_params() }).unwrap();
        assert_ne!(untrained.weights(), trained.weights());

        let bound = 0.5 / 16.0;
        assert!(untrained.weights().iter().all(|x| x.abs() <= bound));

        let king = trained.get("king").unwrap();
        assert!(cosine_similarity(king, king).is_finite());
    }
}
