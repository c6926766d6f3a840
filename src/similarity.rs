use std::collections::HashMap;
use ndarray::prelude::*;
use ndarray_stats::SummaryStatisticsExt;

use crate::analogies::ANALOGY_LEN;
use crate::error::{Result, TunerError};

/// A queryable word to vector mapping, the output of any embedding trainer.
pub trait WordVectors {
    /// `None` when the word is not in the vocabulary.
    fn get(&self, word: &str) -> Option<ArrayView1<'_, f32>>;
    fn dim(&self) -> usize;
}

/// Trained vectors, one row per vocabulary word.
#[derive(Clone, Debug, PartialEq)]
pub struct Embeddings {
    w: Array2<f32>,
    t2i: HashMap<String, usize>,
    i2t: Vec<String>,
}

impl Embeddings {

    pub fn new(w: Array2<f32>, t2i: HashMap<String, usize>) -> Result<Embeddings> {

        if w.dim().0 != t2i.len() {
            return Err(TunerError::ShapeMismatch { rows: w.dim().0, words: t2i.len() });
        }

        let mut i2t = vec![String::new(); t2i.len()];
        for (t, i) in &t2i {
            match i2t.get_mut(*i) {
                Some(slot) => *slot = t.to_owned(),
                None => return Err(TunerError::ShapeMismatch { rows: w.dim().0, words: *i + 1 }),
            }
        }

        Ok(Self { w, t2i, i2t })
    }

    pub fn from_words(w: Array2<f32>, words: Vec<String>) -> Result<Embeddings> {
        let t2i = words.iter().enumerate().map(|(i, t)| (t.to_owned(), i)).collect();
        Embeddings::new(w, t2i)
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.w
    }

    pub fn t2i(&self) -> &HashMap<String, usize> {
        &self.t2i
    }

    pub fn len(&self) -> usize {
        self.i2t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i2t.is_empty()
    }

    pub fn extract_vec_from_word(&self, token: &str) -> Result<Array1<f32>> {
        match self.get(token) {
            Some(v) => Ok(v.to_owned()),
            None => Err(TunerError::UnknownWord(token.to_string())),
        }
    }

    /// The k vocabulary words closest to `vec` by cosine similarity, best first.
    pub fn find_k_most_similar(&self, vec: &Array1<f32>, k: usize) -> Vec<(String, f32)> {

        let mut indexed_scores: Vec<(usize, f32)> = self
            .w
            .axis_iter(Axis(0))
            .map(|row| cosine_similarity(row, vec.view()))
            .enumerate()
            .collect();

        // sort by most similar in descending order, NaN rows (zero vectors) sink to the end
        indexed_scores.sort_by(|(_i, s), (_j, t)| {
            let s = if s.is_nan() { f32::NEG_INFINITY } else { *s };
            let t = if t.is_nan() { f32::NEG_INFINITY } else { *t };
            t.total_cmp(&s)
        });

        indexed_scores
            .into_iter()
            .take(k)
            .map(|(index, score)| (self.i2t[index].to_owned(), score))
            .collect()
    }
}

impl WordVectors for Embeddings {
    fn get(&self, word: &str) -> Option<ArrayView1<'_, f32>> {
        self.t2i.get(word).map(|i| self.w.row(*i))
    }

    fn dim(&self) -> usize {
        self.w.dim().1
    }
}

/// `dot(x, y) / (|x| * |y|)`, NaN when either vector has zero norm.
pub fn cosine_similarity(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
    let norm_x = x.dot(&x).sqrt();
    let norm_y = y.dot(&y).sqrt();
    x.dot(&y) / (norm_x * norm_y)
}

/// `emb(w1) - emb(w2) + emb(w3)` for "w1 w2 w3 w4", `None` if a word is missing.
pub fn predicted_vector<M: WordVectors + ?Sized>(model: &M, inputs: [&str; 3]) -> Option<Array1<f32>> {
    let v1 = model.get(inputs[0])?;
    let v2 = model.get(inputs[1])?;
    let v3 = model.get(inputs[2])?;
    Some(&v1 - &v2 + &v3)
}

/// Cosine similarity between `emb(w4)` and the predicted vector.
///
/// Returns NaN when the analogy cannot be scored: a word is out of
/// vocabulary or the line is not four words.
pub fn analogy_accuracy<M: WordVectors + ?Sized>(model: &M, analogy: &str) -> f32 {

    let words: Vec<&str> = analogy.split_whitespace().collect();
    if words.len() != ANALOGY_LEN {
        return f32::NAN;
    }

    let target = match model.get(words[3]) {
        Some(target) => target,
        None => return f32::NAN,
    };

    match predicted_vector(model, [words[0], words[1], words[2]]) {
        Some(predicted) => cosine_similarity(target, predicted.view()),
        None => f32::NAN,
    }
}

/// Mean and population standard deviation of a batch of scores, NaN entries excluded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityStats {
    pub scored: usize,
    pub excluded: usize,
    pub mean: f64,
    pub std: f64,
}

impl SimilarityStats {

    pub fn from_scores(scores: &[f32]) -> SimilarityStats {

        let finite: Array1<f64> = scores
            .iter()
            .filter(|s| s.is_finite())
            .map(|s| *s as f64)
            .collect();

        let scored = finite.len();
        let excluded = scores.len() - scored;

        // both moments are NaN when nothing could be scored
        let mean = finite.mean().unwrap_or(f64::NAN);
        let std = finite.central_moment(2).map(f64::sqrt).unwrap_or(f64::NAN);

        SimilarityStats { scored, excluded, mean, std }
    }

    /// Scores every analogy against `model`.
    pub fn evaluate<M: WordVectors + ?Sized>(model: &M, analogies: &[String]) -> SimilarityStats {
        let scores: Vec<f32> = analogies.iter().map(|a| analogy_accuracy(model, a)).collect();
        SimilarityStats::from_scores(&scores)
    }

    /// `mean / std`, the value maximized while tuning.
    pub fn ratio(&self) -> f64 {
        self.mean / self.std
    }
}
