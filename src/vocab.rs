use std::collections::HashMap;
use rand::Rng;

use crate::corpus::Sentence;
use crate::error::{Result, TunerError};

/// Training vocabulary: words kept by `min_count`, most frequent first.
#[derive(Clone, Debug)]
pub struct Vocab {
    words: Vec<String>,
    counts: Vec<u64>,
    t2i: HashMap<String, usize>,
}

impl Vocab {

    pub fn build(sentences: &[Sentence], min_count: usize) -> Result<Vocab> {

        // accumulate occurrences of words - how many times each token appears in the corpus
        let mut token2count: HashMap<&str, u64> = HashMap::new();
        for sentence in sentences {
            for tok in sentence {
                *token2count.entry(tok.as_str()).or_insert(0) += 1;
            }
        }

        // sorting by count alone would leave ties in hash order, the word breaks them
        // so that indices are identical from one run to the next
        let mut tup: Vec<(&str, u64)> = token2count
            .into_iter()
            .filter(|(_, count)| *count >= min_count as u64)
            .collect();
        tup.sort_by(|(w1, c1), (w2, c2)| c2.cmp(c1).then_with(|| w1.cmp(w2)));

        if tup.is_empty() {
            return Err(TunerError::EmptyVocabulary { min_count });
        }

        let words: Vec<String> = tup.iter().map(|(w, _)| w.to_string()).collect();
        let counts: Vec<u64> = tup.iter().map(|(_, c)| *c).collect();
        let t2i = words.iter().enumerate().map(|(i, w)| (w.to_owned(), i)).collect();

        Ok(Vocab { words, counts, t2i })
    }

    pub fn index(&self, word: &str) -> Option<usize> {
        self.t2i.get(word).copied()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Probability of keeping each occurrence of a word under frequent-word downsampling.
    pub fn keep_probabilities(&self, sample: f64) -> Vec<f64> {
        if sample <= 0.0 {
            return vec![1.0; self.len()];
        }
        let threshold = sample * self.total_count() as f64;
        self.counts
            .iter()
            .map(|c| {
                let c = *c as f64;
                (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0)
            })
            .collect()
    }

    /// Huffman codes over the counts, used by hierarchical softmax.
    ///
    /// Relies on the counts being sorted in descending order. Inner nodes are
    /// numbered `0..len - 1`, the root being `len - 2`.
    pub fn huffman_codes(&self) -> Vec<HuffmanCode> {

        let n = self.len();
        let mut count: Vec<u64> = self.counts.clone();
        count.resize(2 * n - 1, u64::MAX);
        let mut binary = vec![0u8; 2 * n - 1];
        let mut parent = vec![0usize; 2 * n - 1];

        // two cursors: one walking leaves from the rarest up, one walking the
        // inner nodes in creation order, always merge the two smallest
        let mut leaf = n as isize - 1;
        let mut inner = n;
        let mut take_min = |count: &Vec<u64>| -> usize {
            if leaf >= 0 && count[leaf as usize] < count[inner] {
                leaf -= 1;
                (leaf + 1) as usize
            } else {
                inner += 1;
                inner - 1
            }
        };

        for a in 0..n.saturating_sub(1) {
            let min1 = take_min(&count);
            let min2 = take_min(&count);
            count[n + a] = count[min1] + count[min2];
            parent[min1] = n + a;
            parent[min2] = n + a;
            binary[min2] = 1;
        }

        let root = 2 * n - 2;
        (0..n)
            .map(|word| {
                let mut code = Vec::new();
                let mut point = Vec::new();
                let mut node = word;
                while node != root {
                    code.push(binary[node]);
                    point.push(parent[node] - n);
                    node = parent[node];
                }
                code.reverse();
                point.reverse();
                HuffmanCode { code, point }
            })
            .collect()
    }
}

/// Path from the root to a word: the branch taken and the inner node visited at each step.
#[derive(Clone, Debug, PartialEq)]
pub struct HuffmanCode {
    pub code: Vec<u8>,
    pub point: Vec<usize>,
}

/// Draws noise words from the unigram distribution raised to `ns_exponent`.
#[derive(Clone, Debug)]
pub struct NegativeSampler {
    cumulative: Vec<f64>,
}

impl NegativeSampler {

    pub fn new(vocab: &Vocab, ns_exponent: f64) -> NegativeSampler {
        let mut total = 0.0;
        let cumulative = vocab
            .counts()
            .iter()
            .map(|c| {
                total += (*c as f64).powf(ns_exponent);
                total
            })
            .collect();
        NegativeSampler { cumulative }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let total = self.cumulative.last().copied().unwrap_or(0.0);
        let r = rng.gen::<f64>() * total;
        self.cumulative
            .partition_point(|c| *c <= r)
            .min(self.cumulative.len().saturating_sub(1))
    }
}
