use crate::error::Result;

use std::fs::File;
use std::io::{BufRead, BufReader};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::info;

pub const ANALOGY_LEN: usize = 4;

/// Analogies split into a tuning part and a held out part.
///
/// Every entry is a lowercased line of exactly four words, `w1 w2 w3 w4`,
/// read as "w1 is to w2 as w3 is to w4".
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationSet {
    pub train: Vec<String>,
    pub test: Vec<String>,
}

impl EvaluationSet {

    /// Lowercases and trims a line, `None` unless it holds exactly four words.
    pub fn parse_line(line: &str) -> Option<String> {
        let line = line.trim().to_lowercase();
        if line.split_whitespace().count() == ANALOGY_LEN {
            Some(line)
        } else {
            None
        }
    }

    pub fn build<I, S>(lines: I, seed: u64, train_percent: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut analogies: Vec<String> = lines
            .into_iter()
            .filter_map(|line| EvaluationSet::parse_line(line.as_ref()))
            .collect();

        // the shuffle is the only random step, the split itself is positional
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        analogies.shuffle(&mut rng);

        let train_len = analogies.len() * train_percent.min(100) / 100;
        let test = analogies.split_off(train_len);

        Self { train: analogies, test }
    }

    pub fn from_file(file_path: &str, seed: u64, train_percent: usize) -> Result<Self> {
        let lines = BufReader::new(File::open(file_path)?)
            .lines()
            .collect::<std::result::Result<Vec<String>, _>>()?;

        let n_lines = lines.len();
        let set = EvaluationSet::build(lines, seed, train_percent);
        info!(
            "kept {} of {} analogy lines, {} for tuning and {} held out",
            set.len(), n_lines, set.train.len(), set.test.len()
        );
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
