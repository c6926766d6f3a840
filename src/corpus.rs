// imports
use crate::error::Result;
use crate::stopwords::Stopwords;

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use tracing::info;

pub type Sentence = Vec<String>;

/// Corpus as a list of sentences, read once and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Corpus {
    sentences: Vec<Sentence>,
}

impl Corpus {

    pub fn new(sentences: Vec<Sentence>) -> Self {
        Self { sentences }
    }

    fn read_file(file_path: &str) -> Result<Lines<BufReader<File>>> {
        let f = File::open(file_path)?;
        Ok(BufReader::new(f).lines())
    }

    fn accumulate(line: &str, max_sentence_length: usize, sentences: &mut Vec<Sentence>) {

        // single line corpora (text8 and the like) hold the whole stream in one line,
        // such lines are cut into consecutive sentences of at most `max_sentence_length` tokens
        let tokens = Corpus::tokenize(line);
        if tokens.is_empty() {
            return;
        }
        for chunk in tokens.chunks(max_sentence_length.max(1)) {
            sentences.push(chunk.to_vec());
        }
    }

    pub fn from_lines<I, S>(lines: I, max_sentence_length: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sentences = Vec::new();
        for line in lines {
            Corpus::accumulate(line.as_ref(), max_sentence_length, &mut sentences);
        }
        Self { sentences }
    }

    pub fn load(file_path: &str, max_sentence_length: usize) -> Result<Self> {

        let mut sentences = Vec::new();
        for line in Corpus::read_file(file_path)? {
            Corpus::accumulate(&line?, max_sentence_length, &mut sentences);
        }

        let corpus = Self { sentences };
        info!("loaded {} sentences, {} tokens from {}", corpus.len(), corpus.n_tokens(), file_path);
        Ok(corpus)
    }

    /// Drops every stopword, keeping token order and sentence boundaries.
    pub fn remove_stopwords(&self, stopwords: &Stopwords) -> Corpus {
        let sentences = self
            .sentences
            .iter()
            .map(|sentence| {
                sentence
                    .iter()
                    .filter(|tok| !stopwords.contains(tok))
                    .cloned()
                    .collect::<Sentence>()
            })
            .collect();
        Corpus { sentences }
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn n_tokens(&self) -> usize {
        self.sentences.iter().map(|s| s.len()).sum()
    }
}


// defines the behavior needed for tokinizing a corpus
trait Tokenizer {
    fn tokenize(sequence: &str) -> Vec<String>;
}

impl Tokenizer for Corpus {
    // the corpus is already tokenized, split on any whitespace
    fn tokenize(sequence: &str) -> Vec<String> {
        sequence.split_whitespace().map(|x| x.to_string()).collect()
    }
}
