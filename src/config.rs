use serde_json::Value;
use std::{fs, fmt::Display};

use crate::error::{Result, TunerError};
use crate::space::{default_search_space, format_params, validate_space, Params, SearchSpace};

pub const DEFAULT_MAX_SENTENCE_LENGTH: usize = 10000;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TRAIN_PERCENT: usize = 70;
pub const DEFAULT_N_TRIALS: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// One less than the number of cpus, leaving a core for everything else.
pub fn default_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub corpus_file: String,
    pub analogy_file: String,
    pub output_dir: String,
    pub stopwords_file: Option<String>,
    pub max_sentence_length: usize,
    pub seed: u64,
    pub train_percent: usize,
    pub workers: usize,
    pub n_trials: usize,
    pub timeout_secs: u64,
    pub fixed_params: Params,
    pub search_space: SearchSpace,
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let space = self
            .search_space
            .iter()
            .map(|(name, d)| format!("{}: {:?}", name, d))
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "using params:
        corpus_file: {}
        analogy_file: {}
        output_dir: {}
        stopwords_file: {:?}
        max_sentence_length: {}
        seed: {}
        train_percent: {}
        workers: {}
        n_trials: {}
        timeout_secs: {}
        fixed_params: [{}]
        search_space: [{}]",
        self.corpus_file, self.analogy_file, self.output_dir, self.stopwords_file, self.max_sentence_length,
        self.seed, self.train_percent, self.workers, self.n_trials, self.timeout_secs,
        format_params(&self.fixed_params), space)
    }
}

fn required_str(json: &Value, key: &str) -> Result<String> {
    match json.get(key) {
        Some(value) => match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(TunerError::Config(format!("{} should be a string", key))),
        },
        None => Err(TunerError::Config(format!("{} was not supplied through json", key))),
    }
}

fn optional_str(json: &Value, key: &str) -> Result<Option<String>> {
    match json.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(value) => match value.as_str() {
            Some(s) => Ok(Some(s.to_string())),
            None => Err(TunerError::Config(format!("{} should be a string", key))),
        },
    }
}

fn optional_u64(json: &Value, key: &str, default: u64) -> Result<u64> {
    match json.get(key) {
        Some(value) => value
            .as_u64()
            .ok_or_else(|| TunerError::Config(format!("given {} is not a non negative integer", key))),
        None => Ok(default),
    }
}

impl Config {

    /// Reads the json file at `file_path`.
    pub fn new(file_path: &str) -> Result<Config> {
        let f = fs::File::open(file_path)?;
        let json: Value = serde_json::from_reader(f)?;
        Config::from_json(&json)
    }

    pub fn from_json(json: &Value) -> Result<Config> {

        // validate input and output in json
        let corpus_file = required_str(json, "corpus_file")?;
        let analogy_file = required_str(json, "analogy_file")?;
        let output_dir = required_str(json, "output_dir")?;

        // handle default vs input parameters
        let stopwords_file = optional_str(json, "stopwords_file")?;
        let max_sentence_length = optional_u64(json, "max_sentence_length", DEFAULT_MAX_SENTENCE_LENGTH as u64)? as usize;
        let seed = optional_u64(json, "seed", DEFAULT_SEED)?;
        let train_percent = optional_u64(json, "train_percent", DEFAULT_TRAIN_PERCENT as u64)? as usize;
        let workers = optional_u64(json, "workers", default_workers() as u64)? as usize;
        let n_trials = optional_u64(json, "n_trials", DEFAULT_N_TRIALS as u64)? as usize;
        let timeout_secs = optional_u64(json, "timeout_secs", DEFAULT_TIMEOUT_SECS)?;

        let fixed_params: Params = match json.get("fixed_params") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Params::new(),
        };
        let search_space: SearchSpace = match json.get("search_space") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => default_search_space(),
        };

        let config = Config {
            corpus_file,
            analogy_file,
            output_dir,
            stopwords_file,
            max_sentence_length,
            seed,
            train_percent,
            workers,
            n_trials,
            timeout_secs,
            fixed_params,
            search_space,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.train_percent > 100 {
            return Err(TunerError::Config(format!("train_percent must be within 0..=100, got {}", self.train_percent)));
        }
        if self.workers == 0 {
            return Err(TunerError::Config("workers must be at least 1".to_string()));
        }
        if self.n_trials == 0 {
            return Err(TunerError::Config("n_trials must be at least 1".to_string()));
        }
        if self.max_sentence_length == 0 {
            return Err(TunerError::Config("max_sentence_length must be at least 1".to_string()));
        }
        validate_space(&self.search_space).map_err(TunerError::Config)
    }
}


pub mod files_handling {

    use ndarray::Array2;
    use ndarray_npy::{read_npy, write_npy};
    use serde::Serialize;
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::io::{BufReader, BufWriter};

    use crate::error::Result;
    use crate::similarity::Embeddings;
    use crate::space::Params;
    use crate::study::Trial;

    pub const VECS_FILE: &str = "vecs";
    pub const WORDS_FILE: &str = "words";
    pub const BEST_PARAMS_FILE: &str = "best_params";
    pub const TRIALS_FILE: &str = "trials";

    pub fn read_input<R: ReadFile>(file_path: &str) -> Result<<R as ReadFile>::Item> {
        <R as ReadFile>::read_file(file_path)
    }

    pub fn save_output<S: SaveFile + ?Sized>(output_dir: &str, file_name: &str, item: &S) -> Result<()> {
        // create output folder
        fs::create_dir_all(output_dir)?;
        item.save_file(output_dir, file_name)
    }

    /// Trained vectors as `vecs.npy` plus the word index as `words.txt`.
    pub fn save_embeddings(output_dir: &str, embeddings: &Embeddings) -> Result<()> {
        save_output::<Array2<f32>>(output_dir, VECS_FILE, embeddings.weights())?;
        save_output::<HashMap<String, usize>>(output_dir, WORDS_FILE, embeddings.t2i())
    }

    pub fn read_embeddings(vecs_path: &str, words_path: &str) -> Result<Embeddings> {
        let w = read_input::<Array2<f32>>(vecs_path)?;
        let t2i = read_input::<HashMap<String, usize>>(words_path)?;
        Embeddings::new(w, t2i)
    }

    // paths are given without extension, each type appends its own
    pub trait ReadFile {
        type Item;
        fn read_file(file_path: &str) -> Result<Self::Item>;
    }

    impl ReadFile for Array2<f32> {
        type Item = Self;
        fn read_file(file_path: &str) -> Result<Self::Item> {
            let in_file = file_path.to_string() + ".npy";
            let item = read_npy(in_file)?;
            Ok(item)
        }
    }

    impl ReadFile for HashMap<String, usize> {
        type Item = Self;
        fn read_file(file_path: &str) -> Result<Self::Item> {
            let in_file = file_path.to_string() + ".txt";
            let f = BufReader::new(File::open(in_file)?);
            let item = serde_json::from_reader(f)?;
            Ok(item)
        }
    }

    impl ReadFile for Params {
        type Item = Self;
        fn read_file(file_path: &str) -> Result<Self::Item> {
            let in_file = file_path.to_string() + ".json";
            let f = BufReader::new(File::open(in_file)?);
            let item = serde_json::from_reader(f)?;
            Ok(item)
        }
    }

    pub trait SaveFile {
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()>;
    }

    impl SaveFile for Array2<f32> {
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
            let out = output_dir.to_string() + "/" + file_name + ".npy";
            write_npy(out, self)?;
            Ok(())
        }
    }

    impl SaveFile for HashMap<String, usize> {
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
            let out = output_dir.to_string() + "/" + file_name + ".txt";
            let f = BufWriter::new(File::create(out)?);
            serde_json::to_writer(f, self)?;
            Ok(())
        }
    }

    impl SaveFile for Params {
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
            let out = output_dir.to_string() + "/" + file_name + ".json";
            let f = BufWriter::new(File::create(out)?);
            serde_json::to_writer_pretty(f, self)?;
            Ok(())
        }
    }

    #[derive(Serialize)]
    struct TrialRecord {
        number: usize,
        state: String,
        value: Option<f64>,
        duration_secs: f64,
        params: String,
    }

    impl SaveFile for [Trial] {
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {

            let out = output_dir.to_string() + "/" + file_name + ".csv";
            let mut wrt = csv::WriterBuilder::new().from_path(out)?;

            for trial in self {
                wrt.serialize(TrialRecord {
                    number: trial.number,
                    state: trial.state.to_string(),
                    value: trial.value,
                    duration_secs: trial.duration.as_secs_f64(),
                    params: serde_json::to_string(&trial.params)?,
                })?;
            }
            wrt.flush()?;
            Ok(())
        }
    }
}
