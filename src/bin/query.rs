use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use embedding_tuner::files_handling::read_embeddings;
use embedding_tuner::{predicted_vector, Embeddings, TunerError};


// checks on trained vectors, run independently from the tuner:
// the k most similar words to an analogy prediction, and to single words

#[derive(Parser, Debug)]
#[command(name = "query", about = "Queries vectors saved by embedding_tuner")]
struct Args {
    #[command(subcommand)]
    task: Task,

    /// Path to the saved vecs, without the .npy extension
    #[arg(long, global = true, default_value = "output/vecs")]
    vecs: String,

    /// Path to the saved words, without the .txt extension
    #[arg(long, global = true, default_value = "output/words")]
    words: String,

    /// How many neighbours to print
    #[arg(short, long, global = true, default_value_t = 10)]
    k: usize,

    /// One of trace, debug, info, warn, error
    #[arg(long, global = true, default_value = "warn")]
    log_level: Level,
}

#[derive(Subcommand, Debug)]
enum Task {
    /// Each line holds "a b c [d]", searched as a - b + c
    Analogy { input: String },
    /// Each line holds one word
    Similar { input: String },
}

fn read_lines(file_path: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let f = File::open(file_path)?;
    let mut lines = Vec::new();
    for line in BufReader::new(f).lines() {
        let line = line?.trim().to_lowercase();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn run_analogies(inputs: &[String], k: usize, model: &Embeddings) -> Result<(), Box<dyn Error>> {

    for input in inputs {

        let tokens: Vec<&str> = input.split_whitespace().collect();
        if tokens.len() != 3 && tokens.len() != 4 {
            println!("skipping '{}', expected 3 or 4 words\n", input);
            continue;
        }
        let source = [tokens[0], tokens[1], tokens[2]];

        let Some(vec) = predicted_vector(model, source) else {
            println!("skipping '{}', some word is not in the vocabulary\n", input);
            continue;
        };

        let neighbours = model.find_k_most_similar(&vec, k);
        for (i, (word, score)) in neighbours.iter().enumerate() {
            println!("{} : {} - {} + {} ? {} = {}", i, source[0], source[1], source[2], word, score);
        }

        if let Some(target) = tokens.get(3) {
            match neighbours.iter().position(|(word, _)| word == target) {
                Some(i) => println!("found target '{}' in place {} with score {}", target, i + 1, neighbours[i].1),
                None => println!("target '{}' was not found within the first {}", target, k),
            }
        }
        println!();
    }
    Ok(())
}

fn run_similarity(inputs: &[String], k: usize, model: &Embeddings) -> Result<(), Box<dyn Error>> {

    for token in inputs {
        println!("searching {} most similar words to {}", k, token);
        let vec = match model.extract_vec_from_word(token) {
            Ok(vec) => vec,
            Err(e @ TunerError::UnknownWord(_)) => {
                println!("{}\n", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        for (i, (similar, score)) in model.find_k_most_similar(&vec, k).iter().enumerate() {
            println!("{} : {} ? {} = {}", i, token, similar, score);
        }
        println!();
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let model = read_embeddings(&args.vecs, &args.words)?;
    info!("loaded {} vectors from {}", model.len(), args.vecs);

    match &args.task {
        Task::Analogy { input } => run_analogies(&read_lines(input)?, args.k, &model),
        Task::Similar { input } => run_similarity(&read_lines(input)?, args.k, &model),
    }
}
