use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use datasets::{load_mr, load_sst, MrConfig, SstConfig, TextDataset};
use tokenizer::{RuleTokenizer, SimpleTokenizer, Tokenizer, TokenizerKind, Vocab, VocabConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DatasetName {
    Sst,
    Mr,
}

#[derive(Subcommand)]
enum Commands {
    /// Split text into tokens
    Tokenize {
        /// Tokenizer to use: rule (alias: spacy) or simple
        #[arg(short, long, default_value_t = TokenizerKind::Rule)]
        kind: TokenizerKind,

        #[arg(long)]
        lowercase: bool,

        text: String,
    },
    /// Build a vocabulary from a dataset's training split
    BuildVocab {
        #[arg(short, long, value_enum)]
        dataset: DatasetName,

        /// Directory holding the extracted datasets
        #[arg(long, default_value = ".data")]
        root: PathBuf,

        #[arg(short, long, default_value_t = TokenizerKind::Rule)]
        kind: TokenizerKind,

        #[arg(long)]
        lowercase: bool,

        /// Expand SST training trees into one example per phrase
        #[arg(long)]
        subtrees: bool,

        /// Drop tokens seen fewer times than this
        #[arg(long, default_value_t = 1)]
        min_freq: usize,

        /// Keep at most this many tokens besides <pad> and <unk>
        #[arg(long)]
        max_size: Option<usize>,

        #[arg(short, long, default_value = "vocab.json")]
        output: PathBuf,
    },
    /// Tokenize text and map it to ids
    Encode {
        /// Path to vocab.json
        #[arg(long)]
        vocab: PathBuf,

        #[arg(short, long, default_value_t = TokenizerKind::Rule)]
        kind: TokenizerKind,

        #[arg(long)]
        lowercase: bool,

        text: String,
    },
    /// Map ids back to tokens
    Decode {
        /// Path to vocab.json
        #[arg(long)]
        vocab: PathBuf,

        /// IDs to decode (comma separated)
        #[arg(short, long)]
        ids: String,
    },
}

fn build_tokenizer(kind: TokenizerKind, lowercase: bool) -> Result<Box<dyn Tokenizer>> {
    Ok(match (kind, lowercase) {
        (TokenizerKind::Rule, true) => Box::new(RuleTokenizer::new()?.lowercase()),
        (TokenizerKind::Simple, true) => Box::new(SimpleTokenizer::new().lowercase()),
        (kind, false) => kind.build()?,
    })
}

fn load_train(dataset: DatasetName, root: PathBuf, subtrees: bool, tokenizer: &dyn Tokenizer) -> Result<TextDataset> {
    let train = match dataset {
        DatasetName::Sst => {
            let config = SstConfig {
                root,
                train_subtrees: subtrees,
                ..Default::default()
            };
            load_sst(&config, tokenizer, None)?.train
        }
        DatasetName::Mr => {
            let config = MrConfig {
                root,
                ..Default::default()
            };
            load_mr(&config, tokenizer, None)?
        }
    };
    Ok(train)
}

fn parse_ids(ids: &str) -> Result<Vec<i64>> {
    ids.split(',')
        .map(|s| s.trim().parse::<i64>().with_context(|| format!("Invalid ID {:?}", s)))
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Tokenize { kind, lowercase, text } => {
            let tokenizer = build_tokenizer(kind, lowercase)?;
            println!("{}", serde_json::to_string(&tokenizer.tokenize(&text))?);
        }
        Commands::BuildVocab {
            dataset,
            root,
            kind,
            lowercase,
            subtrees,
            min_freq,
            max_size,
            output,
        } => {
            let tokenizer = build_tokenizer(kind, lowercase)?;
            let train = load_train(dataset, root, subtrees, tokenizer.as_ref()).context("Failed to load dataset")?;
            log::info!("Label counts: {:?}", train.label_counts());

            let vocab = train.build_vocab(&VocabConfig { min_freq, max_size });
            vocab.save(&output).context("Failed to save vocab")?;
            println!(
                "Saved {} tokens from {} examples to {:?}",
                vocab.len(),
                train.len(),
                output
            );
        }
        Commands::Encode {
            vocab,
            kind,
            lowercase,
            text,
        } => {
            let vocab = Vocab::load(&vocab).context("Failed to load vocab")?;
            let tokenizer = build_tokenizer(kind, lowercase)?;
            let ids = vocab.encode(&tokenizer.tokenize(&text));
            println!("Encoded IDs: {:?}", ids);
        }
        Commands::Decode { vocab, ids } => {
            let vocab = Vocab::load(&vocab).context("Failed to load vocab")?;
            let tokens = vocab.decode(&parse_ids(&ids)?);
            println!("Decoded tokens: {}", tokens.join(" "));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("4, 1,0").unwrap(), vec![4, 1, 0]);
        assert!(parse_ids("4,x").is_err());
    }

    #[test]
    fn test_cli_parses_vocab_options() {
        let cli = Cli::try_parse_from([
            "tokenizer_cli",
            "build-vocab",
            "--dataset",
            "mr",
            "--kind",
            "spacy",
            "--min-freq",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::BuildVocab { dataset, kind, min_freq, max_size, .. } => {
                assert!(matches!(dataset, DatasetName::Mr));
                assert_eq!(kind, TokenizerKind::Rule);
                assert_eq!(min_freq, 2);
                assert!(max_size.is_none());
            }
            _ => panic!("expected build-vocab"),
        }
    }

    #[test]
    fn test_lowercase_tokenizer() {
        let tokenizer = build_tokenizer(TokenizerKind::Simple, true).unwrap();
        assert_eq!(tokenizer.tokenize("A Gem"), vec!["a", "gem"]);
    }
}
