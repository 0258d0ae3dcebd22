use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{Result, TokenizerError};

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_ID: i64 = 0;
pub const UNK_ID: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabConfig {
    /// Tokens seen fewer times than this are mapped to `<unk>`.
    pub min_freq: usize,
    /// Cap on the number of corpus tokens (specials not included).
    pub max_size: Option<usize>,
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            min_freq: 1,
            max_size: None,
        }
    }
}

/// Token <-> id mapping built from a training corpus.
///
/// Id 0 is always `<pad>` and id 1 is always `<unk>`. Corpus tokens follow in
/// order of descending frequency, ties broken lexicographically, so the same
/// corpus always yields the same ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocab {
    pub token_to_id: HashMap<String, u32>,
    pub id_to_token: Vec<String>,
    #[serde(default)]
    pub freqs: HashMap<String, usize>,
}

impl Vocab {
    /// A vocabulary holding only the special tokens.
    pub fn new() -> Self {
        let mut vocab = Self {
            token_to_id: HashMap::new(),
            id_to_token: Vec::new(),
            freqs: HashMap::new(),
        };
        vocab.push(PAD_TOKEN.to_string());
        vocab.push(UNK_TOKEN.to_string());
        vocab
    }

    pub fn build<'a, I, S>(corpus: I, config: &VocabConfig) -> Self
    where
        I: IntoIterator<Item = &'a [S]>,
        S: AsRef<str> + 'a,
    {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for tokens in corpus {
            for token in tokens {
                *counts.entry(token.as_ref().to_string()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(token, count)| {
                *count >= config.min_freq && token != PAD_TOKEN && token != UNK_TOKEN
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max) = config.max_size {
            ranked.truncate(max);
        }

        let mut vocab = Self::new();
        for (token, count) in ranked {
            vocab.freqs.insert(token.clone(), count);
            vocab.push(token);
        }
        log::debug!("Built vocabulary with {} tokens", vocab.len());
        vocab
    }

    fn push(&mut self, token: String) {
        let id = self.id_to_token.len() as u32;
        self.token_to_id.insert(token.clone(), id);
        self.id_to_token.push(token);
    }

    pub fn get_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn get_token(&self, id: u32) -> Option<&String> {
        self.id_to_token.get(id as usize)
    }

    /// Corpus frequency recorded at build time.
    pub fn freq(&self, token: &str) -> usize {
        self.freqs.get(token).copied().unwrap_or(0)
    }

    /// Maps tokens to ids, sending out-of-vocabulary tokens to `<unk>`.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<i64> {
        tokens
            .iter()
            .map(|t| self.get_id(t.as_ref()).map_or(UNK_ID, i64::from))
            .collect()
    }

    pub fn decode(&self, ids: &[i64]) -> Vec<String> {
        ids.iter()
            .map(|&id| {
                u32::try_from(id)
                    .ok()
                    .and_then(|id| self.get_token(id))
                    .cloned()
                    .unwrap_or_else(|| UNK_TOKEN.to_string())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut vocab: Vocab = serde_json::from_reader(reader)?;

        // ids are positional, rebuild the reverse map from the table
        vocab.token_to_id = vocab
            .id_to_token
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();

        if vocab.get_id(PAD_TOKEN) != Some(PAD_ID as u32) {
            return Err(TokenizerError::MissingSpecial(PAD_TOKEN));
        }
        if vocab.get_id(UNK_TOKEN) != Some(UNK_ID as u32) {
            return Err(TokenizerError::MissingSpecial(UNK_TOKEN));
        }
        Ok(vocab)
    }
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}
