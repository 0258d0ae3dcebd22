use std::collections::HashMap;
use tch::{Device, Tensor};
use tokenizer::{Vocab, PAD_ID};

use crate::error::{DataError, Result};
use crate::example::Example;

/// A collated mini-batch.
#[derive(Debug)]
pub struct Batch {
    /// Token ids, right-padded with `<pad>`: `[batch, seq_len]`.
    pub inputs: Tensor,
    /// Class indices: `[batch]`.
    pub targets: Tensor,
}

impl Batch {
    pub fn size(&self) -> i64 {
        self.targets.size()[0]
    }
}

/// Turns a slice of examples into tensors.
pub trait BatchEncoder: Send + Sync {
    fn encode_batch(&self, batch: &[&Example]) -> Result<Batch>;
}

/// Maps tokens through a vocabulary and pads every sequence to the longest
/// one in the batch.
pub struct PaddingEncoder {
    vocab: Vocab,
    target_encoding: HashMap<String, i64>,
    device: Device,
}

impl PaddingEncoder {
    pub fn new(vocab: Vocab, target_encoding: HashMap<String, i64>, device: Device) -> Self {
        Self {
            vocab,
            target_encoding,
            device,
        }
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn num_classes(&self) -> usize {
        self.target_encoding.len()
    }

    fn encode_target(&self, label: &str) -> Result<i64> {
        self.target_encoding
            .get(label)
            .copied()
            .ok_or_else(|| DataError::UnknownLabel(label.to_string()))
    }
}

impl BatchEncoder for PaddingEncoder {
    fn encode_batch(&self, batch: &[&Example]) -> Result<Batch> {
        if batch.is_empty() {
            return Err(DataError::EmptyBatch);
        }

        let encoded: Vec<Vec<i64>> = batch.iter().map(|ex| self.vocab.encode(&ex.text)).collect();
        let targets: Vec<i64> = batch
            .iter()
            .map(|ex| self.encode_target(&ex.label))
            .collect::<Result<_>>()?;

        // an all-empty batch still gets one (pad) column
        let seq_len = encoded.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let mut flat = Vec::with_capacity(batch.len() * seq_len);
        for ids in &encoded {
            flat.extend_from_slice(ids);
            flat.extend(std::iter::repeat(PAD_ID).take(seq_len - ids.len()));
        }

        let inputs = Tensor::from_slice(&flat)
            .view([batch.len() as i64, seq_len as i64])
            .to(self.device);
        let targets = Tensor::from_slice(&targets).to(self.device);

        Ok(Batch { inputs, targets })
    }
}

/// `{"negative": 0, "positive": 1}` or the five fine-grained classes.
pub fn sentiment_target_encoding(fine_grained: bool) -> HashMap<String, i64> {
    let labels: &[&str] = if fine_grained {
        &["very negative", "negative", "neutral", "positive", "very positive"]
    } else {
        &["negative", "positive"]
    };
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.to_string(), i as i64))
        .collect()
}
