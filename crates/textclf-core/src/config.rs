use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

fn check_dropout(name: &str, p: f64) -> Result<()> {
    if (0.0..1.0).contains(&p) {
        Ok(())
    } else {
        Err(ModelError::InvalidConfig(format!("{name} must be in [0, 1), got {p}")))
    }
}

fn check_positive(name: &str, v: i64) -> Result<()> {
    if v > 0 {
        Ok(())
    } else {
        Err(ModelError::InvalidConfig(format!("{name} must be positive, got {v}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Size of the input vocabulary.
    pub input_size: i64,
    /// Number of output classes.
    pub num_class: i64,
    /// Width of the token embeddings and every encoder state.
    pub hid_dim: i64,
    /// Number of encoder layers.
    pub n_layers: i64,
    /// Number of attention heads; must divide `hid_dim`.
    pub n_heads: i64,
    /// Inner width of the position-wise feed-forward block.
    pub pf_dim: i64,
    /// Dropout probability used throughout.
    pub dropout: f64,
    /// Hidden width of the classification head.
    pub mlp_dim: i64,
    /// Id whose embedding stays zero and which is masked out of attention.
    pub padding_idx: i64,
    /// Number of learned positions; longer inputs are truncated.
    pub max_length: i64,
    pub layer_norm_eps: f64,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            input_size: 0,
            num_class: 2,
            hid_dim: 512,
            n_layers: 6,
            n_heads: 8,
            pf_dim: 1024,
            dropout: 0.1,
            mlp_dim: 256,
            padding_idx: 0,
            max_length: 284,
            layer_norm_eps: 1e-5,
        }
    }
}

impl TransformerConfig {
    pub fn new(input_size: i64, num_class: i64) -> Self {
        Self {
            input_size,
            num_class,
            ..Default::default()
        }
    }

    pub fn head_dim(&self) -> i64 {
        self.hid_dim / self.n_heads
    }

    pub fn validate(&self) -> Result<()> {
        check_positive("input_size", self.input_size)?;
        check_positive("num_class", self.num_class)?;
        check_positive("hid_dim", self.hid_dim)?;
        check_positive("n_layers", self.n_layers)?;
        check_positive("n_heads", self.n_heads)?;
        check_positive("pf_dim", self.pf_dim)?;
        check_positive("mlp_dim", self.mlp_dim)?;
        check_positive("max_length", self.max_length)?;
        check_dropout("dropout", self.dropout)?;
        if self.hid_dim % self.n_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "hid_dim {} is not divisible by n_heads {}",
                self.hid_dim, self.n_heads
            )));
        }
        if self.padding_idx < 0 || self.padding_idx >= self.input_size {
            return Err(ModelError::InvalidConfig(format!(
                "padding_idx {} outside vocabulary of {}",
                self.padding_idx, self.input_size
            )));
        }
        Ok(())
    }
}

/// Recurrent neural filter: an LSTM run over every window of
/// `filter_width` tokens, max-pooled into a sentence vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RnfConfig {
    pub input_size: i64,
    pub num_class: i64,
    /// Embedding width; must match a pretrained matrix when one is given.
    pub embed_dim: i64,
    /// LSTM state size, i.e. the number of filters.
    pub hidden_size: i64,
    /// Tokens per window.
    pub filter_width: i64,
    pub embed_dropout: f64,
    pub dropout: f64,
    pub padding_idx: i64,
}

impl Default for RnfConfig {
    fn default() -> Self {
        Self {
            input_size: 0,
            num_class: 2,
            embed_dim: 300,
            hidden_size: 300,
            filter_width: 6,
            embed_dropout: 0.3,
            dropout: 0.3,
            padding_idx: 0,
        }
    }
}

impl RnfConfig {
    pub fn new(input_size: i64, num_class: i64) -> Self {
        Self {
            input_size,
            num_class,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_positive("input_size", self.input_size)?;
        check_positive("num_class", self.num_class)?;
        check_positive("embed_dim", self.embed_dim)?;
        check_positive("hidden_size", self.hidden_size)?;
        check_positive("filter_width", self.filter_width)?;
        check_dropout("embed_dropout", self.embed_dropout)?;
        check_dropout("dropout", self.dropout)?;
        if self.padding_idx < 0 || self.padding_idx >= self.input_size {
            return Err(ModelError::InvalidConfig(format!(
                "padding_idx {} outside vocabulary of {}",
                self.padding_idx, self.input_size
            )));
        }
        Ok(())
    }
}
