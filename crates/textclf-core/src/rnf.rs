use tch::nn::RNN;
use tch::{nn, Kind, Tensor};

use crate::classifier::Classifier;
use crate::config::RnfConfig;
use crate::error::{ModelError, Result};

/// Recurrent neural filter classifier.
///
/// Every window of `filter_width` consecutive tokens is read by one shared
/// LSTM; the final hidden state is that window's filter response. Responses
/// are max-pooled over the windows that start inside the sentence and the
/// pooled vector is classified by a linear layer.
pub struct RecurrentNeuralFilter {
    embedding: nn::Embedding,
    lstm: nn::LSTM,
    fc: nn::Linear,
    pub config: RnfConfig,
}

impl RecurrentNeuralFilter {
    /// `pretrained`, when given, must be an `[input_size, embed_dim]` matrix
    /// whose rows follow the vocabulary ids.
    pub fn new(vs: &nn::Path, config: &RnfConfig, pretrained: Option<&Tensor>) -> Result<Self> {
        config.validate()?;

        let embedding = nn::embedding(
            vs / "embedding",
            config.input_size,
            config.embed_dim,
            nn::EmbeddingConfig {
                padding_idx: config.padding_idx,
                ..Default::default()
            },
        );

        match pretrained {
            Some(matrix) => {
                let expected = vec![config.input_size, config.embed_dim];
                if matrix.size() != expected {
                    return Err(ModelError::ShapeMismatch {
                        name: "embedding.weight".to_string(),
                        expected,
                        actual: matrix.size(),
                    });
                }
                tch::no_grad(|| {
                    let mut ws = embedding.ws.shallow_clone();
                    ws.copy_(&matrix.to_kind(Kind::Float).to_device(ws.device()));
                });
            }
            // pad row starts at zero
            None => tch::no_grad(|| {
                embedding.ws.get(config.padding_idx).zero_();
            }),
        }

        let lstm = nn::lstm(vs / "rnn", config.embed_dim, config.hidden_size, Default::default());
        let fc = nn::linear(vs / "fc", config.hidden_size, config.num_class, Default::default());

        Ok(Self {
            embedding,
            lstm,
            fc,
            config: config.clone(),
        })
    }

    /// Right-pads batches shorter than one window.
    fn pad_to_window(&self, inputs: &Tensor) -> Tensor {
        let (b, t) = (inputs.size()[0], inputs.size()[1]);
        let k = self.config.filter_width;
        if t >= k {
            return inputs.shallow_clone();
        }
        let pad = Tensor::full(
            [b, k - t],
            self.config.padding_idx,
            (Kind::Int64, inputs.device()),
        );
        Tensor::cat(&[inputs.to_kind(Kind::Int64), pad], 1)
    }

    /// [batch, n_windows] mask, true for windows starting inside the text.
    fn window_mask(&self, inputs: &Tensor, n_windows: i64) -> Tensor {
        let lengths = inputs
            .ne(self.config.padding_idx)
            .sum_dim_intlist(Some(&[1][..]), false, Kind::Int64);
        let last_start = (lengths - self.config.filter_width).clamp_min(0).unsqueeze(1);
        let starts = Tensor::arange(n_windows, (Kind::Int64, inputs.device())).unsqueeze(0);
        starts.le_tensor(&last_start)
    }
}

impl Classifier for RecurrentNeuralFilter {
    fn forward_t(&self, inputs: &Tensor, train: bool) -> Tensor {
        let inputs = self.pad_to_window(inputs);
        let k = self.config.filter_width;
        let b = inputs.size()[0];

        // [B, T, E]
        let emb = inputs
            .apply(&self.embedding)
            .dropout(self.config.embed_dropout, train);

        // [B, W, E, k] -> [B * W, k, E]
        let windows = emb.unfold(1, k, 1).transpose(2, 3);
        let n_windows = windows.size()[1];
        let windows = windows
            .contiguous()
            .view([b * n_windows, k, self.config.embed_dim]);

        let (out, _) = self.lstm.seq(&windows);
        let responses = out
            .select(1, k - 1)
            .view([b, n_windows, self.config.hidden_size]);

        let mask = self.window_mask(&inputs, n_windows).unsqueeze(-1);
        let responses = responses.masked_fill(&mask.logical_not(), f64::NEG_INFINITY);
        let (pooled, _) = responses.max_dim(1, false);

        pooled
            .dropout(self.config.dropout, train)
            .apply(&self.fc)
    }

    fn num_classes(&self) -> i64 {
        self.config.num_class
    }

    fn name(&self) -> &'static str {
        "RNF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn small_config() -> RnfConfig {
        RnfConfig {
            embed_dim: 6,
            hidden_size: 5,
            filter_width: 3,
            ..RnfConfig::new(12, 2)
        }
    }

    #[test]
    fn test_logits_shape() {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = RecurrentNeuralFilter::new(&vs.root(), &small_config(), None).unwrap();
        let inputs = Tensor::from_slice(&[2i64, 3, 4, 5, 6, 7, 8, 0, 0, 0]).view([2, 5]);
        assert_eq!(model.forward_t(&inputs, true).size(), vec![2, 2]);
    }

    #[test]
    fn test_short_batches_are_padded() {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = RecurrentNeuralFilter::new(&vs.root(), &small_config(), None).unwrap();
        let short = Tensor::from_slice(&[3i64, 4]).view([1, 2]);
        let padded = Tensor::from_slice(&[3i64, 4, 0, 0, 0]).view([1, 5]);

        let a = model.forward_t(&short, false);
        let b = model.forward_t(&padded, false);
        assert_eq!(a.size(), vec![1, 2]);
        assert!((a - b).abs().max().double_value(&[]) < 1e-5);
    }

    #[test]
    fn test_trailing_padding_is_ignored() {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = RecurrentNeuralFilter::new(&vs.root(), &small_config(), None).unwrap();
        let plain = Tensor::from_slice(&[3i64, 4, 5, 6]).view([1, 4]);
        let padded = Tensor::from_slice(&[3i64, 4, 5, 6, 0, 0, 0]).view([1, 7]);

        let a = model.forward_t(&plain, false);
        let b = model.forward_t(&padded, false);
        assert!((a - b).abs().max().double_value(&[]) < 1e-5);
    }

    #[test]
    fn test_pad_row_starts_at_zero() {
        let vs = nn::VarStore::new(Device::Cpu);
        RecurrentNeuralFilter::new(&vs.root(), &small_config(), None).unwrap();
        let weight = vs.variables()["embedding.weight"].shallow_clone();
        assert_eq!(weight.get(0).abs().sum(Kind::Float).double_value(&[]), 0.0);
        assert!(weight.get(1).abs().sum(Kind::Float).double_value(&[]) > 0.0);
    }

    #[test]
    fn test_pretrained_embeddings() {
        let vs = nn::VarStore::new(Device::Cpu);
        let matrix = Tensor::ones([12, 6], (Kind::Float, Device::Cpu));
        RecurrentNeuralFilter::new(&vs.root(), &small_config(), Some(&matrix)).unwrap();

        let weight = vs.variables()["embedding.weight"].shallow_clone();
        assert!((weight - 1.0).abs().max().double_value(&[]) < 1e-6);
    }

    #[test]
    fn test_pretrained_shape_mismatch() {
        let vs = nn::VarStore::new(Device::Cpu);
        let matrix = Tensor::ones([10, 6], (Kind::Float, Device::Cpu));
        let err = RecurrentNeuralFilter::new(&vs.root(), &small_config(), Some(&matrix))
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }
}
