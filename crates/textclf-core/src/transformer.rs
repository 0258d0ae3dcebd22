use tch::{nn, Kind, Tensor};

use crate::attention::MultiHeadAttention;
use crate::classifier::Classifier;
use crate::config::TransformerConfig;
use crate::error::Result;
use crate::layer_norm::LayerNorm;

/// Position-wise feed-forward block: Linear -> ReLU -> Dropout -> Linear
pub struct PositionwiseFeedforward {
    fc_1: nn::Linear,
    fc_2: nn::Linear,
    dropout: f64,
}

impl PositionwiseFeedforward {
    pub fn new(vs: &nn::Path, hid_dim: i64, pf_dim: i64, dropout: f64) -> Self {
        let fc_1 = nn::linear(vs / "fc_1", hid_dim, pf_dim, Default::default());
        let fc_2 = nn::linear(vs / "fc_2", pf_dim, hid_dim, Default::default());

        Self { fc_1, fc_2, dropout }
    }

    /// x: [batch, seq_len, hid_dim]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        x.apply(&self.fc_1)
            .relu()
            .dropout(self.dropout, train)
            .apply(&self.fc_2)
    }
}

/// Encoder layer with post-norm residual connections.
pub struct EncoderLayer {
    attn_layer_norm: LayerNorm,
    ff_layer_norm: LayerNorm,
    attn: MultiHeadAttention,
    positionwise_feedforward: PositionwiseFeedforward,
    dropout: f64,
}

impl EncoderLayer {
    pub fn new(vs: &nn::Path, config: &TransformerConfig) -> Self {
        let hid = config.hid_dim;
        Self {
            attn_layer_norm: LayerNorm::new(&(vs / "attn_layer_norm"), hid, config.layer_norm_eps),
            ff_layer_norm: LayerNorm::new(&(vs / "ff_layer_norm"), hid, config.layer_norm_eps),
            attn: MultiHeadAttention::new(&(vs / "attn"), hid, config.n_heads, config.dropout),
            positionwise_feedforward: PositionwiseFeedforward::new(
                &(vs / "positionwise_feedforward"),
                hid,
                config.pf_dim,
                config.dropout,
            ),
            dropout: config.dropout,
        }
    }

    pub fn forward_t(&self, src: &Tensor, src_mask: &Tensor, train: bool) -> Tensor {
        let (attended, _) = self.attn.forward_t(src, src, src, Some(src_mask), train);
        let src = self
            .attn_layer_norm
            .forward(&(src + attended.dropout(self.dropout, train)));

        let fed = self.positionwise_feedforward.forward_t(&src, train);
        self.ff_layer_norm
            .forward(&(&src + fed.dropout(self.dropout, train)))
    }
}

/// Transformer encoder classifier. The class is read off the state at the
/// first position.
pub struct TransformerClassifier {
    tok_embedding: nn::Embedding,
    pos_embedding: nn::Embedding,
    layers: Vec<EncoderLayer>,
    fc_1: nn::Linear,
    fc_2: nn::Linear,
    scale: f64,
    pub config: TransformerConfig,
}

impl TransformerClassifier {
    pub fn new(vs: &nn::Path, config: &TransformerConfig) -> Result<Self> {
        config.validate()?;

        let tok_embedding = nn::embedding(
            vs / "tok_embedding",
            config.input_size,
            config.hid_dim,
            nn::EmbeddingConfig {
                padding_idx: config.padding_idx,
                ..Default::default()
            },
        );
        // pad row starts at zero
        tch::no_grad(|| {
            tok_embedding.ws.get(config.padding_idx).zero_();
        });
        let pos_embedding = nn::embedding(
            vs / "pos_embedding",
            config.max_length,
            config.hid_dim,
            Default::default(),
        );

        let layers = (0..config.n_layers)
            .map(|i| EncoderLayer::new(&(vs / "layers" / i), config))
            .collect();

        let fc_1 = nn::linear(vs / "fc" / "0", config.hid_dim, config.mlp_dim, Default::default());
        let fc_2 = nn::linear(vs / "fc" / "3", config.mlp_dim, config.num_class, Default::default());

        Ok(Self {
            tok_embedding,
            pos_embedding,
            layers,
            fc_1,
            fc_2,
            scale: (config.hid_dim as f64).sqrt(),
            config: config.clone(),
        })
    }

    /// src: [batch, src_len] -> [batch, 1, 1, src_len], true where not padding
    pub fn make_src_mask(&self, src: &Tensor) -> Tensor {
        src.ne(self.config.padding_idx).unsqueeze(1).unsqueeze(2)
    }
}

impl Classifier for TransformerClassifier {
    fn forward_t(&self, inputs: &Tensor, train: bool) -> Tensor {
        let src_len = inputs.size()[1].min(self.config.max_length);
        let src = inputs.narrow(1, 0, src_len);
        let src_mask = self.make_src_mask(&src);

        let pos = Tensor::arange(src_len, (Kind::Int64, src.device())).unsqueeze(0);

        let tok = src.apply(&self.tok_embedding) * self.scale;
        let mut x = (tok + pos.apply(&self.pos_embedding)).dropout(self.config.dropout, train);

        for layer in &self.layers {
            x = layer.forward_t(&x, &src_mask, train);
        }

        x.select(1, 0)
            .apply(&self.fc_1)
            .relu()
            .dropout(self.config.dropout, train)
            .apply(&self.fc_2)
    }

    fn num_classes(&self) -> i64 {
        self.config.num_class
    }

    fn name(&self) -> &'static str {
        "Transformer"
    }
}
