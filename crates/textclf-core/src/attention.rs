use tch::{nn, Kind, Tensor};

/// Energy given to masked key positions before the softmax.
const MASKED_ENERGY: f64 = -1e10;

pub struct ScaledDotProductAttention {
    scale: f64,
    dropout: f64,
}

impl ScaledDotProductAttention {
    pub fn new(scale: f64, dropout: f64) -> Self {
        Self { scale, dropout }
    }

    /// q: [.., q_len, d], k/v: [.., k_len, d]
    /// mask: boolean, broadcastable to [.., q_len, k_len]; false = ignore key
    /// Returns (output [.., q_len, d], attention [.., q_len, k_len]).
    pub fn forward_t(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        train: bool,
    ) -> (Tensor, Tensor) {
        let energy = q.matmul(&k.transpose(-2, -1)) / self.scale;
        let energy = match mask {
            Some(mask) => energy.masked_fill(&mask.logical_not(), MASKED_ENERGY),
            None => energy,
        };

        let attention = energy.softmax(-1, Kind::Float).dropout(self.dropout, train);
        let output = attention.matmul(v);
        (output, attention)
    }
}

/// Multi-head attention with bias-free projection matrices.
pub struct MultiHeadAttention {
    q_proj_weight: Tensor,
    k_proj_weight: Tensor,
    v_proj_weight: Tensor,
    out_proj: Tensor,
    hid_dim: i64,
    n_heads: i64,
    head_dim: i64,
    attention: ScaledDotProductAttention,
}

impl MultiHeadAttention {
    pub fn new(vs: &nn::Path, hid_dim: i64, n_heads: i64, dropout: f64) -> Self {
        assert!(hid_dim % n_heads == 0, "hid_dim must be divisible by n_heads");
        let head_dim = hid_dim / n_heads;

        let init = nn::Init::Randn {
            mean: 0.0,
            stdev: 1.0 / (hid_dim as f64).sqrt(),
        };
        let q_proj_weight = vs.var("q_proj_weight", &[hid_dim, hid_dim], init);
        let k_proj_weight = vs.var("k_proj_weight", &[hid_dim, hid_dim], init);
        let v_proj_weight = vs.var("v_proj_weight", &[hid_dim, hid_dim], init);
        let out_proj = vs.var("out_proj", &[hid_dim, hid_dim], init);

        Self {
            q_proj_weight,
            k_proj_weight,
            v_proj_weight,
            out_proj,
            hid_dim,
            n_heads,
            head_dim,
            attention: ScaledDotProductAttention::new((head_dim as f64).sqrt(), dropout),
        }
    }

    /// [batch, len, hid] -> [batch, heads, len, head_dim]
    fn split_heads(&self, x: &Tensor) -> Tensor {
        let b = x.size()[0];
        x.view([b, -1, self.n_heads, self.head_dim]).transpose(1, 2)
    }

    pub fn forward_t(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
        train: bool,
    ) -> (Tensor, Tensor) {
        let b = query.size()[0];

        let q = self.split_heads(&query.matmul(&self.q_proj_weight));
        let k = self.split_heads(&key.matmul(&self.k_proj_weight));
        let v = self.split_heads(&value.matmul(&self.v_proj_weight));

        let (output, attention) = self.attention.forward_t(&q, &k, &v, mask, train);

        let x = output.transpose(1, 2).contiguous().view([b, -1, self.hid_dim]);
        (x.matmul(&self.out_proj), attention)
    }
}
