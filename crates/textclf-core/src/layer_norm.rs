use tch::{nn, Kind, Tensor};

#[derive(Debug)]
pub struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    eps: f64,
}

impl LayerNorm {
    pub fn new(vs: &nn::Path, dim: i64, eps: f64) -> Self {
        let weight = vs.var("weight", &[dim], nn::Init::Const(1.0));
        let bias = vs.var("bias", &[dim], nn::Init::Const(0.0));
        Self { weight, bias, eps }
    }

    /// Normalizes over the last dimension.
    /// x: [batch, seq_len, dim]
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let mean = x.mean_dim(Some(&[-1][..]), true, Kind::Float);
        let centered = x - mean;
        let var = centered
            .pow_tensor_scalar(2.0)
            .mean_dim(Some(&[-1][..]), true, Kind::Float);

        let normed = centered * (var + self.eps).rsqrt();
        normed * &self.weight + &self.bias
    }
}
