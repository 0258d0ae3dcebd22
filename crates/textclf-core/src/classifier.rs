use tch::{nn, Tensor};

/// A text classifier mapping padded token ids to class logits.
pub trait Classifier {
    /// inputs: [batch, seq_len] token ids
    /// Returns: [batch, num_classes] logits
    fn forward_t(&self, inputs: &Tensor, train: bool) -> Tensor;

    fn num_classes(&self) -> i64;

    fn name(&self) -> &'static str;
}

/// Number of scalar parameters that receive gradients.
pub fn trainable_parameters(vs: &nn::VarStore) -> i64 {
    vs.trainable_variables()
        .iter()
        .map(|t| t.size().iter().product::<i64>())
        .sum()
}

/// One-line description, e.g. `RNF (2 classes) | Trainable parameters: 1234`.
pub fn summary<M: Classifier + ?Sized>(model: &M, vs: &nn::VarStore) -> String {
    format!(
        "{} ({} classes) | Trainable parameters: {}",
        model.name(),
        model.num_classes(),
        trainable_parameters(vs)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RnfConfig;
    use crate::rnf::RecurrentNeuralFilter;
    use tch::Device;

    #[test]
    fn test_parameter_count() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = RnfConfig {
            embed_dim: 4,
            hidden_size: 3,
            filter_width: 2,
            ..RnfConfig::new(10, 2)
        };
        let model = RecurrentNeuralFilter::new(&vs.root(), &config, None).unwrap();

        // embedding + lstm (w_ih, w_hh, b_ih, b_hh) + linear
        let expected = 10 * 4 + (4 * 3 * 4 + 4 * 3 * 3 + 4 * 3 + 4 * 3) + (3 * 2 + 2);
        assert_eq!(trainable_parameters(&vs), expected);
        assert_eq!(
            summary(&model, &vs),
            format!("RNF (2 classes) | Trainable parameters: {expected}")
        );
    }
}
