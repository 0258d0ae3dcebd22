use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::dataset::TextDataset;
use crate::encoder::{Batch, BatchEncoder};
use crate::error::{DataError, Result};
use crate::example::Example;

/// Bundles the splits of an experiment with the encoder that collates them.
pub struct DataModule {
    pub train: TextDataset,
    pub val: Option<TextDataset>,
    pub test: Option<TextDataset>,
    encoder: Box<dyn BatchEncoder>,
    pub batch_size: usize,
    seed: u64,
    epoch: u64,
}

impl DataModule {
    pub fn new(train: TextDataset, encoder: Box<dyn BatchEncoder>) -> Self {
        Self {
            train,
            val: None,
            test: None,
            encoder,
            batch_size: 16,
            seed: 42,
            epoch: 0,
        }
    }

    pub fn with_val(mut self, val: TextDataset) -> Self {
        self.val = Some(val);
        self
    }

    pub fn with_test(mut self, test: TextDataset) -> Self {
        self.test = Some(test);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Shuffled batches over the training split. Every call draws a new
    /// permutation, reproducible from the module's seed.
    pub fn train_dataloader(&mut self) -> DataLoader<'_> {
        let mut order: Vec<usize> = (0..self.train.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch));
        order.shuffle(&mut rng);
        self.epoch += 1;
        DataLoader::new(&self.train, self.encoder.as_ref(), order, self.batch_size)
    }

    pub fn val_dataloader(&self) -> Result<DataLoader<'_>> {
        let val = self.val.as_ref().ok_or(DataError::MissingSplit("validation"))?;
        Ok(DataLoader::sequential(val, self.encoder.as_ref(), self.batch_size))
    }

    pub fn test_dataloader(&self) -> Result<DataLoader<'_>> {
        let test = self.test.as_ref().ok_or(DataError::MissingSplit("test"))?;
        Ok(DataLoader::sequential(test, self.encoder.as_ref(), self.batch_size))
    }
}

/// Iterates a dataset in batches of `batch_size`; the last batch may be short.
pub struct DataLoader<'a> {
    dataset: &'a TextDataset,
    encoder: &'a dyn BatchEncoder,
    order: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl<'a> DataLoader<'a> {
    pub fn new(
        dataset: &'a TextDataset,
        encoder: &'a dyn BatchEncoder,
        order: Vec<usize>,
        batch_size: usize,
    ) -> Self {
        Self {
            dataset,
            encoder,
            order,
            batch_size: batch_size.max(1),
            pos: 0,
        }
    }

    pub fn sequential(dataset: &'a TextDataset, encoder: &'a dyn BatchEncoder, batch_size: usize) -> Self {
        Self::new(dataset, encoder, (0..dataset.len()).collect(), batch_size)
    }

    /// Number of batches in a full pass.
    pub fn len(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<'a> Iterator for DataLoader<'a> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let items: Vec<&Example> = self.order[self.pos..end]
            .iter()
            .map(|&i| &self.dataset[i])
            .collect();
        self.pos = end;
        Some(self.encoder.encode_batch(&items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetAttributes;
    use crate::encoder::{sentiment_target_encoding, PaddingEncoder};
    use tch::Device;
    use tokenizer::VocabConfig;

    fn dataset(n: usize) -> TextDataset {
        let examples = (0..n)
            .map(|i| Example {
                text: vec![format!("w{i}")],
                label: if i % 2 == 0 { "positive" } else { "negative" }.to_string(),
            })
            .collect();
        TextDataset::new(examples, DatasetAttributes::default())
    }

    fn module(n: usize) -> DataModule {
        let train = dataset(n);
        let vocab = train.build_vocab(&VocabConfig::default());
        let encoder = PaddingEncoder::new(vocab, sentiment_target_encoding(false), Device::Cpu);
        DataModule::new(train, Box::new(encoder)).with_batch_size(4)
    }

    fn first_ids(loader: DataLoader<'_>) -> Vec<i64> {
        loader
            .flat_map(|b| Vec::<i64>::try_from(&b.unwrap().inputs.view([-1])).unwrap())
            .collect()
    }

    #[test]
    fn test_batch_count_and_short_tail() {
        let mut dm = module(10);
        let loader = dm.train_dataloader();
        assert_eq!(loader.len(), 3);
        let sizes: Vec<i64> = loader.map(|b| b.unwrap().size()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_train_shuffle_is_seeded_and_varies_per_epoch() {
        let mut a = module(32);
        let mut b = module(32);
        let a1 = first_ids(a.train_dataloader());
        let b1 = first_ids(b.train_dataloader());
        assert_eq!(a1, b1);

        let a2 = first_ids(a.train_dataloader());
        assert_ne!(a1, a2);

        let mut sorted = a2.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 32);
    }

    #[test]
    fn test_val_is_ordered() {
        let dm = module(4).with_val(dataset(6));
        let ids = first_ids(dm.val_dataloader().unwrap());
        let vocab = dm.train.build_vocab(&VocabConfig::default());
        let expected: Vec<i64> = (0..6)
            .map(|i| vocab.get_id(&format!("w{i}")).map_or(tokenizer::UNK_ID, i64::from))
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_missing_splits() {
        let dm = module(4);
        assert!(matches!(dm.val_dataloader(), Err(DataError::MissingSplit("validation"))));
        assert!(matches!(dm.test_dataloader(), Err(DataError::MissingSplit("test"))));
    }
}
