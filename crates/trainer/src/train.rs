use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tch::{nn, nn::OptimizerConfig};

use datasets::{DataError, DataLoader, DataModule};
use textclf_core::{load_safetensors, save_safetensors, Classifier};

use crate::callback::{CallbackAction, CallbackContext, EarlyStopping, TrainerCallback};
use crate::error::{Result, TrainError};
use crate::TrainerConfig;

/// Seeds libtorch and returns an RNG derived from the same seed.
pub fn seed_everything(seed: u64) -> StdRng {
    tch::manual_seed(seed as i64);
    log::info!("Global seed set to {}", seed);
    StdRng::seed_from_u64(seed)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EvalMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub examples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    pub epochs_run: usize,
    pub best_score: Option<f64>,
    pub best_checkpoint: Option<PathBuf>,
    pub history: Vec<EpochRecord>,
}

/// Cross-entropy loss and accuracy over a loader, averaged per example.
pub fn evaluate<M: Classifier + ?Sized>(model: &M, loader: DataLoader<'_>) -> Result<EvalMetrics> {
    tch::no_grad(|| {
        let mut loss = 0.0;
        let mut correct = 0.0;
        let mut examples = 0usize;

        for batch in loader {
            let batch = batch?;
            let n = batch.size();
            let logits = model.forward_t(&batch.inputs, false);
            loss += logits.cross_entropy_for_logits(&batch.targets).double_value(&[]) * n as f64;
            correct += logits.accuracy_for_logits(&batch.targets).double_value(&[]) * n as f64;
            examples += n as usize;
        }

        if examples == 0 {
            return Err(TrainError::EmptySplit("evaluation"));
        }
        Ok(EvalMetrics {
            loss: loss / examples as f64,
            accuracy: correct / examples as f64,
            examples,
        })
    })
}

pub struct Trainer {
    config: TrainerConfig,
    callbacks: Vec<Box<dyn TrainerCallback>>,
}

impl Trainer {
    /// Early stopping is registered from the config when it is enabled.
    pub fn new(config: TrainerConfig) -> Self {
        let mut callbacks: Vec<Box<dyn TrainerCallback>> = Vec::new();
        if let Some(es) = &config.early_stopping {
            callbacks.push(Box::new(
                EarlyStopping::new(es.patience, es.min_delta).with_monitor(config.monitor),
            ));
        }
        Self { config, callbacks }
    }

    pub fn with_callback(mut self, callback: Box<dyn TrainerCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Trains `model` (whose variables live in `vs`) on the data module's
    /// train split, validating after every epoch.
    ///
    /// The best epoch by the monitored metric is kept as the only checkpoint
    /// in `checkpoint_dir`.
    pub fn fit<M: Classifier + ?Sized>(
        &mut self,
        model: &M,
        vs: &nn::VarStore,
        dm: &mut DataModule,
    ) -> Result<FitSummary> {
        let mut optimizer = nn::Adam::default().build(vs, self.config.learning_rate)?;
        let monitor = self.config.monitor;

        let mut ctx = CallbackContext {
            max_epochs: self.config.max_epochs,
            ..Default::default()
        };
        for cb in self.callbacks.iter_mut() {
            cb.on_train_begin(&ctx);
        }

        log::info!(
            "Starting training for {} epochs with configuration: {:?}",
            self.config.max_epochs,
            self.config
        );

        let mut summary = FitSummary {
            epochs_run: 0,
            best_score: None,
            best_checkpoint: None,
            history: Vec::new(),
        };

        for epoch in 0..self.config.max_epochs {
            let mut total_loss = 0.0;
            let mut seen = 0usize;

            let loader = dm.train_dataloader();
            let num_batches = loader.len();
            for (step, batch) in loader.enumerate() {
                let batch = batch?;
                let logits = model.forward_t(&batch.inputs, true);
                let loss = logits.cross_entropy_for_logits(&batch.targets);

                let loss_val = loss.double_value(&[]);
                if !loss_val.is_finite() {
                    return Err(TrainError::NonFiniteLoss { epoch, step });
                }

                match self.config.grad_clip {
                    Some(max_norm) => optimizer.backward_step_clip_norm(&loss, max_norm),
                    None => optimizer.backward_step(&loss),
                }

                total_loss += loss_val * batch.size() as f64;
                seen += batch.size() as usize;

                if self.config.log_every_n_steps > 0 && step % self.config.log_every_n_steps == 0 {
                    log::debug!(
                        "Epoch {} | Batch {}/{} | Loss: {:.4}",
                        epoch,
                        step,
                        num_batches,
                        loss_val
                    );
                }
            }

            if seen == 0 {
                return Err(TrainError::EmptySplit("train"));
            }

            let val = match dm.val_dataloader() {
                Ok(loader) => Some(evaluate(model, loader)?),
                Err(DataError::MissingSplit(_)) => None,
                Err(e) => return Err(e.into()),
            };

            ctx.epoch = epoch;
            ctx.train_loss = total_loss / seen as f64;
            ctx.val_loss = val.map(|m| m.loss);
            ctx.val_accuracy = val.map(|m| m.accuracy);

            log::info!(
                "Epoch {} | train_loss {:.4} | val_loss {} | val_acc {}",
                epoch,
                ctx.train_loss,
                fmt_metric(ctx.val_loss),
                fmt_metric(ctx.val_accuracy)
            );

            summary.epochs_run = epoch + 1;
            summary.history.push(EpochRecord {
                epoch,
                train_loss: ctx.train_loss,
                val_loss: ctx.val_loss,
                val_accuracy: ctx.val_accuracy,
            });

            match ctx.metric(monitor) {
                Some(score) if is_better(score, summary.best_score, monitor.higher_is_better()) => {
                    let path = self.save_checkpoint(vs, epoch, summary.best_checkpoint.as_deref())?;
                    summary.best_score = Some(score);
                    summary.best_checkpoint = Some(path);
                }
                Some(_) => {}
                None => log::warn!("Monitored metric {:?} is unavailable; not checkpointing", monitor),
            }

            let actions: Vec<CallbackAction> = self
                .callbacks
                .iter_mut()
                .map(|cb| cb.on_epoch_end(&ctx))
                .collect();

            if actions.contains(&CallbackAction::Prune) {
                for cb in self.callbacks.iter_mut() {
                    cb.on_train_end(&ctx);
                }
                return Err(TrainError::Pruned { epoch });
            }
            if actions.contains(&CallbackAction::Stop) {
                break;
            }
        }

        for cb in self.callbacks.iter_mut() {
            cb.on_train_end(&ctx);
        }
        Ok(summary)
    }

    /// Evaluates `model` on `loader`, first restoring `checkpoint` into `vs`
    /// when one is given.
    pub fn test<M: Classifier + ?Sized>(
        &self,
        model: &M,
        vs: &mut nn::VarStore,
        loader: DataLoader<'_>,
        checkpoint: Option<&Path>,
    ) -> Result<EvalMetrics> {
        if let Some(path) = checkpoint {
            load_safetensors(vs, path)?;
            log::info!("Restored weights from {:?}", path);
        }

        let metrics = evaluate(model, loader)?;
        log::info!(
            "Test | loss {:.4} | accuracy {:.4} | {} examples",
            metrics.loss,
            metrics.accuracy,
            metrics.examples
        );
        Ok(metrics)
    }

    fn save_checkpoint(&self, vs: &nn::VarStore, epoch: usize, previous: Option<&Path>) -> Result<PathBuf> {
        let dir = PathBuf::from(&self.config.checkpoint_dir);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let path = dir.join(format!("epoch={}.safetensors", epoch));
        save_safetensors(vs, &path)?;

        if let Some(previous) = previous {
            if previous != path {
                if let Err(e) = fs::remove_file(previous) {
                    log::warn!("Could not remove old checkpoint {:?}: {}", previous, e);
                }
            }
        }

        log::debug!("Saved checkpoint to {:?}", path);
        Ok(path)
    }
}

fn is_better(score: f64, best: Option<f64>, higher_is_better: bool) -> bool {
    match best {
        None => true,
        Some(best) if higher_is_better => score > best,
        Some(best) => score < best,
    }
}

fn fmt_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EarlyStoppingConfig, Monitor};
    use datasets::{sentiment_target_encoding, DatasetAttributes, Example, PaddingEncoder, TextDataset};
    use tch::Device;
    use textclf_core::{RecurrentNeuralFilter, RnfConfig};
    use tokenizer::VocabConfig;

    fn dataset(n: usize) -> TextDataset {
        let examples = (0..n)
            .map(|i| {
                let (word, label) = if i % 2 == 0 { ("good", "positive") } else { ("bad", "negative") };
                Example {
                    text: vec!["a".to_string(), word.to_string(), "film".to_string()],
                    label: label.to_string(),
                }
            })
            .collect();
        TextDataset::new(examples, DatasetAttributes::default())
    }

    fn data_module() -> DataModule {
        let train = dataset(16);
        let vocab = train.build_vocab(&VocabConfig::default());
        let encoder = PaddingEncoder::new(vocab, sentiment_target_encoding(false), Device::Cpu);
        DataModule::new(train, Box::new(encoder))
            .with_val(dataset(6))
            .with_batch_size(4)
    }

    fn model(vs: &nn::VarStore, dm: &DataModule) -> RecurrentNeuralFilter {
        let config = RnfConfig {
            embed_dim: 8,
            hidden_size: 8,
            filter_width: 2,
            embed_dropout: 0.0,
            dropout: 0.0,
            ..RnfConfig::new(dm.train.build_vocab(&VocabConfig::default()).len() as i64, 2)
        };
        RecurrentNeuralFilter::new(&vs.root(), &config, None).unwrap()
    }

    fn config(dir: &Path, max_epochs: usize) -> TrainerConfig {
        TrainerConfig {
            learning_rate: 1e-2,
            max_epochs,
            checkpoint_dir: dir.join("ckpt").to_string_lossy().into_owned(),
            early_stopping: None,
            ..Default::default()
        }
    }

    struct PruneAt(usize);

    impl TrainerCallback for PruneAt {
        fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
            if ctx.epoch == self.0 {
                CallbackAction::Prune
            } else {
                CallbackAction::Continue
            }
        }
    }

    #[test]
    fn test_fit_keeps_single_best_checkpoint() {
        tch::manual_seed(0);
        let dir = tempfile::tempdir().unwrap();
        let mut dm = data_module();
        let mut vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs, &dm);

        let mut trainer = Trainer::new(config(dir.path(), 20));
        let summary = trainer.fit(&model, &vs, &mut dm).unwrap();

        assert_eq!(summary.epochs_run, 20);
        assert_eq!(summary.history.len(), 20);
        assert!(summary.history[0].train_loss > summary.history[19].train_loss);

        let best = summary.best_checkpoint.clone().unwrap();
        assert!(best.exists());
        let files = fs::read_dir(dir.path().join("ckpt")).unwrap().count();
        assert_eq!(files, 1);

        let best_loss = summary
            .history
            .iter()
            .filter_map(|r| r.val_loss)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(summary.best_score, Some(best_loss));

        let loader = dm.val_dataloader().unwrap();
        let metrics = trainer.test(&model, &mut vs, loader, Some(&best)).unwrap();
        assert_eq!(metrics.examples, 6);
        assert!((metrics.loss - best_loss).abs() < 1e-5);
    }

    #[test]
    fn test_prune_callback_aborts_fit() {
        let dir = tempfile::tempdir().unwrap();
        let mut dm = data_module();
        let vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs, &dm);

        let mut trainer = Trainer::new(config(dir.path(), 5)).with_callback(Box::new(PruneAt(1)));
        let err = trainer.fit(&model, &vs, &mut dm).unwrap_err();
        assert!(matches!(err, TrainError::Pruned { epoch: 1 }));
    }

    #[test]
    fn test_early_stopping_ends_fit() {
        let dir = tempfile::tempdir().unwrap();
        let mut dm = data_module();
        let vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs, &dm);

        let trainer_config = TrainerConfig {
            // nothing can improve by this much, so the run stops after patience
            early_stopping: Some(EarlyStoppingConfig {
                patience: 2,
                min_delta: 1e6,
            }),
            ..config(dir.path(), 10)
        };
        let summary = Trainer::new(trainer_config).fit(&model, &vs, &mut dm).unwrap();
        assert_eq!(summary.epochs_run, 3);
    }

    #[test]
    fn test_without_val_split_monitors_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let train = dataset(8);
        let vocab = train.build_vocab(&VocabConfig::default());
        let encoder = PaddingEncoder::new(vocab, sentiment_target_encoding(false), Device::Cpu);
        let mut dm = DataModule::new(train, Box::new(encoder));
        let vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs, &dm);

        let summary = Trainer::new(config(dir.path(), 2)).fit(&model, &vs, &mut dm).unwrap();
        assert!(summary.best_checkpoint.is_none());
        assert!(summary.history.iter().all(|r| r.val_loss.is_none()));

        let trainer_config = TrainerConfig {
            monitor: Monitor::TrainLoss,
            ..config(dir.path(), 2)
        };
        let summary = Trainer::new(trainer_config).fit(&model, &vs, &mut dm).unwrap();
        assert!(summary.best_checkpoint.is_some());
    }

    /// Emits NaN logits while still owning a trainable variable.
    struct NanModel {
        bias: tch::Tensor,
    }

    impl NanModel {
        fn new(vs: &nn::VarStore) -> Self {
            Self {
                bias: vs.root().zeros("bias", &[2]),
            }
        }
    }

    impl Classifier for NanModel {
        fn forward_t(&self, inputs: &tch::Tensor, _train: bool) -> tch::Tensor {
            let batch = inputs.size()[0];
            tch::Tensor::full([batch, 2], f64::NAN, (tch::Kind::Float, Device::Cpu)) + &self.bias
        }

        fn num_classes(&self) -> i64 {
            2
        }

        fn name(&self) -> &'static str {
            "NaN"
        }
    }

    #[test]
    fn test_nan_loss_stops_fit() {
        let dir = tempfile::tempdir().unwrap();
        let mut dm = data_module();
        let vs = nn::VarStore::new(Device::Cpu);
        let model = NanModel::new(&vs);

        let err = Trainer::new(config(dir.path(), 3)).fit(&model, &vs, &mut dm).unwrap_err();
        assert!(matches!(err, TrainError::NonFiniteLoss { epoch: 0, step: 0 }));
        assert!(!dir.path().join("ckpt").exists());
    }

    #[test]
    fn test_empty_train_split() {
        let dir = tempfile::tempdir().unwrap();
        let vocab = dataset(4).build_vocab(&VocabConfig::default());
        let encoder = PaddingEncoder::new(vocab, sentiment_target_encoding(false), Device::Cpu);
        let mut dm = DataModule::new(dataset(0), Box::new(encoder)).with_val(dataset(4));
        let vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs, &data_module());

        let err = Trainer::new(config(dir.path(), 2)).fit(&model, &vs, &mut dm).unwrap_err();
        assert!(matches!(err, TrainError::EmptySplit("train")));
    }

    #[test]
    fn test_empty_val_split() {
        let dir = tempfile::tempdir().unwrap();
        let mut dm = data_module().with_val(dataset(0));
        let vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs, &dm);

        let err = Trainer::new(config(dir.path(), 2)).fit(&model, &vs, &mut dm).unwrap_err();
        assert!(matches!(err, TrainError::EmptySplit("evaluation")));
    }

    #[test]
    fn test_grad_clip_trains() {
        tch::manual_seed(0);
        let dir = tempfile::tempdir().unwrap();
        let mut dm = data_module();
        let vs = nn::VarStore::new(Device::Cpu);
        let model = model(&vs, &dm);
        let before: Vec<f32> = Vec::try_from(vs.variables()["fc.weight"].flatten(0, -1)).unwrap();

        let trainer_config = TrainerConfig {
            grad_clip: Some(0.5),
            ..config(dir.path(), 3)
        };
        let summary = Trainer::new(trainer_config).fit(&model, &vs, &mut dm).unwrap();
        assert_eq!(summary.epochs_run, 3);
        assert!(summary.history.iter().all(|r| r.train_loss.is_finite()));

        let after: Vec<f32> = Vec::try_from(vs.variables()["fc.weight"].flatten(0, -1)).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_is_better() {
        assert!(is_better(1.0, None, false));
        assert!(is_better(0.5, Some(1.0), false));
        assert!(!is_better(0.5, Some(1.0), true));
        assert!(!is_better(1.0, Some(1.0), false));
    }
}
