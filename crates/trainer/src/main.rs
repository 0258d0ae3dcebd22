use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tch::{nn, Device, Tensor};

use datasets::{
    exclude_label, load_sst, sentiment_target_encoding, DataModule, PaddingEncoder, SstConfig, SstSplits, Vectors,
};
use textclf_core::{summary, Classifier, RecurrentNeuralFilter, RnfConfig, TransformerClassifier, TransformerConfig};
use tokenizer::{TokenizerKind, Vocab, VocabConfig};
use trainer::hpo::{Direction, MedianPruner, PruningCallback, Study, Trial, TrialPruned};
use trainer::{seed_everything, TrainError, Trainer, TrainerConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelKind {
    Rnf,
    Transformer,
}

/// Hyperparameter search for SST sentence classifiers.
#[derive(Parser, Debug)]
#[command(name = "textclf-hyperopt", version)]
struct Args {
    /// Keep all five sentiment classes instead of negative/positive
    #[arg(long)]
    fine_grained: bool,

    #[arg(long, value_enum, default_value_t = ModelKind::Rnf)]
    model: ModelKind,

    /// Directory holding `sst/trees/{train,dev,test}.txt`
    #[arg(long, default_value = ".data")]
    data_root: PathBuf,

    /// Directory holding the GloVe text files
    #[arg(long, default_value = ".vector_cache")]
    vectors_root: PathBuf,

    #[arg(long, default_value = "840B")]
    glove_name: String,

    #[arg(long, default_value_t = 300)]
    glove_dim: usize,

    #[arg(long, default_value_t = 30)]
    n_trials: usize,

    /// Seconds after which no new trial is started
    #[arg(long, default_value_t = 1200)]
    timeout: u64,

    /// YAML trainer settings; defaults apply when absent
    #[arg(long)]
    trainer_config: Option<PathBuf>,

    /// Write every trial record to this JSON file
    #[arg(long)]
    study_output: Option<PathBuf>,
}

/// Everything that is identical across trials, loaded once.
struct Experiment {
    splits: SstSplits,
    vocab: Vocab,
    embeddings: Option<Tensor>,
    embed_dim: i64,
    fine_grained: bool,
    trainer_config: TrainerConfig,
    device: Device,
}

impl Experiment {
    fn load(args: &Args) -> Result<Self> {
        let trainer_config = TrainerConfig::load_or_default(args.trainer_config.as_ref())?;
        let device = Device::cuda_if_available();
        log::info!("Using device: {:?}", device);

        let tokenizer = TokenizerKind::Rule.build()?;
        let filter = (!args.fine_grained).then(|| exclude_label("neutral"));
        let sst = SstConfig {
            root: args.data_root.clone(),
            train_subtrees: true,
            fine_grained: args.fine_grained,
            ..Default::default()
        };
        let splits = load_sst(&sst, tokenizer.as_ref(), filter.as_deref()).context("loading SST")?;
        log::info!(
            "SST splits: {} train / {} val / {} test",
            splits.train.len(),
            splits.val.len(),
            splits.test.len()
        );

        let vocab = splits.train.build_vocab(&VocabConfig::default());
        log::info!("Vocabulary size: {}", vocab.len());

        let embeddings = match args.model {
            ModelKind::Rnf => {
                let path = Vectors::glove_path(&args.vectors_root, &args.glove_name, args.glove_dim);
                let vectors = Vectors::from_file_for_vocab(&path, args.glove_dim, &vocab)
                    .with_context(|| format!("loading GloVe vectors from {:?}", path))?;
                let matrix = vectors.matrix(&vocab, trainer_config.seed);
                log::info!("Pretrained vectors cover {}/{} tokens", matrix.hits, matrix.rows);
                Some(matrix.to_tensor(device))
            }
            ModelKind::Transformer => None,
        };

        Ok(Self {
            splits,
            vocab,
            embeddings,
            embed_dim: args.glove_dim as i64,
            fine_grained: args.fine_grained,
            trainer_config,
            device,
        })
    }

    fn num_class(&self) -> i64 {
        if self.fine_grained {
            5
        } else {
            2
        }
    }
}

fn build_model(trial: &Trial, exp: &Experiment, kind: ModelKind, vs: &nn::VarStore) -> Result<Box<dyn Classifier>> {
    let input_size = exp.vocab.len() as i64;
    let model: Box<dyn Classifier> = match kind {
        ModelKind::Rnf => {
            let config = RnfConfig {
                embed_dim: exp.embed_dim,
                filter_width: trial.suggest_int("filter_width", 5, 8)?,
                embed_dropout: trial.suggest_float("embed_dropout", 0.2, 0.4)?,
                dropout: trial.suggest_float("dropout", 0.2, 0.4)?,
                ..RnfConfig::new(input_size, exp.num_class())
            };
            Box::new(RecurrentNeuralFilter::new(&vs.root(), &config, exp.embeddings.as_ref())?)
        }
        ModelKind::Transformer => {
            let hid_dim = trial.suggest_categorical("hid_dim", &[128i64, 256])?;
            let config = TransformerConfig {
                hid_dim,
                pf_dim: 2 * hid_dim,
                n_layers: trial.suggest_int("n_layers", 1, 4)?,
                n_heads: trial.suggest_categorical("n_heads", &[4i64, 8])?,
                dropout: trial.suggest_float("dropout", 0.1, 0.3)?,
                ..TransformerConfig::new(input_size, exp.num_class())
            };
            Box::new(TransformerClassifier::new(&vs.root(), &config)?)
        }
    };
    Ok(model)
}

/// Trains one configuration and returns its validation loss at the best epoch.
fn objective(trial: &Trial, exp: &Experiment, kind: ModelKind) -> Result<f64> {
    seed_everything(exp.trainer_config.seed);

    let encoder = PaddingEncoder::new(
        exp.vocab.clone(),
        sentiment_target_encoding(exp.fine_grained),
        exp.device,
    );
    let mut dm = DataModule::new(exp.splits.train.clone(), Box::new(encoder))
        .with_val(exp.splits.val.clone())
        .with_test(exp.splits.test.clone())
        .with_batch_size(trial.suggest_int("batch_size", 16, 64)? as usize)
        .with_seed(exp.trainer_config.seed);

    let mut vs = nn::VarStore::new(exp.device);
    let model = build_model(trial, exp, kind, &vs)?;

    let mut config = exp.trainer_config.clone();
    config.learning_rate = trial.suggest_float("lr", 1e-4, 1e-3)?;
    config.checkpoint_dir = PathBuf::from(&config.checkpoint_dir)
        .join(format!("trial-{}", trial.number()))
        .to_string_lossy()
        .into_owned();
    let monitor = config.monitor;

    log::info!("Trial {}: {}", trial.number(), summary(model.as_ref(), &vs));

    let mut trainer = Trainer::new(config).with_callback(Box::new(PruningCallback::new(trial.clone(), monitor)));
    let fit = match trainer.fit(model.as_ref(), &vs, &mut dm) {
        Ok(fit) => fit,
        Err(TrainError::Pruned { .. }) => return Err(TrialPruned.into()),
        Err(e) => return Err(e).with_context(|| format!("training trial {}", trial.number())),
    };

    let metrics = trainer.test(
        model.as_ref(),
        &mut vs,
        dm.val_dataloader()?,
        fit.best_checkpoint.as_deref(),
    )?;
    Ok(metrics.loss)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let exp = Experiment::load(&args)?;

    let mut study = Study::new(Direction::Minimize)
        .with_pruner(MedianPruner::default())
        .with_seed(exp.trainer_config.seed);
    study.optimize(
        |trial| objective(trial, &exp, args.model),
        Some(args.n_trials),
        Some(Duration::from_secs(args.timeout)),
    )?;

    if let Some(path) = &args.study_output {
        fs::write(path, serde_json::to_string_pretty(study.trials())?)
            .with_context(|| format!("writing trials to {:?}", path))?;
    }

    let best = study.best_trial()?;
    println!("Best trial:");
    println!("  Value: {}", best.value.unwrap_or(f64::NAN));
    println!("  Params: ");
    for (key, value) in &best.params {
        println!("    {}: {}", key, value);
    }

    Ok(())
}
