// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Train + dev loop using Burn's DataLoader and Adam.
//
// Per epoch:
//   1. one shuffled pass over the training features
//   2. evaluate on the dev features (inference mode, no dropout)
//   3. write the eval record and the metrics row
//   4. if dev F1 beat the best so far by more than MIN_F1_DELTA,
//      save weights + model_config.json + train_args.json and go
//      on; otherwise stop
//
// The best F1 starts at -1.0, or at the best F1 recorded in the
// run the weights were initialised from.
//
// Key Burn insight:
//   - training runs on an AutodiffBackend
//   - model.valid() returns the model on the inner backend, which
//     is what the evaluator takes
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::path::Path;

use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::TaggingBatcher, dataset::FeatureDataset};
use crate::domain::feature::EncodedFeature;
use crate::domain::label_vocab::LabelVocab;
use crate::domain::traits::{ContinuationMarker, SubwordTokenizer};
use crate::infra::metrics::{previous_best_f1, EpochMetrics, MetricsLogger};
use crate::infra::run_store::{ModelConfigRecord, RunStore};
use crate::ml::evaluator::Evaluator;
use crate::ml::model::{TokenClassifier, TokenClassifierConfig};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Dev F1 must improve by more than this to keep training.
pub const MIN_F1_DELTA: f64 = 0.001;

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub epochs_run:    usize,
    pub best_f1:       f64,
    pub best_epoch:    Option<usize>,
    pub stopped_early: bool,
}

/// Everything the loop needs besides the features.
pub struct TrainingContext<'a, T: ?Sized> {
    pub config:    &'a TrainConfig,
    pub vocab:     &'a LabelVocab,
    pub tokenizer: &'a T,
    pub store:     &'a RunStore,
}

impl<'a, T> TrainingContext<'a, T>
where
    T: SubwordTokenizer + ContinuationMarker + ?Sized,
{
    pub fn model_config(&self) -> TokenClassifierConfig {
        self.config.model_config(self.vocab.num_classes())
    }

    fn model_config_record(&self) -> ModelConfigRecord {
        ModelConfigRecord {
            tokenizer:           self.config.tokenizer.clone(),
            do_lower:            self.config.lowercase,
            max_seq_length:      self.config.max_sequence_length,
            num_labels:          self.vocab.num_classes(),
            label_map:           self.vocab.label_map(),
            hidden_dropout_prob: self.config.dropout,
        }
    }
}

/// Train on the default WGPU device.
pub fn run_training<T>(
    ctx:   &TrainingContext<'_, T>,
    train: Vec<EncodedFeature>,
    dev:   Vec<EncodedFeature>,
) -> Result<TrainingSummary>
where
    T: SubwordTokenizer + ContinuationMarker + ?Sized,
{
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend, T>(ctx, train, dev, device)
}

pub fn train_loop<B, T>(
    ctx:    &TrainingContext<'_, T>,
    train:  Vec<EncodedFeature>,
    dev:    Vec<EncodedFeature>,
    device: B::Device,
) -> Result<TrainingSummary>
where
    B: AutodiffBackend,
    T: SubwordTokenizer + ContinuationMarker + ?Sized,
{
    let cfg = ctx.config;

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: TokenClassifier<B> = ctx.model_config().init(&device);
    let mut best_f1 = -1.0;

    if let Some(init_from) = &cfg.init_from {
        let previous = RunStore::open(init_from)?;
        model = previous
            .load_model(model, &device)
            .with_context(|| format!("Cannot initialise from '{init_from}'"))?;
        best_f1 = previous_best_f1(Path::new(init_from), &cfg.dev_on)?;
        tracing::info!("Loaded model from '{}'. Prev best f1 score: {:.1}", init_from, 100.0 * best_f1);
    }
    tracing::info!(
        "Model ready: {} layers, d_model={}, {} classes",
        cfg.num_layers, cfg.d_model, ctx.vocab.num_classes()
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

    // ── Training data loader ──────────────────────────────────────────────────
    let num_train = train.len();
    let train_loader = DataLoaderBuilder::<B, _, _>::new(TaggingBatcher::new())
        .batch_size(cfg.train_batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(FeatureDataset::new(train));

    tracing::info!("***** Running training *****");
    tracing::info!("  Num examples = {}", num_train);
    tracing::info!("  Batch size = {}", cfg.train_batch_size);
    tracing::info!("  Num epochs = {}", cfg.epochs);

    let evaluator = Evaluator {
        tokenizer:  ctx.tokenizer,
        vocab:      ctx.vocab,
        outside:    cfg.task.outside_label(),
        batch_size: cfg.eval_batch_size,
        dev_on:     &cfg.dev_on,
    };
    let logger = MetricsLogger::new(ctx.store.dir())?;

    let mut summary = TrainingSummary { epochs_run: 0, best_f1, best_epoch: None, stopped_early: false };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for batch in train_loader.iter() {
            let (loss, _) = model.forward_loss(&batch);
            loss_sum += loss.clone().into_scalar().elem::<f64>();
            batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        tracing::info!("[EPOCH {}] Training loss: {:.4}", epoch, train_loss);

        // ── Dev evaluation ────────────────────────────────────────────────────
        let model_valid  = model.valid();
        let eval_device  = model_valid.devices().into_iter().next().unwrap_or_default();
        let record       = evaluator.evaluate(&model_valid, &dev, &eval_device)?;
        record.save(ctx.store.dir(), epoch)?;

        let metrics = EpochMetrics::new(epoch, train_loss, record.scores());
        logger.log(&metrics)?;
        summary.epochs_run = epoch;

        if metrics.is_improvement(summary.best_f1, MIN_F1_DELTA) {
            ctx.store.save_model(&model)?;
            ctx.store.save_model_config(&ctx.model_config_record())?;
            ctx.store.save_train_args(cfg, epoch, train_loss)?;
            summary.best_f1    = record.f1;
            summary.best_epoch = Some(epoch);
        } else {
            tracing::info!(
                "F1 score did not improve ({:.2} vs {:.2}). Stopping...",
                record.f1, summary.best_f1
            );
            summary.stopped_early = true;
            break;
        }
    }

    tracing::info!("Training complete! Metrics in '{}'", logger.csv_path().display());
    Ok(summary)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encoder::{encode_all, EncoderConfig, OverflowPolicy};
    use crate::domain::record::Record;
    use crate::domain::task::Task;
    use crate::infra::tokenizer_store::tests::toy_tokenizer;
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    fn tiny_config(output_dir: &Path) -> TrainConfig {
        TrainConfig {
            output_dir:          output_dir.display().to_string(),
            dev_on:              "dev".into(),
            max_sequence_length: 8,
            train_batch_size:    2,
            eval_batch_size:     2,
            epochs:              2,
            lr:                  1e-3,
            d_model:             8,
            num_heads:           2,
            num_layers:          1,
            d_ff:                16,
            dropout:             0.0,
            vocab_size:          16,
            ..TrainConfig::default()
        }
    }

    fn features(vocab: &LabelVocab) -> Vec<EncodedFeature> {
        let records = vec![
            Record::new("C_1#1", vec!["what".into(), "about".into(), "it".into()], vec!["O".into(), "O".into(), "REL".into()]).unwrap(),
            Record::new("C_1#2", vec!["resolve".into(), "the".into(), "cost".into()], vec!["O".into(), "O".into(), "REL".into()]).unwrap(),
            Record::new("C_2#1", vec!["unaffable".into()], vec!["REL".into()]).unwrap(),
        ];
        let cfg = EncoderConfig::new(8, OverflowPolicy::Truncate).unwrap();
        encode_all(&records, vocab, &cfg, &toy_tokenizer()).unwrap()
    }

    #[test]
    fn test_first_epoch_always_saves() {
        let dir   = tempfile::tempdir().unwrap();
        let cfg   = tiny_config(dir.path());
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        let store = RunStore::new(dir.path()).unwrap();
        let ctx   = TrainingContext { config: &cfg, vocab: &vocab, tokenizer: &tok, store: &store };

        let summary = train_loop::<B, _>(&ctx, features(&vocab), features(&vocab), Default::default()).unwrap();

        // Any F1 beats the -1.0 starting point.
        assert!(summary.epochs_run >= 1);
        assert!(summary.best_epoch.is_some());
        assert!(summary.best_f1 >= 0.0);
        assert!(dir.path().join("eval_results_dev_epoch1.json").exists());
        assert!(dir.path().join("model_config.json").exists());
        assert!(dir.path().join("train_args.json").exists());

        let csv = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + summary.epochs_run);

        let model_cfg = store.load_model_config().unwrap();
        assert_eq!(model_cfg.num_labels, 5);
        assert_eq!(model_cfg.label_map[&4], "[SEP]");
    }

    #[test]
    fn test_stops_when_baseline_is_unbeatable() {
        let base  = tempfile::tempdir().unwrap();
        let dir   = tempfile::tempdir().unwrap();
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();

        // A previous run with saved weights and a perfect dev score.
        let base_cfg   = tiny_config(base.path());
        let base_store = RunStore::new(base.path()).unwrap();
        let base_ctx   = TrainingContext { config: &base_cfg, vocab: &vocab, tokenizer: &tok, store: &base_store };
        let model: TokenClassifier<B> = base_ctx.model_config().init(&Default::default());
        base_store.save_model(&model).unwrap();
        std::fs::write(base.path().join("eval_results_dev_epoch1.json"), r#"{"f1_token": 1.0}"#).unwrap();

        let cfg = TrainConfig {
            init_from: Some(base.path().display().to_string()),
            ..tiny_config(dir.path())
        };
        let store = RunStore::new(dir.path()).unwrap();
        let ctx   = TrainingContext { config: &cfg, vocab: &vocab, tokenizer: &tok, store: &store };

        let summary = train_loop::<B, _>(&ctx, features(&vocab), features(&vocab), Default::default()).unwrap();
        assert_eq!(summary.epochs_run, 1);
        assert!(summary.stopped_early);
        assert_eq!(summary.best_epoch, None);
        assert!(!dir.path().join("model_config.json").exists());
    }
}
