// ============================================================
// Layer 2 - EvaluateUseCase
// ============================================================
// Scores the weights a finished training run saved, without
// training again:
//
//   Step 1: Open the run: train_config.json, model_config.json,
//           train_args.json                         (Layer 6)
//   Step 2: Load the tokenizer the run was trained with
//   Step 3: Rebuild the label vocabulary from the saved label map
//   Step 4: Read and encode the dev or test split   (Layer 4)
//   Step 5: Rebuild the classifier, load its weights (Layer 5)
//   Step 6: Predict, decode, score; write the eval record
//
// The record is written as eval_results_<dataset>_epoch<n>.json,
// n being the epoch the weights were saved at. Scoring the dev
// split again rewrites that epoch's record with the same numbers.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    encoder::{encode_all, EncoderConfig},
    reader::DatasetFile,
};
use crate::domain::{label_vocab::LabelVocab, traits::RecordSource};
use crate::infra::{metrics::PrfScore, run_store::RunStore, tokenizer_store::WordPieceTokenizer};
use crate::ml::{evaluator::Evaluator, model::TokenClassifier};

/// Dataset name of the held-out test split.
pub const TEST_DATASET: &str = "test";

/// Which split of the data directory to score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EvalSplit {
    /// The dev set the run was trained against
    #[default]
    Dev,
    /// `test.json` (or `test.txt`) in the data directory
    Test,
}

impl EvalSplit {
    pub fn dataset_name(self, config: &TrainConfig) -> &str {
        match self {
            EvalSplit::Dev  => config.dev_on.as_str(),
            EvalSplit::Test => TEST_DATASET,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    /// Output directory of a training run
    pub run_dir:         String,
    pub eval_on:         EvalSplit,
    /// Read the split from here instead of the run's data directory
    pub data_dir:        Option<String>,
    /// Load this tokenizer instead of the one in model_config.json
    pub tokenizer:       Option<String>,
    pub eval_batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct EvaluateReport {
    pub dataset:     String,
    pub examples:    usize,
    /// Epoch the scored weights were saved at
    pub epoch:       usize,
    pub scores:      PrfScore,
    pub record_path: PathBuf,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    /// Evaluate on the default GPU device.
    pub fn execute(&self) -> Result<EvaluateReport> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<burn::backend::Wgpu>(device)
    }

    pub fn execute_on<B: Backend>(&self, device: B::Device) -> Result<EvaluateReport> {
        let cfg = &self.config;

        // ── Step 1: Run directory ─────────────────────────────────────────────
        let store     = RunStore::open(&cfg.run_dir)?;
        let train_cfg = store.load_config()?;
        let model_cfg = store.load_model_config()?;
        let saved     = store.load_saved_epoch()?;

        // ── Step 2: Tokenizer ─────────────────────────────────────────────────
        let tokenizer_path = cfg.tokenizer.as_deref().unwrap_or(&model_cfg.tokenizer);
        let tokenizer = WordPieceTokenizer::load(Path::new(tokenizer_path), model_cfg.do_lower)
            .with_context(|| format!("Cannot load tokenizer '{tokenizer_path}'"))?;

        // ── Step 3: Label vocabulary ──────────────────────────────────────────
        let vocab = LabelVocab::from_label_map(&model_cfg.label_map, &train_cfg.task.sentinels())?;
        ensure!(
            vocab.num_classes() == model_cfg.num_labels,
            "label map gives {} classes but model_config.json says {}",
            vocab.num_classes(),
            model_cfg.num_labels
        );

        // ── Step 4: Records and features ──────────────────────────────────────
        let dataset  = cfg.eval_on.dataset_name(&train_cfg);
        let data_dir = cfg.data_dir.as_deref().unwrap_or(&train_cfg.data_dir);
        let file = DatasetFile::new(
            data_dir,
            dataset,
            train_cfg.task.record_format(),
            train_cfg.json_part.as_str(),
            train_cfg.on_length_mismatch,
        );
        let records = file
            .load_all()
            .with_context(|| format!("Cannot read '{}'", file.path().display()))?;
        let encoder_cfg = EncoderConfig::new(model_cfg.max_seq_length, train_cfg.overflow)?;
        let features = encode_all(&records, &vocab, &encoder_cfg, &tokenizer)?;

        // ── Step 5: Model ─────────────────────────────────────────────────────
        let model: TokenClassifier<B> = train_cfg.model_config(vocab.num_classes()).init(&device);
        let model = store.load_model(model, &device)?;
        tracing::info!(
            "Loaded weights of epoch {} from '{}' (train loss {})",
            saved.epoch,
            store.dir().display(),
            saved.loss_train.map_or_else(|| "n/a".to_string(), |l| format!("{l:.4}"))
        );

        // ── Step 6: Score ─────────────────────────────────────────────────────
        tracing::info!("***** Running evaluation *****");
        tracing::info!("  Num examples = {}", features.len());
        tracing::info!("  Batch size = {}", cfg.eval_batch_size);

        let evaluator = Evaluator {
            tokenizer:  &tokenizer,
            vocab:      &vocab,
            outside:    train_cfg.task.outside_label(),
            batch_size: cfg.eval_batch_size,
            dev_on:     dataset,
        };
        let record      = evaluator.evaluate(&model, &features, &device)?;
        let record_path = record.save(store.dir(), saved.epoch)?;

        Ok(EvaluateReport {
            dataset:  dataset.to_string(),
            examples: features.len(),
            epoch:    saved.epoch,
            scores:   record.scores(),
            record_path,
        })
    }
}
