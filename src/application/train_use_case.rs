// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load the WordPiece tokenizer      (Layer 6 - infra)
//   Step 2: Build the task's label vocabulary (Layer 3 - domain)
//   Step 3: Read train records, sample
//           a portion of the conversations    (Layer 4 - data)
//   Step 4: Read dev records                  (Layer 4 - data)
//   Step 5: Encode both splits                (Layer 4 - data)
//   Step 6: Save config                       (Layer 6 - infra)
//   Step 7: Run training loop                 (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use std::path::Path;

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::data::{
    encoder::{encode_all, EncoderConfig, OverflowPolicy},
    reader::{DatasetFile, LengthMismatchPolicy},
    sampler::sample_conversations,
};
use crate::domain::{feature::EncodedFeature, label_vocab::LabelVocab, task::Task, traits::RecordSource};
use crate::infra::{run_store::RunStore, tokenizer_store::WordPieceTokenizer};
use crate::ml::model::TokenClassifierConfig;
use crate::ml::trainer::{run_training, train_loop, TrainingContext, TrainingSummary};

// ─── Training Configuration ──────────────────────────────────────────────────
// All options of a training run. Saved as train_config.json so a run
// can be inspected or reproduced later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:                 String,
    pub output_dir:               String,
    pub tokenizer:                String,
    pub task:                     Task,
    pub train_on:                 String,
    pub dev_on:                   String,
    pub json_part:                String,
    pub max_sequence_length:      usize,
    pub lowercase:                bool,
    pub turn_separator_character: char,
    pub train_portion:            f64,
    pub overflow:                 OverflowPolicy,
    pub on_length_mismatch:       LengthMismatchPolicy,
    pub train_batch_size:         usize,
    pub eval_batch_size:          usize,
    pub epochs:                   usize,
    pub lr:                       f64,
    pub seed:                     u64,
    /// Previous run directory to take weights and best dev F1 from
    pub init_from:                Option<String>,
    pub d_model:                  usize,
    pub num_heads:                usize,
    pub num_layers:               usize,
    pub d_ff:                     usize,
    pub dropout:                  f64,
    pub vocab_size:               usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:                 "data".to_string(),
            output_dir:               "runs/default".to_string(),
            tokenizer:                "tokenizer.json".to_string(),
            task:                     Task::ConvSearch,
            train_on:                 "train_quac".to_string(),
            dev_on:                   "train_cast".to_string(),
            json_part:                "bert_ner_overlap".to_string(),
            max_sequence_length:      128,
            lowercase:                false,
            turn_separator_character: '#',
            train_portion:            1.0,
            overflow:                 OverflowPolicy::Truncate,
            on_length_mismatch:       LengthMismatchPolicy::Reject,
            train_batch_size:         32,
            eval_batch_size:          4,
            epochs:                   3,
            lr:                       5e-5,
            seed:                     42,
            init_from:                None,
            d_model:                  256,
            num_heads:                8,
            num_layers:               6,
            d_ff:                     1024,
            dropout:                  0.1,
            vocab_size:               30522,
        }
    }
}

impl TrainConfig {
    pub fn encoder_config(&self) -> Result<EncoderConfig> {
        Ok(EncoderConfig::new(self.max_sequence_length, self.overflow)?)
    }

    /// Architecture of the classifier this config trains.
    pub fn model_config(&self, num_classes: usize) -> TokenClassifierConfig {
        TokenClassifierConfig::new(
            self.vocab_size, self.max_sequence_length, num_classes,
            self.d_model, self.num_heads, self.num_layers, self.d_ff, self.dropout,
        )
    }

    fn dataset(&self, name: &str) -> DatasetFile {
        DatasetFile::new(
            &self.data_dir,
            name,
            self.task.record_format(),
            &self.json_part,
            self.on_length_mismatch,
        )
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

/// Inputs of the training loop, ready to go.
struct Prepared {
    config:    TrainConfig,
    tokenizer: WordPieceTokenizer,
    vocab:     LabelVocab,
    train:     Vec<EncodedFeature>,
    dev:       Vec<EncodedFeature>,
    store:     RunStore,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline on the default GPU device.
    pub fn execute(&self) -> Result<TrainingSummary> {
        let p   = self.prepare()?;
        let ctx = TrainingContext { config: &p.config, vocab: &p.vocab, tokenizer: &p.tokenizer, store: &p.store };
        run_training(&ctx, p.train, p.dev)
    }

    /// Same pipeline on an explicit backend and device.
    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainingSummary> {
        let p   = self.prepare()?;
        let ctx = TrainingContext { config: &p.config, vocab: &p.vocab, tokenizer: &p.tokenizer, store: &p.store };
        train_loop::<B, _>(&ctx, p.train, p.dev, device)
    }

    fn prepare(&self) -> Result<Prepared> {
        let mut cfg = self.config.clone();

        // ── Step 1: Tokenizer ─────────────────────────────────────────────────
        let tokenizer = WordPieceTokenizer::load(Path::new(&cfg.tokenizer), cfg.lowercase)
            .with_context(|| format!("Cannot load tokenizer '{}'", cfg.tokenizer))?;
        if tokenizer.vocab_size() > cfg.vocab_size {
            tracing::warn!(
                "Tokenizer has {} pieces, more than vocab_size {}; using {}",
                tokenizer.vocab_size(), cfg.vocab_size, tokenizer.vocab_size()
            );
            cfg.vocab_size = tokenizer.vocab_size();
        }

        // ── Step 2: Label vocabulary ──────────────────────────────────────────
        let vocab = cfg.task.vocabulary()?;
        tracing::info!("Task {:?}: {} labels", cfg.task, vocab.len());

        // ── Step 3: Training records ──────────────────────────────────────────
        let train_file = cfg.dataset(&cfg.train_on);
        let records = train_file
            .load_all()
            .with_context(|| format!("Cannot read training data '{}'", train_file.path().display()))?;
        let records = sample_conversations(records, cfg.train_portion, cfg.turn_separator_character, cfg.seed)?;

        // ── Step 4: Dev records ───────────────────────────────────────────────
        let dev_file = cfg.dataset(&cfg.dev_on);
        let dev_records = dev_file
            .load_all()
            .with_context(|| format!("Cannot read dev data '{}'", dev_file.path().display()))?;

        // ── Step 5: Encode ────────────────────────────────────────────────────
        let encoder_cfg = cfg.encoder_config()?;
        let train = encode_all(&records, &vocab, &encoder_cfg, &tokenizer)?;
        let dev   = encode_all(&dev_records, &vocab, &encoder_cfg, &tokenizer)?;

        // ── Step 6: Save config ───────────────────────────────────────────────
        let store = RunStore::new(&cfg.output_dir)?;
        store.save_config(&cfg)?;

        Ok(Prepared { config: cfg, tokenizer, vocab, train, dev, store })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use std::fs;

    const VOCAB: &str = "[PAD]\n[UNK]\n[CLS]\n[SEP]\nresolve\nit\nwhat\nabout\nthe\ncost\n";

    pub(crate) fn write_data(dir: &Path) {
        fs::write(dir.join("vocab.txt"), VOCAB).unwrap();
        let train = r#"[
            {"id": "C_1#1", "bert_ner_overlap": [["what", "about", "it"], ["O", "O", "REL"]]},
            {"id": "C_1#2", "bert_ner_overlap": [["the", "cost"], ["O", "REL"]]},
            {"id": "C_2#1", "bert_ner_overlap": [["resolve", "it"], ["O", "REL"]]}
        ]"#;
        fs::write(dir.join("train_quac.json"), train).unwrap();
        fs::write(dir.join("train_cast.json"), train).unwrap();
    }

    pub(crate) fn config(dir: &Path) -> TrainConfig {
        TrainConfig {
            data_dir:            dir.display().to_string(),
            output_dir:          dir.join("run").display().to_string(),
            tokenizer:           dir.join("vocab.txt").display().to_string(),
            max_sequence_length: 8,
            train_batch_size:    2,
            epochs:              1,
            d_model:             8,
            num_heads:           2,
            num_layers:          1,
            d_ff:                16,
            dropout:             0.0,
            vocab_size:          4,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_pipeline_end_to_end_on_cpu() {
        let dir = tempfile::tempdir().unwrap();
        write_data(dir.path());

        let summary = TrainUseCase::new(config(dir.path()))
            .execute_on::<Autodiff<NdArray>>(Default::default())
            .unwrap();
        assert_eq!(summary.epochs_run, 1);

        let run = dir.path().join("run");
        let saved: TrainConfig =
            serde_json::from_str(&fs::read_to_string(run.join("train_config.json")).unwrap()).unwrap();
        // vocab_size grows to cover the tokenizer
        assert!(saved.vocab_size >= 10);
        assert!(run.join("eval_results_train_cast_epoch1.json").exists());
    }

    #[test]
    fn test_missing_dataset_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_data(dir.path());
        let cfg = TrainConfig { train_on: "nope".into(), ..config(dir.path()) };
        let err = TrainUseCase::new(cfg)
            .execute_on::<Autodiff<NdArray>>(Default::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg  = TrainConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"task\":\"conv-search\""));
        assert_eq!(serde_json::from_str::<TrainConfig>(&json).unwrap(), cfg);
    }
}
