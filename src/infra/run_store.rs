// ============================================================
// Layer 6 - Run Store
// ============================================================
// Everything a training run leaves in its output directory:
//
//   runs/default/
//     train_config.json      <- full run configuration
//     model.mpk              <- best classifier weights, full precision
//     model_config.json      <- what is needed to rebuild and read the
//                               model: label map, class count, max
//                               sequence length, lowercasing, dropout
//     train_args.json        <- run configuration plus the epoch and
//                               training loss of the best checkpoint
//     eval_results_<dev>_epoch<n>.json   (infra::metrics)
//     metrics.csv                        (infra::metrics)
//
// model_config.json and train_args.json are rewritten each time the
// dev F1 improves, so they always describe the saved weights.
//
// Weights are stored as f32 (NamedMpkFileRecorder with
// FullPrecisionSettings); a run started with init_from resumes
// from exactly the saved values.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::TokenClassifier;

const MODEL_FILE: &str = "model";

type WeightRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Contents of model_config.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfigRecord {
    pub tokenizer:           String,
    pub do_lower:            bool,
    pub max_seq_length:      usize,
    pub num_labels:          usize,
    pub label_map:           BTreeMap<u32, String>,
    pub hidden_dropout_prob: f64,
}

#[derive(Serialize)]
struct TrainArgsRecord<'a> {
    #[serde(flatten)]
    config:     &'a TrainConfig,
    epoch:      usize,
    loss_train: f64,
}

/// The part of train_args.json that says which epoch the saved
/// weights come from. A NaN training loss is written as null.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SavedEpoch {
    pub epoch:      usize,
    pub loss_train: Option<f64>,
}

pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open the directory of a finished run; it must already exist.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            bail!("Run directory '{}' does not exist. Train a model first.", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json("train_config.json", cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json("train_config.json")
    }

    pub fn save_model_config(&self, record: &ModelConfigRecord) -> Result<()> {
        self.write_json("model_config.json", record)
    }

    pub fn load_model_config(&self) -> Result<ModelConfigRecord> {
        self.read_json("model_config.json")
    }

    pub fn save_train_args(&self, cfg: &TrainConfig, epoch: usize, loss_train: f64) -> Result<()> {
        self.write_json("train_args.json", &TrainArgsRecord { config: cfg, epoch, loss_train })
    }

    pub fn load_saved_epoch(&self) -> Result<SavedEpoch> {
        self.read_json("train_args.json")
    }

    /// Save classifier weights, replacing the previous best.
    pub fn save_model<B: Backend>(&self, model: &TokenClassifier<B>) -> Result<()> {
        let path = self.dir.join(MODEL_FILE);
        WeightRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;
        tracing::debug!("Saved model weights to '{}'", path.display());
        Ok(())
    }

    /// Load saved weights into `model`, which must have the same shape.
    pub fn load_model<B: Backend>(&self, model: TokenClassifier<B>, device: &B::Device) -> Result<TokenClassifier<B>> {
        let path = self.dir.join(MODEL_FILE);
        let record = WeightRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load model '{}'. Has this run been trained?", path.display()))?;
        Ok(model.load_record(record))
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path).with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}
