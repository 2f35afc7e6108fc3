// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the subcommands, `train`, `evaluate` and `encode`, and their
// flags. clap's derive macros generate --help text, missing
// argument errors and string -> number / enum conversion.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{
    encode_use_case::EncodeConfig,
    evaluate_use_case::{EvalSplit, EvaluateConfig},
    train_use_case::TrainConfig,
};
use crate::data::{encoder::OverflowPolicy, reader::LengthMismatchPolicy};
use crate::domain::task::Task;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the token tagger and evaluate it on a dev set after each epoch
    Train(TrainArgs),

    /// Score the saved model of a training run on its dev set or the test set
    Evaluate(EvaluateArgs),

    /// Encode a dataset, check that its labels decode back unchanged
    Encode(EncodeArgs),
}

/// Options shared by every command that reads and encodes records.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory containing <name>.json (conv-search) or <name>.txt (ner) files
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// HuggingFace tokenizer.json, or a BERT vocab.txt
    #[arg(long, default_value = "tokenizer.json")]
    pub tokenizer: String,

    #[arg(long, value_enum, default_value_t = Task::ConvSearch)]
    pub task: Task,

    /// JSON field holding a [tokens, labels] pair
    #[arg(long, default_value = "bert_ner_overlap")]
    pub json_part: String,

    /// Total pieces per example, [CLS] and [SEP] included
    #[arg(long, default_value_t = 128)]
    pub max_sequence_length: usize,

    /// Lowercase words before tokenizing (for uncased vocabularies)
    #[arg(long)]
    pub lowercase: bool,

    /// What to do with records longer than the sequence length
    #[arg(long, value_enum, default_value_t = OverflowPolicy::Truncate)]
    pub overflow: OverflowPolicy,

    /// What to do with records whose word and label counts differ
    #[arg(long, value_enum, default_value_t = LengthMismatchPolicy::Reject)]
    pub on_length_mismatch: LengthMismatchPolicy,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Directory for config, weights, eval records and metrics
    #[arg(long, default_value = "runs/default")]
    pub output_dir: String,

    /// Training dataset name
    #[arg(long, default_value = "train_quac")]
    pub train_on: String,

    /// Dev dataset name, evaluated after every epoch
    #[arg(long, default_value = "train_cast")]
    pub dev_on: String,

    /// Character between conversation id and turn number in record ids
    #[arg(long, default_value_t = '#')]
    pub turn_separator_character: char,

    /// Fraction of training conversations to use, in (0, 1]
    #[arg(long, default_value_t = 1.0)]
    pub train_portion: f64,

    #[arg(long, default_value_t = 32)]
    pub train_batch_size: usize,

    #[arg(long, default_value_t = 4)]
    pub eval_batch_size: usize,

    /// Maximum number of epochs; training stops earlier once dev F1
    /// stops improving
    #[arg(long, default_value_t = 3)]
    pub epochs: usize,

    #[arg(long, default_value_t = 5e-5)]
    pub lr: f64,

    /// Seed for conversation sampling and batch shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Start from the weights of a previous run; its best dev F1
    /// becomes the score to beat
    #[arg(long)]
    pub init_from: Option<String>,

    /// Hidden dimension of the transformer
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    /// Inner dimension of the feed-forward network
    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Embedding rows; raised to the tokenizer's size when smaller
    #[arg(long, default_value_t = 30522)]
    pub vocab_size: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:                 a.data.data_dir,
            output_dir:               a.output_dir,
            tokenizer:                a.data.tokenizer,
            task:                     a.data.task,
            train_on:                 a.train_on,
            dev_on:                   a.dev_on,
            json_part:                a.data.json_part,
            max_sequence_length:      a.data.max_sequence_length,
            lowercase:                a.data.lowercase,
            turn_separator_character: a.turn_separator_character,
            train_portion:            a.train_portion,
            overflow:                 a.data.overflow,
            on_length_mismatch:       a.data.on_length_mismatch,
            train_batch_size:         a.train_batch_size,
            eval_batch_size:          a.eval_batch_size,
            epochs:                   a.epochs,
            lr:                       a.lr,
            seed:                     a.seed,
            init_from:                a.init_from,
            d_model:                  a.d_model,
            num_heads:                a.num_heads,
            num_layers:               a.num_layers,
            d_ff:                     a.d_ff,
            dropout:                  a.dropout,
            vocab_size:               a.vocab_size,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Output directory of the training run to score
    #[arg(long, default_value = "runs/default")]
    pub output_dir: String,

    /// `dev` scores the run's dev set, `test` scores test.json
    #[arg(long, value_enum, default_value_t = EvalSplit::Dev)]
    pub eval_on: EvalSplit,

    /// Read the split from here instead of the run's data directory
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Use this tokenizer instead of the one the run recorded
    #[arg(long)]
    pub tokenizer: Option<String>,

    #[arg(long, default_value_t = 4)]
    pub eval_batch_size: usize,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            run_dir:         a.output_dir,
            eval_on:         a.eval_on,
            data_dir:        a.data_dir,
            tokenizer:       a.tokenizer,
            eval_batch_size: a.eval_batch_size,
        }
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Dataset name to encode
    #[arg(long)]
    pub dataset: String,

    /// Write encoded features as JSON lines to this file
    #[arg(long)]
    pub out: Option<String>,
}

impl From<EncodeArgs> for EncodeConfig {
    fn from(a: EncodeArgs) -> Self {
        EncodeConfig {
            data_dir:            a.data.data_dir,
            dataset:             a.dataset,
            tokenizer:           a.data.tokenizer,
            task:                a.data.task,
            json_part:           a.data.json_part,
            max_sequence_length: a.data.max_sequence_length,
            lowercase:           a.data.lowercase,
            overflow:            a.data.overflow,
            on_length_mismatch:  a.data.on_length_mismatch,
            out:                 a.out,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["convq-tagger", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(TrainConfig::from(args), TrainConfig::default());
    }

    #[test]
    fn test_encode_flags() {
        let cli = Cli::try_parse_from([
            "convq-tagger", "encode",
            "--dataset", "dev",
            "--task", "ner",
            "--overflow", "reject",
            "--on-length-mismatch", "warn",
            "--max-sequence-length", "64",
        ])
        .unwrap();
        let Commands::Encode(args) = cli.command else { panic!("expected encode") };
        let cfg = EncodeConfig::from(args);
        assert_eq!(cfg.task, Task::Ner);
        assert_eq!(cfg.overflow, OverflowPolicy::Reject);
        assert_eq!(cfg.on_length_mismatch, LengthMismatchPolicy::Warn);
        assert_eq!(cfg.max_sequence_length, 64);
        assert!(cfg.out.is_none());
    }

    #[test]
    fn test_evaluate_flags() {
        let cli = Cli::try_parse_from([
            "convq-tagger", "evaluate",
            "--output-dir", "runs/cast",
            "--eval-on", "test",
        ])
        .unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        let cfg = EvaluateConfig::from(args);
        assert_eq!(cfg.run_dir, "runs/cast");
        assert_eq!(cfg.eval_on, EvalSplit::Test);
        assert_eq!(cfg.eval_batch_size, 4);
        assert!(cfg.data_dir.is_none() && cfg.tokenizer.is_none());
    }

    #[test]
    fn test_evaluate_defaults_to_dev() {
        let cli = Cli::try_parse_from(["convq-tagger", "evaluate"]).unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        assert_eq!(args.eval_on, EvalSplit::Dev);
        assert_eq!(args.output_dir, TrainConfig::default().output_dir);
    }

    #[test]
    fn test_encode_requires_dataset() {
        assert!(Cli::try_parse_from(["convq-tagger", "encode"]).is_err());
    }
}
