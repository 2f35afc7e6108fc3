// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Uses `clap` to parse
// arguments and delegates all work to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    - fine-tunes the tagger, evaluating each epoch
//   2. `evaluate` - scores a trained run on its dev or test set
//   3. `encode`   - encodes a dataset and checks the round trip
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EncodeArgs, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "convq-tagger",
    version,
    about = "Tag the words of a conversation that the current turn refers back to."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI layer only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Encode(args)   => run_encode(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training on '{}', evaluating on '{}'", args.train_on, args.dev_on);
    let output_dir = args.output_dir.clone();

    let summary = TrainUseCase::new(args.into()).execute()?;

    match summary.best_epoch {
        Some(epoch) => println!(
            "Training complete after {} epoch(s). Best dev F1 {:.1} at epoch {}, saved to '{}'.",
            summary.epochs_run, 100.0 * summary.best_f1, epoch, output_dir
        ),
        None => println!(
            "Training stopped after {} epoch(s) without beating the previous best F1 {:.1}.",
            summary.epochs_run, 100.0 * summary.best_f1
        ),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.into()).execute()?;

    println!(
        "Scored {} examples of '{}' with the weights of epoch {}.",
        report.examples, report.dataset, report.epoch
    );
    println!(
        "  P={:.1}  R={:.1}  F1={:.1}",
        100.0 * report.scores.precision,
        100.0 * report.scores.recall,
        100.0 * report.scores.f1
    );
    println!("  record: {}", report.record_path.display());
    Ok(())
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    use crate::application::encode_use_case::EncodeUseCase;

    let report = EncodeUseCase::new(args.into()).execute()?;

    println!("Encoded {} records.", report.records);
    println!("  truncated:          {}", report.truncated);
    println!("  surface mismatches: {}", report.surface_mismatches);
    Ok(())
}
