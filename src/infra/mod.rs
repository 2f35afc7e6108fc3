// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   tokenizer_store.rs - WordPiece tokenizer loaded from a
//                        tokenizer.json or BERT vocab.txt, behind
//                        the domain tokenizer traits
//
//   metrics.rs         - P/R/F1 scoring, per-epoch eval records
//                        and the metrics CSV
//
//   run_store.rs       - the run's output directory: config,
//                        weights (full-precision mpk), model config
//                        with the label map
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// WordPiece tokenizer wrapper
pub mod tokenizer_store;

/// Scores, eval records and metrics CSV
pub mod metrics;

/// Output directory persistence
pub mod run_store;
