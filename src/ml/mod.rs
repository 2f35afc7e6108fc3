// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// Model, training and evaluation code built on Burn.
//
//   gather.rs    - moves the hidden state of each word's first
//                  piece to the front of its row; host-side
//                  compaction / scatter of labels and predictions
//
//   model.rs     - the transformer encoder (token + position +
//                  segment embeddings, padding mask, post-norm
//                  blocks) and the token classifier with its
//                  masked cross entropy
//
//   trainer.rs   - Adam training loop with per-epoch dev
//                  evaluation and early stopping on F1
//
//   evaluator.rs - inference-mode prediction, decoding and scoring
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Devlin et al. (2019) BERT

/// Valid-position gather and its host-side helpers
pub mod gather;

/// Transformer encoder and token classification head
pub mod model;

/// Training loop with early stopping
pub mod trainer;

/// Dev-set prediction and scoring
pub mod evaluator;
