// ============================================================
// Layer 4 - Data Layer
// ============================================================
// Everything between files on disk and tensors:
//
//   .json / .txt files
//       │
//       ▼
//   reader            → Records (words + labels per example)
//       │
//       ▼
//   sampler           → a seeded portion of the conversations
//       │
//       ▼
//   encoder           → EncodedFeatures ([CLS] pieces [SEP] + masks)
//       │
//       ▼
//   FeatureDataset    → Burn Dataset
//       │
//       ▼
//   TaggingBatcher    → tensor batches, targets compacted per word
//
// and on the way back, decoder turns predicted label ids into
// word labels and surface words again.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads JSON and CoNLL record files
pub mod reader;

/// Samples a portion of the conversations, turns kept together
pub mod sampler;

/// Record -> fixed-length, position-aligned feature
pub mod encoder;

/// Predicted label ids -> word labels and surface words
pub mod decoder;

/// Implements Burn's Dataset trait for encoded features
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
