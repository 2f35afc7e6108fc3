// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal: training a tagger, scoring a trained one again, or
// encoding a dataset to inspect and check the feature encoding.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination

// The training workflow
pub mod train_use_case;

// Score a finished run on its dev set or the test set
pub mod evaluate_use_case;

// Encode a dataset and verify the encoding round trip
pub mod encode_use_case;
