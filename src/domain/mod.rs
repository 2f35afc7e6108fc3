// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain data types and traits shared by every other layer.
// Nothing in here touches burn, files, or the tokenizers crate.

/// A labelled word sequence with its id
pub mod record;

/// Fixed-length encoder output for one record
pub mod feature;

/// Label name <-> id mapping with the two sentinels
pub mod label_vocab;

/// Entity tagging vs. turn-relevance tagging
pub mod task;

/// Failure taxonomy of the alignment pipeline
pub mod error;

/// Record source and tokenizer capabilities
pub mod traits;
