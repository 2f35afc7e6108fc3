// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// Seams where the pipeline meets things it does not own:
//
//   RecordSource       - where labelled records come from
//   SubwordTokenizer   - splits words into pieces and maps them
//                        to vocabulary ids
//   ContinuationMarker - how a tokenizer flags non-initial pieces,
//                        used when surface words are rebuilt
//
// The encoder and decoder only see these traits, so a different
// tokenizer convention plugs in without touching either.

use crate::domain::error::Result;
use crate::domain::record::Record;

// ─── RecordSource ─────────────────────────────────────────────────────────────
/// Anything that can produce the labelled records of one dataset split.
///
/// Implementations:
///   - DatasetFile -> a JSON or CoNLL file picked by task
pub trait RecordSource {
    fn load_all(&self) -> Result<Vec<Record>>;
}

// ─── SubwordTokenizer ─────────────────────────────────────────────────────────
pub trait SubwordTokenizer {
    /// Split one word into one or more pieces.
    fn tokenize(&self, word: &str) -> Result<Vec<String>>;

    fn pieces_to_ids(&self, pieces: &[String]) -> Result<Vec<u32>>;

    fn id_to_piece(&self, id: u32) -> Option<String>;

    /// Piece written at position 0.
    fn start_piece(&self) -> &str;

    /// Piece written after the last kept word.
    fn separator_piece(&self) -> &str;

    fn pad_id(&self) -> u32;
}

// ─── ContinuationMarker ───────────────────────────────────────────────────────
pub trait ContinuationMarker {
    fn is_continuation(&self, piece: &str) -> bool;

    /// The piece without its continuation marker, if any.
    fn strip_marker<'a>(&self, piece: &'a str) -> &'a str;
}
