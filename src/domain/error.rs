// ============================================================
// Layer 3 - Error Taxonomy
// ============================================================
// Typed failures of the alignment pipeline. Each variant aborts
// processing of a single record or example; nothing shared is
// mutated before the error is returned.
//
// The application layer wraps these in anyhow with context, the
// same way it wraps I/O and serde errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaggerError {
    /// Word and label sequences differ in length at ingestion.
    #[error("malformed record '{id}': {words} words but {labels} labels")]
    MalformedRecord {
        id:     String,
        words:  usize,
        labels: usize,
    },

    /// A CoNLL line that does not carry both a word and a label column.
    #[error("malformed line {line}: '{content}'")]
    MalformedLine { line: usize, content: String },

    /// A true label that the vocabulary has never seen.
    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    /// A true label id with no vocabulary entry.
    #[error("unknown label id {0}")]
    UnknownLabelId(u32),

    #[error("duplicate label '{0}' in label list")]
    DuplicateLabel(String),

    /// A saved label map whose ids do not run 1, 2, .., n.
    #[error("label map has id {found} where id {expected} was expected")]
    LabelMapGap { expected: u32, found: u32 },

    /// The separator sentinel never shows up in an encoded example.
    #[error("example '{id}' has no separator label; encoder/decoder contract violated")]
    MissingSeparator { id: String },

    #[error("{field} has length {actual}, expected {expected}")]
    LengthInvariant {
        field:    &'static str,
        expected: usize,
        actual:   usize,
    },

    #[error("record '{id}' needs {pieces} pieces but only {max} fit")]
    SequenceTooLong { id: String, pieces: usize, max: usize },

    #[error("max sequence length {0} cannot hold two sentinels and a word")]
    InvalidMaxLength(usize),

    #[error("training portion {0} must be in (0, 1]")]
    InvalidPortion(f64),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// A piece with no id, from a vocabulary without an unknown token.
    #[error("piece '{0}' is not in the tokenizer vocabulary")]
    UnknownPiece(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaggerError>;
