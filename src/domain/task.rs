// ============================================================
// Layer 3 - Task Strategy
// ============================================================
// The two tagging tasks differ only in their label set, their
// outside label and the file format their records come in. The
// rest of the pipeline asks the task for these and stays the same.

use serde::{Deserialize, Serialize};

use crate::domain::error::Result;
use crate::domain::label_vocab::{LabelVocab, SentinelNames};

/// On-disk record layout a task reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Array of `{id, tokens, labels}` entries.
    Json,
    /// Two-column CoNLL text, blank line between sentences.
    Conll,
}

impl RecordFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RecordFormat::Json  => "json",
            RecordFormat::Conll => "txt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    /// Relevance tagging of conversation history for the current turn
    ConvSearch,
    /// CoNLL-2003 named entity tagging
    Ner,
}

impl Task {
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Task::ConvSearch => &["O", "REL", "[CLS]", "[SEP]"],
            Task::Ner => &[
                "O", "B-MISC", "I-MISC", "B-PER", "I-PER", "B-ORG", "I-ORG",
                "B-LOC", "I-LOC", "[CLS]", "[SEP]",
            ],
        }
    }

    pub fn sentinels(self) -> SentinelNames {
        SentinelNames::default()
    }

    /// Fallback name for predicted ids with no vocabulary entry.
    pub fn outside_label(self) -> &'static str {
        "O"
    }

    pub fn record_format(self) -> RecordFormat {
        match self {
            Task::ConvSearch => RecordFormat::Json,
            Task::Ner        => RecordFormat::Conll,
        }
    }

    pub fn vocabulary(self) -> Result<LabelVocab> {
        LabelVocab::build(self.labels(), &self.sentinels())
    }
}
