// ============================================================
// Layer 3 - Record Domain Type
// ============================================================
// One labelled example: a conversation history flattened into
// words, with one label per word. Every record produced by a
// reader satisfies len(words) == len(labels); the constructor
// is the only way in, so the encoder never sees a mismatch.

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TaggerError};

/// A raw labelled example, ready for the feature encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    id:     String,
    words:  Vec<String>,
    labels: Vec<String>,
}

impl Record {
    /// Build a record, rejecting word/label length mismatches.
    pub fn new(
        id:     impl Into<String>,
        words:  Vec<String>,
        labels: Vec<String>,
    ) -> Result<Self> {
        let id = id.into();
        if words.len() != labels.len() {
            return Err(TaggerError::MalformedRecord {
                id,
                words:  words.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { id, words, labels })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// The conversation this record belongs to: the id prefix
    /// before the first `separator`, or the whole id.
    pub fn conversation_id(&self, separator: char) -> &str {
        match self.id.find(separator) {
            Some(idx) => &self.id[..idx],
            None      => &self.id,
        }
    }
}
