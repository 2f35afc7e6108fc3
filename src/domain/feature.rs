// ============================================================
// Layer 3 - Encoded Feature
// ============================================================
// Fixed-length, position-aligned model input for one record.
//
// Layout for words ["resolve", "it"] with L = 8 and single-piece
// tokenization:
//
//   position        0      1        2     3      4..7
//   piece         [CLS] resolve     it  [SEP]   [PAD]
//   attention       1      1        1     1       0
//   label_ids     CLS      O      REL   SEP       0
//   valid_mask      1      1        1     1       1   <- padding is valid
//   score_mask      1      1        1     1       0
//
// Continuation pieces carry label id 0 and valid 0.

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TaggerError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFeature {
    pub id:             String,
    pub input_ids:      Vec<u32>,
    pub segment_ids:    Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub label_ids:      Vec<u32>,
    pub valid_mask:     Vec<u32>,
    pub score_mask:     Vec<u32>,
}

impl EncodedFeature {
    pub fn max_length(&self) -> usize {
        self.input_ids.len()
    }

    /// Check that every array has exactly `max_length` entries.
    pub fn check_lengths(&self, max_length: usize) -> Result<()> {
        let fields: [(&'static str, usize); 6] = [
            ("input_ids",      self.input_ids.len()),
            ("segment_ids",    self.segment_ids.len()),
            ("attention_mask", self.attention_mask.len()),
            ("label_ids",      self.label_ids.len()),
            ("valid_mask",     self.valid_mask.len()),
            ("score_mask",     self.score_mask.len()),
        ];
        for (field, actual) in fields {
            if actual != max_length {
                return Err(TaggerError::LengthInvariant { field, expected: max_length, actual });
            }
        }
        Ok(())
    }

    /// Valid positions among real (attended) positions: kept words + 2.
    pub fn valid_count(&self) -> usize {
        self.valid_mask
            .iter()
            .zip(&self.attention_mask)
            .filter(|(v, a)| **v == 1 && **a == 1)
            .count()
    }

    /// Number of real pieces, sentinels included.
    pub fn real_length(&self) -> usize {
        self.attention_mask.iter().filter(|&&a| a == 1).count()
    }
}
