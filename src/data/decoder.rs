// ============================================================
// Layer 4 - Prediction Decoder
// ============================================================
// Inverse of the feature encoder on the output side: from
// position-aligned true and predicted label ids back to word
// level label names and surface words.
//
// Walk positions 1..L (position 0 is [CLS]):
//   - continuation positions (valid 0) carry no label, skip them
//   - the separator label ends the example; the surface words are
//     rebuilt from input_ids[1..] by gluing every valid-0 piece
//     onto the word before it, stopping at padding or at the
//     separator piece. Only glued continuation pieces lose their
//     marker; a word-initial piece is kept as written
//   - anything else contributes one true and one predicted name
//
// An example with no separator label is a broken encoder/decoder
// contract and is reported, never looped over.

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TaggerError};
use crate::domain::feature::EncodedFeature;
use crate::domain::label_vocab::LabelVocab;
use crate::domain::traits::{ContinuationMarker, SubwordTokenizer};

/// Word-level view of one evaluated example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedExample {
    pub id:               String,
    pub true_labels:      Vec<String>,
    pub predicted_labels: Vec<String>,
    pub surface_tokens:   Vec<String>,
}

/// Decode one example.
///
/// `predicted` and `true_ids` are position-aligned with `valid_mask`
/// and `input_ids`. Predicted ids without a vocabulary entry fall
/// back to `outside_label`; true ids without one are an error.
#[allow(clippy::too_many_arguments)]
pub fn decode<T>(
    id:            &str,
    predicted:     &[u32],
    true_ids:      &[u32],
    valid_mask:    &[u32],
    input_ids:     &[u32],
    tokenizer:     &T,
    vocab:         &LabelVocab,
    outside_label: &str,
) -> Result<DecodedExample>
where
    T: SubwordTokenizer + ContinuationMarker + ?Sized,
{
    let len = true_ids.len();
    for (field, actual) in [("predicted", predicted.len()), ("valid_mask", valid_mask.len()), ("input_ids", input_ids.len())] {
        if actual != len {
            return Err(TaggerError::LengthInvariant { field, expected: len, actual });
        }
    }

    let mut true_labels      = Vec::new();
    let mut predicted_labels = Vec::new();

    for j in 1..len {
        if valid_mask[j] == 0 {
            continue;
        }

        if true_ids[j] == vocab.separator_id() {
            let surface_tokens = surface_tokens(input_ids, valid_mask, tokenizer);
            return Ok(DecodedExample {
                id: id.to_string(),
                true_labels,
                predicted_labels,
                surface_tokens,
            });
        }

        let true_name = vocab.name(true_ids[j]).ok_or(TaggerError::UnknownLabelId(true_ids[j]))?;
        let predicted_name = vocab.name(predicted[j]).unwrap_or(outside_label);
        true_labels.push(true_name.to_string());
        predicted_labels.push(predicted_name.to_string());
    }

    Err(TaggerError::MissingSeparator { id: id.to_string() })
}

/// Decode a feature against position-aligned predictions.
pub fn decode_feature<T>(
    feature:       &EncodedFeature,
    predicted:     &[u32],
    tokenizer:     &T,
    vocab:         &LabelVocab,
    outside_label: &str,
) -> Result<DecodedExample>
where
    T: SubwordTokenizer + ContinuationMarker + ?Sized,
{
    decode(
        &feature.id,
        predicted,
        &feature.label_ids,
        &feature.valid_mask,
        &feature.input_ids,
        tokenizer,
        vocab,
        outside_label,
    )
}

/// Decode features against their predictions, in order.
/// Stops at the first example that fails.
pub fn decode_all<T>(
    features:      &[EncodedFeature],
    predictions:   &[Vec<u32>],
    tokenizer:     &T,
    vocab:         &LabelVocab,
    outside_label: &str,
) -> Result<Vec<DecodedExample>>
where
    T: SubwordTokenizer + ContinuationMarker + ?Sized,
{
    if features.len() != predictions.len() {
        return Err(TaggerError::LengthInvariant {
            field:    "predictions",
            expected: features.len(),
            actual:   predictions.len(),
        });
    }

    features
        .iter()
        .zip(predictions)
        .map(|(f, p)| decode_feature(f, p, tokenizer, vocab, outside_label))
        .collect()
}

/// Rebuild the words behind `input_ids[1..]`.
fn surface_tokens<T>(input_ids: &[u32], valid_mask: &[u32], tokenizer: &T) -> Vec<String>
where
    T: SubwordTokenizer + ContinuationMarker + ?Sized,
{
    let mut words: Vec<String> = Vec::new();

    for jj in 1..input_ids.len() {
        let id = input_ids[jj];
        if id == tokenizer.pad_id() {
            break;
        }
        let piece = tokenizer.id_to_piece(id).unwrap_or_default();
        if piece == tokenizer.separator_piece() {
            break;
        }

        if valid_mask[jj] == 1 || words.is_empty() {
            words.push(piece);
            continue;
        }
        let fragment = if tokenizer.is_continuation(&piece) {
            tokenizer.strip_marker(&piece)
        } else {
            piece.as_str()
        };
        if let Some(last) = words.last_mut() {
            last.push_str(fragment);
        }
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encoder::{encode, EncoderConfig, OverflowPolicy};
    use crate::domain::record::Record;
    use crate::domain::task::Task;
    use crate::infra::tokenizer_store::tests::toy_tokenizer;

    fn record(words: &[&str], labels: &[&str]) -> Record {
        Record::new(
            "C_3#4",
            words.iter().map(|s| s.to_string()).collect(),
            labels.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip_of_own_labels() {
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        let r     = record(&["playing", "unaffable", "it", "resolve"], &["O", "REL", "REL", "O"]);
        let cfg   = EncoderConfig::new(16, OverflowPolicy::Truncate).unwrap();
        let f     = encode(&r, &vocab, &cfg, &tok).unwrap();

        let decoded = decode_feature(&f, &f.label_ids, &tok, &vocab, "O").unwrap();
        assert_eq!(decoded.surface_tokens, r.words());
        assert_eq!(decoded.true_labels, r.labels());
        assert_eq!(decoded.predicted_labels, r.labels());
        assert_eq!(decoded.id, "C_3#4");
    }

    #[test]
    fn test_round_trip_when_sequence_is_full() {
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        let r     = record(&["what", "about", "it"], &["O", "O", "REL"]);
        let cfg   = EncoderConfig::new(5, OverflowPolicy::Truncate).unwrap();
        let f     = encode(&r, &vocab, &cfg, &tok).unwrap();

        let decoded = decode_feature(&f, &f.label_ids, &tok, &vocab, "O").unwrap();
        assert_eq!(decoded.surface_tokens, r.words());
        assert_eq!(decoded.true_labels, r.labels());
    }

    #[test]
    fn test_word_normalized_away_keeps_its_label() {
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        // zero-width space: the BERT normalizer drops it entirely
        let r     = record(&["what", "\u{200b}", "it"], &["O", "REL", "REL"]);
        let cfg   = EncoderConfig::new(8, OverflowPolicy::Truncate).unwrap();
        let f     = encode(&r, &vocab, &cfg, &tok).unwrap();
        assert_eq!(&f.input_ids[..5], &[2, 7, 1, 6, 3]);
        assert_eq!(f.valid_count(), 5);

        let decoded = decode_feature(&f, &f.label_ids, &tok, &vocab, "O").unwrap();
        assert_eq!(decoded.true_labels, r.labels());
        assert_eq!(decoded.surface_tokens, vec!["what", "[UNK]", "it"]);
    }

    #[test]
    fn test_word_initial_marker_is_kept() {
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        // ##aff starts a word here; ##able is glued on and loses its marker
        let true_ids  = [3, 2, 0, 4, 0];
        let valid     = [1, 1, 0, 1, 1];
        let input_ids = [2, 12, 13, 3, 0];
        let decoded = decode("x", &true_ids, &true_ids, &valid, &input_ids, &tok, &vocab, "O").unwrap();
        assert_eq!(decoded.surface_tokens, vec!["##affable"]);
        assert_eq!(decoded.true_labels, vec!["REL"]);
    }

    #[test]
    fn test_unknown_prediction_falls_back_to_outside() {
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        let r     = record(&["resolve", "it"], &["O", "REL"]);
        let f     = encode(&r, &vocab, &EncoderConfig::new(6, OverflowPolicy::Truncate).unwrap(), &tok).unwrap();

        let predicted = vec![3, 2, 99, 4, 0, 0];
        let decoded = decode_feature(&f, &predicted, &tok, &vocab, "O").unwrap();
        assert_eq!(decoded.predicted_labels, vec!["REL", "O"]);
        assert_eq!(decoded.true_labels, vec!["O", "REL"]);
    }

    #[test]
    fn test_missing_separator_is_structural_error() {
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        // [CLS] resolve it, no [SEP] label anywhere
        let true_ids  = [3, 1, 2, 2];
        let valid     = [1, 1, 1, 1];
        let input_ids = [2, 5, 6, 0];
        let err = decode("x", &true_ids, &true_ids, &valid, &input_ids, &tok, &vocab, "O").unwrap_err();
        assert!(matches!(err, TaggerError::MissingSeparator { id } if id == "x"));
    }

    #[test]
    fn test_decode_all_keeps_order() {
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        let cfg   = EncoderConfig::new(8, OverflowPolicy::Truncate).unwrap();
        let a = encode(&record(&["it"], &["REL"]), &vocab, &cfg, &tok).unwrap();
        let b = encode(&record(&["the", "cost"], &["O", "O"]), &vocab, &cfg, &tok).unwrap();
        let preds = vec![a.label_ids.clone(), b.label_ids.clone()];

        let decoded = decode_all(&[a, b], &preds, &tok, &vocab, "O").unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].surface_tokens, vec!["it"]);
        assert_eq!(decoded[1].surface_tokens, vec!["the", "cost"]);
        assert!(decode_all(&[], &preds, &tok, &vocab, "O").is_err());
    }

    #[test]
    fn test_length_mismatch_is_reported() {
        let vocab = Task::ConvSearch.vocabulary().unwrap();
        let tok   = toy_tokenizer();
        let err = decode("x", &[3, 4], &[3, 4, 0], &[1, 1, 1], &[2, 3, 0], &tok, &vocab, "O").unwrap_err();
        assert!(matches!(err, TaggerError::LengthInvariant { field: "predicted", .. }));
    }
}
