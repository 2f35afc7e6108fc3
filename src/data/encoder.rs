// ============================================================
// Layer 4 - Feature Encoder
// ============================================================
// Turns one Record into a fixed-length EncodedFeature.
//
// Steps (per record):
//
//   1. Split every word into subword pieces and concatenate them.
//   2. The first piece of a word carries the word's label and is
//      marked valid; continuation pieces get label 0, valid 0.
//   3. If pieces + 2 sentinels exceed max_length, keep the first
//      max_length - 2 pieces (or reject, per OverflowPolicy).
//   4. [CLS] pieces [SEP], both sentinels valid and labelled.
//   5. score_mask = 1 from position 0 up to and including the
//      first [SEP] label, 0 after it.
//   6. Right-pad to max_length: pad id for input_ids, 0 for the
//      attention, segment, label and score arrays, and 1 for
//      valid_mask. Padding is valid so that consumers branching
//      only on valid_mask keep it; score_mask is what filters
//      loss and evaluation.
//   7. Every array must be exactly max_length long, and the real
//      positions hold exactly kept words + 2 valid entries.
//
// Example, max_length = 8, "unaffable" -> un ##aff ##able:
//
//   pieces     [CLS]  un  ##aff  ##able  [SEP]  [PAD] [PAD] [PAD]
//   label_ids   CLS   O     0      0      SEP     0     0     0
//   valid_mask   1    1     0      0       1      1     1     1
//   score_mask   1    1     1      1       1      0     0     0
//
// Reference: Devlin et al. (2019) BERT, section 5.3 (first
//            sub-token tagging for NER)

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TaggerError};
use crate::domain::feature::EncodedFeature;
use crate::domain::label_vocab::LabelVocab;
use crate::domain::record::Record;
use crate::domain::traits::SubwordTokenizer;

/// Two sentinels plus at least one piece.
pub const MIN_MAX_LENGTH: usize = 3;

const PROGRESS_EVERY: usize = 1000;

/// What to do when a record's pieces do not fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Keep the leading pieces, drop the tail
    #[default]
    Truncate,
    /// Fail with SequenceTooLong
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub max_length: usize,
    pub overflow:   OverflowPolicy,
}

impl EncoderConfig {
    pub fn new(max_length: usize, overflow: OverflowPolicy) -> Result<Self> {
        if max_length < MIN_MAX_LENGTH {
            return Err(TaggerError::InvalidMaxLength(max_length));
        }
        Ok(Self { max_length, overflow })
    }
}

/// Encode one record. Pure apart from a debug log on truncation.
pub fn encode<T>(
    record:    &Record,
    vocab:     &LabelVocab,
    config:    &EncoderConfig,
    tokenizer: &T,
) -> Result<EncodedFeature>
where
    T: SubwordTokenizer + ?Sized,
{
    let max_length = config.max_length;
    if max_length < MIN_MAX_LENGTH {
        return Err(TaggerError::InvalidMaxLength(max_length));
    }

    // ── Steps 1-2: pieces, per-piece labels, first-piece flags ───────────────
    let mut pieces:       Vec<String> = Vec::with_capacity(record.len());
    let mut piece_labels: Vec<u32>    = Vec::with_capacity(record.len());
    let mut first_piece:  Vec<u32>    = Vec::with_capacity(record.len());

    for (word, label) in record.words().iter().zip(record.labels()) {
        let label_id = vocab.id(label)?;
        for (m, piece) in tokenizer.tokenize(word)?.into_iter().enumerate() {
            pieces.push(piece);
            if m == 0 {
                piece_labels.push(label_id);
                first_piece.push(1);
            } else {
                piece_labels.push(0);
                first_piece.push(0);
            }
        }
    }

    // ── Step 3: truncation, always from the tail ─────────────────────────────
    let budget = max_length - 2;
    if pieces.len() > budget {
        match config.overflow {
            OverflowPolicy::Reject => {
                return Err(TaggerError::SequenceTooLong {
                    id:     record.id().to_string(),
                    pieces: pieces.len(),
                    max:    budget,
                });
            }
            OverflowPolicy::Truncate => {
                tracing::debug!(
                    "Truncating '{}': dropping {} of {} pieces",
                    record.id(),
                    pieces.len() - budget,
                    pieces.len()
                );
                pieces.truncate(budget);
                piece_labels.truncate(budget);
                first_piece.truncate(budget);
            }
        }
    }

    let kept_words = first_piece.iter().filter(|&&v| v == 1).count();

    // ── Step 4: sentinels ────────────────────────────────────────────────────
    let mut tokens = Vec::with_capacity(pieces.len() + 2);
    tokens.push(tokenizer.start_piece().to_string());
    tokens.extend(pieces);
    tokens.push(tokenizer.separator_piece().to_string());

    let mut input_ids = tokenizer.pieces_to_ids(&tokens)?;

    let mut label_ids = Vec::with_capacity(max_length);
    label_ids.push(vocab.start_id());
    label_ids.extend(piece_labels);
    label_ids.push(vocab.separator_id());

    let mut valid_mask = Vec::with_capacity(max_length);
    valid_mask.push(1);
    valid_mask.extend(first_piece);
    valid_mask.push(1);

    let mut segment_ids    = vec![0u32; input_ids.len()];
    let mut attention_mask = vec![1u32; input_ids.len()];

    // ── Step 5: score only up to the separator ───────────────────────────────
    let sep_pos = label_ids
        .iter()
        .position(|&id| id == vocab.separator_id())
        .ok_or_else(|| TaggerError::MissingSeparator { id: record.id().to_string() })?;
    let mut score_mask: Vec<u32> = (0..label_ids.len()).map(|i| u32::from(i <= sep_pos)).collect();

    // ── Step 6: padding ──────────────────────────────────────────────────────
    input_ids.resize(max_length, tokenizer.pad_id());
    attention_mask.resize(max_length, 0);
    segment_ids.resize(max_length, 0);
    label_ids.resize(max_length, 0);
    valid_mask.resize(max_length, 1);
    score_mask.resize(max_length, 0);

    let feature = EncodedFeature {
        id: record.id().to_string(),
        input_ids,
        segment_ids,
        attention_mask,
        label_ids,
        valid_mask,
        score_mask,
    };

    // ── Step 7: length and valid-count invariants ────────────────────────────
    feature.check_lengths(max_length)?;
    let valid = feature.valid_count();
    if valid != kept_words + 2 {
        return Err(TaggerError::LengthInvariant { field: "valid_mask", expected: kept_words + 2, actual: valid });
    }
    Ok(feature)
}

/// Encode records in order, logging the first example and progress.
pub fn encode_all<T>(
    records:   &[Record],
    vocab:     &LabelVocab,
    config:    &EncoderConfig,
    tokenizer: &T,
) -> Result<Vec<EncodedFeature>>
where
    T: SubwordTokenizer + ?Sized,
{
    tracing::info!("Converting {} records to features...", records.len());
    let started = Instant::now();
    let mut features = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let feature = encode(record, vocab, config, tokenizer)?;

        if index == 0 {
            log_example(record, &feature, tokenizer);
        }
        if index % PROGRESS_EVERY == 0 {
            tracing::info!("converted {} / {} examples", index + 1, records.len());
        }
        features.push(feature);
    }

    tracing::info!(
        "Done converting records to features in {:.1} minutes",
        started.elapsed().as_secs_f64() / 60.0
    );
    Ok(features)
}

/// The pieces behind a feature's real (attended) positions, sentinels
/// included.
pub fn feature_pieces<T>(feature: &EncodedFeature, tokenizer: &T) -> Vec<String>
where
    T: SubwordTokenizer + ?Sized,
{
    feature.input_ids[..feature.real_length()]
        .iter()
        .map(|&id| tokenizer.id_to_piece(id).unwrap_or_else(|| format!("<{id}>")))
        .collect()
}

fn log_example<T>(record: &Record, f: &EncodedFeature, tokenizer: &T)
where
    T: SubwordTokenizer + ?Sized,
{
    tracing::info!("*** Example ***");
    tracing::info!("id: {}", record.id());
    tracing::info!("tokens: {}", feature_pieces(f, tokenizer).join(" "));
    tracing::info!("input_ids: {}", join(&f.input_ids));
    tracing::info!("attention_mask: {}", join(&f.attention_mask));
    tracing::info!("score_mask: {}", join(&f.score_mask));
    tracing::info!("segment_ids: {}", join(&f.segment_ids));
    tracing::info!("labels: {} (ids = {})", record.labels().join(" "), join(&f.label_ids));
}

fn join(xs: &[u32]) -> String {
    xs.iter().map(u32::to_string).collect::<Vec<_>>().join(" ")
}
