// ============================================================
// Layer 2 - EncodeUseCase
// ============================================================
// Runs a dataset through the feature encoder without training,
// and checks the encoding against its own inverse:
//
//   Step 1: Load tokenizer and label vocabulary
//   Step 2: Read the records
//   Step 3: Encode every record
//   Step 4: Decode every feature with its own label ids as the
//           prediction; the word labels must come back unchanged
//           (the kept prefix, for truncated records)
//   Step 5: Optionally write the features as JSON lines
//
// Surface words can legitimately differ from the input (case
// folding, unknown words), so those are counted, not rejected.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{bail, Context, Result};

use crate::data::{
    decoder::decode_feature,
    encoder::{encode_all, EncoderConfig, OverflowPolicy},
    reader::{DatasetFile, LengthMismatchPolicy},
};
use crate::domain::{task::Task, traits::RecordSource};
use crate::infra::tokenizer_store::WordPieceTokenizer;

#[derive(Debug, Clone)]
pub struct EncodeConfig {
    pub data_dir:            String,
    pub dataset:             String,
    pub tokenizer:           String,
    pub task:                Task,
    pub json_part:           String,
    pub max_sequence_length: usize,
    pub lowercase:           bool,
    pub overflow:            OverflowPolicy,
    pub on_length_mismatch:  LengthMismatchPolicy,
    /// Write encoded features here, one JSON object per line
    pub out:                 Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeReport {
    pub records:            usize,
    /// Records that lost words to the length bound
    pub truncated:          usize,
    /// Records whose decoded surface words differ from the input
    pub surface_mismatches: usize,
}

pub struct EncodeUseCase {
    config: EncodeConfig,
}

impl EncodeUseCase {
    pub fn new(config: EncodeConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EncodeReport> {
        let cfg = &self.config;

        // ── Step 1 ────────────────────────────────────────────────────────────
        let tokenizer = WordPieceTokenizer::load(Path::new(&cfg.tokenizer), cfg.lowercase)
            .with_context(|| format!("Cannot load tokenizer '{}'", cfg.tokenizer))?;
        let vocab = cfg.task.vocabulary()?;

        // ── Step 2 ────────────────────────────────────────────────────────────
        let file = DatasetFile::new(
            &cfg.data_dir,
            cfg.dataset.as_str(),
            cfg.task.record_format(),
            cfg.json_part.as_str(),
            cfg.on_length_mismatch,
        );
        let records = file
            .load_all()
            .with_context(|| format!("Cannot read '{}'", file.path().display()))?;

        // ── Step 3 ────────────────────────────────────────────────────────────
        let encoder_cfg = EncoderConfig::new(cfg.max_sequence_length, cfg.overflow)?;
        let features = encode_all(&records, &vocab, &encoder_cfg, &tokenizer)?;

        // ── Step 4: Round trip ────────────────────────────────────────────────
        let mut report = EncodeReport { records: records.len(), ..EncodeReport::default() };
        for (record, feature) in records.iter().zip(&features) {
            let decoded = decode_feature(feature, &feature.label_ids, &tokenizer, &vocab, cfg.task.outside_label())?;
            let kept = decoded.true_labels.len();

            if decoded.true_labels != record.labels()[..kept] {
                bail!("labels of record '{}' do not survive encoding", record.id());
            }
            if kept < record.len() {
                report.truncated += 1;
            } else if decoded.surface_tokens != record.words() {
                report.surface_mismatches += 1;
                tracing::debug!(
                    "Surface words of '{}' differ: {:?} vs {:?}",
                    record.id(), decoded.surface_tokens, record.words()
                );
            }
        }

        // ── Step 5: JSON lines ────────────────────────────────────────────────
        if let Some(out) = &cfg.out {
            let mut writer = BufWriter::new(
                File::create(out).with_context(|| format!("Cannot create '{out}'"))?,
            );
            for feature in &features {
                serde_json::to_writer(&mut writer, feature)?;
                writeln!(writer)?;
            }
            writer.flush()?;
            tracing::info!("Wrote {} features to '{}'", features.len(), out);
        }

        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feature::EncodedFeature;
    use std::fs;

    const VOCAB: &str = "[PAD]\n[UNK]\n[CLS]\n[SEP]\nresolve\nit\nwhat\nabout\nthe\ncost\n";

    fn config(dir: &Path, max_sequence_length: usize) -> EncodeConfig {
        fs::write(dir.join("vocab.txt"), VOCAB).unwrap();
        fs::write(
            dir.join("dev.json"),
            r#"[
                {"id": "C_1#1", "tokens": ["what", "about", "it"], "labels": ["O", "O", "REL"]},
                {"id": "C_1#2", "tokens": ["the", "cost"], "labels": ["O", "REL"]},
                {"id": "C_1#3", "tokens": ["Resolve", "it"], "labels": ["O", "REL"]}
            ]"#,
        )
        .unwrap();
        EncodeConfig {
            data_dir:            dir.display().to_string(),
            dataset:             "dev".into(),
            tokenizer:           dir.join("vocab.txt").display().to_string(),
            task:                Task::ConvSearch,
            json_part:           "bert_ner_overlap".into(),
            max_sequence_length,
            lowercase:           true,
            overflow:            OverflowPolicy::Truncate,
            on_length_mismatch:  LengthMismatchPolicy::Reject,
            out:                 Some(dir.join("features.jsonl").display().to_string()),
        }
    }

    #[test]
    fn test_encode_writes_json_lines() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = config(dir.path(), 8);
        let report = EncodeUseCase::new(cfg).execute().unwrap();
        assert_eq!(report.records, 3);
        assert_eq!(report.truncated, 0);
        // "Resolve" comes back lowercased
        assert_eq!(report.surface_mismatches, 1);

        let text = fs::read_to_string(dir.path().join("features.jsonl")).unwrap();
        let features: Vec<EncodedFeature> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].id, "C_1#1");
        assert_eq!(features[0].input_ids.len(), 8);
    }

    #[test]
    fn test_truncated_records_are_counted() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = EncodeConfig { out: None, ..config(dir.path(), 4) };
        let report = EncodeUseCase::new(cfg).execute().unwrap();
        // only "what about it" needs more than two pieces
        assert_eq!(report.truncated, 1);
    }
}
