// ============================================================
// Layer 4 - Record Reader
// ============================================================
// Parses labelled examples from disk into Records.
//
// Two layouts are supported:
//
//   JSON  - an array of entries. Each entry has an "id" and
//           either "tokens" + "labels" arrays, or a named part
//           holding a [tokens, labels] pair:
//
//             [{"id": "C_1#2",
//               "bert_ner_overlap": [["what", "about", "it"],
//                                    ["O",    "O",     "REL"]]}]
//
//   CoNLL - one "word ... label" line per word, whitespace
//           separated, first column is the word and last column
//           the label. Blank lines and -DOCSTART lines end a
//           sentence.
//
// Word/label length mismatches go through an explicit policy:
// reject the record, or warn and trim both sides to the shorter.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TaggerError};
use crate::domain::record::Record;
use crate::domain::task::RecordFormat;
use crate::domain::traits::RecordSource;

/// What to do with a record whose word and label counts differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LengthMismatchPolicy {
    /// Fail with MalformedRecord
    #[default]
    Reject,
    /// Log the record and keep the aligned prefix
    Warn,
}

/// Build a record from raw columns, applying `policy` on mismatch.
pub fn make_record(
    id:     String,
    mut words:  Vec<String>,
    mut labels: Vec<String>,
    policy: LengthMismatchPolicy,
) -> Result<Record> {
    if words.len() != labels.len() && policy == LengthMismatchPolicy::Warn {
        tracing::warn!(
            "Record '{}' has {} words but {} labels; keeping the aligned prefix",
            id,
            words.len(),
            labels.len()
        );
        let n = words.len().min(labels.len());
        words.truncate(n);
        labels.truncate(n);
    }
    Record::new(id, words, labels)
}

// ─── JSON ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JsonEntry {
    id: serde_json::Value,
    #[serde(default)]
    tokens: Option<Vec<String>>,
    #[serde(default)]
    labels: Option<Vec<String>>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

/// Parse JSON records from a string. `part` names the field that holds a
/// `[tokens, labels]` pair for entries without their own arrays.
pub fn parse_json_records(text: &str, part: &str, policy: LengthMismatchPolicy) -> Result<Vec<Record>> {
    let entries: Vec<JsonEntry> = serde_json::from_str(text)?;
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        let id = match entry.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };

        let (words, labels) = match (entry.tokens, entry.labels) {
            (Some(words), Some(labels)) => (words, labels),
            _ => {
                let pair = entry.rest.get(part).cloned().unwrap_or(serde_json::Value::Null);
                serde_json::from_value::<(Vec<String>, Vec<String>)>(pair)?
            }
        };

        records.push(make_record(id, words, labels, policy)?);
    }

    Ok(records)
}

pub fn read_json_records(path: &Path, part: &str, policy: LengthMismatchPolicy) -> Result<Vec<Record>> {
    let text = fs::read_to_string(path)?;
    parse_json_records(&text, part, policy)
}

// ─── CoNLL ────────────────────────────────────────────────────────────────────

/// Parse CoNLL-style text. Records get ids `<set_name>-<index>`.
pub fn parse_conll_records(text: &str, set_name: &str, policy: LengthMismatchPolicy) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut words:  Vec<String> = Vec::new();
    let mut labels: Vec<String> = Vec::new();

    let flush = |words: &mut Vec<String>, labels: &mut Vec<String>, records: &mut Vec<Record>| -> Result<()> {
        if !words.is_empty() {
            let id = format!("{}-{}", set_name, records.len());
            records.push(make_record(id, std::mem::take(words), std::mem::take(labels), policy)?);
        }
        Ok(())
    };

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("-DOCSTART") {
            flush(&mut words, &mut labels, &mut records)?;
            continue;
        }

        let columns: Vec<&str> = trimmed.split_whitespace().collect();
        if columns.len() < 2 {
            return Err(TaggerError::MalformedLine { line: line_no + 1, content: line.to_string() });
        }
        words.push(columns[0].to_string());
        labels.push(columns[columns.len() - 1].to_string());
    }
    flush(&mut words, &mut labels, &mut records)?;

    Ok(records)
}

pub fn read_conll_records(path: &Path, set_name: &str, policy: LengthMismatchPolicy) -> Result<Vec<Record>> {
    let text = fs::read_to_string(path)?;
    parse_conll_records(&text, set_name, policy)
}

// ─── DatasetFile ──────────────────────────────────────────────────────────────
/// One dataset split on disk: `<dir>/<name>.json` or `<dir>/<name>.txt`.
pub struct DatasetFile {
    path:     PathBuf,
    name:     String,
    format:   RecordFormat,
    json_part: String,
    policy:   LengthMismatchPolicy,
}

impl DatasetFile {
    pub fn new(
        dir:       impl AsRef<Path>,
        name:      impl Into<String>,
        format:    RecordFormat,
        json_part: impl Into<String>,
        policy:    LengthMismatchPolicy,
    ) -> Self {
        let name = name.into();
        let path = dir.as_ref().join(format!("{}.{}", name, format.extension()));
        Self { path, name, format, json_part: json_part.into(), policy }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for DatasetFile {
    fn load_all(&self) -> Result<Vec<Record>> {
        let records = match self.format {
            RecordFormat::Json  => read_json_records(&self.path, &self.json_part, self.policy)?,
            RecordFormat::Conll => read_conll_records(&self.path, &self.name, self.policy)?,
        };
        tracing::info!("Loaded {} records from '{}'", records.len(), self.path.display());
        Ok(records)
    }
}
