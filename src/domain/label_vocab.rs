// ============================================================
// Layer 3 - Label Vocabulary
// ============================================================
// Bidirectional label name <-> id mapping.
//
//   id 0        never assigned, means "padding / unscored"
//   ids 1..=n   caller-supplied order, then the two sentinels
//               (sequence start, sequence separator) if the
//               caller did not already list them
//
// Ids follow input order rather than sorting, so the same label
// list always yields the same mapping across runs.
//
// Built once per task and shared read-only by every encoder and
// decoder call.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TaggerError};

/// Names of the two structural labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelNames {
    pub start:     String,
    pub separator: String,
}

impl SentinelNames {
    pub fn new(start: impl Into<String>, separator: impl Into<String>) -> Self {
        Self { start: start.into(), separator: separator.into() }
    }
}

impl Default for SentinelNames {
    fn default() -> Self {
        Self::new("[CLS]", "[SEP]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VocabRepr", into = "VocabRepr")]
pub struct LabelVocab {
    /// names[i] has id i + 1
    names:        Vec<String>,
    name_to_id:   HashMap<String, u32>,
    start_id:     u32,
    separator_id: u32,
}

impl LabelVocab {
    /// Assign ids starting at 1 in the given order.
    pub fn build<S: AsRef<str>>(label_names: &[S], sentinels: &SentinelNames) -> Result<Self> {
        let mut names: Vec<String> = Vec::with_capacity(label_names.len() + 2);
        let mut name_to_id = HashMap::with_capacity(label_names.len() + 2);

        for name in label_names.iter().map(AsRef::as_ref) {
            if name_to_id.contains_key(name) {
                return Err(TaggerError::DuplicateLabel(name.to_string()));
            }
            names.push(name.to_string());
            name_to_id.insert(name.to_string(), names.len() as u32);
        }

        for sentinel in [&sentinels.start, &sentinels.separator] {
            if !name_to_id.contains_key(sentinel.as_str()) {
                names.push(sentinel.clone());
                name_to_id.insert(sentinel.clone(), names.len() as u32);
            }
        }

        let start_id     = name_to_id[sentinels.start.as_str()];
        let separator_id = name_to_id[sentinels.separator.as_str()];
        if start_id == separator_id {
            return Err(TaggerError::DuplicateLabel(sentinels.start.clone()));
        }

        Ok(Self { names, name_to_id, start_id, separator_id })
    }

    /// Rebuild the vocabulary a run saved with `label_map`. Ids must run
    /// 1..=n without gaps, so every id keeps its meaning.
    pub fn from_label_map(map: &BTreeMap<u32, String>, sentinels: &SentinelNames) -> Result<Self> {
        for (expected, &found) in (1u32..).zip(map.keys()) {
            if found != expected {
                return Err(TaggerError::LabelMapGap { expected, found });
            }
        }
        let names: Vec<&str> = map.values().map(String::as_str).collect();
        Self::build(&names, sentinels)
    }

    /// Id of a true label. Unknown names are an error, never a default.
    pub fn id(&self, name: &str) -> Result<u32> {
        self.name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| TaggerError::UnknownLabel(name.to_string()))
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.names.get(id as usize - 1).map(String::as_str)
    }

    pub fn start_id(&self) -> u32 {
        self.start_id
    }

    pub fn separator_id(&self) -> u32 {
        self.separator_id
    }

    pub fn start_name(&self) -> &str {
        &self.names[self.start_id as usize - 1]
    }

    pub fn separator_name(&self) -> &str {
        &self.names[self.separator_id as usize - 1]
    }

    /// Number of named labels, sentinels included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Classifier width: every named label plus the reserved id 0.
    pub fn num_classes(&self) -> usize {
        self.names.len() + 1
    }

    /// id -> name, ordered by id, for persistence next to a run.
    pub fn label_map(&self) -> BTreeMap<u32, String> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as u32 + 1, n.clone()))
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct VocabRepr {
    labels:    Vec<String>,
    start:     String,
    separator: String,
}

impl From<LabelVocab> for VocabRepr {
    fn from(v: LabelVocab) -> Self {
        let start     = v.start_name().to_string();
        let separator = v.separator_name().to_string();
        Self { labels: v.names, start, separator }
    }
}

impl TryFrom<VocabRepr> for LabelVocab {
    type Error = TaggerError;

    fn try_from(r: VocabRepr) -> Result<Self> {
        LabelVocab::build(&r.labels, &SentinelNames::new(r.start, r.separator))
    }
}
