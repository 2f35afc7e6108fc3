// ============================================================
// Layer 6 - Metrics
// ============================================================
// Scoring and bookkeeping for the dev set:
//
//   score()          token-level micro precision / recall / F1
//                    over word labels. A word counts as positive
//                    when its label is anything but the outside
//                    label; a true positive needs the predicted
//                    label to match exactly.
//
//   EvalRecord       everything one evaluation produced, written
//                    as eval_results_<dev_on>_epoch<n>.json so a
//                    later run can pick up the best F1 so far
//                    (previous_best_f1).
//
//   MetricsLogger    one CSV row per epoch:
//                      epoch,train_loss,precision,recall,f1
//                      1,0.412300,0.801200,0.744100,0.771600
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::data::decoder::DecodedExample;
use crate::domain::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrfScore {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

/// Micro-averaged token scores. Empty denominators give 0.
pub fn score<S: AsRef<str>>(true_labels: &[Vec<S>], predicted_labels: &[Vec<S>], outside: &str) -> PrfScore {
    let mut true_positive = 0usize;
    let mut predicted_pos = 0usize;
    let mut actual_pos    = 0usize;

    for (truth, pred) in true_labels.iter().zip(predicted_labels) {
        for (t, p) in truth.iter().zip(pred) {
            let (t, p) = (t.as_ref(), p.as_ref());
            if p != outside {
                predicted_pos += 1;
            }
            if t != outside {
                actual_pos += 1;
                if t == p {
                    true_positive += 1;
                }
            }
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(true_positive, predicted_pos);
    let recall    = ratio(true_positive, actual_pos);
    let f1 = if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) };

    PrfScore { precision, recall, f1 }
}

// ─── EvalRecord ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    #[serde(rename = "f1_token")]
    pub f1:               f64,
    #[serde(rename = "precision_token")]
    pub precision:        f64,
    #[serde(rename = "recall_token")]
    pub recall:           f64,
    #[serde(rename = "y_true")]
    pub true_labels:      Vec<Vec<String>>,
    #[serde(rename = "y_pred")]
    pub predicted_labels: Vec<Vec<String>>,
    #[serde(rename = "x_input")]
    pub surface_tokens:   Vec<Vec<String>>,
    #[serde(rename = "ids")]
    pub example_ids:      Vec<String>,
    pub dev_on:           String,
}

impl EvalRecord {
    /// Score decoded examples and collect them into one record.
    pub fn from_decoded(decoded: Vec<DecodedExample>, outside: &str, dev_on: impl Into<String>) -> Self {
        let mut true_labels      = Vec::with_capacity(decoded.len());
        let mut predicted_labels = Vec::with_capacity(decoded.len());
        let mut surface_tokens   = Vec::with_capacity(decoded.len());
        let mut example_ids      = Vec::with_capacity(decoded.len());

        for d in decoded {
            true_labels.push(d.true_labels);
            predicted_labels.push(d.predicted_labels);
            surface_tokens.push(d.surface_tokens);
            example_ids.push(d.id);
        }

        let s = score(&true_labels, &predicted_labels, outside);
        Self {
            f1: s.f1,
            precision: s.precision,
            recall: s.recall,
            true_labels,
            predicted_labels,
            surface_tokens,
            example_ids,
            dev_on: dev_on.into(),
        }
    }

    pub fn scores(&self) -> PrfScore {
        PrfScore { precision: self.precision, recall: self.recall, f1: self.f1 }
    }

    pub fn file_name(dev_on: &str, epoch: usize) -> String {
        format!("eval_results_{dev_on}_epoch{epoch}.json")
    }

    /// Write to `<dir>/eval_results_<dev_on>_epoch<epoch>.json`.
    pub fn save(&self, dir: &Path, epoch: usize) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(&self.dev_on, epoch));
        fs::write(&path, serde_json::to_string(self)?)?;
        tracing::debug!("Saved eval record to '{}'", path.display());
        Ok(path)
    }
}

/// Best `f1_token` among the eval records in `dir` for `dev_on`,
/// or -1.0 when there are none. Files without the field are skipped.
pub fn previous_best_f1(dir: &Path, dev_on: &str) -> Result<f64> {
    #[derive(Deserialize)]
    struct F1Only {
        f1_token: Option<f64>,
    }

    let mut best = -1.0;
    if !dir.is_dir() {
        return Ok(best);
    }

    let prefix = format!("eval_results_{dev_on}_epoch");
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"));
        if !is_match {
            continue;
        }

        let parsed: serde_json::Result<F1Only> = serde_json::from_str(&fs::read_to_string(&path)?);
        match parsed {
            Ok(F1Only { f1_token: Some(f1) }) if f1 > best => best = f1,
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping unreadable eval record '{}': {e}", path.display()),
        }
    }

    Ok(best)
}

// ─── Epoch metrics ────────────────────────────────────────────────────────────
/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch:      usize,
    /// Mean masked cross entropy over the training batches
    pub train_loss: f64,
    pub dev:        PrfScore,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, dev: PrfScore) -> Self {
        Self { epoch, train_loss, dev }
    }

    /// Improvement means beating `best_f1` by more than `min_delta`.
    pub fn is_improvement(&self, best_f1: f64, min_delta: f64) -> bool {
        self.dev.f1 > best_f1 + min_delta
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so
    /// reruns into the same directory append.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,precision,recall,f1")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.dev.precision, m.dev.recall, m.dev.f1,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn labels(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect()
    }

    #[test]
    fn test_score_micro_average() {
        let truth = labels(&[&["O", "REL", "REL"], &["REL", "O"]]);
        let pred  = labels(&[&["REL", "REL", "O"], &["REL", "O"]]);
        let s = score(&truth, &pred, "O");
        // tp = 2, predicted positives = 3, actual positives = 3
        assert!((s.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((s.recall - 2.0 / 3.0).abs() < 1e-9);
        assert!((s.f1 - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_wrong_entity_type_is_not_a_hit() {
        let truth = labels(&[&["B-PER", "O"]]);
        let pred  = labels(&[&["B-ORG", "O"]]);
        let s = score(&truth, &pred, "O");
        assert_eq!(s.precision, 0.0);
        assert_eq!(s.recall, 0.0);
    }

    #[test]
    fn test_score_empty_is_zero() {
        let truth = labels(&[&["O", "O"]]);
        let s = score(&truth, &truth, "O");
        assert_eq!(s, PrfScore::default());
    }

    #[test]
    fn test_is_improvement_needs_margin() {
        let m = EpochMetrics::new(2, 0.5, PrfScore { precision: 0.5, recall: 0.5, f1: 0.5005 });
        assert!(!m.is_improvement(0.5, 0.001));
        assert!(m.is_improvement(0.4, 0.001));
        assert!(m.is_improvement(-1.0, 0.001));
    }

    #[test]
    fn test_eval_record_round_trip_and_best_f1() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(previous_best_f1(dir.path(), "train_cast").unwrap(), -1.0);

        let decoded = vec![DecodedExample {
            id:               "C_1#2".into(),
            true_labels:      vec!["O".into(), "REL".into()],
            predicted_labels: vec!["O".into(), "REL".into()],
            surface_tokens:   vec!["what".into(), "it".into()],
        }];
        let record = EvalRecord::from_decoded(decoded, "O", "train_cast");
        assert_eq!(record.f1, 1.0);
        let path = record.save(dir.path(), 1).unwrap();
        assert!(path.ends_with("eval_results_train_cast_epoch1.json"));

        let text = fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["f1_token"], 1.0);
        assert_eq!(json["ids"][0], "C_1#2");

        // other dev sets and files without the field are ignored
        fs::write(dir.path().join("eval_results_other_epoch1.json"), r#"{"f1_token": 9.0}"#).unwrap();
        fs::write(dir.path().join("eval_results_train_cast_epoch2.json"), r#"{"dev_on": "x"}"#).unwrap();
        assert_eq!(previous_best_f1(dir.path(), "train_cast").unwrap(), 1.0);
    }

    #[test]
    fn test_metrics_logger_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&EpochMetrics::new(1, 0.25, PrfScore { precision: 1.0, recall: 0.5, f1: 0.6 })).unwrap();
        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,train_loss,precision,recall,f1");
        assert_eq!(lines[1], "1,0.250000,1.000000,0.500000,0.600000");
    }
}
