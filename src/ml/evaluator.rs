// ============================================================
// Layer 5 - Evaluator
// ============================================================
// Runs a trained classifier over the dev features and scores it:
//
//   1. batch features in order (no shuffling, ids stay aligned)
//   2. forward pass in inference mode, gathering straight from
//      the valid mask, argmax over classes
//   3. the argmax is per compacted slot; scatter it back onto
//      positions with the feature's valid mask so it lines up
//      with the position-aligned true label ids
//   4. decode both into word labels, score P/R/F1
//
// Takes the model on the inner (non-autodiff) backend; the
// trainer passes model.valid().

use burn::prelude::*;

use crate::data::batcher::TaggingBatcher;
use crate::data::decoder::decode_all;
use crate::domain::error::Result;
use crate::domain::feature::EncodedFeature;
use crate::domain::label_vocab::LabelVocab;
use crate::domain::traits::{ContinuationMarker, SubwordTokenizer};
use crate::infra::metrics::EvalRecord;
use crate::ml::gather::scatter_valid;
use crate::ml::model::TokenClassifier;

pub struct Evaluator<'a, T: ?Sized> {
    pub tokenizer:  &'a T,
    pub vocab:      &'a LabelVocab,
    pub outside:    &'a str,
    pub batch_size: usize,
    pub dev_on:     &'a str,
}

impl<'a, T> Evaluator<'a, T>
where
    T: SubwordTokenizer + ContinuationMarker + ?Sized,
{
    /// Position-aligned predicted label ids, one row per feature.
    pub fn predict<B: Backend>(
        &self,
        model:    &TokenClassifier<B>,
        features: &[EncodedFeature],
        device:   &B::Device,
    ) -> Vec<Vec<u32>> {
        let batcher = TaggingBatcher::new();
        let mut predictions = Vec::with_capacity(features.len());

        for chunk in features.chunks(self.batch_size.max(1)) {
            let batch = batcher.stack::<B>(chunk, device);
            let logits = model.infer(&batch);
            let [rows, seq_len, _] = logits.dims();
            let argmax: Vec<i64> = logits
                .argmax(2)
                .reshape([rows, seq_len])
                .into_data()
                .iter::<i64>()
                .collect();

            for (feature, row) in chunk.iter().zip(argmax.chunks(seq_len.max(1))) {
                let compact: Vec<u32> = row.iter().map(|&c| c.max(0) as u32).collect();
                predictions.push(scatter_valid(&compact, &feature.valid_mask));
            }
        }

        predictions
    }

    pub fn evaluate<B: Backend>(
        &self,
        model:    &TokenClassifier<B>,
        features: &[EncodedFeature],
        device:   &B::Device,
    ) -> Result<EvalRecord> {
        let predictions = self.predict(model, features, device);
        let decoded = decode_all(features, &predictions, self.tokenizer, self.vocab, self.outside)?;
        let record  = EvalRecord::from_decoded(decoded, self.outside, self.dev_on);

        tracing::info!(
            "[Token eval] P={:.1}, R={:.1}, F1={:.1}",
            100.0 * record.precision,
            100.0 * record.recall,
            100.0 * record.f1,
        );
        Ok(record)
    }
}
