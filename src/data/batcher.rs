// ============================================================
// Layer 4 - Tagging Batcher
// ============================================================
// Implements Burn's Batcher trait to stack EncodedFeatures into
// tensors of shape [batch, seq_len].
//
// Sequence inputs (input_ids, segment_ids, attention_mask) stay
// position-aligned. The targets do not: the classifier produces
// one logit row per *word*, compacted to the front of the row by
// the valid-position gather. So labels and score_mask are
// compacted here on the host with the same valid mask, and the
// gather plan is built here too, once per batch:
//
//   valid_mask   1  1  0  0  1  1  1  1
//   label_ids    C  O  0  0  S  0  0  0     (position-aligned)
//   labels       C  O  S  0  0  0  0  0     (compacted)
//   gather idx   0  1  4  5  6  7  0  0
//
// The position-aligned valid mask travels along for inference,
// which gathers from the mask directly.
//
// All features are already padded to the same length, so no
// dynamic padding happens here.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::domain::feature::EncodedFeature;
use crate::ml::gather::{compact_valid, gather_plan};

// ─── TaggingBatch ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TaggingBatch<B: Backend> {
    /// Piece ids - [batch, seq_len]
    pub input_ids:      Tensor<B, 2, Int>,
    pub segment_ids:    Tensor<B, 2, Int>,
    /// 1 = real piece, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,
    /// 1 = first piece of a word, sentinel or padding
    pub valid_mask:     Tensor<B, 2, Int>,

    /// Source position of each compacted slot - [batch, seq_len]
    pub gather_index:   Tensor<B, 2, Int>,
    /// 1.0 where a compacted slot holds a word, 0.0 past the end
    pub gather_keep:    Tensor<B, 2>,

    /// Compacted label ids - [batch, seq_len]
    pub labels:         Tensor<B, 2, Int>,
    /// Compacted score mask, as weights for the loss
    pub score_mask:     Tensor<B, 2>,
}

// ─── TaggingBatcher ───────────────────────────────────────────────────────────
#[derive(Clone, Debug, Default)]
pub struct TaggingBatcher;

impl TaggingBatcher {
    pub fn new() -> Self {
        Self
    }

    /// Stack `items` on `device`. Every item must have the same length.
    pub fn stack<B: Backend>(&self, items: &[EncodedFeature], device: &B::Device) -> TaggingBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.first().map(EncodedFeature::max_length).unwrap_or(0);
        let shape      = [batch_size, seq_len];

        let int_tensor = |rows: Vec<i64>| -> Tensor<B, 2, Int> {
            Tensor::from_data(TensorData::new(rows, shape), device)
        };

        let input_ids      = int_tensor(flatten(items, |f| f.input_ids.as_slice()));
        let segment_ids    = int_tensor(flatten(items, |f| f.segment_ids.as_slice()));
        let attention_mask = int_tensor(flatten(items, |f| f.attention_mask.as_slice()));
        let valid_mask     = int_tensor(flatten(items, |f| f.valid_mask.as_slice()));

        // ── Targets, compacted by the valid mask ─────────────────────────────
        let labels: Vec<i64> = items
            .iter()
            .flat_map(|f| compact_valid(&f.label_ids, &f.valid_mask))
            .map(i64::from)
            .collect();
        let score: Vec<f32> = items
            .iter()
            .flat_map(|f| compact_valid(&f.score_mask, &f.valid_mask))
            .map(|x| x as f32)
            .collect();

        let masks: Vec<&[u32]> = items.iter().map(|f| f.valid_mask.as_slice()).collect();
        let (gather_index, gather_keep) = gather_plan(&masks).to_tensors::<B>(device);

        TaggingBatch {
            input_ids,
            segment_ids,
            attention_mask,
            valid_mask,
            gather_index,
            gather_keep,
            labels:     int_tensor(labels),
            score_mask: Tensor::from_data(TensorData::new(score, shape), device),
        }
    }
}

fn flatten(items: &[EncodedFeature], pick: fn(&EncodedFeature) -> &[u32]) -> Vec<i64> {
    items.iter().flat_map(|f| pick(f).iter().map(|&x| x as i64)).collect()
}

impl<B: Backend> Batcher<B, EncodedFeature, TaggingBatch<B>> for TaggingBatcher {
    fn batch(&self, items: Vec<EncodedFeature>, device: &B::Device) -> TaggingBatch<B> {
        self.stack(&items, device)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn feature(valid: Vec<u32>, labels: Vec<u32>, score: Vec<u32>) -> EncodedFeature {
        let n = valid.len();
        EncodedFeature {
            id:             "x".into(),
            input_ids:      (0..n as u32).collect(),
            segment_ids:    vec![0; n],
            attention_mask: score.clone(),
            label_ids:      labels,
            valid_mask:     valid,
            score_mask:     score,
        }
    }

    fn ints(t: Tensor<B, 2, Int>) -> Vec<i64> {
        t.into_data().iter::<i64>().collect()
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let items = vec![
            feature(vec![1, 1, 1, 1], vec![3, 1, 4, 0], vec![1, 1, 1, 0]),
            feature(vec![1, 1, 1, 1], vec![3, 2, 4, 0], vec![1, 1, 1, 0]),
        ];
        let batch: TaggingBatch<B> = TaggingBatcher::new().stack(&items, &device);
        assert_eq!(batch.input_ids.dims(), [2, 4]);
        assert_eq!(batch.gather_keep.dims(), [2, 4]);
        assert_eq!(ints(batch.labels), vec![3, 1, 4, 0, 3, 2, 4, 0]);
    }

    #[test]
    fn test_targets_are_compacted_by_valid_mask() {
        let device = Default::default();
        let items = vec![feature(
            vec![1, 1, 0, 0, 1, 1],
            vec![3, 2, 0, 0, 4, 0],
            vec![1, 1, 1, 1, 1, 0],
        )];
        let batch: TaggingBatch<B> = TaggingBatcher::new().stack(&items, &device);
        assert_eq!(ints(batch.labels), vec![3, 2, 4, 0, 0, 0]);
        assert_eq!(ints(batch.gather_index), vec![0, 1, 4, 5, 0, 0]);
        let score: Vec<f32> = batch.score_mask.into_data().to_vec::<f32>().unwrap();
        assert_eq!(score, vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
        // input_ids and valid_mask are untouched
        assert_eq!(ints(batch.input_ids), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(ints(batch.valid_mask), vec![1, 1, 0, 0, 1, 1]);
    }
}
