// ============================================================
// Layer 5 - Valid-Position Gather
// ============================================================
// The classifier scores words, not pieces. Before the linear
// head, every row of the encoder output is compacted so that the
// hidden state of each word's first piece sits at the front, in
// order, and the remaining slots are zero:
//
//   valid_mask   1  1  0  0  1  1  1  1
//   hidden       h0 h1 h2 h3 h4 h5 h6 h7
//   gathered     h0 h1 h4 h5 h6 h7 0  0
//
// On the device this is one Tensor::gather along the sequence
// axis with a precomputed index, followed by a multiply with a
// keep weight that zeroes the tail. Labels and score masks are
// compacted the same way on the host (compact_valid), and model
// predictions are mapped back onto positions with scatter_valid.
//
// Rows are independent; no state crosses examples.

use burn::prelude::*;

/// Keep `values[j]` where `valid_mask[j] == 1`, in order, then pad
/// with zeros to the original length.
pub fn compact_valid(values: &[u32], valid_mask: &[u32]) -> Vec<u32> {
    let mut out: Vec<u32> = values
        .iter()
        .zip(valid_mask)
        .filter(|&(_, &v)| v == 1)
        .map(|(&x, _)| x)
        .collect();
    out.resize(values.len(), 0);
    out
}

/// Inverse of [`compact_valid`]: the k-th compacted value goes to
/// the k-th valid position; invalid positions get 0.
pub fn scatter_valid(compact: &[u32], valid_mask: &[u32]) -> Vec<u32> {
    let mut next = compact.iter();
    valid_mask
        .iter()
        .map(|&v| if v == 1 { next.next().copied().unwrap_or(0) } else { 0 })
        .collect()
}

/// Host-side description of a batched gather.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherPlan {
    pub batch_size: usize,
    pub seq_len:    usize,
    /// Source position for each output slot, row-major `[batch, seq_len]`.
    pub index:      Vec<i64>,
    /// 1.0 for filled slots, 0.0 past the row's valid count.
    pub keep:       Vec<f32>,
}

impl GatherPlan {
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 2, Int>, Tensor<B, 2>) {
        let shape = [self.batch_size, self.seq_len];
        let index = Tensor::from_data(TensorData::new(self.index.clone(), shape), device);
        let keep  = Tensor::from_data(TensorData::new(self.keep.clone(), shape), device);
        (index, keep)
    }
}

/// Build the gather plan for a batch of equally long valid masks.
pub fn gather_plan<M: AsRef<[u32]>>(valid_masks: &[M]) -> GatherPlan {
    let batch_size = valid_masks.len();
    let seq_len    = valid_masks.first().map(|m| m.as_ref().len()).unwrap_or(0);

    let mut index = Vec::with_capacity(batch_size * seq_len);
    let mut keep  = Vec::with_capacity(batch_size * seq_len);

    for mask in valid_masks {
        let mask = mask.as_ref();
        let sources: Vec<i64> = (0..seq_len)
            .filter(|&j| mask.get(j).copied() == Some(1))
            .map(|j| j as i64)
            .collect();
        for slot in 0..seq_len {
            match sources.get(slot) {
                Some(&src) => {
                    index.push(src);
                    keep.push(1.0);
                }
                None => {
                    index.push(0);
                    keep.push(0.0);
                }
            }
        }
    }

    GatherPlan { batch_size, seq_len, index, keep }
}

/// Apply a precomputed plan to `sequence_output: [batch, seq_len, hidden]`.
pub fn gather_with_plan<B: Backend>(
    sequence_output: Tensor<B, 3>,
    index:           Tensor<B, 2, Int>,
    keep:            Tensor<B, 2>,
) -> Tensor<B, 3> {
    let [_, _, hidden] = sequence_output.dims();
    let index = index.unsqueeze_dim::<3>(2).repeat_dim(2, hidden);
    let keep  = keep.unsqueeze_dim::<3>(2).repeat_dim(2, hidden);
    sequence_output.gather(1, index) * keep
}

/// Compact `sequence_output` by a `[batch, seq_len]` valid mask.
///
/// Reads the mask back to the host to build the plan; the training
/// path builds the plan in the batcher instead.
pub fn gather_valid<B: Backend>(sequence_output: Tensor<B, 3>, valid_mask: Tensor<B, 2, Int>) -> Tensor<B, 3> {
    let [batch_size, seq_len] = valid_mask.dims();
    let device = sequence_output.device();

    let flat: Vec<u32> = valid_mask
        .into_data()
        .iter::<i64>()
        .map(|v| u32::from(v == 1))
        .collect();
    let rows: Vec<&[u32]> = flat.chunks(seq_len.max(1)).take(batch_size).collect();

    let (index, keep) = gather_plan(&rows).to_tensors::<B>(&device);
    gather_with_plan(sequence_output, index, keep)
}
