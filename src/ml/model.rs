// ============================================================
// Layer 5 - Token Classification Model
// ============================================================
//   input_ids, segment_ids, attention_mask   [batch, seq_len]
//       │
//       ▼
//   TransformerEncoder     token + position + segment embeddings,
//                          num_layers post-norm encoder blocks
//       │                  -> [batch, seq_len, d_model]
//       ▼
//   valid-position gather  first piece of every word to the front
//       │
//       ▼
//   dropout + linear       -> [batch, seq_len, num_classes]
//
// num_classes = label vocabulary size + 1; id 0 is the padding /
// continuation class and never contributes to the loss.
//
// Reference: Vaswani et al. (2017) Attention Is All You Need
//            Devlin et al. (2019) BERT

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{gelu, log_softmax},
};

use crate::data::batcher::TaggingBatch;
use crate::ml::gather::{gather_valid, gather_with_plan};

/// Segment vocabulary: conversation history and current turn share
/// segment 0 today, the second slot keeps BERT's layout.
const SEGMENT_VOCAB: usize = 2;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct TokenClassifierConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub num_classes: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
}

impl TokenClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TokenClassifier<B> {
        let encoder    = self.init_encoder(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        let classifier = LinearConfig::new(self.d_model, self.num_classes).init(device);
        TokenClassifier { encoder, dropout, classifier, num_classes: self.num_classes }
    }

    fn init_encoder<B: Backend>(&self, device: &B::Device) -> TransformerEncoder<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let segment_embedding  = EmbeddingConfig::new(SEGMENT_VOCAB, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        TransformerEncoder {
            token_embedding,
            position_embedding,
            segment_embedding,
            embedding_norm: LayerNormConfig::new(self.d_model).init(device),
            layers,
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

// ─── Encoder ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `pad_mask` is true at padding positions, which no query may attend to.
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let input = MhaInput::self_attn(x.clone()).mask_pad(pad_mask);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(gelu(self.ffn_linear1.forward(x.clone())));
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct TransformerEncoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub segment_embedding:  Embedding<B>,
    pub embedding_norm:     LayerNorm<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub dropout:            Dropout,
}

impl<B: Backend> TransformerEncoder<B> {
    /// `[batch, seq_len]` ids and masks -> `[batch, seq_len, d_model]`
    pub fn encode(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        segment_ids:    Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let pad_mask = attention_mask.equal_elem(0);

        let tok_emb = self.token_embedding.forward(input_ids);
        let seg_emb = self.segment_embedding.forward(segment_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(self.embedding_norm.forward(tok_emb + pos_emb + seg_emb));
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        x
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TokenClassifier<B: Backend> {
    pub encoder:     TransformerEncoder<B>,
    pub dropout:     Dropout,
    pub classifier:  Linear<B>,
    pub num_classes: usize,
}

impl<B: Backend> TokenClassifier<B> {
    /// Word-level logits `[batch, seq_len, num_classes]`. Slot k of a
    /// row scores the row's k-th valid position.
    pub fn forward(&self, batch: &TaggingBatch<B>) -> Tensor<B, 3> {
        let hidden = self.encoder.encode(
            batch.input_ids.clone(),
            batch.segment_ids.clone(),
            batch.attention_mask.clone(),
        );
        let gathered = gather_with_plan(hidden, batch.gather_index.clone(), batch.gather_keep.clone());
        self.classifier.forward(self.dropout.forward(gathered))
    }

    /// Inference logits, gathered from the batch's valid mask rather
    /// than the batcher's plan. No dropout.
    pub fn infer(&self, batch: &TaggingBatch<B>) -> Tensor<B, 3> {
        let hidden = self.encoder.encode(
            batch.input_ids.clone(),
            batch.segment_ids.clone(),
            batch.attention_mask.clone(),
        );
        self.classifier.forward(gather_valid(hidden, batch.valid_mask.clone()))
    }

    /// Mean cross entropy over compacted slots whose score mask is set
    /// and whose label is not 0.
    pub fn forward_loss(&self, batch: &TaggingBatch<B>) -> (Tensor<B, 1>, Tensor<B, 3>) {
        let logits = self.forward(batch);
        let loss   = masked_cross_entropy(logits.clone(), batch.labels.clone(), batch.score_mask.clone());
        (loss, logits)
    }
}

/// Cross entropy averaged over the positions selected by `weights`,
/// treating label 0 as ignored.
///
/// logits `[batch, seq_len, classes]`, labels and weights `[batch, seq_len]`.
pub fn masked_cross_entropy<B: Backend>(
    logits:  Tensor<B, 3>,
    labels:  Tensor<B, 2, Int>,
    weights: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch_size, seq_len, num_classes] = logits.dims();
    let n = batch_size * seq_len;

    let log_probs = log_softmax(logits.reshape([n, num_classes]), 1);
    let labels    = labels.reshape([n]);
    let weights   = weights.reshape([n]) * labels.clone().not_equal_elem(0).float();

    let picked = log_probs.gather(1, labels.reshape([n, 1])).reshape([n]);
    let total  = weights.clone().sum().clamp_min(1.0);
    (picked * weights).sum().neg() / total
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::TaggingBatcher;
    use crate::domain::feature::EncodedFeature;
    use burn::backend::NdArray;

    type B = NdArray;

    fn tiny_config() -> TokenClassifierConfig {
        TokenClassifierConfig::new(16, 8, 5, 8, 2, 1, 16, 0.0)
    }

    fn feature() -> EncodedFeature {
        EncodedFeature {
            id:             "C_1#1".into(),
            input_ids:      vec![2, 11, 12, 13, 6, 3, 0, 0],
            segment_ids:    vec![0; 8],
            attention_mask: vec![1, 1, 1, 1, 1, 1, 0, 0],
            label_ids:      vec![3, 2, 0, 0, 1, 4, 0, 0],
            valid_mask:     vec![1, 1, 0, 0, 1, 1, 1, 1],
            score_mask:     vec![1, 1, 1, 1, 1, 1, 0, 0],
        }
    }

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_logit_shape() {
        let device = Default::default();
        let model: TokenClassifier<B> = tiny_config().init(&device);
        let batch = TaggingBatcher::new().stack::<B>(&[feature(), feature()], &device);
        assert_eq!(model.forward(&batch).dims(), [2, 8, 5]);
    }

    #[test]
    fn test_infer_matches_forward_without_dropout() {
        let device = Default::default();
        let model: TokenClassifier<B> = tiny_config().init(&device);
        let batch = TaggingBatcher::new().stack::<B>(&[feature(), feature()], &device);
        let planned: Vec<f32>  = model.forward(&batch).into_data().to_vec().unwrap();
        let inferred: Vec<f32> = model.infer(&batch).into_data().to_vec().unwrap();
        assert_eq!(planned.len(), inferred.len());
        for (a, b) in planned.iter().zip(&inferred) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_encoder_output_shape() {
        let device = Default::default();
        let model: TokenClassifier<B> = tiny_config().init(&device);
        let batch  = TaggingBatcher::new().stack::<B>(&[feature()], &device);
        let hidden = model.encoder.encode(batch.input_ids, batch.segment_ids, batch.attention_mask);
        assert_eq!(hidden.dims(), [1, 8, 8]);
    }

    #[test]
    fn test_loss_is_finite_and_positive() {
        let device = Default::default();
        let model: TokenClassifier<B> = tiny_config().init(&device);
        let batch = TaggingBatcher::new().stack::<B>(&[feature()], &device);
        let (loss, _) = model.forward_loss(&batch);
        let loss = scalar(loss);
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }

    #[test]
    fn test_masked_cross_entropy_ignores_masked_slots() {
        let device = Default::default();
        // Two slots, two classes. Slot 0 is confident and right, slot 1 is
        // confident and wrong but masked out.
        let logits = Tensor::<B, 3>::from_data(
            TensorData::new(vec![0.0f32, 10.0, 10.0, 0.0], [1, 2, 2]),
            &device,
        );
        let labels  = Tensor::<B, 2, Int>::from_data(TensorData::new(vec![1i64, 1], [1, 2]), &device);
        let weights = Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32, 0.0], [1, 2]), &device);

        let loss = scalar(masked_cross_entropy(logits, labels, weights));
        assert!(loss < 1e-3);
    }

    #[test]
    fn test_masked_cross_entropy_ignores_label_zero() {
        let device = Default::default();
        let logits = Tensor::<B, 3>::from_data(
            TensorData::new(vec![10.0f32, 0.0, 0.0, 10.0], [1, 2, 2]),
            &device,
        );
        // Slot 0 has label 0: even though it is weighted, it is ignored.
        let labels  = Tensor::<B, 2, Int>::from_data(TensorData::new(vec![0i64, 1], [1, 2]), &device);
        let weights = Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32, 1.0], [1, 2]), &device);

        let loss = scalar(masked_cross_entropy(logits, labels, weights));
        assert!(loss < 1e-3);
    }
}
