// ============================================================
// Layer 6 - WordPiece Tokenizer Store
// ============================================================
// Loads the pretrained encoder's WordPiece tokenizer and exposes
// it through the SubwordTokenizer / ContinuationMarker traits.
//
// Two on-disk forms are accepted:
//   tokenizer.json - a HuggingFace tokenizer, loaded as is
//   vocab.txt      - a BERT vocabulary, one piece per line; we
//                    write the tokenizer JSON for it ourselves and
//                    parse that, which avoids any trainer or
//                    builder API differences between tokenizers
//                    releases
//
// Reference: Wu et al. (2016) WordPiece, Devlin et al. (2019) BERT

use std::{fs, path::Path};

use tokenizers::Tokenizer;

use crate::domain::error::{Result, TaggerError};
use crate::domain::traits::{ContinuationMarker, SubwordTokenizer};

pub const CONTINUATION_PREFIX: &str = "##";
pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";

const SPECIAL_TOKENS: [&str; 5] = [PAD_TOKEN, UNK_TOKEN, CLS_TOKEN, SEP_TOKEN, "[MASK]"];

pub struct WordPieceTokenizer {
    inner:     Tokenizer,
    lowercase: bool,
    pad_id:    u32,
    unk_id:    Option<u32>,
}

impl WordPieceTokenizer {
    /// Load from `tokenizer.json` or a BERT `vocab.txt`.
    pub fn load(path: &Path, lowercase: bool) -> Result<Self> {
        let is_vocab_txt = path.extension().and_then(|e| e.to_str()) == Some("txt");
        if is_vocab_txt {
            let text = fs::read_to_string(path)?;
            let pieces: Vec<&str> = text.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
            tracing::info!("Building WordPiece tokenizer from {} vocab entries", pieces.len());
            Self::from_vocab(&pieces, lowercase)
        } else {
            let inner = Tokenizer::from_file(path)
                .map_err(|e| TaggerError::Tokenizer(format!("cannot load '{}': {e}", path.display())))?;
            Self::from_tokenizer(inner, lowercase)
        }
    }

    /// Build a WordPiece tokenizer whose ids follow the order of `pieces`.
    /// Special tokens missing from `pieces` are appended.
    pub fn from_vocab(pieces: &[&str], lowercase: bool) -> Result<Self> {
        let json = wordpiece_json(pieces);
        let inner: Tokenizer = json
            .to_string()
            .parse()
            .map_err(|e| TaggerError::Tokenizer(format!("cannot build WordPiece tokenizer: {e}")))?;
        Self::from_tokenizer(inner, lowercase)
    }

    pub fn from_tokenizer(inner: Tokenizer, lowercase: bool) -> Result<Self> {
        for special in [CLS_TOKEN, SEP_TOKEN, PAD_TOKEN] {
            if inner.token_to_id(special).is_none() {
                return Err(TaggerError::Tokenizer(format!("vocabulary lacks {special}")));
            }
        }
        let pad_id = inner.token_to_id(PAD_TOKEN).unwrap_or_default();
        let unk_id = inner.token_to_id(UNK_TOKEN);
        Ok(Self { inner, lowercase, pad_id, unk_id })
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl SubwordTokenizer for WordPieceTokenizer {
    fn tokenize(&self, word: &str) -> Result<Vec<String>> {
        let word = if self.lowercase { word.to_lowercase() } else { word.to_string() };
        let encoding = self
            .inner
            .encode(word.as_str(), false)
            .map_err(|e| TaggerError::Tokenizer(e.to_string()))?;
        let pieces = encoding.get_tokens().to_vec();

        // A word that normalizes to nothing still owns a label.
        if pieces.is_empty() {
            return Ok(vec![UNK_TOKEN.to_string()]);
        }
        Ok(pieces)
    }

    fn pieces_to_ids(&self, pieces: &[String]) -> Result<Vec<u32>> {
        pieces
            .iter()
            .map(|p| {
                self.inner
                    .token_to_id(p)
                    .or(self.unk_id)
                    .ok_or_else(|| TaggerError::UnknownPiece(p.clone()))
            })
            .collect()
    }

    fn id_to_piece(&self, id: u32) -> Option<String> {
        self.inner.id_to_token(id)
    }

    fn start_piece(&self) -> &str {
        CLS_TOKEN
    }

    fn separator_piece(&self) -> &str {
        SEP_TOKEN
    }

    fn pad_id(&self) -> u32 {
        self.pad_id
    }
}

impl ContinuationMarker for WordPieceTokenizer {
    fn is_continuation(&self, piece: &str) -> bool {
        piece.starts_with(CONTINUATION_PREFIX)
    }

    fn strip_marker<'a>(&self, piece: &'a str) -> &'a str {
        piece.strip_prefix(CONTINUATION_PREFIX).unwrap_or(piece)
    }
}

/// HuggingFace tokenizer JSON for a BERT-style WordPiece vocabulary.
fn wordpiece_json(pieces: &[&str]) -> serde_json::Value {
    let mut vocab = serde_json::Map::new();
    for piece in pieces.iter().copied().chain(SPECIAL_TOKENS) {
        if !vocab.contains_key(piece) {
            let id = vocab.len();
            vocab.insert(piece.to_string(), serde_json::json!(id));
        }
    }

    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .map(|t| {
            serde_json::json!({
                "id": vocab[*t],
                "content": t,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            })
        })
        .collect();

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": false
        },
        "pre_tokenizer": { "type": "BertPreTokenizer" },
        "post_processor": null,
        "decoder": { "type": "WordPiece", "prefix": CONTINUATION_PREFIX, "cleanup": true },
        "model": {
            "type": "WordPiece",
            "unk_token": UNK_TOKEN,
            "continuing_subword_prefix": CONTINUATION_PREFIX,
            "max_input_chars_per_word": 100,
            "vocab": vocab
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Small vocabulary: "resolve" and "it" are whole pieces,
    /// "unaffable" splits into three.
    pub(crate) fn toy_tokenizer() -> WordPieceTokenizer {
        WordPieceTokenizer::from_vocab(
            &[
                "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]",
                "resolve", "it", "what", "about", "the", "cost",
                "un", "##aff", "##able", "play", "##ing",
            ],
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_whole_word_is_single_piece() {
        let tok = toy_tokenizer();
        assert_eq!(tok.tokenize("resolve").unwrap(), vec!["resolve"]);
    }

    #[test]
    fn test_word_splits_into_continuations() {
        let tok = toy_tokenizer();
        assert_eq!(tok.tokenize("unaffable").unwrap(), vec!["un", "##aff", "##able"]);
    }

    #[test]
    fn test_lowercase_applies_before_lookup() {
        let tok = toy_tokenizer();
        assert_eq!(tok.tokenize("Resolve").unwrap(), vec!["resolve"]);
    }

    #[test]
    fn test_unknown_word_maps_to_unk() {
        let tok = toy_tokenizer();
        let pieces = tok.tokenize("zzz").unwrap();
        assert_eq!(pieces, vec![UNK_TOKEN]);
        assert_eq!(tok.pieces_to_ids(&pieces).unwrap(), vec![1]);
    }

    #[test]
    fn test_word_normalized_to_nothing_is_unk() {
        let tok = toy_tokenizer();
        // U+200B is a format character, removed by the normalizer
        assert_eq!(tok.tokenize("\u{200b}").unwrap(), vec![UNK_TOKEN]);
        assert_eq!(tok.tokenize("\u{200b}\u{200b}").unwrap(), vec![UNK_TOKEN]);
    }

    #[test]
    fn test_ids_follow_vocab_order() {
        let tok = toy_tokenizer();
        assert_eq!(tok.pad_id(), 0);
        let ids = tok.pieces_to_ids(&["[CLS]".into(), "resolve".into(), "[SEP]".into()]).unwrap();
        assert_eq!(ids, vec![2, 5, 3]);
        assert_eq!(tok.id_to_piece(13).as_deref(), Some("##able"));
    }

    #[test]
    fn test_continuation_marker() {
        let tok = toy_tokenizer();
        assert!(tok.is_continuation("##ing"));
        assert!(!tok.is_continuation("play"));
        assert_eq!(tok.strip_marker("##ing"), "ing");
        assert_eq!(tok.strip_marker("play"), "play");
    }

    #[test]
    fn test_loads_vocab_txt() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        fs::write(&path, "[PAD]\n[UNK]\n[CLS]\n[SEP]\nhello\n").unwrap();
        let tok = WordPieceTokenizer::load(&path, false).unwrap();
        assert_eq!(tok.tokenize("hello").unwrap(), vec!["hello"]);
        assert_eq!(tok.pieces_to_ids(&["hello".to_string()]).unwrap(), vec![4]);
    }
}
