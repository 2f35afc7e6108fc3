// ============================================================
// Layer 4 - Conversation Sampler
// ============================================================
// Keeps a random portion of the training conversations.
//
// Sampling is by conversation, not by record: every turn of a
// conversation shares an id prefix ("C_12#1", "C_12#2", ...), and
// all of them are kept or dropped together. Otherwise later turns
// of a sampled conversation would refer back to turns the model
// never saw.
//
// The number of conversations kept is floor(portion * n). The
// records that survive keep their original order.
//
// Uses a seeded StdRng so the same seed always picks the same
// conversations.
//
// Reference: rand crate documentation (SliceRandom)

use std::collections::HashSet;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::error::{Result, TaggerError};
use crate::domain::record::Record;

/// Sample `portion` of the conversations in `records`.
///
/// # Arguments
/// * `portion`   - fraction of conversations to keep, in (0, 1]
/// * `separator` - character ending the conversation id in a record id
/// * `seed`      - RNG seed
pub fn sample_conversations(
    records:   Vec<Record>,
    portion:   f64,
    separator: char,
    seed:      u64,
) -> Result<Vec<Record>> {
    if !(portion > 0.0 && portion <= 1.0) {
        return Err(TaggerError::InvalidPortion(portion));
    }
    if portion == 1.0 {
        return Ok(records);
    }

    // First-seen order, so the shuffle input is deterministic.
    let mut conversations: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for record in &records {
        let conv = record.conversation_id(separator);
        if seen.insert(conv) {
            conversations.push(conv);
        }
    }

    let total   = conversations.len();
    let to_keep = (portion * total as f64).floor() as usize;

    let mut rng = StdRng::seed_from_u64(seed);
    conversations.shuffle(&mut rng);
    let kept: HashSet<String> = conversations
        .into_iter()
        .take(to_keep)
        .map(str::to_string)
        .collect();

    tracing::info!("Sampled {} / {} conversations", kept.len(), total);

    let num_records = records.len();
    let sampled: Vec<Record> = records
        .into_iter()
        .filter(|r| kept.contains(r.conversation_id(separator)))
        .collect();

    tracing::info!("Sampled {} / {} ids", sampled.len(), num_records);
    Ok(sampled)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn records(ids: &[&str]) -> Vec<Record> {
        ids.iter()
            .map(|id| Record::new(*id, vec!["w".into()], vec!["O".into()]).unwrap())
            .collect()
    }

    fn conversation_set(rs: &[Record]) -> HashSet<String> {
        rs.iter().map(|r| r.conversation_id('#').to_string()).collect()
    }

    #[test]
    fn test_full_portion_keeps_everything() {
        let rs      = records(&["a#1", "a#2", "b#1"]);
        let sampled = sample_conversations(rs.clone(), 1.0, '#', 42).unwrap();
        assert_eq!(sampled, rs);
    }

    #[test]
    fn test_turns_stay_together() {
        let rs = records(&["a#1", "a#2", "a#3", "b#1", "b#2", "c#1", "d#1"]);
        let sampled = sample_conversations(rs, 0.5, '#', 7).unwrap();
        // floor(0.5 * 4) = 2 conversations
        assert_eq!(conversation_set(&sampled).len(), 2);
        for conv in conversation_set(&sampled) {
            let turns = sampled.iter().filter(|r| r.conversation_id('#') == conv).count();
            let expected = match conv.as_str() {
                "a" => 3,
                "b" => 2,
                _   => 1,
            };
            assert_eq!(turns, expected);
        }
    }

    #[test]
    fn test_order_is_preserved() {
        let rs = records(&["a#1", "b#1", "a#2", "c#1", "b#2"]);
        let sampled = sample_conversations(rs.clone(), 0.7, '#', 3).unwrap();
        let positions: Vec<usize> = sampled
            .iter()
            .map(|s| rs.iter().position(|r| r.id() == s.id()).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_same_seed_same_sample() {
        let rs = records(&["a#1", "b#1", "c#1", "d#1", "e#1", "f#1"]);
        let first  = sample_conversations(rs.clone(), 0.5, '#', 11).unwrap();
        let second = sample_conversations(rs, 0.5, '#', 11).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_portion() {
        assert!(matches!(
            sample_conversations(records(&["a#1"]), 0.0, '#', 1),
            Err(TaggerError::InvalidPortion(_))
        ));
        assert!(sample_conversations(records(&["a#1"]), 1.5, '#', 1).is_err());
    }
}
