use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use std::sync::atomic::{AtomicBool, Ordering};

use super::transaction::Transaction;

/// A SHA-256 digest
pub type Hash = [u8; 32];

/// Represents a block in the chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Proof of work
    pub nonce: u64,

    /// Hash of the previous block, lowercase hex on the wire
    #[serde(with = "hex::serde")]
    #[schema(value_type = String, example = "000a3f...")]
    pub prev_hash: Hash,

    /// Creation time in milliseconds since the Unix epoch
    pub timestamp: i64,

    /// Transactions committed by this block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates a new block. The timestamp is fixed here so the hash is
    /// reproducible for a given nonce.
    pub fn new(
        nonce: u64,
        prev_hash: Hash,
        transactions: Vec<Transaction>,
        timestamp: i64,
    ) -> Self {
        Block {
            nonce,
            prev_hash,
            timestamp,
            transactions,
        }
    }

    /// Calculates the SHA-256 content hash of the block
    pub fn hash(&self) -> Hash {
        hash_parts(
            self.nonce,
            &self.prev_hash,
            self.timestamp,
            &encode_transactions(&self.transactions),
        )
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// Checks the block's own hash against `difficulty`
    pub fn has_valid_proof(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.hash(), difficulty)
    }
}

/// Pure block constructor
pub fn build_block(
    nonce: u64,
    prev_hash: Hash,
    transactions: Vec<Transaction>,
    timestamp: i64,
) -> Block {
    Block::new(nonce, prev_hash, transactions, timestamp)
}

pub fn content_hash(block: &Block) -> Hash {
    block.hash()
}

/// `count u64 LE` followed by each transaction's canonical bytes
fn encode_transactions(transactions: &[Transaction]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(transactions.len() as u64).to_le_bytes());
    for tx in transactions {
        out.extend_from_slice(&tx.canonical_bytes());
    }
    out
}

/// Hashes `nonce | prev_hash | timestamp | transactions`
fn hash_parts(nonce: u64, prev_hash: &Hash, timestamp: i64, encoded_transactions: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(nonce.to_le_bytes());
    hasher.update(prev_hash);
    hasher.update(timestamp.to_le_bytes());
    hasher.update(encoded_transactions);
    hasher.finalize().into()
}

/// True if the hex form of `hash` starts with `difficulty` '0' characters
pub fn meets_difficulty(hash: &Hash, difficulty: usize) -> bool {
    if difficulty > hash.len() * 2 {
        return false;
    }
    (0..difficulty).all(|i| {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        nibble == 0
    })
}

/// Checks whether the candidate block built from these parts satisfies `difficulty`
pub fn is_valid_proof(
    nonce: u64,
    prev_hash: &Hash,
    transactions: &[Transaction],
    timestamp: i64,
    difficulty: usize,
) -> bool {
    let hash = hash_parts(nonce, prev_hash, timestamp, &encode_transactions(transactions));
    meets_difficulty(&hash, difficulty)
}

/// Searches nonces upward from 0 until the block hash meets `difficulty`.
///
/// `cancel` is polled between attempts; returns `None` once it is set.
/// Expected work is about `16^difficulty` hashes.
pub fn find_nonce(
    prev_hash: &Hash,
    transactions: &[Transaction],
    timestamp: i64,
    difficulty: usize,
    cancel: &AtomicBool,
) -> Option<u64> {
    let encoded = encode_transactions(transactions);
    let mut nonce: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }

        let hash = hash_parts(nonce, prev_hash, timestamp, &encoded);
        if meets_difficulty(&hash, difficulty) {
            return Some(nonce);
        }

        nonce = nonce.checked_add(1)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::amount::Amount;
    use crate::blockchain::crypto::Address;

    fn sample_transactions() -> Vec<Transaction> {
        vec![
            Transaction::new(
                Address("sender".to_string()),
                Address("recipient".to_string()),
                Amount::from_coins(3),
            ),
            Transaction::new_reward(Address("miner".to_string()), Amount::from_coins(1)),
        ]
    }

    #[test]
    fn test_new_block() {
        let block = build_block(100, [7u8; 32], sample_transactions(), 1_700_000_000_000);

        assert_eq!(block.nonce, 100);
        assert_eq!(block.prev_hash, [7u8; 32]);
        assert_eq!(block.timestamp, 1_700_000_000_000);
        assert_eq!(block.transactions.len(), 2);
    }

    #[test]
    fn test_hash_is_reproducible() {
        let block = build_block(5, [1u8; 32], sample_transactions(), 42);
        assert_eq!(block.hash(), content_hash(&block.clone()));
        assert_eq!(block.hash_hex().len(), 64);

        let mut later = block.clone();
        later.timestamp += 1;
        assert_ne!(block.hash(), later.hash());

        let mut reordered = block.clone();
        reordered.transactions.reverse();
        assert_ne!(block.hash(), reordered.hash());
    }

    #[test]
    fn test_meets_difficulty() {
        let mut hash = [0xffu8; 32];
        assert!(meets_difficulty(&hash, 0));
        assert!(!meets_difficulty(&hash, 1));

        hash[0] = 0x00;
        hash[1] = 0x0f;
        assert!(meets_difficulty(&hash, 3));
        assert!(!meets_difficulty(&hash, 4));

        assert!(meets_difficulty(&[0u8; 32], 64));
        assert!(!meets_difficulty(&[0u8; 32], 65));
    }

    #[test]
    fn test_meets_difficulty_matches_hex_prefix() {
        let block = build_block(0, [0u8; 32], sample_transactions(), 99);
        for nonce in 0..64 {
            let candidate = build_block(nonce, block.prev_hash, block.transactions.clone(), 99);
            let hex = candidate.hash_hex();
            for difficulty in 0..4 {
                assert_eq!(
                    candidate.has_valid_proof(difficulty),
                    hex.starts_with(&"0".repeat(difficulty))
                );
            }
        }
    }

    #[test]
    fn test_find_nonce() {
        let txs = sample_transactions();
        let prev = Block::default().hash();
        let cancel = AtomicBool::new(false);

        let nonce = find_nonce(&prev, &txs, 1234, 2, &cancel).unwrap();
        assert!(is_valid_proof(nonce, &prev, &txs, 1234, 2));

        let block = build_block(nonce, prev, txs, 1234);
        assert!(block.hash_hex().starts_with("00"));

        // Difficulty 0 accepts the first candidate
        assert_eq!(find_nonce(&prev, &[], 0, 0, &cancel), Some(0));
    }

    #[test]
    fn test_find_nonce_cancelled() {
        let cancel = AtomicBool::new(true);
        assert_eq!(find_nonce(&[0u8; 32], &[], 0, 64, &cancel), None);
    }

    #[test]
    fn test_wire_format_round_trip() {
        let block = build_block(
            17,
            Block::default().hash(),
            sample_transactions(),
            1_700_000_000_123,
        );
        let json = serde_json::to_value(&block).unwrap();

        assert_eq!(json["nonce"], 17);
        assert_eq!(json["timestamp"], 1_700_000_000_123i64);
        assert_eq!(json["prev_hash"], hex::encode(block.prev_hash));
        let amount: Amount =
            serde_json::from_value(json["transactions"][0]["amount"].clone()).unwrap();
        assert_eq!(amount, Amount::from_coins(3));
        assert_eq!(json["transactions"][1]["sender_address"], "THE BLOCKCHAIN");

        let parsed: Block = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.hash(), block.hash());
    }
}
