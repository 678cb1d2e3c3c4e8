// Blockchain module
//
// This module contains the ledger core:
// - Fixed-point amounts
// - Keys, addresses and signatures
// - Transactions and the transaction pool
// - Blocks and the proof of work search
// - The ledger that ties them together

pub mod amount;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod pool;
pub mod transaction;

// Re-export main components for easier access
pub use amount::{Amount, AmountError};
pub use block::{Block, Hash};
pub use chain::{Ledger, MiningError, DEFAULT_DIFFICULTY, MINING_REWARD};
pub use crypto::{Address, CryptoError, DigitalSignature, KeyPair, Wallet};
pub use pool::{AuthError, TransactionPool};
pub use transaction::{
    SignedTransaction, Transaction, TransactionError, TransactionRequest, SYSTEM_SENDER,
};
