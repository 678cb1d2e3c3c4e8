use log::warn;
use secp256k1::PublicKey;
use thiserror::Error;

use super::amount::Amount;
use super::crypto::{derive_address, Address, DigitalSignature};
use super::transaction::Transaction;

/// Errors that reject a transaction at the pool boundary
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Sender identity is reserved for mining rewards")]
    ReservedSender,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Sender address does not belong to the signing key")]
    SenderMismatch,

    #[error("Amount must not be negative: {0}")]
    NegativeAmount(Amount),

    #[error("Invalid mining reward: {0}")]
    InvalidReward(String),
}

/// Authorized transactions waiting for inclusion in a block, in arrival order
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        TransactionPool {
            transactions: Vec::new(),
        }
    }

    /// Admits an externally signed transaction.
    ///
    /// The amount must not be negative, the sender address must be the one
    /// derived from `public_key` and the signature must verify over the
    /// transaction's canonical bytes. On any failure the pool is left untouched.
    pub fn submit(
        &mut self,
        transaction: Transaction,
        signature: &DigitalSignature,
        public_key: &PublicKey,
    ) -> Result<(), AuthError> {
        if transaction.is_reward() {
            warn!("Rejected transaction using the reserved system sender");
            return Err(AuthError::ReservedSender);
        }

        if transaction.amount.is_negative() {
            warn!(
                "Rejected transaction from {}: negative amount {}",
                transaction.sender_address, transaction.amount
            );
            return Err(AuthError::NegativeAmount(transaction.amount));
        }

        if derive_address(public_key) != transaction.sender_address {
            warn!(
                "Rejected transaction from {}: key does not match sender",
                transaction.sender_address
            );
            return Err(AuthError::SenderMismatch);
        }

        if !transaction.verify(signature, public_key) {
            warn!(
                "Rejected transaction from {}: signature verification failed",
                transaction.sender_address
            );
            return Err(AuthError::InvalidSignature);
        }

        self.transactions.push(transaction);
        Ok(())
    }

    /// Admits the unsigned reward transaction. Only the mining routine calls this.
    pub(crate) fn submit_reward(
        &mut self,
        transaction: Transaction,
        miner: &Address,
        reward: Amount,
    ) -> Result<(), AuthError> {
        if !transaction.is_reward() {
            return Err(AuthError::InvalidReward(
                "sender is not the system identity".to_string(),
            ));
        }
        if transaction.amount != reward {
            return Err(AuthError::InvalidReward(format!(
                "expected {}, got {}",
                reward, transaction.amount
            )));
        }
        if &transaction.recipient_address != miner {
            return Err(AuthError::InvalidReward(
                "recipient is not the miner".to_string(),
            ));
        }

        self.transactions.push(transaction);
        Ok(())
    }

    /// Returns a copy of the pending transactions
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    /// Takes every pending transaction, leaving the pool empty
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    /// Puts drained transactions back ahead of anything submitted since
    pub(crate) fn restore(&mut self, mut transactions: Vec<Transaction>) {
        transactions.append(&mut self.transactions);
        self.transactions = transactions;
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
