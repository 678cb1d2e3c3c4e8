use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use secp256k1::PublicKey;
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::amount::{Amount, AmountError};
use super::block::{find_nonce, Block};
use super::crypto::{Address, DigitalSignature};
use super::pool::{AuthError, TransactionPool};
use super::transaction::{SignedTransaction, Transaction};

/// Leading '0' hex characters required of a block hash
pub const DEFAULT_DIFFICULTY: usize = 3;

/// Reward credited to the ledger owner for each mined block (1.0)
pub const MINING_REWARD: Amount = Amount::from_bits(1i128 << 64);

/// Errors that can occur while mining
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MiningError {
    #[error("Transaction pool is empty")]
    EmptyPool,

    #[error("Mining was cancelled")]
    Cancelled,

    #[error("Mining failed: {0}")]
    Internal(String),
}

#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pool: TransactionPool,
}

impl LedgerState {
    fn tip(&self) -> &Block {
        match self.chain.last() {
            Some(block) => block,
            None => panic!("ledger chain is empty: genesis block missing"),
        }
    }

    /// Appends a block, refusing to continue if it does not extend the tip
    fn append(&mut self, block: Block) {
        let tip_hash = self.tip().hash();
        assert_eq!(
            block.prev_hash, tip_hash,
            "new block does not link to the chain tip"
        );
        self.chain.push(block);
    }
}

/// The chain of blocks, the pool of pending transactions and the miner's address.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Debug, Clone)]
pub struct Ledger {
    state: Arc<Mutex<LedgerState>>,

    /// Held for a whole mining round so rounds never overlap
    mining: Arc<Mutex<()>>,

    owner_address: Address,

    difficulty: usize,
}

/// The genesis block's `prev_hash`: the hash of an all-default block
pub fn genesis_prev_hash() -> [u8; 32] {
    Block::default().hash()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Ledger {
    /// Creates a new ledger with a genesis block, mining at the default difficulty
    pub fn new(owner_address: Address) -> Self {
        Self::with_difficulty(owner_address, DEFAULT_DIFFICULTY)
    }

    pub fn with_difficulty(owner_address: Address, difficulty: usize) -> Self {
        let genesis = Block::new(0, genesis_prev_hash(), Vec::new(), now_millis());

        info!(
            "Created ledger owned by {} (difficulty {})",
            owner_address, difficulty
        );

        Ledger {
            state: Arc::new(Mutex::new(LedgerState {
                chain: vec![genesis],
                pool: TransactionPool::new(),
            })),
            mining: Arc::new(Mutex::new(())),
            owner_address,
            difficulty,
        }
    }

    pub fn owner_address(&self) -> &Address {
        &self.owner_address
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Verifies and enqueues a signed transfer
    pub fn submit_transaction(
        &self,
        sender: Address,
        recipient: Address,
        amount: Amount,
        signature: &DigitalSignature,
        sender_public_key: &PublicKey,
    ) -> Result<(), AuthError> {
        let transaction = Transaction::new(sender, recipient, amount);
        let mut state = self.state.lock();
        state.pool.submit(transaction.clone(), signature, sender_public_key)?;

        info!(
            "Accepted transaction {} -> {} ({})",
            transaction.sender_address, transaction.recipient_address, transaction.amount
        );
        Ok(())
    }

    /// Submits a transaction decoded from a client request
    pub fn submit(&self, signed: SignedTransaction) -> Result<(), AuthError> {
        let SignedTransaction {
            transaction,
            signature,
            public_key,
        } = signed;

        self.submit_transaction(
            transaction.sender_address,
            transaction.recipient_address,
            transaction.amount,
            &signature,
            &public_key,
        )
    }

    /// Mines the pending transactions into a new block
    pub fn mine(&self) -> Result<Block, MiningError> {
        self.mine_with_cancel(&AtomicBool::new(false))
    }

    /// Mines the pending transactions, giving up once `cancel` is set.
    ///
    /// The pool is drained under the state lock, so a transaction submitted
    /// during the nonce search waits for the next round. A cancelled round
    /// puts its transactions back at the front of the pool.
    pub fn mine_with_cancel(&self, cancel: &AtomicBool) -> Result<Block, MiningError> {
        let _round = self.mining.lock();

        let (prev_hash, transactions, timestamp) = {
            let mut state = self.state.lock();

            if state.pool.is_empty() {
                debug!("Nothing to mine: transaction pool is empty");
                return Err(MiningError::EmptyPool);
            }

            let reward = Transaction::new_reward(self.owner_address.clone(), MINING_REWARD);
            state
                .pool
                .submit_reward(reward, &self.owner_address, MINING_REWARD)
                .map_err(|e| MiningError::Internal(e.to_string()))?;

            (state.tip().hash(), state.pool.drain(), now_millis())
        };

        let found = find_nonce(&prev_hash, &transactions, timestamp, self.difficulty, cancel);
        let nonce = match found {
            Some(nonce) => nonce,
            None => {
                let pending: Vec<Transaction> =
                    transactions.into_iter().filter(|tx| !tx.is_reward()).collect();
                let restored = pending.len();
                self.state.lock().pool.restore(pending);

                if cancel.load(Ordering::Relaxed) {
                    warn!("Mining cancelled, {} transactions returned to the pool", restored);
                    return Err(MiningError::Cancelled);
                }
                return Err(MiningError::Internal("nonce space exhausted".to_string()));
            }
        };

        let block = Block::new(nonce, prev_hash, transactions, timestamp);

        let height = {
            let mut state = self.state.lock();
            state.append(block.clone());
            state.chain.len() - 1
        };

        info!(
            "action=mining status=success height={} nonce={} transactions={} hash={}",
            height,
            block.nonce,
            block.transactions.len(),
            block.hash_hex()
        );

        Ok(block)
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Block {
        self.state.lock().tip().clone()
    }

    /// Copy of every committed block, genesis first
    pub fn chain_snapshot(&self) -> Vec<Block> {
        self.state.lock().chain.clone()
    }

    pub fn chain_len(&self) -> usize {
        self.state.lock().chain.len()
    }

    /// Copy of the transactions waiting for the next block
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.lock().pool.snapshot()
    }

    /// Sums every committed transfer touching `address`: credits as
    /// recipient, debits as sender. Walks the whole chain on each call.
    ///
    /// Fails with `AmountError::OutOfRange` when the running total leaves the
    /// range of `Amount`.
    pub fn balance_of(&self, address: &Address) -> Result<Amount, AmountError> {
        let state = self.state.lock();
        let mut balance = Amount::ZERO;

        for tx in state.chain.iter().flat_map(|block| block.transactions.iter()) {
            if &tx.recipient_address == address {
                balance = balance.checked_add(tx.amount)?;
            }
            if &tx.sender_address == address {
                balance = balance.checked_sub(tx.amount)?;
            }
        }

        Ok(balance)
    }

    /// Re-checks genesis, every `prev_hash` link and every proof of work
    pub fn verify_chain_integrity(&self) -> bool {
        let state = self.state.lock();
        is_valid_chain(&state.chain, self.difficulty)
    }
}

/// Validates a sequence of blocks as a chain mined at `difficulty`
pub fn is_valid_chain(chain: &[Block], difficulty: usize) -> bool {
    let genesis = match chain.first() {
        Some(genesis) => genesis,
        None => return false,
    };

    if genesis.nonce != 0 || genesis.prev_hash != genesis_prev_hash() {
        return false;
    }

    chain.windows(2).all(|pair| {
        let (previous, current) = (&pair[0], &pair[1]);
        current.prev_hash == previous.hash() && current.has_valid_proof(difficulty)
    })
}
